use super::edge::Edge;
use super::MassData;
use crate::collision::aabb::AABB;
use crate::collision::ray::{RayCastInput, RayCastOutput};
use crate::common::error::{PhysicsError, Result};
use crate::common::settings::{LINEAR_SLOP, POLYGON_RADIUS};
use crate::math::{Transform, Vec2};

/// A free-form sequence of line segments, open or closed.
///
/// Each segment is a child with its own broadphase proxy. Children are
/// materialized as [`Edge`]s with ghost vertices taken from the neighbors,
/// so polygons slide across internal vertices smoothly.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub vertices: Vec<Vec2>,
    /// Ghost vertex before the first vertex of an open chain.
    pub prev_vertex: Option<Vec2>,
    /// Ghost vertex after the last vertex of an open chain.
    pub next_vertex: Option<Vec2>,
    pub is_loop: bool,
    pub radius: f64,
}

impl Chain {
    /// An open chain through `vertices` (at least 2).
    pub fn new_chain(vertices: Vec<Vec2>) -> Result<Self> {
        if vertices.len() < 2 {
            return Err(PhysicsError::InvalidShape(format!(
                "chain needs at least 2 vertices, got {}",
                vertices.len()
            )));
        }
        validate_spacing(&vertices, false)?;
        Ok(Chain {
            vertices,
            prev_vertex: None,
            next_vertex: None,
            is_loop: false,
            radius: POLYGON_RADIUS,
        })
    }

    /// A closed loop through `vertices` (at least 3). The last vertex connects back to the first.
    pub fn new_loop(vertices: Vec<Vec2>) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(PhysicsError::InvalidShape(format!(
                "chain loop needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        validate_spacing(&vertices, true)?;
        Ok(Chain {
            vertices,
            prev_vertex: None,
            next_vertex: None,
            is_loop: true,
            radius: POLYGON_RADIUS,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let min = if self.is_loop { 3 } else { 2 };
        if self.vertices.len() < min {
            return Err(PhysicsError::InvalidShape(format!(
                "chain needs at least {min} vertices, got {}",
                self.vertices.len()
            )));
        }
        validate_spacing(&self.vertices, self.is_loop)?;
        super::validate_ghosts([self.prev_vertex, self.next_vertex])?;
        super::validate_skin(self.radius)
    }

    /// Sets the ghost vertices of an open chain. Ignored for loops.
    pub fn with_ghosts(mut self, prev_vertex: Option<Vec2>, next_vertex: Option<Vec2>) -> Self {
        if !self.is_loop {
            self.prev_vertex = prev_vertex;
            self.next_vertex = next_vertex;
        }
        self
    }

    pub fn child_count(&self) -> usize {
        if self.is_loop {
            self.vertices.len()
        } else {
            self.vertices.len().saturating_sub(1)
        }
    }

    /// The segment for child `index` with neighbor ghost vertices.
    pub fn child_edge(&self, index: usize) -> Edge {
        let n = self.vertices.len();
        debug_assert!(index < self.child_count());

        let vertex1 = self.vertices[index];
        let vertex2 = self.vertices[(index + 1) % n];

        let vertex0 = if index > 0 {
            Some(self.vertices[index - 1])
        } else if self.is_loop {
            Some(self.vertices[n - 1])
        } else {
            self.prev_vertex
        };

        let vertex3 = if index + 2 < n {
            Some(self.vertices[index + 2])
        } else if self.is_loop {
            Some(self.vertices[(index + 2) % n])
        } else {
            self.next_vertex
        };

        Edge {
            vertex1,
            vertex2,
            vertex0,
            vertex3,
            radius: self.radius,
        }
    }

    pub fn test_point(&self, _xf: &Transform, _p: Vec2) -> bool {
        false
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform, child: usize) -> Option<RayCastOutput> {
        self.child_edge(child).ray_cast(input, xf)
    }

    pub fn compute_aabb(&self, xf: &Transform, child: usize) -> AABB {
        let n = self.vertices.len();
        let v1 = xf.apply(self.vertices[child]);
        let v2 = xf.apply(self.vertices[(child + 1) % n]);
        let r = Vec2::new(self.radius, self.radius);
        AABB {
            min: v1.min(v2) - r,
            max: v1.max(v2) + r,
        }
    }

    pub fn compute_mass(&self, _density: f64) -> MassData {
        MassData::default()
    }
}

fn validate_spacing(vertices: &[Vec2], is_loop: bool) -> Result<()> {
    let min_sq = (0.5 * LINEAR_SLOP) * (0.5 * LINEAR_SLOP);
    let n = vertices.len();
    let segments = if is_loop { n } else { n - 1 };
    for i in 0..segments {
        let v1 = vertices[i];
        let v2 = vertices[(i + 1) % n];
        if !v1.is_valid() || !v2.is_valid() {
            return Err(PhysicsError::InvalidShape("chain vertex is not finite".into()));
        }
        if v1.distance_squared(v2) <= min_sq {
            return Err(PhysicsError::InvalidShape(format!(
                "chain vertices {i} and {} are too close",
                (i + 1) % n
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Vec2> {
        vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ]
    }

    #[test]
    fn test_chain_validation() {
        assert!(Chain::new_chain(vec![Vec2::ZERO]).is_err());
        assert!(Chain::new_loop(vec![Vec2::ZERO, Vec2::X]).is_err());
        assert!(Chain::new_chain(vec![Vec2::ZERO, Vec2::new(0.001, 0.0)]).is_err());
        // The closing segment of a loop is checked too
        let mut closing = square();
        closing.push(Vec2::new(0.0, 0.0001));
        assert!(Chain::new_loop(closing).is_err());
    }

    #[test]
    fn test_chain_built_by_hand_is_validated() {
        let lone = Chain {
            vertices: vec![Vec2::ZERO],
            prev_vertex: None,
            next_vertex: None,
            is_loop: false,
            radius: POLYGON_RADIUS,
        };
        assert!(matches!(lone.validate(), Err(PhysicsError::InvalidShape(_))));

        let empty = Chain { vertices: Vec::new(), ..lone.clone() };
        assert!(empty.validate().is_err());
        assert_eq!(empty.child_count(), 0);

        let open_square = Chain { vertices: square(), ..lone.clone() };
        assert!(open_square.validate().is_ok());
        let two_point_loop = Chain { vertices: vec![Vec2::ZERO, Vec2::X], is_loop: true, ..lone };
        assert!(two_point_loop.validate().is_err());

        assert!(Chain::new_loop(square()).unwrap().validate().is_ok());
    }

    #[test]
    fn test_open_chain_children() {
        let chain = Chain::new_chain(square())
            .unwrap()
            .with_ghosts(Some(Vec2::new(-1.0, 0.0)), None);
        assert_eq!(chain.child_count(), 3);

        let first = chain.child_edge(0);
        assert_eq!(first.vertex0, Some(Vec2::new(-1.0, 0.0)));
        assert_eq!(first.vertex3, Some(Vec2::new(1.0, 1.0)));

        let last = chain.child_edge(2);
        assert_eq!(last.vertex1, Vec2::new(1.0, 1.0));
        assert_eq!(last.vertex2, Vec2::new(0.0, 1.0));
        assert_eq!(last.vertex3, None);
    }

    #[test]
    fn test_loop_children_wrap() {
        let chain = Chain::new_loop(square()).unwrap();
        assert_eq!(chain.child_count(), 4);

        let closing = chain.child_edge(3);
        assert_eq!(closing.vertex1, Vec2::new(0.0, 1.0));
        assert_eq!(closing.vertex2, Vec2::new(0.0, 0.0));
        assert_eq!(closing.vertex0, Some(Vec2::new(1.0, 1.0)));
        assert_eq!(closing.vertex3, Some(Vec2::new(1.0, 0.0)));

        let first = chain.child_edge(0);
        assert_eq!(first.vertex0, Some(Vec2::new(0.0, 1.0)));

        let aabb = chain.compute_aabb(&Transform::identity(), 3);
        assert!(aabb.min.x < 0.0 && aabb.max.y > 1.0);
    }
}
