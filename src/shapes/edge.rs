use super::MassData;
use crate::collision::aabb::AABB;
use crate::collision::ray::{RayCastInput, RayCastOutput};
use crate::common::error::{PhysicsError, Result};
use crate::common::settings::{LINEAR_SLOP, POLYGON_RADIUS};
use crate::math::{Transform, Vec2};

/// A line segment. Optional ghost vertices describe the neighbors of the
/// segment so that bodies sliding across a chain of edges do not catch on
/// the internal vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub vertex1: Vec2,
    pub vertex2: Vec2,
    pub vertex0: Option<Vec2>,
    pub vertex3: Option<Vec2>,
    pub radius: f64,
}

impl Edge {
    pub fn new(vertex1: Vec2, vertex2: Vec2) -> Result<Self> {
        if !vertex1.is_valid() || !vertex2.is_valid() {
            return Err(PhysicsError::InvalidShape("edge vertex is not finite".into()));
        }
        if vertex1.distance_squared(vertex2) <= (0.5 * LINEAR_SLOP) * (0.5 * LINEAR_SLOP) {
            return Err(PhysicsError::InvalidShape(format!(
                "edge from {vertex1:?} to {vertex2:?} is degenerate"
            )));
        }
        Ok(Edge {
            vertex1,
            vertex2,
            vertex0: None,
            vertex3: None,
            radius: POLYGON_RADIUS,
        })
    }

    pub fn validate(&self) -> Result<()> {
        Edge::new(self.vertex1, self.vertex2)?;
        super::validate_ghosts([self.vertex0, self.vertex3])?;
        super::validate_skin(self.radius)
    }

    /// Attaches ghost vertices before `vertex1` and after `vertex2`.
    pub fn with_ghosts(mut self, vertex0: Option<Vec2>, vertex3: Option<Vec2>) -> Self {
        self.vertex0 = vertex0;
        self.vertex3 = vertex3;
        self
    }

    /// Edges have no area, so nothing is ever inside them.
    pub fn test_point(&self, _xf: &Transform, _p: Vec2) -> bool {
        false
    }

    /// Two-sided ray cast. The normal faces the ray origin.
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let p1 = xf.apply_inverse(input.p1);
        let p2 = xf.apply_inverse(input.p2);
        let d = p2 - p1;

        let v1 = self.vertex1;
        let v2 = self.vertex2;
        let e = v2 - v1;
        let normal = e.right_perpendicular().normalize();

        // q = p1 + t * d
        // dot(normal, q - v1) = 0
        let numerator = normal.dot(v1 - p1);
        let denominator = normal.dot(d);
        if denominator == 0.0 {
            return None;
        }

        let t = numerator / denominator;
        if t < 0.0 || input.max_fraction < t {
            return None;
        }

        let q = p1 + d * t;

        // q = v1 + s * r
        let rr = e.magnitude_squared();
        if rr == 0.0 {
            return None;
        }
        let s = (q - v1).dot(e) / rr;
        if !(0.0..=1.0).contains(&s) {
            return None;
        }

        let local_normal = if numerator > 0.0 { -normal } else { normal };
        Some(RayCastOutput {
            normal: xf.rot.apply(local_normal),
            fraction: t,
        })
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        let v1 = xf.apply(self.vertex1);
        let v2 = xf.apply(self.vertex2);
        let r = Vec2::new(self.radius, self.radius);
        AABB {
            min: v1.min(v2) - r,
            max: v1.max(v2) + r,
        }
    }

    pub fn compute_mass(&self, _density: f64) -> MassData {
        MassData {
            mass: 0.0,
            center: (self.vertex1 + self.vertex2) * 0.5,
            inertia: 0.0,
        }
    }
}
