use super::MassData;
use crate::collision::aabb::AABB;
use crate::collision::ray::{RayCastInput, RayCastOutput};
use crate::common::error::{PhysicsError, Result};
use crate::common::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS};
use crate::math::{Rot, Transform, Vec2};

/// A convex polygon in local space.
///
/// Vertices are stored counter-clockwise and `normals[i]` is the outward normal
/// of the edge `vertices[i] -> vertices[i + 1]`. The polygon carries a small
/// skin `radius` so that resting contacts keep a separation the continuous
/// collision code can work with.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub vertices: Vec<Vec2>,
    pub normals: Vec<Vec2>,
    pub centroid: Vec2,
    pub radius: f64,
}

impl Polygon {
    /// Creates a polygon from an ordered loop of vertices.
    ///
    /// The loop must be simple and convex. Clockwise input is reversed.
    /// Returns `InvalidShape` for fewer than 3 or more than
    /// `MAX_POLYGON_VERTICES` vertices, repeated vertices, zero area,
    /// reflex corners or self-intersection.
    pub fn new(vertices: Vec<Vec2>) -> Result<Self> {
        let n = vertices.len();
        if n < 3 || n > MAX_POLYGON_VERTICES {
            return Err(PhysicsError::InvalidShape(format!(
                "polygon needs 3 to {MAX_POLYGON_VERTICES} vertices, got {n}"
            )));
        }
        if vertices.iter().any(|v| !v.is_valid()) {
            return Err(PhysicsError::InvalidShape("polygon vertex is not finite".into()));
        }

        let mut vertices = vertices;
        if signed_area(&vertices) < 0.0 {
            vertices.reverse();
        }

        let mut winding = 0.0;
        for i in 0..n {
            let v0 = vertices[(i + n - 1) % n];
            let v1 = vertices[i];
            let v2 = vertices[(i + 1) % n];
            let e1 = v1 - v0;
            let e2 = v2 - v1;
            if e2.magnitude_squared() <= (0.5 * LINEAR_SLOP) * (0.5 * LINEAR_SLOP) {
                return Err(PhysicsError::InvalidShape(format!(
                    "polygon vertices {i} and {} coincide",
                    (i + 1) % n
                )));
            }
            if e1.cross(e2) <= 0.0 {
                return Err(PhysicsError::InvalidShape(format!(
                    "polygon is not convex at vertex {i}"
                )));
            }
            winding += e1.cross(e2).atan2(e1.dot(e2));
        }
        // Convex corners that wind more than once describe a star.
        if winding > 2.0 * std::f64::consts::PI + 1e-6 {
            return Err(PhysicsError::InvalidShape("polygon is self-intersecting".into()));
        }

        Self::from_ccw(vertices)
    }

    /// Creates the convex hull of a point cloud (gift wrapping).
    ///
    /// Points closer than half the linear slop are welded. Fails when the
    /// hull is degenerate (fewer than 3 points or collinear).
    pub fn from_hull(points: &[Vec2]) -> Result<Self> {
        if points.len() < 3 || points.len() > MAX_POLYGON_VERTICES {
            return Err(PhysicsError::InvalidShape(format!(
                "hull needs 3 to {MAX_POLYGON_VERTICES} points, got {}",
                points.len()
            )));
        }

        let weld_sq = (0.5 * LINEAR_SLOP) * (0.5 * LINEAR_SLOP);
        let mut ps: Vec<Vec2> = Vec::with_capacity(points.len());
        for &v in points {
            if !v.is_valid() {
                return Err(PhysicsError::InvalidShape("hull point is not finite".into()));
            }
            if ps.iter().all(|p| v.distance_squared(*p) >= weld_sq) {
                ps.push(v);
            }
        }
        if ps.len() < 3 {
            return Err(PhysicsError::InvalidShape("hull points are too close together".into()));
        }

        // Start from the right-most point (lowest y on ties); it is on the hull.
        let mut i0 = 0;
        let mut x0 = ps[0].x;
        for (i, p) in ps.iter().enumerate().skip(1) {
            if p.x > x0 || (p.x == x0 && p.y < ps[i0].y) {
                i0 = i;
                x0 = p.x;
            }
        }

        let mut hull: Vec<usize> = Vec::with_capacity(ps.len());
        let mut ih = i0;
        loop {
            if hull.len() >= ps.len() {
                break;
            }
            hull.push(ih);

            let mut ie = 0;
            for j in 1..ps.len() {
                if ie == ih {
                    ie = j;
                    continue;
                }
                let r = ps[ie] - ps[ih];
                let v = ps[j] - ps[ih];
                let c = r.cross(v);
                if c < 0.0 {
                    ie = j;
                }
                // Collinearity check: keep the farthest point.
                if c == 0.0 && v.magnitude_squared() > r.magnitude_squared() {
                    ie = j;
                }
            }

            ih = ie;
            if ie == i0 {
                break;
            }
        }

        if hull.len() < 3 {
            return Err(PhysicsError::InvalidShape("hull is collinear".into()));
        }
        Self::from_ccw(hull.into_iter().map(|i| ps[i]).collect())
    }

    /// An axis-aligned box centered on the local origin.
    pub fn new_box(half_width: f64, half_height: f64) -> Result<Self> {
        if !(half_width > 0.0 && half_height > 0.0) {
            return Err(PhysicsError::InvalidShape(format!(
                "box extents must be positive, got {half_width} x {half_height}"
            )));
        }
        Self::from_ccw(vec![
            Vec2::new(-half_width, -half_height),
            Vec2::new(half_width, -half_height),
            Vec2::new(half_width, half_height),
            Vec2::new(-half_width, half_height),
        ])
    }

    /// A box with the given center and rotation in local space.
    pub fn new_oriented_box(half_width: f64, half_height: f64, center: Vec2, angle: f64) -> Result<Self> {
        let base = Self::new_box(half_width, half_height)?;
        let xf = Transform {
            position: center,
            rot: Rot::new(angle),
        };
        Self::from_ccw(base.vertices.iter().map(|v| xf.apply(*v)).collect())
    }

    /// Checks what the collision code relies on: a counter-clockwise convex
    /// loop with one unit outward normal per edge.
    pub fn validate(&self) -> Result<()> {
        let n = self.vertices.len();
        if n < 3 || n > MAX_POLYGON_VERTICES {
            return Err(PhysicsError::InvalidShape(format!(
                "polygon needs 3 to {MAX_POLYGON_VERTICES} vertices, got {n}"
            )));
        }
        if self.normals.len() != n {
            return Err(PhysicsError::InvalidShape(format!(
                "polygon has {} normals for {n} vertices",
                self.normals.len()
            )));
        }
        if self.vertices.iter().any(|v| !v.is_valid()) || !self.centroid.is_valid() {
            return Err(PhysicsError::InvalidShape("polygon vertex is not finite".into()));
        }

        for i in 0..n {
            let v1 = self.vertices[i];
            let v2 = self.vertices[(i + 1) % n];
            let v3 = self.vertices[(i + 2) % n];
            let edge = v2 - v1;
            if edge.magnitude_squared() <= f64::EPSILON * f64::EPSILON {
                return Err(PhysicsError::InvalidShape(format!("polygon edge {i} has zero length")));
            }
            if edge.cross(v3 - v2) <= 0.0 {
                return Err(PhysicsError::InvalidShape(format!(
                    "polygon is not counter-clockwise convex at vertex {}",
                    (i + 1) % n
                )));
            }
            let expected = edge.right_perpendicular().normalize();
            if (self.normals[i] - expected).magnitude_squared() > 1e-12 {
                return Err(PhysicsError::InvalidShape(format!(
                    "polygon normal {i} does not match its edge"
                )));
            }
        }

        if signed_area(&self.vertices) <= f64::EPSILON {
            return Err(PhysicsError::InvalidShape("polygon area must be positive".into()));
        }
        super::validate_skin(self.radius)
    }

    fn from_ccw(vertices: Vec<Vec2>) -> Result<Self> {
        let n = vertices.len();
        let mut normals = Vec::with_capacity(n);
        for i in 0..n {
            let edge = vertices[(i + 1) % n] - vertices[i];
            if edge.magnitude_squared() <= f64::EPSILON * f64::EPSILON {
                return Err(PhysicsError::InvalidShape(format!("polygon edge {i} has zero length")));
            }
            normals.push(edge.right_perpendicular().normalize());
        }

        let area = signed_area(&vertices);
        if area <= f64::EPSILON {
            return Err(PhysicsError::InvalidShape(format!(
                "polygon area must be positive, got {area}"
            )));
        }

        let centroid = compute_centroid(&vertices);
        Ok(Polygon {
            vertices,
            normals,
            centroid,
            radius: POLYGON_RADIUS,
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Area of the core polygon (the skin radius is not included).
    pub fn area(&self) -> f64 {
        signed_area(&self.vertices)
    }

    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        let local = xf.apply_inverse(p);
        self.vertices
            .iter()
            .zip(&self.normals)
            .all(|(v, n)| n.dot(local - *v) <= 0.0)
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        // Put the ray into the polygon's frame of reference.
        let p1 = xf.apply_inverse(input.p1);
        let p2 = xf.apply_inverse(input.p2);
        let d = p2 - p1;

        let mut lower = 0.0;
        let mut upper = input.max_fraction;
        let mut index = None;

        for (i, (v, n)) in self.vertices.iter().zip(&self.normals).enumerate() {
            // p = p1 + a * d
            // dot(normal, p - v) = 0
            // dot(normal, p1 - v) + a * dot(normal, d) = 0
            let numerator = n.dot(*v - p1);
            let denominator = n.dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                // The segment enters this half-space.
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > 0.0 && numerator < upper * denominator {
                // The segment exits this half-space.
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|i| RayCastOutput {
            normal: xf.rot.apply(self.normals[i]),
            fraction: lower,
        })
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        let mut lower = xf.apply(self.vertices[0]);
        let mut upper = lower;
        for v in self.vertices.iter().skip(1) {
            let w = xf.apply(*v);
            lower = lower.min(w);
            upper = upper.max(w);
        }
        let r = Vec2::new(self.radius, self.radius);
        AABB {
            min: lower - r,
            max: upper + r,
        }
    }

    /// Mass properties by triangle fan decomposition. Inertia is about the local origin.
    pub fn compute_mass(&self, density: f64) -> MassData {
        const INV3: f64 = 1.0 / 3.0;

        let mut center = Vec2::ZERO;
        let mut area = 0.0;
        let mut inertia = 0.0;

        // Reference point inside the polygon keeps the fan numerically well behaved.
        let s = self.vertices[0];
        let n = self.vertices.len();
        for i in 0..n {
            let e1 = self.vertices[i] - s;
            let e2 = self.vertices[(i + 1) % n] - s;

            let d = e1.cross(e2);
            let triangle_area = 0.5 * d;
            area += triangle_area;
            center += (e1 + e2) * (triangle_area * INV3);

            let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * INV3 * d) * (intx2 + inty2);
        }

        let mass = density * area;
        center = center * (1.0 / area);
        let world_center = center + s;

        // Shift the inertia from the reference point to the origin.
        let inertia = density * inertia
            + mass * (world_center.magnitude_squared() - center.magnitude_squared());
        MassData {
            mass,
            center: world_center,
            inertia,
        }
    }
}

fn signed_area(vertices: &[Vec2]) -> f64 {
    let n = vertices.len();
    let mut area = 0.0;
    for i in 0..n {
        area += vertices[i].cross(vertices[(i + 1) % n]);
    }
    0.5 * area
}

fn compute_centroid(vertices: &[Vec2]) -> Vec2 {
    let origin = vertices[0];
    let mut centroid = Vec2::ZERO;
    let mut area = 0.0;
    for i in 1..vertices.len() - 1 {
        let e1 = vertices[i] - origin;
        let e2 = vertices[i + 1] - origin;
        let triangle_area = 0.5 * e1.cross(e2);
        area += triangle_area;
        centroid += (e1 + e2) * (triangle_area / 3.0);
    }
    centroid * (1.0 / area) + origin
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f64 = 1e-9;

    fn unit_square_at(offset: Vec2) -> Vec<Vec2> {
        vec![
            offset + Vec2::new(-0.5, -0.5),
            offset + Vec2::new(0.5, -0.5),
            offset + Vec2::new(0.5, 0.5),
            offset + Vec2::new(-0.5, 0.5),
        ]
    }

    #[test]
    fn test_polygon_new() {
        let polygon = Polygon::new(vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)]).unwrap();
        assert_eq!(polygon.vertex_count(), 3);
        assert_relative_eq!(polygon.area(), 0.5, epsilon = EPSILON);
        assert_relative_eq!(polygon.centroid.x, 1.0 / 3.0, epsilon = EPSILON);
    }

    #[test]
    fn test_polygon_built_by_hand_is_validated() {
        let segment = Polygon {
            vertices: vec![Vec2::ZERO, Vec2::X],
            normals: Vec::new(),
            centroid: Vec2::ZERO,
            radius: POLYGON_RADIUS,
        };
        assert!(matches!(segment.validate(), Err(PhysicsError::InvalidShape(_))));

        let square = Polygon::new(unit_square_at(Vec2::ZERO)).unwrap();
        assert!(square.validate().is_ok());
        assert!(Polygon::new_box(0.001, 0.001).unwrap().validate().is_ok());

        let missing_normal = Polygon { normals: square.normals[..3].to_vec(), ..square.clone() };
        assert!(missing_normal.validate().is_err());

        let mut flipped = square.clone();
        flipped.normals[1] = -flipped.normals[1];
        assert!(flipped.validate().is_err());

        let mut clockwise = square.clone();
        clockwise.vertices.reverse();
        assert!(clockwise.validate().is_err());

        let fat = Polygon { radius: f64::NAN, ..square };
        assert!(fat.validate().is_err());
    }

    #[test]
    fn test_polygon_too_few_vertices() {
        let err = Polygon::new(vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)]);
        assert!(matches!(err, Err(PhysicsError::InvalidShape(_))));
    }

    #[test]
    fn test_polygon_clockwise_input_is_reversed() {
        let mut vertices = unit_square_at(Vec2::ZERO);
        vertices.reverse();
        let polygon = Polygon::new(vertices).unwrap();
        assert!(polygon.area() > 0.0);
        // Outward normal of the first edge points down for a CCW square starting bottom-left.
        assert!(polygon.normals.iter().any(|n| (n.y + 1.0).abs() < EPSILON));
    }

    #[test]
    fn test_polygon_rejects_degenerate_and_concave() {
        let collinear = vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0)];
        assert!(Polygon::new(collinear).is_err());

        let concave = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.5),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        assert!(Polygon::new(concave).is_err());

        // A pentagram has only convex turns but winds twice.
        let star: Vec<Vec2> = (0..5)
            .map(|i| {
                let angle = std::f64::consts::FRAC_PI_2 + i as f64 * 4.0 * std::f64::consts::PI / 5.0;
                Vec2::new(angle.cos(), angle.sin())
            })
            .collect();
        assert!(Polygon::new(star).is_err());
    }

    #[test]
    fn test_polygon_hull() {
        let points = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.5),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
            Vec2::new(1.0, 0.0),
        ];
        let hull = Polygon::from_hull(&points).unwrap();
        assert_eq!(hull.vertex_count(), 4);
        assert_relative_eq!(hull.area(), 4.0, epsilon = EPSILON);

        let collinear = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0)];
        assert!(Polygon::from_hull(&collinear).is_err());
    }

    #[test]
    fn test_polygon_mass_square_centered() {
        let polygon = Polygon::new(unit_square_at(Vec2::ZERO)).unwrap();
        let md = polygon.compute_mass(1.0);
        assert_relative_eq!(md.mass, 1.0, epsilon = EPSILON);
        assert_relative_eq!(md.center.x, 0.0, epsilon = EPSILON);
        // Rectangle inertia about its centroid: m (w^2 + h^2) / 12
        assert_relative_eq!(md.inertia, 1.0 / 6.0, epsilon = EPSILON);
    }

    #[test]
    fn test_polygon_mass_square_offset() {
        let offset = Vec2::new(10.0, 0.0);
        let polygon = Polygon::new(unit_square_at(offset)).unwrap();
        let md = polygon.compute_mass(2.0);
        assert_relative_eq!(md.mass, 2.0, epsilon = EPSILON);
        assert_relative_eq!(md.center.x, 10.0, epsilon = EPSILON);
        // Inertia about the origin picks up the parallel-axis term
        let about_centroid = md.inertia - md.mass * md.center.magnitude_squared();
        assert_relative_eq!(about_centroid, 2.0 / 6.0, epsilon = 1e-7);
    }

    #[test]
    fn test_polygon_oriented_box() {
        let polygon = Polygon::new_oriented_box(1.0, 0.5, Vec2::new(3.0, 1.0), std::f64::consts::FRAC_PI_2).unwrap();
        assert_relative_eq!(polygon.centroid.x, 3.0, epsilon = EPSILON);
        assert_relative_eq!(polygon.centroid.y, 1.0, epsilon = EPSILON);
        let aabb = polygon.compute_aabb(&Transform::identity());
        // Rotated a quarter turn, the long side is vertical
        assert_relative_eq!(aabb.max.y - aabb.min.y, 2.0 + 2.0 * polygon.radius, epsilon = EPSILON);
    }

    #[test]
    fn test_polygon_test_point_and_ray() {
        let polygon = Polygon::new_box(1.0, 1.0).unwrap();
        let xf = Transform::new(Vec2::new(5.0, 0.0), 0.3);
        assert!(polygon.test_point(&xf, Vec2::new(5.2, 0.1)));
        assert!(!polygon.test_point(&xf, Vec2::new(3.0, 0.0)));

        let input = RayCastInput {
            p1: Vec2::new(0.0, 0.0),
            p2: Vec2::new(10.0, 0.0),
            max_fraction: 1.0,
        };
        let hit = polygon.ray_cast(&input, &Transform::new(Vec2::new(5.0, 0.0), 0.0)).unwrap();
        assert_relative_eq!(hit.fraction, 0.4, epsilon = EPSILON);
        assert_relative_eq!(hit.normal.x, -1.0, epsilon = EPSILON);
    }
}
