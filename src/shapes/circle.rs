use std::f64::consts::PI;

use super::MassData;
use crate::collision::aabb::AABB;
use crate::collision::ray::{RayCastInput, RayCastOutput};
use crate::common::error::{PhysicsError, Result};
use crate::math::{Transform, Vec2};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    /// Center in body-local coordinates.
    pub position: Vec2,
    pub radius: f64,
}

impl Circle {
    pub fn new(radius: f64) -> Result<Self> {
        Self::with_position(Vec2::ZERO, radius)
    }

    pub fn with_position(position: Vec2, radius: f64) -> Result<Self> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(PhysicsError::InvalidShape(format!(
                "circle radius must be finite and non-negative, got {radius}"
            )));
        }
        if !position.is_valid() {
            return Err(PhysicsError::InvalidShape("circle center is not finite".into()));
        }
        Ok(Self { position, radius })
    }

    pub fn validate(&self) -> Result<()> {
        Self::with_position(self.position, self.radius).map(|_| ())
    }

    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        let center = xf.apply(self.position);
        (p - center).magnitude_squared() <= self.radius * self.radius
    }

    /// Collision detection in Real-Time Collision Detection, 3.1.2 / 5.3.2.
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let position = xf.apply(self.position);
        let s = input.p1 - position;
        let b = s.magnitude_squared() - self.radius * self.radius;

        // Solve quadratic equation.
        let r = input.p2 - input.p1;
        let c = s.dot(r);
        let rr = r.magnitude_squared();
        let sigma = c * c - rr * b;

        // Check for negative discriminant and short segment.
        if sigma < 0.0 || rr < f64::EPSILON {
            return None;
        }

        // Find the point of intersection of the line with the circle.
        let a = -(c + sigma.sqrt());

        // Is the intersection point on the segment?
        if 0.0 <= a && a <= input.max_fraction * rr {
            let fraction = a / rr;
            let normal = (s + r * fraction).normalize();
            return Some(RayCastOutput { normal, fraction });
        }
        None
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        let p = xf.apply(self.position);
        let r = Vec2::new(self.radius, self.radius);
        AABB { min: p - r, max: p + r }
    }

    pub fn compute_mass(&self, density: f64) -> MassData {
        let rr = self.radius * self.radius;
        let mass = density * PI * rr;
        MassData {
            mass,
            center: self.position,
            // Inertia about the local origin
            inertia: mass * (0.5 * rr + self.position.magnitude_squared()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_circle_new() {
        let c = Circle::new(5.0).unwrap();
        assert_eq!(c.radius, 5.0);
        assert_eq!(c.position, Vec2::ZERO);
    }

    #[test]
    fn test_circle_negative_radius_rejected() {
        assert!(matches!(Circle::new(-1.0), Err(PhysicsError::InvalidShape(_))));
        assert!(Circle::new(f64::NAN).is_err());
    }

    #[test]
    fn test_circle_built_by_hand_is_validated() {
        let negative = Circle { position: Vec2::ZERO, radius: -1.0 };
        assert!(matches!(negative.validate(), Err(PhysicsError::InvalidShape(_))));
        let stray = Circle { position: Vec2::new(f64::NAN, 0.0), radius: 1.0 };
        assert!(stray.validate().is_err());
        assert!(Circle::new(0.5).unwrap().validate().is_ok());
    }

    #[test]
    fn test_circle_mass() {
        let c = Circle::new(2.0).unwrap();
        let md = c.compute_mass(1.0);
        assert_relative_eq!(md.mass, 4.0 * PI, epsilon = 1e-12);
        assert_relative_eq!(md.inertia, 0.5 * md.mass * 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_circle_ray_cast_and_point() {
        let c = Circle::with_position(Vec2::new(1.0, 0.0), 1.0).unwrap();
        let xf = Transform::new(Vec2::new(2.0, 0.0), 0.0);
        assert!(c.test_point(&xf, Vec2::new(3.5, 0.0)));
        assert!(!c.test_point(&xf, Vec2::new(0.5, 0.0)));

        let input = RayCastInput {
            p1: Vec2::new(0.0, 0.0),
            p2: Vec2::new(10.0, 0.0),
            max_fraction: 1.0,
        };
        let hit = c.ray_cast(&input, &xf).unwrap();
        assert_relative_eq!(hit.fraction, 0.2, epsilon = 1e-12);
        assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_circle_aabb() {
        let c = Circle::with_position(Vec2::new(0.0, 1.0), 0.5).unwrap();
        let xf = Transform::new(Vec2::new(1.0, 1.0), std::f64::consts::FRAC_PI_2);
        let aabb = c.compute_aabb(&xf);
        // (0,1) rotated by 90 degrees is (-1,0), then shifted to (0,1)
        assert_relative_eq!(aabb.min.x, -0.5, epsilon = 1e-12);
        assert_relative_eq!(aabb.max.y, 1.5, epsilon = 1e-12);
    }
}
