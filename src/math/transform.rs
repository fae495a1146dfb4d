use super::rot::Rot;
use super::vec2::Vec2;

/// A rigid transform: a translation followed by a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub position: Vec2,
    pub rot: Rot,
}

impl Transform {
    /// Creates a new transform from a position and an angle in radians.
    pub fn new(position: Vec2, angle: f64) -> Self {
        Self {
            position,
            rot: Rot::new(angle),
        }
    }

    /// Creates an identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self {
            position: Vec2::ZERO,
            rot: Rot::IDENTITY,
        }
    }

    pub fn set(&mut self, position: Vec2, angle: f64) {
        self.position = position;
        self.rot = Rot::new(angle);
    }

    pub fn angle(&self) -> f64 {
        self.rot.angle()
    }

    /// Applies the transform (rotation then translation) to a point.
    pub fn apply(&self, point: Vec2) -> Vec2 {
        self.rot.apply(point) + self.position
    }

    /// Applies the inverse transform (inverse translation then inverse rotation) to a point.
    pub fn apply_inverse(&self, point: Vec2) -> Vec2 {
        self.rot.apply_inverse(point - self.position)
    }

    /// `self * other`: maps from `other`'s frame through `self`.
    pub fn mul(&self, other: &Transform) -> Transform {
        Transform {
            position: self.rot.apply(other.position) + self.position,
            rot: self.rot.mul(other.rot),
        }
    }

    /// `self^-1 * other`: expresses `other` in this transform's frame.
    pub fn mul_t(&self, other: &Transform) -> Transform {
        Transform {
            position: self.rot.apply_inverse(other.position - self.position),
            rot: self.rot.mul_t(other.rot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_transform_identity() {
        let t = Transform::identity();
        let p = Vec2::new(5.0, -3.0);
        assert_eq!(t.apply(p), p);
        assert_eq!(t.apply_inverse(p), p);
    }

    #[test]
    fn test_transform_apply_combined() {
        // Rotate (1,0) by 90 degrees to (0,1), then translate by (10, 5)
        let t = Transform::new(Vec2::new(10.0, 5.0), PI / 2.0);
        let tp = t.apply(Vec2::new(1.0, 0.0));
        assert!((tp.x - 10.0).abs() < EPSILON);
        assert!((tp.y - 6.0).abs() < EPSILON);
    }

    #[test]
    fn test_transform_apply_inverse_round_trip() {
        let t = Transform::new(Vec2::new(10.0, 5.0), PI / 4.0);
        let p_local = Vec2::new(1.0, 1.0);
        let p_local_again = t.apply_inverse(t.apply(p_local));
        assert!((p_local_again.x - p_local.x).abs() < EPSILON);
        assert!((p_local_again.y - p_local.y).abs() < EPSILON);
    }

    #[test]
    fn test_transform_relative() {
        let a = Transform::new(Vec2::new(1.0, 2.0), 0.4);
        let b = Transform::new(Vec2::new(-3.0, 0.5), -1.1);
        let rel = a.mul_t(&b);
        let p = Vec2::new(0.7, -0.2);
        // b(p) == a(rel(p))
        let direct = b.apply(p);
        let via = a.apply(rel.apply(p));
        assert!((direct.x - via.x).abs() < EPSILON);
        assert!((direct.y - via.y).abs() < EPSILON);
        let back = a.mul(&rel);
        assert!((back.position.x - b.position.x).abs() < EPSILON);
        assert!((back.angle() - b.angle()).abs() < EPSILON);
    }
}
