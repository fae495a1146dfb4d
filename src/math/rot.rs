use super::vec2::Vec2;

/// A rotation stored as its sine and cosine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rot {
    pub s: f64,
    pub c: f64,
}

impl Rot {
    pub const IDENTITY: Rot = Rot { s: 0.0, c: 1.0 };

    /// Creates a rotation from an angle in radians.
    pub fn new(angle: f64) -> Self {
        Self {
            s: angle.sin(),
            c: angle.cos(),
        }
    }

    pub fn set(&mut self, angle: f64) {
        *self = Rot::new(angle);
    }

    /// Returns the angle in radians, in [-PI, PI].
    pub fn angle(self) -> f64 {
        self.s.atan2(self.c)
    }

    pub fn x_axis(self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    pub fn y_axis(self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    /// Rotates a vector.
    pub fn apply(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Inverse rotates a vector.
    pub fn apply_inverse(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// Composes two rotations: `self * other`.
    pub fn mul(self, other: Rot) -> Rot {
        Rot {
            s: self.s * other.c + self.c * other.s,
            c: self.c * other.c - self.s * other.s,
        }
    }

    /// Transposed composition: `self^T * other`.
    pub fn mul_t(self, other: Rot) -> Rot {
        Rot {
            s: self.c * other.s - self.s * other.c,
            c: self.c * other.c + self.s * other.s,
        }
    }
}

impl Default for Rot {
    fn default() -> Self {
        Rot::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_rot_apply_and_inverse() {
        let q = Rot::new(PI / 2.0);
        let v = q.apply(Vec2::new(1.0, 0.0));
        assert!(v.x.abs() < EPSILON);
        assert!((v.y - 1.0).abs() < EPSILON);
        let back = q.apply_inverse(v);
        assert!((back.x - 1.0).abs() < EPSILON);
        assert!(back.y.abs() < EPSILON);
    }

    #[test]
    fn test_rot_compose() {
        let a = Rot::new(0.3);
        let b = Rot::new(0.5);
        assert!((a.mul(b).angle() - 0.8).abs() < EPSILON);
        assert!((a.mul_t(b).angle() - 0.2).abs() < EPSILON);
    }
}
