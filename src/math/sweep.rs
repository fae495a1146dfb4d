use super::transform::Transform;
use super::vec2::Vec2;
use std::f64::consts::PI;

/// Describes the motion of a body's center of mass over a time step.
///
/// `c0`/`a0` are the center and angle at time `alpha0`, `c`/`a` at the end of the step.
/// The shape origin is recovered through `local_center`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sweep {
    pub local_center: Vec2,
    pub c0: Vec2,
    pub c: Vec2,
    pub a0: f64,
    pub a: f64,
    /// Fraction of the current step already consumed, in [0, 1).
    pub alpha0: f64,
}

impl Sweep {
    /// Interpolated transform at `beta` in [0, 1] of the remaining sweep.
    pub fn get_transform(&self, beta: f64) -> Transform {
        let position = self.c0 * (1.0 - beta) + self.c * beta;
        let angle = (1.0 - beta) * self.a0 + beta * self.a;
        let mut xf = Transform::new(position, angle);
        xf.position -= xf.rot.apply(self.local_center);
        xf
    }

    /// Advances the start of the sweep forward to `alpha`, keeping the end fixed.
    pub fn advance(&mut self, alpha: f64) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += beta * (self.a - self.a0);
        self.alpha0 = alpha;
    }

    /// Wraps the angles so `a0` lies in [0, 2PI).
    pub fn normalize(&mut self) {
        let two_pi = 2.0 * PI;
        let d = two_pi * (self.a0 / two_pi).floor();
        self.a0 -= d;
        self.a -= d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_sweep_interpolates() {
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: Vec2::new(0.0, 0.0),
            c: Vec2::new(10.0, 0.0),
            a0: 0.0,
            a: 1.0,
            alpha0: 0.0,
        };
        let xf = sweep.get_transform(0.25);
        assert!((xf.position.x - 2.5).abs() < EPSILON);
        assert!((xf.angle() - 0.25).abs() < EPSILON);
    }

    #[test]
    fn test_sweep_local_center_offset() {
        let sweep = Sweep {
            local_center: Vec2::new(1.0, 0.0),
            c0: Vec2::new(1.0, 0.0),
            c: Vec2::new(1.0, 0.0),
            a0: PI,
            a: PI,
            alpha0: 0.0,
        };
        // Rotating by PI about the center puts the origin at (2, 0)
        let xf = sweep.get_transform(1.0);
        assert!((xf.position.x - 2.0).abs() < 1e-9);
        assert!(xf.position.y.abs() < 1e-9);
    }

    #[test]
    fn test_sweep_advance() {
        let mut sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: Vec2::ZERO,
            c: Vec2::new(4.0, 0.0),
            a0: 0.0,
            a: 0.0,
            alpha0: 0.0,
        };
        sweep.advance(0.5);
        assert!((sweep.c0.x - 2.0).abs() < EPSILON);
        assert!((sweep.alpha0 - 0.5).abs() < EPSILON);
        // The interpolation restarts from the advanced point
        assert!((sweep.get_transform(0.5).position.x - 3.0).abs() < EPSILON);
    }
}
