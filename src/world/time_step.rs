//! Per-step solver inputs and the island-local body state arrays.

use crate::math::Vec2;

/// Parameters of one solver pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStep {
    pub dt: f64,
    /// Inverse time step, zero when `dt` is zero.
    pub inv_dt: f64,
    /// `dt * inv_dt0`, scales warm-start impulses after a change in step size.
    pub dt_ratio: f64,
    pub velocity_iterations: usize,
    pub position_iterations: usize,
    pub warm_starting: bool,
}

impl TimeStep {
    pub fn new(dt: f64, velocity_iterations: usize, position_iterations: usize) -> Self {
        TimeStep {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            dt_ratio: 1.0,
            velocity_iterations,
            position_iterations,
            warm_starting: true,
        }
    }
}

/// Center of mass position and angle of an island body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub c: Vec2,
    pub a: f64,
}

/// Linear and angular velocity of an island body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    pub v: Vec2,
    pub w: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_dt_has_zero_inverse() {
        let step = TimeStep::new(0.0, 8, 3);
        assert_eq!(step.inv_dt, 0.0);
        let step = TimeStep::new(0.5, 8, 3);
        assert_eq!(step.inv_dt, 2.0);
        assert_eq!(step.dt_ratio, 1.0);
    }
}
