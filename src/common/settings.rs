//! Global tuning constants and the per-world solver configuration.

use std::f64::consts::PI;

/// Maximum number of contact points between two convex shapes.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Maximum number of vertices on a convex polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Collision and constraint tolerance, in meters. Chosen to be numerically
/// significant but visually insignificant.
pub const LINEAR_SLOP: f64 = 0.005;

/// Collision and constraint tolerance, in radians.
pub const ANGULAR_SLOP: f64 = 2.0 / 180.0 * PI;

/// Skin radius around polygons and edges. Keeps polygons slightly apart so
/// continuous collision works on the core shapes.
pub const POLYGON_RADIUS: f64 = 2.0 * LINEAR_SLOP;

/// Maximum number of outer iterations in the time-of-impact solver.
pub const MAX_TOI_ITERATIONS: usize = 20;

/// Order in which the two halves of a contact's velocity constraint are solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrictionOrder {
    /// Non-penetration first, then friction clamped by the fresh normal impulse.
    #[default]
    NormalFirst,
    /// Friction first, so the normal constraint gets the final word each iteration.
    TangentFirst,
}

/// Solver and sleep configuration owned by a world.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Relative normal speed below which restitution is ignored.
    pub velocity_threshold: f64,
    /// Largest position correction applied per position iteration.
    pub max_linear_correction: f64,
    pub max_angular_correction: f64,
    /// Largest translation of a body per step. Guards against numerical blow-up.
    pub max_translation: f64,
    pub max_rotation: f64,
    /// Fraction of overlap resolved per position iteration.
    pub baumgarte: f64,
    pub toi_baumgarte: f64,
    /// Time a body must stay at rest before its island may sleep.
    pub time_to_sleep: f64,
    pub linear_sleep_tolerance: f64,
    pub angular_sleep_tolerance: f64,
    /// Margin added to broadphase AABBs so small motions need no tree update.
    pub aabb_extension: f64,
    /// Scales the displacement used to predict broadphase AABB movement.
    pub aabb_multiplier: f64,
    /// Maximum time-of-impact sub-steps per contact.
    pub max_sub_steps: u32,
    /// Maximum contacts gathered into one time-of-impact island.
    pub max_toi_contacts: usize,
    pub warm_starting: bool,
    pub continuous_physics: bool,
    /// Stop after the first time-of-impact event each step. Intended for debugging.
    pub sub_stepping: bool,
    pub allow_sleeping: bool,
    /// Solve two-point manifolds with the 2x2 block solver.
    pub block_solve: bool,
    pub friction_order: FrictionOrder,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            velocity_threshold: 1.0,
            max_linear_correction: 0.2,
            max_angular_correction: 8.0 / 180.0 * PI,
            max_translation: 2.0,
            max_rotation: 0.5 * PI,
            baumgarte: 0.2,
            toi_baumgarte: 0.75,
            time_to_sleep: 0.5,
            linear_sleep_tolerance: 0.01,
            angular_sleep_tolerance: 2.0 / 180.0 * PI,
            aabb_extension: 0.1,
            aabb_multiplier: 2.0,
            max_sub_steps: 8,
            max_toi_contacts: 32,
            warm_starting: true,
            continuous_physics: true,
            sub_stepping: false,
            allow_sleeping: true,
            block_solve: true,
            friction_order: FrictionOrder::NormalFirst,
        }
    }
}
