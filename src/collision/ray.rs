use crate::math::vec2::Vec2;

/// A ray segment from `p1` towards `p2`, cut off at `max_fraction` of its length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    pub max_fraction: f64,
}

/// Hit information for a ray: the surface normal and the fraction along `p1 -> p2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastOutput {
    pub normal: Vec2,
    pub fraction: f64,
}
