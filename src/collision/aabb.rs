// Defines an Axis-Aligned Bounding Box

use super::ray::{RayCastInput, RayCastOutput};
use crate::math::vec2::Vec2;

/// An Axis-Aligned Bounding Box defined by its minimum and maximum corner points.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AABB {
    pub min: Vec2,
    pub max: Vec2,
}

impl AABB {
    /// Creates a new AABB. The corners may be given in any order.
    pub fn new(min: Vec2, max: Vec2) -> Self {
        AABB {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Checks if this AABB overlaps with another AABB. Touching boxes overlap.
    pub fn overlaps(&self, other: &AABB) -> bool {
        let x_overlap = self.max.x >= other.min.x && self.min.x <= other.max.x;
        let y_overlap = self.max.y >= other.min.y && self.min.y <= other.max.y;
        x_overlap && y_overlap
    }

    /// Merges another AABB into this one, expanding this AABB to contain both.
    pub fn merge(&mut self, other: &AABB) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// The smallest AABB containing both inputs.
    pub fn combine(a: &AABB, b: &AABB) -> AABB {
        AABB {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        }
    }

    /// Creates an AABB that encompasses a set of points.
    pub fn from_points(points: &[Vec2]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut aabb = AABB {
            min: *first,
            max: *first,
        };
        for point in rest {
            aabb.min = aabb.min.min(*point);
            aabb.max = aabb.max.max(*point);
        }
        Some(aabb)
    }

    /// True when `other` lies entirely inside this box.
    pub fn contains(&self, other: &AABB) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    /// Grows the box by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> AABB {
        let r = Vec2::new(margin, margin);
        AABB {
            min: self.min - r,
            max: self.max + r,
        }
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    /// Perimeter, used as the surface-area cost in the dynamic tree.
    pub fn perimeter(&self) -> f64 {
        2.0 * ((self.max.x - self.min.x) + (self.max.y - self.min.y))
    }

    pub fn is_valid(&self) -> bool {
        let d = self.max - self.min;
        d.x >= 0.0 && d.y >= 0.0 && self.min.is_valid() && self.max.is_valid()
    }

    /// Slab test against a ray. Returns the entry point fraction and face normal.
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let mut tmin = f64::MIN;
        let mut tmax = f64::MAX;

        let p = input.p1;
        let d = input.p2 - input.p1;
        let abs_d = d.abs();
        let mut normal = Vec2::ZERO;

        let axes = [
            (p.x, d.x, abs_d.x, self.min.x, self.max.x, Vec2::new(1.0, 0.0)),
            (p.y, d.y, abs_d.y, self.min.y, self.max.y, Vec2::new(0.0, 1.0)),
        ];
        for (p_i, d_i, abs_d_i, lower, upper, axis) in axes {
            if abs_d_i < f64::EPSILON {
                // Parallel
                if p_i < lower || upper < p_i {
                    return None;
                }
            } else {
                let inv_d = 1.0 / d_i;
                let mut t1 = (lower - p_i) * inv_d;
                let mut t2 = (upper - p_i) * inv_d;
                // Sign of the normal vector
                let mut s = -1.0;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                    s = 1.0;
                }
                if t1 > tmin {
                    normal = axis * s;
                    tmin = t1;
                }
                tmax = tmax.min(t2);
                if tmin > tmax {
                    return None;
                }
            }
        }

        // The ray must start outside the box and hit within its range.
        if tmin < 0.0 || input.max_fraction < tmin {
            return None;
        }
        Some(RayCastOutput {
            normal,
            fraction: tmin,
        })
    }
}
