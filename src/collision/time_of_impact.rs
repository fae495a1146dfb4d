//! Time of impact by conservative advancement.
//!
//! The GJK closest features define a separating axis; a 1D root finder then
//! pushes the sweep forward until that axis reaches the target separation.
//! Repeats until the proxies are touching or proven apart.

use super::distance::{distance, DistanceInput, DistanceProxy, SimplexCache};
use crate::common::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, MAX_TOI_ITERATIONS};
use crate::math::{Sweep, Transform, Vec2};
use tracing::trace;

const MAX_ROOT_ITERATIONS: usize = 50;

#[derive(Debug, Clone)]
pub struct ToiInput<'a> {
    pub proxy_a: &'a DistanceProxy,
    pub proxy_b: &'a DistanceProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    /// Sweep interval is `[0, t_max]`.
    pub t_max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToiState {
    Unknown,
    Failed,
    Overlapped,
    Touching,
    Separated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToiOutput {
    pub state: ToiState,
    pub t: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeparationType {
    Points,
    FaceA,
    FaceB,
}

struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    separation_type: SeparationType,
    local_point: Vec2,
    axis: Vec2,
}

impl<'a> SeparationFunction<'a> {
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: f64,
    ) -> Self {
        let xf_a = sweep_a.get_transform(t1);
        let xf_b = sweep_b.get_transform(t1);

        let mut f = SeparationFunction {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            separation_type: SeparationType::Points,
            local_point: Vec2::ZERO,
            axis: Vec2::ZERO,
        };

        if cache.count == 1 {
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));
            f.axis = (point_b - point_a).normalize();
        } else if cache.index_a[0] == cache.index_a[1] {
            // Two points on B and one on A.
            f.separation_type = SeparationType::FaceB;
            let local_b1 = proxy_b.vertex(cache.index_b[0]);
            let local_b2 = proxy_b.vertex(cache.index_b[1]);

            f.axis = (local_b2 - local_b1).cross_scalar(1.0).normalize();
            let normal = xf_b.rot.apply(f.axis);

            f.local_point = (local_b1 + local_b2) * 0.5;
            let point_b = xf_b.apply(f.local_point);
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));

            if (point_a - point_b).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        } else {
            // Two points on A and one or two points on B.
            f.separation_type = SeparationType::FaceA;
            let local_a1 = proxy_a.vertex(cache.index_a[0]);
            let local_a2 = proxy_a.vertex(cache.index_a[1]);

            f.axis = (local_a2 - local_a1).cross_scalar(1.0).normalize();
            let normal = xf_a.rot.apply(f.axis);

            f.local_point = (local_a1 + local_a2) * 0.5;
            let point_a = xf_a.apply(f.local_point);
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));

            if (point_b - point_a).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        }
        f
    }

    fn transforms(&self, t: f64) -> (Transform, Transform) {
        (self.sweep_a.get_transform(t), self.sweep_b.get_transform(t))
    }

    /// Deepest points along the axis at time `t`. Returns `(index_a, index_b, separation)`;
    /// the index on the reference face side is unused.
    fn find_min_separation(&self, t: f64) -> (usize, usize, f64) {
        let (xf_a, xf_b) = self.transforms(t);
        match self.separation_type {
            SeparationType::Points => {
                let index_a = self.proxy_a.support(xf_a.rot.apply_inverse(self.axis));
                let index_b = self.proxy_b.support(xf_b.rot.apply_inverse(-self.axis));
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (index_a, index_b, (point_b - point_a).dot(self.axis))
            }
            SeparationType::FaceA => {
                let normal = xf_a.rot.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let index_b = self.proxy_b.support(xf_b.rot.apply_inverse(-normal));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (0, index_b, (point_b - point_a).dot(normal))
            }
            SeparationType::FaceB => {
                let normal = xf_b.rot.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let index_a = self.proxy_a.support(xf_a.rot.apply_inverse(-normal));
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (index_a, 0, (point_a - point_b).dot(normal))
            }
        }
    }

    /// Separation of the given features along the axis at time `t`.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f64) -> f64 {
        let (xf_a, xf_b) = self.transforms(t);
        match self.separation_type {
            SeparationType::Points => {
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(self.axis)
            }
            SeparationType::FaceA => {
                let normal = xf_a.rot.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(normal)
            }
            SeparationType::FaceB => {
                let normal = xf_b.rot.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(normal)
            }
        }
    }
}

/// Computes the upper bound on time before two shapes penetrate. Time is
/// expressed as a fraction of the sweep interval `[0, t_max]`.
///
/// The result may miss collisions if the sweeps rotate a lot; it never
/// reports a time past an actual impact.
pub fn time_of_impact(input: &ToiInput<'_>) -> ToiOutput {
    let mut output = ToiOutput {
        state: ToiState::Unknown,
        t: input.t_max,
    };

    let proxy_a = input.proxy_a;
    let proxy_b = input.proxy_b;

    let mut sweep_a = input.sweep_a;
    let mut sweep_b = input.sweep_b;

    // Large rotations can make the root finder fail, so normalize the sweep angles.
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = input.t_max;

    let total_radius = proxy_a.radius + proxy_b.radius;
    let target = LINEAR_SLOP.max(total_radius - 3.0 * LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;
    debug_assert!(target > tolerance);

    let mut t1 = 0.0;
    let mut iter = 0;

    // Prepare input for distance query.
    let mut cache = SimplexCache::default();
    let mut distance_input = DistanceInput {
        proxy_a,
        proxy_b,
        transform_a: Transform::identity(),
        transform_b: Transform::identity(),
        use_radii: false,
    };

    // The outer loop progressively attempts to compute new separating axes.
    // This loop terminates when an axis is repeated (no progress is made).
    loop {
        let xf_a = sweep_a.get_transform(t1);
        let xf_b = sweep_b.get_transform(t1);

        // Get the distance between shapes. We can also use the results
        // to get a separating axis.
        distance_input.transform_a = xf_a;
        distance_input.transform_b = xf_b;
        let distance_output = distance(&mut cache, &distance_input);

        // If the shapes are overlapped, we give up on continuous collision.
        if distance_output.distance <= 0.0 {
            output = ToiOutput {
                state: ToiState::Overlapped,
                t: 0.0,
            };
            break;
        }

        if distance_output.distance < target + tolerance {
            // Victory!
            output = ToiOutput {
                state: ToiState::Touching,
                t: t1,
            };
            break;
        }

        // Initialize the separating axis.
        let fcn = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Compute the TOI on the separating axis. We do this by successively
        // resolving the deepest point. This loop is bounded by the number of vertices.
        let mut done = false;
        let mut t2 = t_max;
        let mut push_back_iter = 0;
        loop {
            // Find the deepest point at t2. Store the witness point indices.
            let (index_a, index_b, mut s2) = fcn.find_min_separation(t2);

            // Is the final configuration separated?
            if s2 > target + tolerance {
                output = ToiOutput {
                    state: ToiState::Separated,
                    t: t_max,
                };
                done = true;
                break;
            }

            // Has the separation reached tolerance?
            if s2 > target - tolerance {
                // Advance the sweeps
                t1 = t2;
                break;
            }

            // Compute the initial separation of the witness points.
            let mut s1 = fcn.evaluate(index_a, index_b, t1);

            // Check for initial overlap. This might happen if the root finder
            // runs out of iterations.
            if s1 < target - tolerance {
                output = ToiOutput {
                    state: ToiState::Failed,
                    t: t1,
                };
                done = true;
                break;
            }

            // Check for touching
            if s1 <= target + tolerance {
                // Victory! t1 should hold the TOI (could be 0.0).
                output = ToiOutput {
                    state: ToiState::Touching,
                    t: t1,
                };
                done = true;
                break;
            }

            // Compute 1D root of: f(x) - target = 0
            let mut root_iter_count = 0;
            let mut a1 = t1;
            let mut a2 = t2;
            loop {
                // Use a mix of the secant rule and bisection.
                let t = if root_iter_count & 1 == 1 {
                    // Secant rule to improve convergence.
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    // Bisection to guarantee progress.
                    0.5 * (a1 + a2)
                };
                root_iter_count += 1;

                let s = fcn.evaluate(index_a, index_b, t);

                if (s - target).abs() < tolerance {
                    // t2 holds a tentative value for t1
                    t2 = t;
                    break;
                }

                // Ensure we continue to bracket the root.
                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iter_count == MAX_ROOT_ITERATIONS {
                    break;
                }
            }

            push_back_iter += 1;
            if push_back_iter == MAX_POLYGON_VERTICES {
                break;
            }
        }

        iter += 1;

        if done {
            break;
        }

        if iter == MAX_TOI_ITERATIONS {
            // Root finder got stuck. Semi-victory.
            output = ToiOutput {
                state: ToiState::Failed,
                t: t1,
            };
            break;
        }
    }

    trace!(state = ?output.state, t = output.t, iterations = iter, "time of impact");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{Circle, Polygon, Shape};

    fn sweep(c0: Vec2, c: Vec2, a0: f64, a: f64) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c0,
            c,
            a0,
            a,
            alpha0: 0.0,
        }
    }

    #[test]
    fn test_toi_fast_box_hits_wall() {
        let wall: Shape = Polygon::new_box(0.05, 5.0).unwrap().into();
        let bullet: Shape = Polygon::new_box(0.1, 0.1).unwrap().into();
        let proxy_a = DistanceProxy::new(&wall, 0);
        let proxy_b = DistanceProxy::new(&bullet, 0);

        let input = ToiInput {
            proxy_a: &proxy_a,
            proxy_b: &proxy_b,
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            sweep_b: sweep(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0), 0.0, 0.0),
            t_max: 1.0,
        };
        let output = time_of_impact(&input);
        assert_eq!(output.state, ToiState::Touching);
        // Contact begins when the bullet's right face reaches x = -0.05.
        let expected = (-0.05 - 0.1 + 5.0) / 10.0;
        assert!((output.t - expected).abs() < 0.01, "t = {}", output.t);
    }

    #[test]
    fn test_toi_separated_sweeps() {
        let a: Shape = Circle::new(0.5).unwrap().into();
        let proxy = DistanceProxy::new(&a, 0);
        let input = ToiInput {
            proxy_a: &proxy,
            proxy_b: &proxy,
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            sweep_b: sweep(Vec2::new(0.0, 3.0), Vec2::new(5.0, 3.0), 0.0, 0.0),
            t_max: 1.0,
        };
        let output = time_of_impact(&input);
        assert_eq!(output.state, ToiState::Separated);
        assert_eq!(output.t, 1.0);
    }

    #[test]
    fn test_toi_overlapped_at_start() {
        let a: Shape = Polygon::new_box(1.0, 1.0).unwrap().into();
        let proxy = DistanceProxy::new(&a, 0);
        let input = ToiInput {
            proxy_a: &proxy,
            proxy_b: &proxy,
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            sweep_b: sweep(Vec2::new(0.5, 0.0), Vec2::new(3.0, 0.0), 0.0, 0.0),
            t_max: 1.0,
        };
        assert_eq!(time_of_impact(&input).state, ToiState::Overlapped);
    }

    #[test]
    fn test_toi_with_rotation() {
        let a: Shape = Polygon::new_box(0.5, 0.5).unwrap().into();
        let b: Shape = Polygon::new_box(2.0, 0.1).unwrap().into();
        let proxy_a = DistanceProxy::new(&a, 0);
        let proxy_b = DistanceProxy::new(&b, 0);
        let input = ToiInput {
            proxy_a: &proxy_a,
            proxy_b: &proxy_b,
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            sweep_b: sweep(Vec2::new(0.0, 4.0), Vec2::new(0.0, -4.0), 0.0, 1.0),
            t_max: 1.0,
        };
        let output = time_of_impact(&input);
        assert_eq!(output.state, ToiState::Touching);
        assert!(output.t > 0.0 && output.t < 0.5);

        // At the reported time the shapes are apart by about the target separation.
        let mut cache = SimplexCache::default();
        let d = distance(
            &mut cache,
            &DistanceInput {
                proxy_a: &proxy_a,
                proxy_b: &proxy_b,
                transform_a: input.sweep_a.get_transform(output.t),
                transform_b: input.sweep_b.get_transform(output.t),
                use_radii: false,
            },
        );
        let target = LINEAR_SLOP.max(proxy_a.radius + proxy_b.radius - 3.0 * LINEAR_SLOP);
        assert!((d.distance - target).abs() < LINEAR_SLOP, "distance = {}", d.distance);
    }
}
