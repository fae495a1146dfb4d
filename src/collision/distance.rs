//! GJK closest-point computation between convex proxies.

use crate::math::{Transform, Vec2};
use crate::shapes::Shape;

/// Convex vertex cloud plus skin radius, the form GJK works on.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceProxy {
    pub vertices: Vec<Vec2>,
    pub radius: f64,
}

impl DistanceProxy {
    /// Builds the proxy for child `index` of `shape`.
    pub fn new(shape: &Shape, index: usize) -> Self {
        match shape {
            Shape::Circle(c) => DistanceProxy {
                vertices: vec![c.position],
                radius: c.radius,
            },
            Shape::Polygon(p) => DistanceProxy {
                vertices: p.vertices.clone(),
                radius: p.radius,
            },
            Shape::Edge(e) => DistanceProxy {
                vertices: vec![e.vertex1, e.vertex2],
                radius: e.radius,
            },
            Shape::Chain(c) => {
                let edge = c.child_edge(index);
                DistanceProxy {
                    vertices: vec![edge.vertex1, edge.vertex2],
                    radius: c.radius,
                }
            }
        }
    }

    /// Index of the vertex furthest along `d`.
    pub fn support(&self, d: Vec2) -> usize {
        let mut best_index = 0;
        let mut best_value = self.vertices[0].dot(d);
        for (i, v) in self.vertices.iter().enumerate().skip(1) {
            let value = v.dot(d);
            if value > best_value {
                best_index = i;
                best_value = value;
            }
        }
        best_index
    }

    pub fn vertex(&self, index: usize) -> Vec2 {
        self.vertices[index]
    }
}

/// Warm-start data for repeated distance queries on the same pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimplexCache {
    /// Length or area of the cached simplex.
    pub metric: f64,
    pub count: usize,
    pub index_a: [usize; 3],
    pub index_b: [usize; 3],
}

#[derive(Debug, Clone)]
pub struct DistanceInput<'a> {
    pub proxy_a: &'a DistanceProxy,
    pub proxy_b: &'a DistanceProxy,
    pub transform_a: Transform,
    pub transform_b: Transform,
    pub use_radii: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DistanceOutput {
    /// Closest point on shape A.
    pub point_a: Vec2,
    /// Closest point on shape B.
    pub point_b: Vec2,
    pub distance: f64,
    /// Number of GJK iterations used.
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct SimplexVertex {
    w_a: Vec2,
    w_b: Vec2,
    /// `w_b - w_a`
    w: Vec2,
    /// Barycentric coordinate for the closest point.
    a: f64,
    index_a: usize,
    index_b: usize,
}

impl SimplexVertex {
    fn new(
        proxy_a: &DistanceProxy,
        xf_a: &Transform,
        index_a: usize,
        proxy_b: &DistanceProxy,
        xf_b: &Transform,
        index_b: usize,
    ) -> Self {
        let w_a = xf_a.apply(proxy_a.vertex(index_a));
        let w_b = xf_b.apply(proxy_b.vertex(index_b));
        SimplexVertex {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 1.0,
            index_a,
            index_b,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn read_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        xf_a: &Transform,
        proxy_b: &DistanceProxy,
        xf_b: &Transform,
    ) -> Self {
        let mut simplex = Simplex {
            count: cache.count,
            ..Simplex::default()
        };
        for i in 0..cache.count {
            let mut v = SimplexVertex::new(proxy_a, xf_a, cache.index_a[i], proxy_b, xf_b, cache.index_b[i]);
            v.a = 0.0;
            simplex.v[i] = v;
        }

        // Flush the cache if the metric changed a lot, the pair has moved too far.
        if simplex.count > 1 {
            let metric1 = cache.metric;
            let metric2 = simplex.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < f64::EPSILON {
                simplex.count = 0;
            }
        }

        if simplex.count == 0 {
            simplex.v[0] = SimplexVertex::new(proxy_a, xf_a, 0, proxy_b, xf_b, 0);
            simplex.count = 1;
        }
        simplex
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.v[i].index_a;
            cache.index_b[i] = self.v[i].index_b;
        }
    }

    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = e12.cross(-self.v[0].w);
                if sgn > 0.0 {
                    // Origin is left of e12.
                    Vec2::scalar_cross(1.0, e12)
                } else {
                    // Origin is right of e12.
                    e12.cross_scalar(1.0)
                }
            }
            _ => Vec2::ZERO,
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        let [v1, v2, v3] = &self.v;
        match self.count {
            1 => (v1.w_a, v1.w_b),
            2 => (v1.w_a * v1.a + v2.w_a * v2.a, v1.w_b * v1.a + v2.w_b * v2.a),
            3 => {
                let p = v1.w_a * v1.a + v2.w_a * v2.a + v3.w_a * v3.a;
                (p, p)
            }
            _ => (Vec2::ZERO, Vec2::ZERO),
        }
    }

    fn metric(&self) -> f64 {
        match self.count {
            2 => self.v[0].w.distance(self.v[1].w),
            3 => (self.v[1].w - self.v[0].w).cross(self.v[2].w - self.v[0].w),
            _ => 0.0,
        }
    }

    // Solve a line segment using barycentric coordinates.
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        // w1 region
        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            // a2 <= 0, so we clamp it to 0
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // w2 region
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            // a1 <= 0, so we clamp it to 0
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // Must be in e12 region.
        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv_d12;
        self.v[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    // Possible regions: the three vertices, the three edges and the interior.
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        // Edge12
        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        // Edge13
        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        // Edge23
        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        // Triangle123
        let n123 = e12.cross(e13);
        let d123_1 = n123 * w2.cross(w3);
        let d123_2 = n123 * w3.cross(w1);
        let d123_3 = n123 * w1.cross(w2);

        // w1 region
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // e12
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv_d12 = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv_d12;
            self.v[1].a = d12_2 * inv_d12;
            self.count = 2;
            return;
        }

        // e13
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv_d13 = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv_d13;
            self.v[2].a = d13_2 * inv_d13;
            self.count = 2;
            self.v[1] = self.v[2];
            return;
        }

        // w2 region
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // w3 region
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[2].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[2];
            return;
        }

        // e23
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv_d23 = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv_d23;
            self.v[2].a = d23_2 * inv_d23;
            self.count = 2;
            self.v[0] = self.v[2];
            return;
        }

        // Must be in triangle123
        let inv_d123 = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv_d123;
        self.v[1].a = d123_2 * inv_d123;
        self.v[2].a = d123_3 * inv_d123;
        self.count = 3;
    }
}

const MAX_GJK_ITERATIONS: usize = 20;

/// Computes the closest points between two convex proxies. `cache` is read
/// for warm starting and updated with the final simplex. On the first call
/// pass a default cache.
pub fn distance(cache: &mut SimplexCache, input: &DistanceInput<'_>) -> DistanceOutput {
    let proxy_a = input.proxy_a;
    let proxy_b = input.proxy_b;
    let xf_a = &input.transform_a;
    let xf_b = &input.transform_b;

    let mut simplex = Simplex::read_cache(cache, proxy_a, xf_a, proxy_b, xf_b);

    // These store the vertices of the last simplex so that
    // we can check for duplicates and prevent cycling.
    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];

    let mut iter = 0;
    while iter < MAX_GJK_ITERATIONS {
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.v[i].index_a;
            save_b[i] = simplex.v[i].index_b;
        }

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        // If we have 3 points, then the origin is in the corresponding triangle.
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();

        // Ensure the search direction is numerically fit.
        if d.magnitude_squared() < f64::EPSILON * f64::EPSILON {
            // The origin is probably contained by a line segment
            // or triangle. Thus the shapes are overlapped.
            break;
        }

        let index_a = proxy_a.support(xf_a.rot.apply_inverse(-d));
        let index_b = proxy_b.support(xf_b.rot.apply_inverse(d));
        let vertex = SimplexVertex::new(proxy_a, xf_a, index_a, proxy_b, xf_b, index_b);

        iter += 1;

        // Check for duplicate support points. This is the main termination criterion.
        let duplicate = (0..save_count).any(|i| index_a == save_a[i] && index_b == save_b[i]);
        if duplicate {
            break;
        }

        simplex.v[simplex.count] = vertex;
        simplex.count += 1;
    }

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut dist = point_a.distance(point_b);
    simplex.write_cache(cache);

    // Apply radii if requested.
    if input.use_radii {
        let r_a = proxy_a.radius;
        let r_b = proxy_b.radius;

        if dist > r_a + r_b && dist > f64::EPSILON {
            // Shapes are still not overlapped.
            // Move the witness points to the outer surface.
            dist -= r_a + r_b;
            let normal = (point_b - point_a).normalize();
            point_a += normal * r_a;
            point_b -= normal * r_b;
        } else {
            // Shapes are overlapped when radii are considered.
            // Move the witness points to the middle.
            let p = (point_a + point_b) * 0.5;
            point_a = p;
            point_b = p;
            dist = 0.0;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
        iterations: iter,
    }
}

/// True when the two shape children overlap, radii included.
pub fn test_overlap(
    shape_a: &Shape,
    index_a: usize,
    shape_b: &Shape,
    index_b: usize,
    xf_a: &Transform,
    xf_b: &Transform,
) -> bool {
    let proxy_a = DistanceProxy::new(shape_a, index_a);
    let proxy_b = DistanceProxy::new(shape_b, index_b);
    let input = DistanceInput {
        proxy_a: &proxy_a,
        proxy_b: &proxy_b,
        transform_a: *xf_a,
        transform_b: *xf_b,
        use_radii: true,
    };
    let mut cache = SimplexCache::default();
    let output = distance(&mut cache, &input);
    output.distance < 10.0 * f64::EPSILON
}
