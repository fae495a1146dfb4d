//! Edge collisions. Edges may carry ghost vertices from a chain, which are
//! used to suppress contacts that belong to a neighboring segment.

use super::manifold::{
    clip_segment_to_line, ClipVertex, ContactFeature, ContactId, FeatureType, Manifold, ManifoldPoint, ManifoldType,
};
use crate::common::settings::{ANGULAR_SLOP, MAX_MANIFOLD_POINTS};
use crate::math::{Transform, Vec2};
use crate::shapes::{Circle, Edge, Polygon};

/// Edge A against circle B. Voronoi regions of the two vertices and of the
/// segment interior are handled separately.
pub fn collide_edge_and_circle(edge_a: &Edge, xf_a: &Transform, circle_b: &Circle, xf_b: &Transform) -> Manifold {
    let mut manifold = Manifold::new(ManifoldType::Circles);

    // Compute circle in frame of edge
    let q = xf_a.apply_inverse(xf_b.apply(circle_b.position));

    let a = edge_a.vertex1;
    let b = edge_a.vertex2;
    let e = b - a;

    // Barycentric coordinates
    let u = e.dot(b - q);
    let v = e.dot(q - a);

    let radius = edge_a.radius + circle_b.radius;

    let circle_point = |feature: ContactFeature| ManifoldPoint {
        local_point: circle_b.position,
        id: ContactId::new(feature),
        ..ManifoldPoint::default()
    };

    // Region A
    if v <= 0.0 {
        if q.distance_squared(a) > radius * radius {
            return manifold;
        }

        // Is there an edge connected to A?
        if let Some(a1) = edge_a.vertex0 {
            let e1 = a - a1;
            let u1 = e1.dot(a - q);

            // Is the circle in Region AB of the previous edge?
            if u1 > 0.0 {
                return manifold;
            }
        }

        manifold.local_point = a;
        manifold.push(circle_point(ContactFeature::new(0, FeatureType::Vertex, 0, FeatureType::Vertex)));
        return manifold;
    }

    // Region B
    if u <= 0.0 {
        if q.distance_squared(b) > radius * radius {
            return manifold;
        }

        // Is there an edge connected to B?
        if let Some(b2) = edge_a.vertex3 {
            let e2 = b2 - b;
            let v2 = e2.dot(q - b);

            // Is the circle in Region AB of the next edge?
            if v2 > 0.0 {
                return manifold;
            }
        }

        manifold.local_point = b;
        manifold.push(circle_point(ContactFeature::new(1, FeatureType::Vertex, 0, FeatureType::Vertex)));
        return manifold;
    }

    // Region AB
    let den = e.magnitude_squared();
    debug_assert!(den > 0.0);
    let p = (a * u + b * v) * (1.0 / den);
    if q.distance_squared(p) > radius * radius {
        return manifold;
    }

    let mut n = e.perpendicular();
    if n.dot(q - a) < 0.0 {
        n = -n;
    }

    manifold.manifold_type = ManifoldType::FaceA;
    manifold.local_normal = n.normalize();
    manifold.local_point = a;
    manifold.push(circle_point(ContactFeature::new(0, FeatureType::Face, 0, FeatureType::Vertex)));
    manifold
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxisType {
    Unknown,
    EdgeA,
    EdgeB,
}

#[derive(Debug, Clone, Copy)]
struct EpAxis {
    axis_type: AxisType,
    index: usize,
    separation: f64,
}

struct ReferenceFace {
    i1: usize,
    i2: usize,
    v1: Vec2,
    normal: Vec2,
    side_normal1: Vec2,
    side_offset1: f64,
    side_normal2: Vec2,
    side_offset2: f64,
}

/// Separating-axis collider for an edge (with optional neighbors) against a
/// polygon. Works in the edge's frame.
///
/// The neighbor configuration at each end is convex or concave. That decides
/// which side of the edge is the front and the admissible range of collision
/// normals `[lower_limit, upper_limit]`. Polygon normals outside the range are
/// ignored, which keeps bodies from snagging on the internal vertices of a chain.
struct EpCollider {
    vertices: Vec<Vec2>,
    normals: Vec<Vec2>,
    xf: Transform,
    v1: Vec2,
    v2: Vec2,
    normal: Vec2,
    normal1: Vec2,
    lower_limit: Vec2,
    upper_limit: Vec2,
    radius: f64,
    front: bool,
}

impl EpCollider {
    fn new(edge_a: &Edge, xf_a: &Transform, polygon_b: &Polygon, xf_b: &Transform) -> Self {
        let xf = xf_a.mul_t(xf_b);
        let centroid_b = xf.apply(polygon_b.centroid);

        let v1 = edge_a.vertex1;
        let v2 = edge_a.vertex2;

        let edge1 = (v2 - v1).normalize();
        let normal1 = edge1.right_perpendicular();
        let offset1 = normal1.dot(centroid_b - v1);

        let mut normal0 = Vec2::ZERO;
        let mut offset0 = 0.0;
        let mut convex1 = false;
        if let Some(v0) = edge_a.vertex0 {
            let edge0 = (v1 - v0).normalize();
            normal0 = edge0.right_perpendicular();
            convex1 = edge0.cross(edge1) >= 0.0;
            offset0 = normal0.dot(centroid_b - v0);
        }

        let mut normal2 = Vec2::ZERO;
        let mut offset2 = 0.0;
        let mut convex2 = false;
        if let Some(v3) = edge_a.vertex3 {
            let edge2 = (v3 - v2).normalize();
            normal2 = edge2.right_perpendicular();
            convex2 = edge1.cross(edge2) > 0.0;
            offset2 = normal2.dot(centroid_b - v2);
        }

        let (front, normal, lower_limit, upper_limit) = match (edge_a.vertex0.is_some(), edge_a.vertex3.is_some()) {
            (true, true) => {
                if convex1 && convex2 {
                    let front = offset0 >= 0.0 || offset1 >= 0.0 || offset2 >= 0.0;
                    if front {
                        (front, normal1, normal0, normal2)
                    } else {
                        (front, -normal1, -normal1, -normal1)
                    }
                } else if convex1 {
                    let front = offset0 >= 0.0 || (offset1 >= 0.0 && offset2 >= 0.0);
                    if front {
                        (front, normal1, normal0, normal1)
                    } else {
                        (front, -normal1, -normal2, -normal1)
                    }
                } else if convex2 {
                    let front = offset2 >= 0.0 || (offset0 >= 0.0 && offset1 >= 0.0);
                    if front {
                        (front, normal1, normal1, normal2)
                    } else {
                        (front, -normal1, -normal1, -normal0)
                    }
                } else {
                    let front = offset0 >= 0.0 && offset1 >= 0.0 && offset2 >= 0.0;
                    if front {
                        (front, normal1, normal1, normal1)
                    } else {
                        (front, -normal1, -normal2, -normal0)
                    }
                }
            }
            (true, false) => {
                if convex1 {
                    let front = offset0 >= 0.0 || offset1 >= 0.0;
                    if front {
                        (front, normal1, normal0, -normal1)
                    } else {
                        (front, -normal1, normal1, -normal1)
                    }
                } else {
                    let front = offset0 >= 0.0 && offset1 >= 0.0;
                    if front {
                        (front, normal1, normal1, -normal1)
                    } else {
                        (front, -normal1, normal1, -normal0)
                    }
                }
            }
            (false, true) => {
                if convex2 {
                    let front = offset1 >= 0.0 || offset2 >= 0.0;
                    if front {
                        (front, normal1, -normal1, normal2)
                    } else {
                        (front, -normal1, -normal1, normal1)
                    }
                } else {
                    let front = offset1 >= 0.0 && offset2 >= 0.0;
                    if front {
                        (front, normal1, -normal1, normal1)
                    } else {
                        (front, -normal1, -normal2, normal1)
                    }
                }
            }
            (false, false) => {
                let front = offset1 >= 0.0;
                if front {
                    (front, normal1, -normal1, -normal1)
                } else {
                    (front, -normal1, normal1, normal1)
                }
            }
        };

        // Get polygon B in frame A
        let vertices = polygon_b.vertices.iter().map(|v| xf.apply(*v)).collect();
        let normals = polygon_b.normals.iter().map(|n| xf.rot.apply(*n)).collect();

        EpCollider {
            vertices,
            normals,
            xf,
            v1,
            v2,
            normal,
            normal1,
            lower_limit,
            upper_limit,
            radius: polygon_b.radius + edge_a.radius,
            front,
        }
    }

    fn compute_edge_separation(&self) -> EpAxis {
        let separation = self
            .vertices
            .iter()
            .map(|v| self.normal.dot(*v - self.v1))
            .fold(f64::MAX, f64::min);
        EpAxis {
            axis_type: AxisType::EdgeA,
            index: if self.front { 0 } else { 1 },
            separation,
        }
    }

    fn compute_polygon_separation(&self) -> EpAxis {
        let mut axis = EpAxis {
            axis_type: AxisType::Unknown,
            index: 0,
            separation: f64::MIN,
        };

        let perp = self.normal.perpendicular();

        for (i, (v, pn)) in self.vertices.iter().zip(&self.normals).enumerate() {
            let n = -*pn;

            let s1 = n.dot(*v - self.v1);
            let s2 = n.dot(*v - self.v2);
            let s = s1.min(s2);

            if s > self.radius {
                // No collision
                return EpAxis {
                    axis_type: AxisType::EdgeB,
                    index: i,
                    separation: s,
                };
            }

            // Adjacency
            let limit = if n.dot(perp) >= 0.0 { self.upper_limit } else { self.lower_limit };
            if (n - limit).dot(self.normal) < -ANGULAR_SLOP {
                continue;
            }

            if s > axis.separation {
                axis = EpAxis {
                    axis_type: AxisType::EdgeB,
                    index: i,
                    separation: s,
                };
            }
        }

        axis
    }

    fn collide(&self, polygon_b: &Polygon) -> Manifold {
        let edge_axis = self.compute_edge_separation();
        if edge_axis.separation > self.radius {
            return Manifold::new(ManifoldType::FaceA);
        }

        let polygon_axis = self.compute_polygon_separation();
        if polygon_axis.axis_type != AxisType::Unknown && polygon_axis.separation > self.radius {
            return Manifold::new(ManifoldType::FaceA);
        }

        // Use hysteresis for jitter reduction.
        const RELATIVE_TOL: f64 = 0.98;
        const ABSOLUTE_TOL: f64 = 0.001;

        let primary_axis = if polygon_axis.axis_type == AxisType::Unknown {
            edge_axis
        } else if polygon_axis.separation > RELATIVE_TOL * edge_axis.separation + ABSOLUTE_TOL {
            polygon_axis
        } else {
            edge_axis
        };

        let count = self.vertices.len();
        let (incident_edge, rf, manifold_type) = if primary_axis.axis_type == AxisType::EdgeA {
            // Search for the polygon normal that is most anti-parallel to the edge normal.
            let mut best_index = 0;
            let mut best_value = self.normal.dot(self.normals[0]);
            for i in 1..count {
                let value = self.normal.dot(self.normals[i]);
                if value < best_value {
                    best_value = value;
                    best_index = i;
                }
            }

            let i1 = best_index;
            let i2 = (i1 + 1) % count;
            let ie = [
                ClipVertex {
                    v: self.vertices[i1],
                    id: ContactId::new(ContactFeature::new(0, FeatureType::Face, i1 as u8, FeatureType::Vertex)),
                },
                ClipVertex {
                    v: self.vertices[i2],
                    id: ContactId::new(ContactFeature::new(0, FeatureType::Face, i2 as u8, FeatureType::Vertex)),
                },
            ];

            let rf = if self.front {
                reference_face(0, 1, self.v1, self.v2, self.normal1)
            } else {
                reference_face(1, 0, self.v2, self.v1, -self.normal1)
            };
            (ie, rf, ManifoldType::FaceA)
        } else {
            let index = primary_axis.index as u8;
            let ie = [
                ClipVertex {
                    v: self.v1,
                    id: ContactId::new(ContactFeature::new(0, FeatureType::Vertex, index, FeatureType::Face)),
                },
                ClipVertex {
                    v: self.v2,
                    id: ContactId::new(ContactFeature::new(0, FeatureType::Vertex, index, FeatureType::Face)),
                },
            ];

            let i1 = primary_axis.index;
            let i2 = (i1 + 1) % count;
            let rf = reference_face(i1, i2, self.vertices[i1], self.vertices[i2], self.normals[i1]);
            (ie, rf, ManifoldType::FaceB)
        };

        let mut manifold = Manifold::new(manifold_type);

        // Clip incident edge against extruded edge1 side edges.
        let (clip_points1, np) = clip_segment_to_line(&incident_edge, rf.side_normal1, rf.side_offset1, rf.i1 as u8);
        if np < MAX_MANIFOLD_POINTS {
            return manifold;
        }

        let (clip_points2, np) = clip_segment_to_line(&clip_points1, rf.side_normal2, rf.side_offset2, rf.i2 as u8);
        if np < MAX_MANIFOLD_POINTS {
            return manifold;
        }

        // Now clip_points2 contains the clipped points.
        if manifold_type == ManifoldType::FaceA {
            manifold.local_normal = rf.normal;
            manifold.local_point = rf.v1;
        } else {
            manifold.local_normal = polygon_b.normals[rf.i1];
            manifold.local_point = polygon_b.vertices[rf.i1];
        }

        for cp in clip_points2.iter() {
            let separation = rf.normal.dot(cp.v - rf.v1);
            if separation <= self.radius {
                let point = if manifold_type == ManifoldType::FaceA {
                    ManifoldPoint {
                        local_point: self.xf.apply_inverse(cp.v),
                        id: cp.id,
                        ..ManifoldPoint::default()
                    }
                } else {
                    ManifoldPoint {
                        local_point: cp.v,
                        id: ContactId::new(cp.id.feature.swapped()),
                        ..ManifoldPoint::default()
                    }
                };
                manifold.push(point);
            }
        }

        manifold
    }
}

fn reference_face(i1: usize, i2: usize, v1: Vec2, v2: Vec2, normal: Vec2) -> ReferenceFace {
    let side_normal1 = normal.right_perpendicular();
    let side_normal2 = -side_normal1;
    ReferenceFace {
        i1,
        i2,
        v1,
        normal,
        side_normal1,
        side_offset1: side_normal1.dot(v1),
        side_normal2,
        side_offset2: side_normal2.dot(v2),
    }
}

/// Edge A against polygon B, using the edge's ghost vertices when present.
pub fn collide_edge_and_polygon(edge_a: &Edge, xf_a: &Transform, polygon_b: &Polygon, xf_b: &Transform) -> Manifold {
    EpCollider::new(edge_a, xf_a, polygon_b, xf_b).collide(polygon_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::manifold::WorldManifold;
    use approx::assert_relative_eq;

    fn ground() -> Edge {
        Edge::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)).unwrap()
    }

    #[test]
    fn test_edge_circle_interior() {
        let circle = Circle::new(0.5).unwrap();
        let xf_b = Transform::new(Vec2::new(1.0, 0.45), 0.0);
        let manifold = collide_edge_and_circle(&ground(), &Transform::identity(), &circle, &xf_b);
        assert_eq!(manifold.point_count, 1);
        assert_eq!(manifold.manifold_type, ManifoldType::FaceA);
        assert_relative_eq!(manifold.local_normal.y, 1.0);
    }

    #[test]
    fn test_edge_circle_ghost_vertex_suppresses_neighbor_region() {
        // The circle sits past vertex2, inside the interior region of the next edge.
        let circle = Circle::new(0.5).unwrap();
        let xf_b = Transform::new(Vec2::new(5.2, 0.45), 0.0);

        let lone = collide_edge_and_circle(&ground(), &Transform::identity(), &circle, &xf_b);
        assert_eq!(lone.point_count, 1);
        assert_eq!(lone.manifold_type, ManifoldType::Circles);

        let chained = ground().with_ghosts(None, Some(Vec2::new(10.0, 0.0)));
        let manifold = collide_edge_and_circle(&chained, &Transform::identity(), &circle, &xf_b);
        assert_eq!(manifold.point_count, 0);
    }

    #[test]
    fn test_edge_polygon_resting_box() {
        let edge = ground();
        let b = Polygon::new_box(0.5, 0.5).unwrap();
        let xf_b = Transform::new(Vec2::new(0.0, 0.5), 0.0);

        let manifold = collide_edge_and_polygon(&edge, &Transform::identity(), &b, &xf_b);
        assert_eq!(manifold.point_count, 2);

        let wm = WorldManifold::new(&manifold, &Transform::identity(), edge.radius, &xf_b, b.radius);
        assert_relative_eq!(wm.normal.y, 1.0, epsilon = 1e-9);
        for s in &wm.separations[..manifold.point_count] {
            assert_relative_eq!(*s, -2.0 * edge.radius, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_edge_polygon_clips_to_edge_end() {
        // Half the box hangs past vertex2, so one point is clipped to the end.
        let edge = ground();
        let b = Polygon::new_box(0.5, 0.5).unwrap();
        let xf_b = Transform::new(Vec2::new(5.0, 0.5), 0.0);

        let manifold = collide_edge_and_polygon(&edge, &Transform::identity(), &b, &xf_b);
        assert_eq!(manifold.point_count, 2);
        assert_eq!(manifold.manifold_type, ManifoldType::FaceA);

        let wm = WorldManifold::new(&manifold, &Transform::identity(), edge.radius, &xf_b, b.radius);
        let mut xs: Vec<f64> = wm.points[..manifold.point_count].iter().map(|p| p.x).collect();
        xs.sort_by(|a, b| a.total_cmp(b));
        assert_relative_eq!(xs[0], 4.5, epsilon = 1e-9);
        assert_relative_eq!(xs[1], 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_edge_polygon_smooth_across_internal_vertex() {
        // A box straddling the joint between two collinear chain segments must
        // only see the shared upward normal.
        let left = Edge::new(Vec2::new(-2.0, 0.0), Vec2::new(0.0, 0.0))
            .unwrap()
            .with_ghosts(Some(Vec2::new(-4.0, 0.0)), Some(Vec2::new(2.0, 0.0)));
        let b = Polygon::new_box(0.5, 0.5).unwrap();
        let xf_b = Transform::new(Vec2::new(0.1, 0.49), 0.0);

        let manifold = collide_edge_and_polygon(&left, &Transform::identity(), &b, &xf_b);
        assert!(manifold.point_count > 0);
        let wm = WorldManifold::new(&manifold, &Transform::identity(), left.radius, &xf_b, b.radius);
        assert_relative_eq!(wm.normal.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(wm.normal.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_edge_polygon_separated() {
        let b = Polygon::new_box(0.5, 0.5).unwrap();
        let xf_b = Transform::new(Vec2::new(0.0, 2.0), 0.0);
        let manifold = collide_edge_and_polygon(&ground(), &Transform::identity(), &b, &xf_b);
        assert_eq!(manifold.point_count, 0);
    }
}
