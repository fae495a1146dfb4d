use super::manifold::{
    clip_segment_to_line, ClipVertex, ContactFeature, ContactId, FeatureType, Manifold, ManifoldPoint, ManifoldType,
};
use crate::common::settings::LINEAR_SLOP;
use crate::math::Transform;
use crate::shapes::Polygon;

/// Finds the max separation between poly1 and poly2 using the edge normals of poly1.
/// Returns the edge index and the separation.
pub(crate) fn find_max_separation(
    poly1: &Polygon,
    xf1: &Transform,
    poly2: &Polygon,
    xf2: &Transform,
) -> (usize, f64) {
    let xf = xf2.mul_t(xf1);

    let mut best_index = 0;
    let mut max_separation = f64::MIN;
    for (i, (v1, n1)) in poly1.vertices.iter().zip(&poly1.normals).enumerate() {
        // Get poly1 normal and vertex in frame2.
        let n = xf.rot.apply(*n1);
        let v1 = xf.apply(*v1);

        // Find deepest point for normal i.
        let si = poly2
            .vertices
            .iter()
            .map(|v2| n.dot(*v2 - v1))
            .fold(f64::MAX, f64::min);

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

fn find_incident_edge(poly1: &Polygon, xf1: &Transform, edge1: usize, poly2: &Polygon, xf2: &Transform) -> [ClipVertex; 2] {
    // Get the normal of the reference edge in poly2's frame.
    let normal1 = xf2.rot.apply_inverse(xf1.rot.apply(poly1.normals[edge1]));

    // Find the incident edge on poly2.
    let mut index = 0;
    let mut min_dot = f64::MAX;
    for (i, n2) in poly2.normals.iter().enumerate() {
        let dot = normal1.dot(*n2);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    // Build the clip vertices for the incident edge.
    let i1 = index;
    let i2 = (i1 + 1) % poly2.vertices.len();

    [
        ClipVertex {
            v: xf2.apply(poly2.vertices[i1]),
            id: ContactId::new(ContactFeature::new(edge1 as u8, FeatureType::Face, i1 as u8, FeatureType::Vertex)),
        },
        ClipVertex {
            v: xf2.apply(poly2.vertices[i2]),
            id: ContactId::new(ContactFeature::new(edge1 as u8, FeatureType::Face, i2 as u8, FeatureType::Vertex)),
        },
    ]
}

/// Polygon A against polygon B.
///
/// Finds the edge normal of max separation on A (and on B), picks a reference
/// face, then clips the incident edge of the other polygon against the side
/// planes of the reference face. Reference face A gives a `FaceA` manifold,
/// reference face B gives `FaceB` with flipped feature ids.
pub fn collide_polygons(poly_a: &Polygon, xf_a: &Transform, poly_b: &Polygon, xf_b: &Transform) -> Manifold {
    let total_radius = poly_a.radius + poly_b.radius;

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return Manifold::new(ManifoldType::FaceA);
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return Manifold::new(ManifoldType::FaceA);
    }

    let tol = 0.1 * LINEAR_SLOP;
    let (poly1, poly2, xf1, xf2, edge1, flip, manifold_type) = if separation_b > separation_a + tol {
        (poly_b, poly_a, xf_b, xf_a, edge_b, true, ManifoldType::FaceB)
    } else {
        (poly_a, poly_b, xf_a, xf_b, edge_a, false, ManifoldType::FaceA)
    };
    let mut manifold = Manifold::new(manifold_type);

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let count1 = poly1.vertices.len();
    let iv1 = edge1;
    let iv2 = (edge1 + 1) % count1;

    let mut v11 = poly1.vertices[iv1];
    let mut v12 = poly1.vertices[iv2];

    let local_tangent = (v12 - v11).normalize();
    let local_normal = local_tangent.cross_scalar(1.0);
    let plane_point = (v11 + v12) * 0.5;

    let tangent = xf1.rot.apply(local_tangent);
    let normal = tangent.cross_scalar(1.0);

    v11 = xf1.apply(v11);
    v12 = xf1.apply(v12);

    // Face offset.
    let front_offset = normal.dot(v11);

    // Side offsets, extended by polytope skin thickness.
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    // Clip incident edge against extruded edge1 side edges.
    let (clip_points1, np) = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1 as u8);
    if np < 2 {
        return manifold;
    }

    let (clip_points2, np) = clip_segment_to_line(&clip_points1, tangent, side_offset2, iv2 as u8);
    if np < 2 {
        return manifold;
    }

    // Now clip_points2 contains the clipped points.
    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    for cp in clip_points2.iter() {
        let separation = normal.dot(cp.v) - front_offset;
        if separation <= total_radius {
            let feature = if flip { cp.id.feature.swapped() } else { cp.id.feature };
            manifold.push(ManifoldPoint {
                local_point: xf2.apply_inverse(cp.v),
                id: ContactId::new(feature),
                ..ManifoldPoint::default()
            });
        }
    }

    manifold
}
