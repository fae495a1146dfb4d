use crate::common::settings::MAX_MANIFOLD_POINTS;
use crate::math::{Transform, Vec2};

/// Whether a contact feature is a vertex or a face (edge) of its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FeatureType {
    #[default]
    Vertex = 0,
    Face = 1,
}

/// The features that intersect to form a contact point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContactFeature {
    pub index_a: u8,
    pub index_b: u8,
    pub type_a: FeatureType,
    pub type_b: FeatureType,
}

impl ContactFeature {
    pub fn new(index_a: u8, type_a: FeatureType, index_b: u8, type_b: FeatureType) -> Self {
        Self {
            index_a,
            index_b,
            type_a,
            type_b,
        }
    }

    /// Swaps the roles of A and B. Used when a collider ran with the shapes flipped.
    pub fn swapped(self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

/// Identifies a contact point across steps so accumulated impulses can be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContactId {
    pub feature: ContactFeature,
}

impl ContactId {
    pub fn new(feature: ContactFeature) -> Self {
        Self { feature }
    }

    /// The feature packed into one integer for fast comparison.
    pub fn key(&self) -> u32 {
        let f = &self.feature;
        u32::from(f.index_a)
            | (u32::from(f.index_b) << 8)
            | ((f.type_a as u32) << 16)
            | ((f.type_b as u32) << 24)
    }
}

/// A manifold point in the local frame that depends on the manifold type:
/// - `Circles`: the local center of circle B
/// - `FaceA`: the local center of circle B or the clip point of polygon B
/// - `FaceB`: the clip point of polygon A
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManifoldPoint {
    pub local_point: Vec2,
    pub normal_impulse: f64,
    pub tangent_impulse: f64,
    pub id: ContactId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifoldType {
    #[default]
    Circles,
    FaceA,
    FaceB,
}

/// Contact points for two touching convex shapes, stored in local coordinates
/// so they survive small motions of either body.
///
/// `local_normal` and `local_point` mean:
/// - `Circles`: unused normal; `local_point` is the center of circle A
/// - `FaceA`: the normal and a point on the reference face of A
/// - `FaceB`: the normal and a point on the reference face of B
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Manifold {
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    pub local_normal: Vec2,
    pub local_point: Vec2,
    pub manifold_type: ManifoldType,
    pub point_count: usize,
}

impl Manifold {
    pub fn new(manifold_type: ManifoldType) -> Self {
        Self {
            manifold_type,
            ..Self::default()
        }
    }

    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    pub fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.points[..self.point_count]
    }

    pub fn push(&mut self, point: ManifoldPoint) {
        debug_assert!(self.point_count < MAX_MANIFOLD_POINTS);
        self.points[self.point_count] = point;
        self.point_count += 1;
    }

    pub fn find_point(&self, id: ContactId) -> Option<&ManifoldPoint> {
        let key = id.key();
        self.points().iter().find(|p| p.id.key() == key)
    }
}

/// World-space contact data reconstructed from a [`Manifold`]. The normal
/// always points from shape A to shape B.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldManifold {
    pub normal: Vec2,
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    /// Negative when the shapes overlap.
    pub separations: [f64; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    pub fn new(manifold: &Manifold, xf_a: &Transform, radius_a: f64, xf_b: &Transform, radius_b: f64) -> Self {
        let mut wm = WorldManifold::default();
        if manifold.point_count == 0 {
            return wm;
        }

        match manifold.manifold_type {
            ManifoldType::Circles => {
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.points[0].local_point);
                let normal = if point_a.distance_squared(point_b) > f64::EPSILON * f64::EPSILON {
                    (point_b - point_a).normalize()
                } else {
                    Vec2::X
                };

                let c_a = point_a + normal * radius_a;
                let c_b = point_b - normal * radius_b;
                wm.normal = normal;
                wm.points[0] = (c_a + c_b) * 0.5;
                wm.separations[0] = (c_b - c_a).dot(normal);
            }
            ManifoldType::FaceA => {
                let normal = xf_a.rot.apply(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                wm.normal = normal;

                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip_point = xf_b.apply(mp.local_point);
                    let c_a = clip_point + normal * (radius_a - (clip_point - plane_point).dot(normal));
                    let c_b = clip_point - normal * radius_b;
                    wm.points[i] = (c_a + c_b) * 0.5;
                    wm.separations[i] = (c_b - c_a).dot(normal);
                }
            }
            ManifoldType::FaceB => {
                let normal = xf_b.rot.apply(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);

                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip_point = xf_a.apply(mp.local_point);
                    let c_b = clip_point + normal * (radius_b - (clip_point - plane_point).dot(normal));
                    let c_a = clip_point - normal * radius_a;
                    wm.points[i] = (c_a + c_b) * 0.5;
                    wm.separations[i] = (c_a - c_b).dot(normal);
                }

                // Ensure normal points from A to B.
                wm.normal = -normal;
            }
        }
        wm
    }
}

/// How a manifold point changed between two updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointState {
    /// Point does not exist.
    #[default]
    Null,
    /// Point was added in the update.
    Add,
    /// Point persisted across the update.
    Persist,
    /// Point was removed in the update.
    Remove,
}

/// Classifies the points of `manifold1` (old) and `manifold2` (new) by id.
/// Returns the states for the old points and for the new points.
pub fn get_point_states(
    manifold1: &Manifold,
    manifold2: &Manifold,
) -> ([PointState; MAX_MANIFOLD_POINTS], [PointState; MAX_MANIFOLD_POINTS]) {
    let mut state1 = [PointState::Null; MAX_MANIFOLD_POINTS];
    let mut state2 = [PointState::Null; MAX_MANIFOLD_POINTS];

    for (i, p) in manifold1.points().iter().enumerate() {
        state1[i] = if manifold2.find_point(p.id).is_some() {
            PointState::Persist
        } else {
            PointState::Remove
        };
    }

    for (i, p) in manifold2.points().iter().enumerate() {
        state2[i] = if manifold1.find_point(p.id).is_some() {
            PointState::Persist
        } else {
            PointState::Add
        };
    }

    (state1, state2)
}

/// A clip vertex: a point with the feature that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClipVertex {
    pub v: Vec2,
    pub id: ContactId,
}

/// Sutherland-Hodgman clipping of a segment against the half-plane
/// `dot(normal, x) <= offset`. Returns the clipped points and how many are valid.
pub fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: Vec2,
    offset: f64,
    vertex_index_a: u8,
) -> ([ClipVertex; 2], usize) {
    let mut v_out = [ClipVertex::default(); 2];
    let mut count = 0;

    // Calculate the distance of end points to the line
    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    // If the points are behind the plane
    if distance0 <= 0.0 {
        v_out[count] = v_in[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        v_out[count] = v_in[1];
        count += 1;
    }

    // If the points are on different sides of the plane
    if distance0 * distance1 < 0.0 {
        let interp = distance0 / (distance0 - distance1);
        v_out[count].v = v_in[0].v + (v_in[1].v - v_in[0].v) * interp;

        // VertexA is hitting edgeB.
        v_out[count].id = ContactId::new(ContactFeature::new(
            vertex_index_a,
            FeatureType::Vertex,
            v_in[0].id.feature.index_b,
            FeatureType::Face,
        ));
        count += 1;
    }

    (v_out, count)
}
