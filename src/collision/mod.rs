pub mod aabb;
pub mod broad_phase;
pub mod collide_circle;
pub mod collide_edge;
pub mod collide_polygon;
pub mod distance;
pub mod dynamic_tree;
pub mod manifold;
pub mod narrowphase;
pub mod ray;
pub mod time_of_impact;

// Re-export key types
pub use aabb::AABB;
pub use broad_phase::BroadPhase;
pub use distance::{distance, test_overlap, DistanceInput, DistanceOutput, DistanceProxy, SimplexCache};
pub use dynamic_tree::{DynamicTree, ProxyId};
pub use manifold::{
    get_point_states, ContactFeature, ContactId, FeatureType, Manifold, ManifoldPoint, ManifoldType, PointState,
    WorldManifold,
};
pub use narrowphase::collide;
pub use ray::{RayCastInput, RayCastOutput};
pub use time_of_impact::{time_of_impact, ToiInput, ToiOutput, ToiState};
