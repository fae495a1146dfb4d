pub mod matrix;
pub mod rot;
pub mod sweep;
pub mod transform;
pub mod vec2;

pub use matrix::{Mat22, Mat33, Vec3};
pub use rot::Rot;
pub use sweep::Sweep;
pub use transform::Transform;
pub use vec2::Vec2;
