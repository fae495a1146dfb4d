pub mod arena;
pub mod error;
pub mod material;
pub mod settings;

pub use arena::{Arena, Handle};
pub use error::{PhysicsError, Result};
pub use material::Material;
pub use settings::{FrictionOrder, Settings};
