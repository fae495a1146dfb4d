pub mod callbacks;
pub(crate) mod island;
pub mod physics_world;
pub mod time_step;


// Re-export the world API
pub use callbacks::{ContactImpulse, ContactListener};
pub use physics_world::PhysicsWorld;
pub use time_step::TimeStep;
