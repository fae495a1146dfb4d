//! Error type for world and shape operations.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    /// The geometry cannot be simulated (degenerate, non-convex, negative radius...).
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// A body, fixture or joint definition holds values outside their valid range.
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    /// The handle refers to an entity that has been destroyed.
    #[error("stale or unknown handle")]
    StaleHandle,

    /// The world graph cannot be changed while a step is running.
    #[error("world is locked during a step")]
    WorldLocked,
}

pub type Result<T> = std::result::Result<T, PhysicsError>;
