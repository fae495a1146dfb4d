pub mod fixture;
pub mod rigid_body;

pub use fixture::{Filter, Fixture, FixtureChild, FixtureDef, FixtureHandle, FixtureProxy};
pub use rigid_body::{BodyDef, BodyHandle, BodyType, ContactEdge, JointEdge, RigidBody};
