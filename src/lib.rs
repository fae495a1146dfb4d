//! A 2D rigid-body physics engine.
//!
//! Bodies carry fixtures (shapes with material and filtering), a dynamic AABB
//! tree finds candidate pairs, and a sequential impulse solver resolves
//! contacts and joints island by island. Fast bodies are handled with
//! time-of-impact sub-stepping.
//!
//! ```no_run
//! use rigid2d::{BodyDef, Circle, PhysicsWorld, Polygon, Shape, Vec2};
//!
//! let mut world = PhysicsWorld::new(Vec2::new(0.0, -10.0));
//! let ground = world.create_body(&BodyDef::fixed(Vec2::ZERO))?;
//! world.create_fixture_from_shape(ground, Shape::Polygon(Polygon::new_box(10.0, 0.5)?), 0.0)?;
//!
//! let ball = world.create_body(&BodyDef::dynamic(Vec2::new(0.0, 4.0)))?;
//! world.create_fixture_from_shape(ball, Shape::Circle(Circle::new(0.5)?), 1.0)?;
//!
//! for _ in 0..60 {
//!     world.step(1.0 / 60.0, 8, 3);
//! }
//! # Ok::<(), rigid2d::PhysicsError>(())
//! ```

pub mod collision;
pub mod common;
pub mod constraints;
pub mod contacts;
pub mod integration;
pub mod math;
pub mod objects;
pub mod shapes;
pub mod world;

// Re-export key types for easier use
pub use collision::{RayCastInput, RayCastOutput, AABB};
pub use common::{Handle, Material, PhysicsError, Result, Settings};
pub use constraints::{
    DistanceJointDef, Joint, JointDef, JointHandle, JointKind, PrismaticJointDef, RevoluteJointDef, WeldJointDef,
};
pub use contacts::{Contact, ContactHandle};
pub use math::{Rot, Transform, Vec2};
pub use objects::{BodyDef, BodyHandle, BodyType, Filter, Fixture, FixtureDef, FixtureHandle, RigidBody};
pub use shapes::{Chain, Circle, Edge, Polygon, Shape};
pub use world::{ContactImpulse, ContactListener, PhysicsWorld};
