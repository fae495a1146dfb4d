//! User hooks invoked while the world steps.

use crate::collision::Manifold;
use crate::common::settings::MAX_MANIFOLD_POINTS;
use crate::contacts::Contact;

/// Impulses the solver applied to a contact, reported after solving.
/// Indexed like the contact's manifold points.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactImpulse {
    pub normal_impulses: [f64; MAX_MANIFOLD_POINTS],
    pub tangent_impulses: [f64; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

/// Receives contact events during [`PhysicsWorld::step`](crate::world::PhysicsWorld::step).
///
/// Callbacks never see the world, so they cannot create or destroy entities
/// mid-step. Record what you need and act on it after the step returns.
/// `pre_solve` may still tweak the contact itself, for example disabling it
/// for this step or overriding friction.
pub trait ContactListener {
    /// Two fixtures started touching.
    fn begin_contact(&mut self, _contact: &Contact) {}

    /// Two fixtures stopped touching. Also called when a touching contact is
    /// destroyed, including during body or fixture destruction.
    fn end_contact(&mut self, _contact: &Contact) {}

    /// Called after the manifold is updated and before it is solved.
    /// Only for touching, non-sensor contacts.
    fn pre_solve(&mut self, _contact: &mut Contact, _old_manifold: &Manifold) {}

    /// Called with the impulses the solver applied. Only for touching,
    /// enabled, non-sensor contacts.
    fn post_solve(&mut self, _contact: &Contact, _impulse: &ContactImpulse) {}
}

/// Reborrows an installed listener with a lifetime short enough to pass down
/// into a single update.
pub(crate) fn listener_mut(listener: &mut Option<Box<dyn ContactListener>>) -> Option<&mut dyn ContactListener> {
    match listener {
        Some(listener) => Some(listener.as_mut()),
        None => None,
    }
}
