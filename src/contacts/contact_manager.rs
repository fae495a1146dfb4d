//! Owns the broadphase and every contact, turning proxy pairs into contacts
//! and keeping them up to date.

use tracing::{debug, trace};

use super::contact::{Contact, ContactHandle};
use crate::collision::{BroadPhase, DynamicTree};
use crate::common::{Arena, Settings};
use crate::constraints::Joint;
use crate::objects::fixture::{Fixture, FixtureChild};
use crate::objects::rigid_body::{BodyHandle, BodyType, ContactEdge, RigidBody};
use crate::world::callbacks::{listener_mut, ContactListener};

/// Body-level collision rule: at least one body is dynamic and no joint
/// between them disables collision.
pub(crate) fn bodies_should_collide(
    bodies: &Arena<RigidBody>,
    joints: &Arena<Joint>,
    handle_a: BodyHandle,
    handle_b: BodyHandle,
) -> bool {
    let (Some(a), Some(b)) = (bodies.get(handle_a), bodies.get(handle_b)) else {
        return false;
    };
    if !a.can_collide_with(b) {
        return false;
    }
    b.joint_edges
        .iter()
        .filter(|edge| edge.other == handle_a)
        .all(|edge| joints.get(edge.joint).map_or(true, |joint| joint.collide_connected()))
}

pub struct ContactManager {
    pub(crate) broad_phase: BroadPhase<FixtureChild>,
    pub(crate) contacts: Arena<Contact>,
    pub(crate) listener: Option<Box<dyn ContactListener>>,
}

impl ContactManager {
    pub fn new(settings: &Settings) -> Self {
        ContactManager {
            broad_phase: BroadPhase::new(DynamicTree::new(settings.aabb_extension, settings.aabb_multiplier)),
            contacts: Arena::new(),
            listener: None,
        }
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Creates contacts for every new broadphase pair.
    pub(crate) fn find_new_contacts(
        &mut self,
        bodies: &mut Arena<RigidBody>,
        fixtures: &Arena<Fixture>,
        joints: &Arena<Joint>,
    ) {
        let mut pairs = Vec::new();
        self.broad_phase.update_pairs(|a, b| pairs.push((a, b)));
        for (a, b) in pairs {
            self.add_pair(a, b, bodies, fixtures, joints);
        }
    }

    fn add_pair(
        &mut self,
        proxy_a: FixtureChild,
        proxy_b: FixtureChild,
        bodies: &mut Arena<RigidBody>,
        fixtures: &Arena<Fixture>,
        joints: &Arena<Joint>,
    ) {
        let (Some(fixture_a), Some(fixture_b)) = (fixtures.get(proxy_a.fixture), fixtures.get(proxy_b.fixture)) else {
            return;
        };
        let body_a = fixture_a.body();
        let body_b = fixture_b.body();

        // Are the fixtures on the same body?
        if body_a == body_b {
            return;
        }

        // Does a contact already exist?
        let Some(b) = bodies.get(body_b) else {
            return;
        };
        let exists = b.contact_edges.iter().filter(|edge| edge.other == body_a).any(|edge| {
            self.contacts.get(edge.contact).map_or(false, |c| {
                let same = c.fixture_a == proxy_a.fixture
                    && c.fixture_b == proxy_b.fixture
                    && c.child_a == proxy_a.child_index
                    && c.child_b == proxy_b.child_index;
                let swapped = c.fixture_a == proxy_b.fixture
                    && c.fixture_b == proxy_a.fixture
                    && c.child_a == proxy_b.child_index
                    && c.child_b == proxy_a.child_index;
                same || swapped
            })
        });
        if exists {
            return;
        }

        if !bodies_should_collide(bodies, joints, body_b, body_a) {
            return;
        }
        if !fixture_a.filter().should_collide(fixture_b.filter()) {
            return;
        }

        let Some(contact) = Contact::new(
            proxy_a.fixture,
            fixture_a,
            proxy_a.child_index,
            proxy_b.fixture,
            fixture_b,
            proxy_b.child_index,
        ) else {
            return;
        };

        let handle = self.contacts.insert(contact);
        trace!(?handle, ?body_a, ?body_b, "contact created");

        if let Some(a) = bodies.get_mut(body_a) {
            a.contact_edges.push(ContactEdge {
                other: body_b,
                contact: handle,
            });
        }
        if let Some(b) = bodies.get_mut(body_b) {
            b.contact_edges.push(ContactEdge {
                other: body_a,
                contact: handle,
            });
        }
    }

    /// Removes a contact and unlinks it from both bodies. A touching contact
    /// reports `end_contact` and wakes its bodies.
    pub(crate) fn destroy(&mut self, handle: ContactHandle, bodies: &mut Arena<RigidBody>) {
        let Some(contact) = self.contacts.remove(handle) else {
            return;
        };

        if contact.touching {
            if let Some(listener) = self.listener.as_deref_mut() {
                listener.end_contact(&contact);
            }
        }

        let wake = contact.manifold.point_count > 0 && !contact.sensor;
        for body_handle in [contact.body_a, contact.body_b] {
            if let Some(body) = bodies.get_mut(body_handle) {
                body.contact_edges.retain(|edge| edge.contact != handle);
                if wake {
                    body.set_awake(true);
                }
            }
        }
        trace!(?handle, "contact destroyed");
    }

    /// Narrowphase for every contact: re-filters flagged contacts, drops
    /// contacts whose fat AABBs separated and updates the rest.
    pub(crate) fn collide(&mut self, bodies: &mut Arena<RigidBody>, fixtures: &Arena<Fixture>, joints: &Arena<Joint>) {
        let mut destroyed = 0usize;
        for handle in self.contacts.handles() {
            let Some(contact) = self.contacts.get(handle) else {
                continue;
            };
            let (handle_a, handle_b) = (contact.fixture_a, contact.fixture_b);
            let (child_a, child_b) = (contact.child_a, contact.child_b);
            let (body_a, body_b) = (contact.body_a, contact.body_b);
            let filter_flag = contact.filter_flag;

            let (Some(fixture_a), Some(fixture_b)) = (fixtures.get(handle_a), fixtures.get(handle_b)) else {
                self.destroy(handle, bodies);
                destroyed += 1;
                continue;
            };

            // Is this contact flagged for filtering?
            if filter_flag {
                if !bodies_should_collide(bodies, joints, body_b, body_a)
                    || !fixture_a.filter().should_collide(fixture_b.filter())
                {
                    self.destroy(handle, bodies);
                    destroyed += 1;
                    continue;
                }
                if let Some(contact) = self.contacts.get_mut(handle) {
                    contact.filter_flag = false;
                }
            }

            let (Some(a), Some(b)) = (bodies.get(body_a), bodies.get(body_b)) else {
                continue;
            };
            let active_a = a.awake && a.body_type != BodyType::Static;
            let active_b = b.awake && b.body_type != BodyType::Static;
            let (xf_a, xf_b) = (a.xf, b.xf);

            // At least one body must be awake and it must be dynamic or kinematic.
            if !active_a && !active_b {
                continue;
            }

            let (Some(proxy_a), Some(proxy_b)) = (fixture_a.proxies.get(child_a), fixture_b.proxies.get(child_b))
            else {
                continue;
            };

            // Here we destroy contacts that cease to overlap in the broadphase.
            if !self.broad_phase.test_overlap(proxy_a.proxy_id, proxy_b.proxy_id) {
                self.destroy(handle, bodies);
                destroyed += 1;
                continue;
            }

            let Some(contact) = self.contacts.get_mut(handle) else {
                continue;
            };
            let update = contact.update(fixture_a, fixture_b, &xf_a, &xf_b, listener_mut(&mut self.listener));
            let sensor = contact.sensor;

            if (update.began || update.ended) && !sensor {
                for body_handle in [body_a, body_b] {
                    if let Some(body) = bodies.get_mut(body_handle) {
                        body.set_awake(true);
                    }
                }
            }
        }

        if destroyed > 0 {
            debug!(destroyed, remaining = self.contacts.len(), "narrowphase pruned contacts");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Transform, Vec2};
    use crate::objects::fixture::{Filter, FixtureDef, FixtureHandle};
    use crate::objects::rigid_body::BodyDef;
    use crate::shapes::{Circle, Shape};

    struct Scene {
        manager: ContactManager,
        bodies: Arena<RigidBody>,
        fixtures: Arena<Fixture>,
        joints: Arena<Joint>,
    }

    impl Scene {
        fn new() -> Self {
            Scene {
                manager: ContactManager::new(&Settings::default()),
                bodies: Arena::new(),
                fixtures: Arena::new(),
                joints: Arena::new(),
            }
        }

        fn body(&mut self, def: BodyDef) -> BodyHandle {
            self.bodies.insert(RigidBody::new(&def))
        }

        fn fixture(&mut self, body: BodyHandle, def: FixtureDef) -> FixtureHandle {
            let handle = self.fixtures.insert(Fixture::new(body, &def));
            let xf = self.bodies[body].xf;
            self.fixtures[handle].create_proxies(&mut self.manager.broad_phase, &xf, handle);
            self.bodies[body].fixtures.push(handle);
            handle
        }

        fn step(&mut self) {
            self.manager.find_new_contacts(&mut self.bodies, &self.fixtures, &self.joints);
            self.manager.collide(&mut self.bodies, &self.fixtures, &self.joints);
        }
    }

    fn ball() -> FixtureDef {
        let shape: Shape = Circle::new(1.0).unwrap().into();
        FixtureDef::new(shape).with_density(1.0)
    }

    #[test]
    fn test_overlapping_pair_creates_touching_contact() {
        let mut scene = Scene::new();
        let a = scene.body(BodyDef::dynamic(Vec2::ZERO));
        let b = scene.body(BodyDef::dynamic(Vec2::new(1.5, 0.0)));
        scene.fixture(a, ball());
        scene.fixture(b, ball());
        scene.step();

        assert_eq!(scene.manager.contact_count(), 1);
        let (handle, contact) = scene.manager.contacts.iter().next().unwrap();
        assert!(contact.is_touching());
        assert_eq!(scene.bodies[a].contact_edges()[0].contact, handle);
        assert_eq!(scene.bodies[b].contact_edges()[0].other, a);

        // A second pass does not duplicate the contact.
        scene.manager.broad_phase.touch_proxy(scene.fixtures[scene.bodies[a].fixtures[0]].proxies[0].proxy_id);
        scene.step();
        assert_eq!(scene.manager.contact_count(), 1);
    }

    #[test]
    fn test_static_pairs_and_same_body_are_skipped() {
        let mut scene = Scene::new();
        let g1 = scene.body(BodyDef::fixed(Vec2::ZERO));
        let g2 = scene.body(BodyDef::fixed(Vec2::new(0.5, 0.0)));
        scene.fixture(g1, ball());
        scene.fixture(g2, ball());
        let d = scene.body(BodyDef::dynamic(Vec2::new(10.0, 0.0)));
        scene.fixture(d, ball());
        scene.fixture(d, ball());
        scene.step();
        assert_eq!(scene.manager.contact_count(), 0);
    }

    #[test]
    fn test_filter_blocks_pair() {
        let mut scene = Scene::new();
        let a = scene.body(BodyDef::dynamic(Vec2::ZERO));
        let b = scene.body(BodyDef::dynamic(Vec2::new(1.0, 0.0)));
        let filter = Filter {
            group_index: -1,
            ..Filter::default()
        };
        scene.fixture(a, ball().with_filter(filter));
        scene.fixture(b, ball().with_filter(filter));
        scene.step();
        assert_eq!(scene.manager.contact_count(), 0);
    }

    #[test]
    fn test_refilter_destroys_contact() {
        let mut scene = Scene::new();
        let a = scene.body(BodyDef::dynamic(Vec2::ZERO));
        let b = scene.body(BodyDef::dynamic(Vec2::new(1.0, 0.0)));
        let fa = scene.fixture(a, ball());
        scene.fixture(b, ball());
        scene.step();
        assert_eq!(scene.manager.contact_count(), 1);

        scene.fixtures[fa].filter.mask_bits = 0;
        for contact in scene.manager.contacts.iter_mut().map(|(_, c)| c) {
            contact.flag_for_filtering();
        }
        scene.step();
        assert_eq!(scene.manager.contact_count(), 0);
        assert!(scene.bodies[a].contact_edges().is_empty());
    }

    #[test]
    fn test_separated_proxies_destroy_contact() {
        let mut scene = Scene::new();
        let a = scene.body(BodyDef::dynamic(Vec2::ZERO));
        let b = scene.body(BodyDef::dynamic(Vec2::new(1.5, 0.0)));
        scene.fixture(a, ball());
        let fb = scene.fixture(b, ball());
        scene.step();
        assert_eq!(scene.manager.contact_count(), 1);

        let xf0 = scene.bodies[b].xf;
        let xf1 = Transform::new(Vec2::new(20.0, 0.0), 0.0);
        scene.bodies[b].set_transform_internal(xf1.position, 0.0);
        scene.fixtures[fb].synchronize(&mut scene.manager.broad_phase, &xf0, &xf1);
        // Moving far away leaves only the new pose in the proxy.
        scene.fixtures[fb].synchronize(&mut scene.manager.broad_phase, &xf1, &xf1);
        scene.step();
        assert_eq!(scene.manager.contact_count(), 0);
        assert!(scene.bodies[b].contact_edges().is_empty());
    }
}
