//! Persistent record of a potentially touching fixture pair.

use crate::collision::narrowphase::{collide, pair_order, PairOrder};
use crate::collision::{test_overlap, Manifold, WorldManifold};
use crate::common::material::{mix_friction, mix_restitution};
use crate::common::Handle;
use crate::math::Transform;
use crate::objects::fixture::{Fixture, FixtureHandle};
use crate::objects::rigid_body::BodyHandle;
use crate::world::callbacks::ContactListener;

pub type ContactHandle = Handle<Contact>;

/// Touching transitions produced by [`Contact::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContactUpdate {
    pub began: bool,
    pub ended: bool,
}

/// A contact exists for every fixture pair whose broadphase AABBs overlap,
/// touching or not. Fixtures are stored in collider order (see
/// [`pair_order`]), so fixture A is never of lower rank than fixture B.
#[derive(Debug, Clone)]
pub struct Contact {
    pub(crate) fixture_a: FixtureHandle,
    pub(crate) fixture_b: FixtureHandle,
    pub(crate) child_a: usize,
    pub(crate) child_b: usize,
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,

    pub(crate) manifold: Manifold,

    pub(crate) touching: bool,
    pub(crate) enabled: bool,
    pub(crate) sensor: bool,
    /// Filtering must be re-evaluated before the next narrowphase.
    pub(crate) filter_flag: bool,
    pub(crate) island_flag: bool,
    /// `toi` holds a valid time of impact for this step.
    pub(crate) toi_flag: bool,
    pub(crate) bullet_hit: bool,
    pub(crate) toi_count: u32,
    pub(crate) toi: f64,

    pub(crate) friction: f64,
    pub(crate) restitution: f64,
    pub(crate) tangent_speed: f64,

    // Poses and radii of the last update, for world manifold queries.
    xf_a: Transform,
    xf_b: Transform,
    radius_a: f64,
    radius_b: f64,
}

impl Contact {
    /// Creates a contact for the pair, reordering it for the collider.
    /// Returns `None` for shape pairs that have no collider.
    pub(crate) fn new(
        handle_a: FixtureHandle,
        fixture_a: &Fixture,
        child_a: usize,
        handle_b: FixtureHandle,
        fixture_b: &Fixture,
        child_b: usize,
    ) -> Option<Self> {
        let swap = match pair_order(fixture_a.shape_type(), fixture_b.shape_type()) {
            PairOrder::Unsupported => return None,
            PairOrder::Keep => false,
            PairOrder::Swap => true,
        };
        let ((ha, fa, ia), (hb, fb, ib)) = if swap {
            ((handle_b, fixture_b, child_b), (handle_a, fixture_a, child_a))
        } else {
            ((handle_a, fixture_a, child_a), (handle_b, fixture_b, child_b))
        };

        Some(Contact {
            fixture_a: ha,
            fixture_b: hb,
            child_a: ia,
            child_b: ib,
            body_a: fa.body(),
            body_b: fb.body(),
            manifold: Manifold::default(),
            touching: false,
            enabled: true,
            sensor: fa.is_sensor() || fb.is_sensor(),
            filter_flag: false,
            island_flag: false,
            toi_flag: false,
            bullet_hit: false,
            toi_count: 0,
            toi: 0.0,
            friction: mix_friction(fa.friction(), fb.friction()),
            restitution: mix_restitution(fa.restitution(), fb.restitution()),
            tangent_speed: 0.0,
            xf_a: Transform::identity(),
            xf_b: Transform::identity(),
            radius_a: fa.shape().radius(),
            radius_b: fb.shape().radius(),
        })
    }

    pub fn fixture_a(&self) -> FixtureHandle {
        self.fixture_a
    }

    pub fn fixture_b(&self) -> FixtureHandle {
        self.fixture_b
    }

    pub fn child_index_a(&self) -> usize {
        self.child_a
    }

    pub fn child_index_b(&self) -> usize {
        self.child_b
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    /// Local manifold, including the accumulated impulses.
    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// World-space view of the manifold at the poses of the last update.
    pub fn world_manifold(&self) -> WorldManifold {
        WorldManifold::new(&self.manifold, &self.xf_a, self.radius_a, &self.xf_b, self.radius_b)
    }

    pub fn is_touching(&self) -> bool {
        self.touching
    }

    pub fn is_sensor(&self) -> bool {
        self.sensor
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disables the contact for the current step only. Call from
    /// [`ContactListener::pre_solve`]; every update re-enables it.
    pub fn set_enabled(&mut self, flag: bool) {
        self.enabled = flag;
    }

    pub fn friction(&self) -> f64 {
        self.friction
    }

    /// Overrides the mixed friction. Persists until reset.
    pub fn set_friction(&mut self, friction: f64) {
        self.friction = friction;
    }

    pub fn reset_friction(&mut self, fixture_a: &Fixture, fixture_b: &Fixture) {
        self.friction = mix_friction(fixture_a.friction(), fixture_b.friction());
    }

    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f64) {
        self.restitution = restitution;
    }

    pub fn reset_restitution(&mut self, fixture_a: &Fixture, fixture_b: &Fixture) {
        self.restitution = mix_restitution(fixture_a.restitution(), fixture_b.restitution());
    }

    /// Surface speed along the tangent, for conveyor belts.
    pub fn tangent_speed(&self) -> f64 {
        self.tangent_speed
    }

    pub fn set_tangent_speed(&mut self, speed: f64) {
        self.tangent_speed = speed;
    }

    /// Number of time-of-impact sub-steps taken this step.
    pub fn toi_count(&self) -> u32 {
        self.toi_count
    }

    /// A bullet body was stopped by this contact in a time-of-impact sub-step.
    pub fn is_bullet_hit(&self) -> bool {
        self.bullet_hit
    }

    pub(crate) fn flag_for_filtering(&mut self) {
        self.filter_flag = true;
    }

    /// Regenerates the manifold at the given body transforms, carries
    /// impulses over to persisting points and fires listener events.
    pub(crate) fn update(
        &mut self,
        fixture_a: &Fixture,
        fixture_b: &Fixture,
        xf_a: &Transform,
        xf_b: &Transform,
        listener: Option<&mut dyn ContactListener>,
    ) -> ContactUpdate {
        let old_manifold = self.manifold;

        // Re-enable; pre-solve may disable again.
        self.enabled = true;
        self.sensor = fixture_a.is_sensor() || fixture_b.is_sensor();
        self.xf_a = *xf_a;
        self.xf_b = *xf_b;

        let was_touching = self.touching;
        let touching;

        if self.sensor {
            touching = test_overlap(fixture_a.shape(), self.child_a, fixture_b.shape(), self.child_b, xf_a, xf_b);
            // Sensors don't generate manifolds.
            self.manifold.point_count = 0;
        } else {
            self.manifold = collide(fixture_a.shape(), self.child_a, xf_a, fixture_b.shape(), self.child_b, xf_b);
            touching = self.manifold.point_count > 0;

            // Match new points to old ones by feature id to warm start.
            for point in self.manifold.points_mut() {
                point.normal_impulse = 0.0;
                point.tangent_impulse = 0.0;
                if let Some(old) = old_manifold.find_point(point.id) {
                    point.normal_impulse = old.normal_impulse;
                    point.tangent_impulse = old.tangent_impulse;
                }
            }
        }

        self.touching = touching;
        let result = ContactUpdate {
            began: !was_touching && touching,
            ended: was_touching && !touching,
        };

        if let Some(listener) = listener {
            if result.began {
                listener.begin_contact(self);
            }
            if result.ended {
                listener.end_contact(self);
            }
            if !self.sensor && touching {
                listener.pre_solve(self, &old_manifold);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::Manifold;
    use crate::common::Arena;
    use crate::math::Vec2;
    use crate::objects::fixture::FixtureDef;
    use crate::objects::rigid_body::{BodyDef, RigidBody};
    use crate::shapes::{Circle, Edge, Polygon, Shape};

    struct Fixtures {
        arena: Arena<Fixture>,
        a: FixtureHandle,
        b: FixtureHandle,
    }

    fn fixtures(shape_a: Shape, shape_b: Shape, def: impl Fn(FixtureDef) -> FixtureDef) -> Fixtures {
        let mut bodies = Arena::new();
        let body_a = bodies.insert(RigidBody::new(&BodyDef::default()));
        let body_b = bodies.insert(RigidBody::new(&BodyDef::dynamic(Vec2::ZERO)));
        let mut arena = Arena::new();
        let a = arena.insert(Fixture::new(body_a, &def(FixtureDef::new(shape_a))));
        let b = arena.insert(Fixture::new(body_b, &def(FixtureDef::new(shape_b))));
        Fixtures { arena, a, b }
    }

    fn contact(f: &Fixtures) -> Contact {
        Contact::new(f.a, &f.arena[f.a], 0, f.b, &f.arena[f.b], 0).unwrap()
    }

    fn update(c: &mut Contact, f: &Fixtures, xf_b: Transform, listener: Option<&mut dyn ContactListener>) -> ContactUpdate {
        let (fa, fb) = (&f.arena[c.fixture_a], &f.arena[c.fixture_b]);
        let (xa, xb) = if c.fixture_a == f.a {
            (Transform::identity(), xf_b)
        } else {
            (xf_b, Transform::identity())
        };
        c.update(fa, fb, &xa, &xb, listener)
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<&'static str>,
        disable: bool,
    }

    impl ContactListener for Recorder {
        fn begin_contact(&mut self, _contact: &Contact) {
            self.events.push("begin");
        }
        fn end_contact(&mut self, _contact: &Contact) {
            self.events.push("end");
        }
        fn pre_solve(&mut self, contact: &mut Contact, _old_manifold: &Manifold) {
            self.events.push("pre");
            if self.disable {
                contact.set_enabled(false);
            }
        }
    }

    #[test]
    fn test_material_mixing() {
        let f = fixtures(
            Circle::new(1.0).unwrap().into(),
            Circle::new(1.0).unwrap().into(),
            |d| d.with_friction(0.4).with_restitution(0.3),
        );
        let c = contact(&f);
        assert!((c.friction() - 0.4).abs() < 1e-12);
        assert_eq!(c.restitution(), 0.3);
    }

    #[test]
    fn test_pair_is_reordered_for_collider() {
        let f = fixtures(
            Circle::new(0.5).unwrap().into(),
            Polygon::new_box(1.0, 1.0).unwrap().into(),
            |d| d,
        );
        let c = contact(&f);
        assert_eq!(c.fixture_a(), f.b);
        assert_eq!(c.fixture_b(), f.a);

        let edges = fixtures(
            Edge::new(Vec2::ZERO, Vec2::X).unwrap().into(),
            Edge::new(Vec2::ZERO, Vec2::X).unwrap().into(),
            |d| d,
        );
        assert!(Contact::new(edges.a, &edges.arena[edges.a], 0, edges.b, &edges.arena[edges.b], 0).is_none());
    }

    #[test]
    fn test_touching_transitions_and_events() {
        let f = fixtures(
            Circle::new(1.0).unwrap().into(),
            Circle::new(1.0).unwrap().into(),
            |d| d,
        );
        let mut c = contact(&f);
        let mut rec = Recorder::default();

        let far = Transform::new(Vec2::new(3.0, 0.0), 0.0);
        let near = Transform::new(Vec2::new(1.5, 0.0), 0.0);

        assert_eq!(update(&mut c, &f, far, Some(&mut rec)), ContactUpdate::default());
        let u = update(&mut c, &f, near, Some(&mut rec));
        assert!(u.began && !u.ended);
        assert!(c.is_touching());
        let u = update(&mut c, &f, near, Some(&mut rec));
        assert_eq!(u, ContactUpdate::default());
        let u = update(&mut c, &f, far, Some(&mut rec));
        assert!(u.ended);

        assert_eq!(rec.events, vec!["begin", "pre", "pre", "end"]);
    }

    #[test]
    fn test_impulses_persist_by_id() {
        let f = fixtures(
            Polygon::new_box(5.0, 0.5).unwrap().into(),
            Polygon::new_box(0.5, 0.5).unwrap().into(),
            |d| d,
        );
        let mut c = contact(&f);
        let resting = Transform::new(Vec2::new(0.0, 0.99), 0.0);
        update(&mut c, &f, resting, None);
        assert_eq!(c.manifold().point_count, 2);
        for (i, p) in c.manifold.points_mut().iter_mut().enumerate() {
            p.normal_impulse = 1.0 + i as f64;
            p.tangent_impulse = 0.5;
        }

        // Small slide keeps the same features.
        update(&mut c, &f, Transform::new(Vec2::new(0.01, 0.99), 0.0), None);
        let mut impulses: Vec<f64> = c.manifold().points().iter().map(|p| p.normal_impulse).collect();
        impulses.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(impulses, vec![1.0, 2.0]);
        assert!(c.manifold().points().iter().all(|p| p.tangent_impulse == 0.5));
    }

    #[test]
    fn test_sensor_has_no_manifold() {
        let f = fixtures(
            Circle::new(1.0).unwrap().into(),
            Circle::new(1.0).unwrap().into(),
            |d| d.sensor(),
        );
        let mut c = contact(&f);
        let mut rec = Recorder::default();
        let u = update(&mut c, &f, Transform::new(Vec2::new(1.0, 0.0), 0.0), Some(&mut rec));
        assert!(u.began);
        assert!(c.is_sensor());
        assert_eq!(c.manifold().point_count, 0);
        // No pre-solve for sensors.
        assert_eq!(rec.events, vec!["begin"]);
    }

    #[test]
    fn test_pre_solve_can_disable() {
        let f = fixtures(
            Circle::new(1.0).unwrap().into(),
            Circle::new(1.0).unwrap().into(),
            |d| d,
        );
        let mut c = contact(&f);
        let mut rec = Recorder {
            disable: true,
            ..Default::default()
        };
        update(&mut c, &f, Transform::new(Vec2::new(1.5, 0.0), 0.0), Some(&mut rec));
        assert!(c.is_touching());
        assert!(!c.is_enabled());

        // Re-enabled on the next update.
        update(&mut c, &f, Transform::new(Vec2::new(1.5, 0.0), 0.0), None);
        assert!(c.is_enabled());
    }

    #[test]
    fn test_world_manifold_uses_last_poses() {
        let f = fixtures(
            Circle::new(1.0).unwrap().into(),
            Circle::new(1.0).unwrap().into(),
            |d| d,
        );
        let mut c = contact(&f);
        update(&mut c, &f, Transform::new(Vec2::new(0.0, 1.5), 0.0), None);
        let wm = c.world_manifold();
        assert!((wm.normal.y - 1.0).abs() < 1e-12);
        assert!((wm.separations[0] + 0.5).abs() < 1e-12);
    }
}
