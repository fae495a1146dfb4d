use crate::common::{Arena, Handle, PhysicsError, Result};
use crate::constraints::JointHandle;
use crate::contacts::ContactHandle;
use crate::math::{Rot, Sweep, Transform, Vec2};
use crate::objects::fixture::{Fixture, FixtureHandle};

pub type BodyHandle = Handle<RigidBody>;

/// How a body takes part in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    /// Zero velocity, infinite mass. Moved only by the user.
    #[default]
    Static,
    /// Moves with its set velocity, unaffected by forces and contacts.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// Construction parameters for a [`RigidBody`].
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDef {
    pub body_type: BodyType,
    /// World position of the body origin.
    pub position: Vec2,
    /// World angle in radians.
    pub angle: f64,
    /// Linear velocity of the body origin.
    pub linear_velocity: Vec2,
    pub angular_velocity: f64,
    pub linear_damping: f64,
    pub angular_damping: f64,
    pub allow_sleep: bool,
    pub awake: bool,
    pub fixed_rotation: bool,
    /// Treat as a fast body that must not tunnel through other dynamic bodies.
    pub bullet: bool,
    pub enabled: bool,
    pub gravity_scale: f64,
    pub user_data: u64,
}

impl Default for BodyDef {
    fn default() -> Self {
        BodyDef {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            enabled: true,
            gravity_scale: 1.0,
            user_data: 0,
        }
    }
}

impl BodyDef {
    /// A dynamic body at `position`.
    pub fn dynamic(position: Vec2) -> Self {
        BodyDef {
            body_type: BodyType::Dynamic,
            position,
            ..Default::default()
        }
    }

    /// A static body at `position`.
    pub fn fixed(position: Vec2) -> Self {
        BodyDef {
            position,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.position.is_valid() || !self.linear_velocity.is_valid() {
            return Err(PhysicsError::InvalidDefinition("body position and velocity must be finite".into()));
        }
        if !self.angle.is_finite() || !self.angular_velocity.is_finite() || !self.gravity_scale.is_finite() {
            return Err(PhysicsError::InvalidDefinition("body angle, spin and gravity scale must be finite".into()));
        }
        if !(self.linear_damping >= 0.0 && self.angular_damping >= 0.0)
            || !self.linear_damping.is_finite()
            || !self.angular_damping.is_finite()
        {
            return Err(PhysicsError::InvalidDefinition("damping must be finite and non-negative".into()));
        }
        Ok(())
    }
}

/// Link from a body to a contact it takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEdge {
    pub other: BodyHandle,
    pub contact: ContactHandle,
}

/// Link from a body to a joint it takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointEdge {
    pub other: BodyHandle,
    pub joint: JointHandle,
}

/// A rigid body. Owned by the world and created through
/// [`PhysicsWorld::create_body`](crate::world::PhysicsWorld::create_body).
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub(crate) body_type: BodyType,

    // Body origin transform and center of mass motion
    pub(crate) xf: Transform,
    pub(crate) sweep: Sweep,

    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f64,

    // Accumulators for forces/torques applied during a time step
    pub(crate) force: Vec2,
    pub(crate) torque: f64,

    pub(crate) mass: f64,
    pub(crate) inv_mass: f64,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f64,
    pub(crate) inv_inertia: f64,

    pub(crate) linear_damping: f64,
    pub(crate) angular_damping: f64,
    pub(crate) gravity_scale: f64,
    pub(crate) sleep_time: f64,

    pub(crate) awake: bool,
    pub(crate) allow_sleep: bool,
    pub(crate) bullet: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) enabled: bool,
    pub(crate) island_flag: bool,
    pub(crate) island_index: usize,

    pub(crate) fixtures: Vec<FixtureHandle>,
    pub(crate) contact_edges: Vec<ContactEdge>,
    pub(crate) joint_edges: Vec<JointEdge>,

    pub(crate) user_data: u64,
}

impl RigidBody {
    /// Builds a body from a validated definition. Dynamic bodies start with
    /// unit mass until fixtures with density are attached.
    pub(crate) fn new(def: &BodyDef) -> Self {
        let xf = Transform::new(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: xf.position,
            c: xf.position,
            a0: def.angle,
            a: def.angle,
            alpha0: 0.0,
        };

        let (mass, inv_mass) = if def.body_type == BodyType::Dynamic {
            (1.0, 1.0)
        } else {
            (0.0, 0.0)
        };

        RigidBody {
            body_type: def.body_type,
            xf,
            sweep,
            linear_velocity: def.linear_velocity,
            angular_velocity: def.angular_velocity,
            force: Vec2::ZERO,
            torque: 0.0,
            mass,
            inv_mass,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: 0.0,
            awake: def.awake,
            allow_sleep: def.allow_sleep,
            bullet: def.bullet,
            fixed_rotation: def.fixed_rotation,
            enabled: def.enabled,
            island_flag: false,
            island_index: 0,
            fixtures: Vec::new(),
            contact_edges: Vec::new(),
            joint_edges: Vec::new(),
            user_data: def.user_data,
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// Transform of the body origin.
    pub fn transform(&self) -> &Transform {
        &self.xf
    }

    /// World position of the body origin.
    pub fn position(&self) -> Vec2 {
        self.xf.position
    }

    pub fn angle(&self) -> f64 {
        self.sweep.a
    }

    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    pub fn sweep(&self) -> &Sweep {
        &self.sweep
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    pub fn angular_velocity(&self) -> f64 {
        self.angular_velocity
    }

    pub fn force(&self) -> Vec2 {
        self.force
    }

    pub fn torque(&self) -> f64 {
        self.torque
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn inv_mass(&self) -> f64 {
        self.inv_mass
    }

    /// Rotational inertia about the body origin.
    pub fn inertia(&self) -> f64 {
        self.inertia + self.mass * self.sweep.local_center.dot(self.sweep.local_center)
    }

    pub fn inv_inertia(&self) -> f64 {
        self.inv_inertia
    }

    pub fn linear_damping(&self) -> f64 {
        self.linear_damping
    }

    pub fn set_linear_damping(&mut self, damping: f64) {
        self.linear_damping = damping.max(0.0);
    }

    pub fn angular_damping(&self) -> f64 {
        self.angular_damping
    }

    pub fn set_angular_damping(&mut self, damping: f64) {
        self.angular_damping = damping.max(0.0);
    }

    pub fn gravity_scale(&self) -> f64 {
        self.gravity_scale
    }

    pub fn set_gravity_scale(&mut self, scale: f64) {
        self.gravity_scale = scale;
    }

    pub fn sleep_time(&self) -> f64 {
        self.sleep_time
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.allow_sleep
    }

    /// Disallowing sleep wakes the body.
    pub fn set_sleeping_allowed(&mut self, flag: bool) {
        self.allow_sleep = flag;
        if !flag {
            self.set_awake(true);
        }
    }

    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    pub fn set_bullet(&mut self, flag: bool) {
        self.bullet = flag;
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn fixtures(&self) -> &[FixtureHandle] {
        &self.fixtures
    }

    pub fn contact_edges(&self) -> &[ContactEdge] {
        &self.contact_edges
    }

    pub fn joint_edges(&self) -> &[JointEdge] {
        &self.joint_edges
    }

    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    pub fn set_user_data(&mut self, data: u64) {
        self.user_data = data;
    }

    pub fn world_point(&self, local_point: Vec2) -> Vec2 {
        self.xf.apply(local_point)
    }

    pub fn world_vector(&self, local_vector: Vec2) -> Vec2 {
        self.xf.rot.apply(local_vector)
    }

    pub fn local_point(&self, world_point: Vec2) -> Vec2 {
        self.xf.apply_inverse(world_point)
    }

    pub fn local_vector(&self, world_vector: Vec2) -> Vec2 {
        self.xf.rot.apply_inverse(world_vector)
    }

    /// Velocity of a world point attached to this body.
    pub fn linear_velocity_from_world_point(&self, world_point: Vec2) -> Vec2 {
        self.linear_velocity + Vec2::scalar_cross(self.angular_velocity, world_point - self.sweep.c)
    }

    pub fn linear_velocity_from_local_point(&self, local_point: Vec2) -> Vec2 {
        self.linear_velocity_from_world_point(self.world_point(local_point))
    }

    /// Ignored for static bodies. A non-zero velocity wakes the body.
    pub fn set_linear_velocity(&mut self, v: Vec2) {
        if self.body_type == BodyType::Static {
            return;
        }
        if v.dot(v) > 0.0 {
            self.set_awake(true);
        }
        self.linear_velocity = v;
    }

    pub fn set_angular_velocity(&mut self, w: f64) {
        if self.body_type == BodyType::Static {
            return;
        }
        if w * w > 0.0 {
            self.set_awake(true);
        }
        self.angular_velocity = w;
    }

    /// Waking resets the sleep timer. Putting a body to sleep zeroes its
    /// velocity and accumulated forces.
    pub fn set_awake(&mut self, flag: bool) {
        if flag {
            if !self.awake {
                self.awake = true;
                self.sleep_time = 0.0;
            }
        } else {
            self.awake = false;
            self.sleep_time = 0.0;
            self.linear_velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    /// Applies a force at a world point. Off-center forces also produce torque.
    /// Only dynamic bodies respond; a sleeping body accumulates nothing unless `wake` is set.
    pub fn apply_force(&mut self, force: Vec2, point: Vec2, wake: bool) {
        if !self.prepare_to_push(wake) {
            return;
        }
        self.force += force;
        // torque = r x F
        self.torque += (point - self.sweep.c).cross(force);
    }

    pub fn apply_force_to_center(&mut self, force: Vec2, wake: bool) {
        if !self.prepare_to_push(wake) {
            return;
        }
        self.force += force;
    }

    pub fn apply_torque(&mut self, torque: f64, wake: bool) {
        if !self.prepare_to_push(wake) {
            return;
        }
        self.torque += torque;
    }

    /// Applies an impulse at a world point, changing velocity immediately.
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2, wake: bool) {
        if !self.prepare_to_push(wake) {
            return;
        }
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia * (point - self.sweep.c).cross(impulse);
    }

    pub fn apply_angular_impulse(&mut self, impulse: f64, wake: bool) {
        if !self.prepare_to_push(wake) {
            return;
        }
        self.angular_velocity += self.inv_inertia * impulse;
    }

    fn prepare_to_push(&mut self, wake: bool) -> bool {
        if self.body_type != BodyType::Dynamic {
            return false;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        self.awake
    }

    /// Clears force and torque accumulators.
    pub fn clear_forces(&mut self) {
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }

    /// Recomputes mass, center of mass and inertia from the attached fixtures.
    /// Static and kinematic bodies get zero mass. A dynamic body without
    /// density still gets unit mass so it can move.
    pub(crate) fn reset_mass_data(&mut self, fixtures: &Arena<Fixture>) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_inertia = 0.0;
        self.sweep.local_center = Vec2::ZERO;

        if self.body_type != BodyType::Dynamic {
            self.sweep.c0 = self.xf.position;
            self.sweep.c = self.xf.position;
            self.sweep.a0 = self.sweep.a;
            return;
        }

        // Accumulate mass over all fixtures.
        let mut local_center = Vec2::ZERO;
        for fixture in self.fixtures.iter().filter_map(|&h| fixtures.get(h)) {
            if fixture.density() == 0.0 {
                continue;
            }
            let mass_data = fixture.mass_data();
            self.mass += mass_data.mass;
            local_center += mass_data.center * mass_data.mass;
            self.inertia += mass_data.inertia;
        }

        if self.mass > 0.0 {
            self.inv_mass = 1.0 / self.mass;
            local_center = local_center * self.inv_mass;
        } else {
            self.mass = 1.0;
            self.inv_mass = 1.0;
        }

        if self.inertia > 0.0 && !self.fixed_rotation {
            // Shift inertia to the center of mass.
            self.inertia -= self.mass * local_center.dot(local_center);
            debug_assert!(self.inertia > 0.0);
            self.inv_inertia = 1.0 / self.inertia;
        } else {
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        }

        // Move center of mass and keep the velocity of the new center consistent.
        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        self.sweep.c = self.xf.apply(local_center);
        self.sweep.c0 = self.sweep.c;

        self.linear_velocity += Vec2::scalar_cross(self.angular_velocity, self.sweep.c - old_center);
    }

    /// Places the body origin without touching the broadphase.
    pub(crate) fn set_transform_internal(&mut self, position: Vec2, angle: f64) {
        self.xf = Transform::new(position, angle);
        self.sweep.c = self.xf.apply(self.sweep.local_center);
        self.sweep.a = angle;
        self.sweep.c0 = self.sweep.c;
        self.sweep.a0 = angle;
    }

    /// Rebuilds the origin transform from the end of the sweep.
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf.rot = Rot::new(self.sweep.a);
        self.xf.position = self.sweep.c - self.xf.rot.apply(self.sweep.local_center);
    }

    /// Moves the whole sweep to `alpha` and parks the body there.
    pub(crate) fn advance(&mut self, alpha: f64) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    /// Body-level collision rule: at least one body must be dynamic.
    pub(crate) fn can_collide_with(&self, other: &RigidBody) -> bool {
        self.body_type == BodyType::Dynamic || other.body_type == BodyType::Dynamic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::fixture::FixtureDef;
    use crate::shapes::{Circle, Polygon, Shape};
    use approx::assert_relative_eq;
    const EPSILON: f64 = 1e-10;

    fn dynamic_body() -> RigidBody {
        RigidBody::new(&BodyDef::dynamic(Vec2::ZERO))
    }

    fn attach(body: &mut RigidBody, fixtures: &mut Arena<Fixture>, shape: Shape, density: f64) {
        let def = FixtureDef::new(shape).with_density(density);
        let mut owners: Arena<RigidBody> = Arena::new();
        let owner = owners.insert(dynamic_body());
        let handle = fixtures.insert(Fixture::new(owner, &def));
        body.fixtures.push(handle);
        body.reset_mass_data(fixtures);
    }

    #[test]
    fn test_body_def_validation() {
        assert!(BodyDef::dynamic(Vec2::new(1.0, 2.0)).validate().is_ok());

        let mut def = BodyDef::dynamic(Vec2::new(f64::NAN, 0.0));
        assert!(matches!(def.validate(), Err(PhysicsError::InvalidDefinition(_))));

        def.position = Vec2::ZERO;
        def.linear_damping = -1.0;
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_new_dynamic_body_has_unit_mass() {
        let rb = dynamic_body();
        assert_eq!(rb.mass(), 1.0);
        assert_eq!(rb.inv_mass(), 1.0);
        assert_eq!(rb.inv_inertia(), 0.0);

        let ground = RigidBody::new(&BodyDef::fixed(Vec2::ZERO));
        assert_eq!(ground.inv_mass(), 0.0);
    }

    #[test]
    fn test_reset_mass_data_circle() {
        let mut fixtures = Arena::new();
        let mut rb = dynamic_body();
        attach(&mut rb, &mut fixtures, Circle::new(1.0).unwrap().into(), 2.0);

        let mass = 2.0 * std::f64::consts::PI;
        assert_relative_eq!(rb.mass(), mass, epsilon = EPSILON);
        assert_relative_eq!(rb.inertia, 0.5 * mass, epsilon = EPSILON);
        assert_relative_eq!(rb.inv_inertia(), 1.0 / (0.5 * mass), epsilon = EPSILON);
        assert_eq!(rb.local_center(), Vec2::ZERO);
    }

    #[test]
    fn test_reset_mass_data_offset_box() {
        let mut fixtures = Arena::new();
        let mut rb = dynamic_body();
        let shape = Polygon::new_oriented_box(1.0, 0.5, Vec2::new(2.0, 0.0), 0.0).unwrap();
        attach(&mut rb, &mut fixtures, shape.into(), 1.0);

        // 2 x 1 box, unit density
        assert_relative_eq!(rb.mass(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(rb.local_center().x, 2.0, epsilon = 1e-9);
        assert_relative_eq!(rb.world_center().x, 2.0, epsilon = 1e-9);
        // Central inertia m(w^2 + h^2)/12
        assert_relative_eq!(rb.inertia, 2.0 * (4.0 + 1.0) / 12.0, epsilon = 1e-9);
        // Origin inertia adds m d^2
        assert_relative_eq!(rb.inertia(), 2.0 * (4.0 + 1.0) / 12.0 + 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fixed_rotation_has_no_inertia() {
        let mut fixtures = Arena::new();
        let mut def = BodyDef::dynamic(Vec2::ZERO);
        def.fixed_rotation = true;
        let mut rb = RigidBody::new(&def);
        attach(&mut rb, &mut fixtures, Circle::new(1.0).unwrap().into(), 1.0);
        assert_eq!(rb.inv_inertia(), 0.0);
        assert!(rb.mass() > 0.0);
    }

    #[test]
    fn test_apply_force() {
        let mut rb = dynamic_body();
        rb.apply_force_to_center(Vec2::new(10.0, 0.0), true);
        rb.apply_force_to_center(Vec2::new(0.0, 5.0), true);
        assert!((rb.force.x - 10.0).abs() < EPSILON);
        assert!((rb.force.y - 5.0).abs() < EPSILON);
        assert!((rb.torque - 0.0).abs() < EPSILON); // No torque from force at CoM
    }

    #[test]
    fn test_apply_force_at_point() {
        let mut rb = RigidBody::new(&BodyDef::dynamic(Vec2::new(5.0, 5.0)));
        let force = Vec2::new(0.0, 10.0);
        let point_world = Vec2::new(6.0, 5.0); // 1 unit right of CoM
        rb.apply_force(force, point_world, true);

        assert!((rb.force.y - 10.0).abs() < EPSILON);
        // r = (1,0), torque = r x F = 1*10 - 0*0 = 10
        assert!((rb.torque - 10.0).abs() < EPSILON);
    }

    #[test]
    fn test_forces_ignored_by_static_and_sleeping_bodies() {
        let mut ground = RigidBody::new(&BodyDef::fixed(Vec2::ZERO));
        ground.apply_force_to_center(Vec2::new(1.0, 0.0), true);
        assert_eq!(ground.force, Vec2::ZERO);

        let mut rb = dynamic_body();
        rb.set_awake(false);
        rb.apply_force_to_center(Vec2::new(1.0, 0.0), false);
        assert_eq!(rb.force, Vec2::ZERO);
        assert!(!rb.is_awake());

        rb.apply_force_to_center(Vec2::new(1.0, 0.0), true);
        assert!(rb.is_awake());
        assert_eq!(rb.force, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_linear_impulse() {
        let mut rb = dynamic_body();
        rb.inv_inertia = 2.0;
        rb.apply_linear_impulse(Vec2::new(0.0, 3.0), Vec2::new(1.0, 0.0), true);
        assert_relative_eq!(rb.linear_velocity().y, 3.0);
        assert_relative_eq!(rb.angular_velocity(), 6.0);
    }

    #[test]
    fn test_clear_forces() {
        let mut rb = dynamic_body();
        rb.apply_force_to_center(Vec2::new(1.0, 1.0), true);
        rb.apply_torque(5.0, true);
        rb.clear_forces();
        assert_eq!(rb.force, Vec2::ZERO);
        assert_eq!(rb.torque, 0.0);
    }

    #[test]
    fn test_sleep_clears_motion() {
        let mut rb = dynamic_body();
        rb.set_linear_velocity(Vec2::new(3.0, 0.0));
        rb.set_angular_velocity(1.0);
        rb.sleep_time = 2.0;
        rb.set_awake(false);
        assert_eq!(rb.linear_velocity(), Vec2::ZERO);
        assert_eq!(rb.angular_velocity(), 0.0);
        assert_eq!(rb.sleep_time(), 0.0);

        rb.set_linear_velocity(Vec2::new(0.0, 1.0));
        assert!(rb.is_awake());
    }

    #[test]
    fn test_point_conversions() {
        let mut def = BodyDef::dynamic(Vec2::new(1.0, 2.0));
        def.angle = std::f64::consts::FRAC_PI_2;
        let rb = RigidBody::new(&def);
        let world = rb.world_point(Vec2::new(1.0, 0.0));
        assert_relative_eq!(world.x, 1.0, epsilon = EPSILON);
        assert_relative_eq!(world.y, 3.0, epsilon = EPSILON);
        let local = rb.local_point(world);
        assert_relative_eq!(local.x, 1.0, epsilon = EPSILON);
        assert_relative_eq!(local.y, 0.0, epsilon = EPSILON);
    }

    #[test]
    fn test_advance_parks_sweep() {
        let mut rb = dynamic_body();
        rb.sweep.c = Vec2::new(4.0, 0.0);
        rb.sweep.a = 1.0;
        rb.advance(0.5);
        assert_relative_eq!(rb.world_center().x, 2.0, epsilon = EPSILON);
        assert_relative_eq!(rb.angle(), 0.5, epsilon = EPSILON);
        assert_relative_eq!(rb.position().x, 2.0, epsilon = EPSILON);
    }
}
