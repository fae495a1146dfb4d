use tracing::{debug, trace, warn};

use crate::collision::{time_of_impact, BroadPhase, DistanceProxy, RayCastInput, ToiInput, ToiState, AABB};
use crate::common::{Arena, PhysicsError, Result, Settings};
use crate::constraints::{Joint, JointDef, JointHandle};
use crate::contacts::{Contact, ContactHandle, ContactManager};
use crate::math::{Rot, Sweep, Transform, Vec2};
use crate::objects::fixture::{Filter, Fixture, FixtureChild, FixtureDef, FixtureHandle};
use crate::objects::rigid_body::{BodyDef, BodyHandle, BodyType, JointEdge, RigidBody};
use crate::shapes::Shape;
use crate::world::callbacks::{listener_mut, ContactListener};
use crate::world::island::{Island, SolverContext};
use crate::world::time_step::TimeStep;

/// Position iterations used by time-of-impact sub-steps.
const TOI_POSITION_ITERATIONS: usize = 20;

/// Owns every body, fixture, joint and contact, and advances them in time.
///
/// Entities are addressed by generational handles. A handle to a destroyed
/// entity is rejected with [`PhysicsError::StaleHandle`].
pub struct PhysicsWorld {
    bodies: Arena<RigidBody>,
    fixtures: Arena<Fixture>,
    joints: Arena<Joint>,
    contact_manager: ContactManager,
    gravity: Vec2,
    settings: Settings,
    /// Set while `step` runs.
    locked: bool,
    /// Fixtures were added since the last pair update.
    new_fixtures: bool,
    /// False when sub-stepping left time-of-impact work for the next step.
    step_complete: bool,
    auto_clear_forces: bool,
    /// Inverse of the previous step's dt, for warm-start scaling.
    inv_dt0: f64,
    island: Island,
}

impl PhysicsWorld {
    /// Creates an empty world with default settings.
    pub fn new(gravity: Vec2) -> Self {
        Self::with_settings(gravity, Settings::default())
    }

    pub fn with_settings(gravity: Vec2, settings: Settings) -> Self {
        Self {
            bodies: Arena::new(),
            fixtures: Arena::new(),
            joints: Arena::new(),
            contact_manager: ContactManager::new(&settings),
            gravity,
            settings,
            locked: false,
            new_fixtures: false,
            step_complete: true,
            auto_clear_forces: true,
            inv_dt0: 0.0,
            island: Island::default(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Solver settings. Broadphase margins only apply to trees built after
    /// the world was created.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn gravity(&self) -> Vec2 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Turning sleep off wakes every body.
    pub fn set_allow_sleeping(&mut self, flag: bool) {
        if flag == self.settings.allow_sleeping {
            return;
        }
        self.settings.allow_sleeping = flag;
        if !flag {
            for (_, body) in self.bodies.iter_mut() {
                body.set_awake(true);
            }
        }
    }

    pub fn auto_clear_forces(&self) -> bool {
        self.auto_clear_forces
    }

    /// When off, forces persist across steps until [`clear_forces`](Self::clear_forces).
    pub fn set_auto_clear_forces(&mut self, flag: bool) {
        self.auto_clear_forces = flag;
    }

    pub fn clear_forces(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.clear_forces();
        }
    }

    pub fn set_contact_listener(&mut self, listener: Box<dyn ContactListener>) {
        self.contact_manager.listener = Some(listener);
    }

    pub fn take_contact_listener(&mut self) -> Option<Box<dyn ContactListener>> {
        self.contact_manager.listener.take()
    }

    fn check_unlocked(&self) -> Result<()> {
        if self.locked {
            Err(PhysicsError::WorldLocked)
        } else {
            Ok(())
        }
    }

    // ---- Bodies -------------------------------------------------------

    pub fn create_body(&mut self, def: &BodyDef) -> Result<BodyHandle> {
        self.check_unlocked()?;
        if let Err(err) = def.validate() {
            warn!(%err, "rejected body definition");
            return Err(err);
        }
        let handle = self.bodies.insert(RigidBody::new(def));
        debug!(?handle, body_type = ?def.body_type, "body created");
        Ok(handle)
    }

    /// Destroys a body with its joints, contacts and fixtures.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> Result<()> {
        self.check_unlocked()?;
        let body = self.bodies.get(handle).ok_or(PhysicsError::StaleHandle)?;
        let joint_handles: Vec<JointHandle> = body.joint_edges.iter().map(|edge| edge.joint).collect();
        let contact_handles: Vec<ContactHandle> = body.contact_edges.iter().map(|edge| edge.contact).collect();

        for joint in joint_handles {
            self.remove_joint(joint);
        }
        for contact in contact_handles {
            self.contact_manager.destroy(contact, &mut self.bodies);
        }

        let Some(body) = self.bodies.remove(handle) else {
            return Err(PhysicsError::StaleHandle);
        };
        for fixture_handle in &body.fixtures {
            if let Some(mut fixture) = self.fixtures.remove(*fixture_handle) {
                fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
            }
        }
        debug!(?handle, fixtures = body.fixtures.len(), "body destroyed");
        Ok(())
    }

    pub fn body(&self, handle: BodyHandle) -> Result<&RigidBody> {
        self.bodies.get(handle).ok_or(PhysicsError::StaleHandle)
    }

    /// Mutable body access for changes that need no world bookkeeping, such
    /// as velocities, damping or user data.
    pub fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut RigidBody> {
        self.check_unlocked()?;
        self.bodies.get_mut(handle).ok_or(PhysicsError::StaleHandle)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> + '_ {
        self.bodies.iter()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Teleports a body. Contacts are updated on the next step.
    pub fn set_transform(&mut self, handle: BodyHandle, position: Vec2, angle: f64) -> Result<()> {
        self.check_unlocked()?;
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::StaleHandle)?;
        body.set_transform_internal(position, angle);
        body.set_awake(true);

        let body = &self.bodies[handle];
        let xf = body.xf;
        for &fixture_handle in &body.fixtures {
            if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                fixture.synchronize(&mut self.contact_manager.broad_phase, &xf, &xf);
            }
        }
        self.new_fixtures = true;
        Ok(())
    }

    pub fn set_awake(&mut self, handle: BodyHandle, flag: bool) -> Result<()> {
        self.body_mut(handle)?.set_awake(flag);
        Ok(())
    }

    /// Changes the body type. Attached contacts are rebuilt on the next step.
    pub fn set_type(&mut self, handle: BodyHandle, body_type: BodyType) -> Result<()> {
        self.check_unlocked()?;
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::StaleHandle)?;
        if body.body_type == body_type {
            return Ok(());
        }

        body.body_type = body_type;
        body.reset_mass_data(&self.fixtures);

        if body_type == BodyType::Static {
            body.linear_velocity = Vec2::ZERO;
            body.angular_velocity = 0.0;
            body.sweep.a0 = body.sweep.a;
            body.sweep.c0 = body.sweep.c;
            synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
        }

        body.set_awake(true);
        body.clear_forces();

        let contact_handles: Vec<ContactHandle> = body.contact_edges.iter().map(|edge| edge.contact).collect();
        for contact in contact_handles {
            self.contact_manager.destroy(contact, &mut self.bodies);
        }

        // Touch the proxies so that new contacts will be created (when appropriate)
        for &fixture_handle in &self.bodies[handle].fixtures {
            if let Some(fixture) = self.fixtures.get(fixture_handle) {
                fixture.touch_proxies(&mut self.contact_manager.broad_phase);
            }
        }
        debug!(?handle, ?body_type, "body type changed");
        Ok(())
    }

    /// A disabled body keeps its fixtures but has no proxies, contacts or
    /// simulation. Joints to it stay but are not solved.
    pub fn set_enabled(&mut self, handle: BodyHandle, flag: bool) -> Result<()> {
        self.check_unlocked()?;
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::StaleHandle)?;
        if body.enabled == flag {
            return Ok(());
        }
        body.enabled = flag;

        if flag {
            let xf = body.xf;
            for &fixture_handle in &body.fixtures {
                if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                    fixture.create_proxies(&mut self.contact_manager.broad_phase, &xf, fixture_handle);
                }
            }
            self.new_fixtures = true;
        } else {
            for &fixture_handle in &body.fixtures {
                if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                    fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
                }
            }
            let contact_handles: Vec<ContactHandle> = body.contact_edges.iter().map(|edge| edge.contact).collect();
            for contact in contact_handles {
                self.contact_manager.destroy(contact, &mut self.bodies);
            }
        }
        Ok(())
    }

    pub fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec2) -> Result<()> {
        self.body_mut(handle)?.set_linear_velocity(velocity);
        Ok(())
    }

    pub fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: f64) -> Result<()> {
        self.body_mut(handle)?.set_angular_velocity(velocity);
        Ok(())
    }

    /// Applies a force at a world point, waking the body.
    pub fn apply_force(&mut self, handle: BodyHandle, force: Vec2, point: Vec2) -> Result<()> {
        self.body_mut(handle)?.apply_force(force, point, true);
        Ok(())
    }

    pub fn apply_force_to_center(&mut self, handle: BodyHandle, force: Vec2) -> Result<()> {
        self.body_mut(handle)?.apply_force_to_center(force, true);
        Ok(())
    }

    pub fn apply_torque(&mut self, handle: BodyHandle, torque: f64) -> Result<()> {
        self.body_mut(handle)?.apply_torque(torque, true);
        Ok(())
    }

    pub fn apply_linear_impulse(&mut self, handle: BodyHandle, impulse: Vec2, point: Vec2) -> Result<()> {
        self.body_mut(handle)?.apply_linear_impulse(impulse, point, true);
        Ok(())
    }

    pub fn apply_angular_impulse(&mut self, handle: BodyHandle, impulse: f64) -> Result<()> {
        self.body_mut(handle)?.apply_angular_impulse(impulse, true);
        Ok(())
    }

    // ---- Fixtures -----------------------------------------------------

    /// Attaches a shape to a body. Positive density updates the body's mass.
    pub fn create_fixture(&mut self, body_handle: BodyHandle, def: &FixtureDef) -> Result<FixtureHandle> {
        self.check_unlocked()?;
        if let Err(err) = def.validate() {
            warn!(%err, "rejected fixture definition");
            return Err(err);
        }
        let body = self.bodies.get_mut(body_handle).ok_or(PhysicsError::StaleHandle)?;

        let handle = self.fixtures.insert(Fixture::new(body_handle, def));
        if body.enabled {
            let xf = body.xf;
            self.fixtures[handle].create_proxies(&mut self.contact_manager.broad_phase, &xf, handle);
        }
        body.fixtures.push(handle);

        if def.material.density > 0.0 {
            body.reset_mass_data(&self.fixtures);
        }

        // Let the world know we have a new fixture. This will cause new
        // contacts to be created at the beginning of the next time step.
        self.new_fixtures = true;
        debug!(?handle, body = ?body_handle, shape = ?def.shape.shape_type(), "fixture created");
        Ok(handle)
    }

    /// Shorthand for a fixture with default material and the given density.
    pub fn create_fixture_from_shape(
        &mut self,
        body_handle: BodyHandle,
        shape: Shape,
        density: f64,
    ) -> Result<FixtureHandle> {
        self.create_fixture(body_handle, &FixtureDef::new(shape).with_density(density))
    }

    pub fn destroy_fixture(&mut self, handle: FixtureHandle) -> Result<()> {
        self.check_unlocked()?;
        let body_handle = self.fixtures.get(handle).ok_or(PhysicsError::StaleHandle)?.body;

        // Destroy any contacts associated with the fixture.
        let contact_handles: Vec<ContactHandle> = self.bodies[body_handle]
            .contact_edges
            .iter()
            .map(|edge| edge.contact)
            .filter(|&contact| {
                self.contact_manager
                    .contacts
                    .get(contact)
                    .is_some_and(|c| c.fixture_a == handle || c.fixture_b == handle)
            })
            .collect();
        for contact in contact_handles {
            self.contact_manager.destroy(contact, &mut self.bodies);
        }

        if let Some(mut fixture) = self.fixtures.remove(handle) {
            fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
        }

        let body = &mut self.bodies[body_handle];
        body.fixtures.retain(|&fixture| fixture != handle);
        // Reset the mass data.
        body.reset_mass_data(&self.fixtures);
        debug!(?handle, body = ?body_handle, "fixture destroyed");
        Ok(())
    }

    pub fn fixture(&self, handle: FixtureHandle) -> Result<&Fixture> {
        self.fixtures.get(handle).ok_or(PhysicsError::StaleHandle)
    }

    /// Mutable fixture access for material and user data. Use
    /// [`set_filter`](Self::set_filter) to change collision filtering.
    pub fn fixture_mut(&mut self, handle: FixtureHandle) -> Result<&mut Fixture> {
        self.check_unlocked()?;
        self.fixtures.get_mut(handle).ok_or(PhysicsError::StaleHandle)
    }

    pub fn set_filter(&mut self, handle: FixtureHandle, filter: Filter) -> Result<()> {
        self.fixture_mut(handle)?.filter = filter;
        self.refilter(handle)
    }

    /// Re-evaluates filtering for every contact of the fixture on the next step.
    pub fn refilter(&mut self, handle: FixtureHandle) -> Result<()> {
        self.check_unlocked()?;
        let fixture = self.fixtures.get(handle).ok_or(PhysicsError::StaleHandle)?;
        let body = &self.bodies[fixture.body];

        // Flag associated contacts for filtering.
        for edge in &body.contact_edges {
            if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                if contact.fixture_a == handle || contact.fixture_b == handle {
                    contact.flag_for_filtering();
                }
            }
        }

        // Touch each proxy so that new pairs may be created
        fixture.touch_proxies(&mut self.contact_manager.broad_phase);
        self.new_fixtures = true;
        Ok(())
    }

    // ---- Joints -------------------------------------------------------

    pub fn create_joint(&mut self, def: &JointDef) -> Result<JointHandle> {
        self.check_unlocked()?;
        if !self.bodies.contains(def.body_a) || !self.bodies.contains(def.body_b) {
            return Err(PhysicsError::StaleHandle);
        }
        let joint = match Joint::new(def) {
            Ok(joint) => joint,
            Err(err) => {
                warn!(%err, "rejected joint definition");
                return Err(err);
            }
        };
        let handle = self.joints.insert(joint);

        // Connect to the bodies' doubly linked lists.
        self.bodies[def.body_a].joint_edges.push(JointEdge {
            other: def.body_b,
            joint: handle,
        });
        self.bodies[def.body_b].joint_edges.push(JointEdge {
            other: def.body_a,
            joint: handle,
        });

        // If the joint prevents collisions, then flag any contacts for filtering.
        if !def.collide_connected {
            self.flag_contacts_between(def.body_a, def.body_b);
        }

        self.bodies[def.body_a].set_awake(true);
        self.bodies[def.body_b].set_awake(true);
        debug!(?handle, body_a = ?def.body_a, body_b = ?def.body_b, "joint created");
        Ok(handle)
    }

    pub fn destroy_joint(&mut self, handle: JointHandle) -> Result<()> {
        self.check_unlocked()?;
        if !self.joints.contains(handle) {
            return Err(PhysicsError::StaleHandle);
        }
        self.remove_joint(handle);
        debug!(?handle, "joint destroyed");
        Ok(())
    }

    fn remove_joint(&mut self, handle: JointHandle) {
        let Some(joint) = self.joints.remove(handle) else {
            return;
        };
        for body_handle in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(body_handle) {
                body.joint_edges.retain(|edge| edge.joint != handle);
                body.set_awake(true);
            }
        }

        // If the joint prevents collisions, then flag any contacts for filtering.
        if !joint.collide_connected {
            self.flag_contacts_between(joint.body_a, joint.body_b);
        }
    }

    fn flag_contacts_between(&mut self, body_a: BodyHandle, body_b: BodyHandle) {
        let Some(body) = self.bodies.get(body_b) else {
            return;
        };
        for edge in body.contact_edges.iter().filter(|edge| edge.other == body_a) {
            if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                contact.flag_for_filtering();
            }
        }
    }

    pub fn joint(&self, handle: JointHandle) -> Result<&Joint> {
        self.joints.get(handle).ok_or(PhysicsError::StaleHandle)
    }

    /// Mutable joint access, for motor and limit changes. Wakes both bodies.
    pub fn joint_mut(&mut self, handle: JointHandle) -> Result<&mut Joint> {
        self.check_unlocked()?;
        let joint = self.joints.get_mut(handle).ok_or(PhysicsError::StaleHandle)?;
        for body_handle in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(body_handle) {
                body.set_awake(true);
            }
        }
        Ok(joint)
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &Joint)> + '_ {
        self.joints.iter()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    // ---- Contacts and broadphase -----------------------------------------

    pub fn contact(&self, handle: ContactHandle) -> Result<&Contact> {
        self.contact_manager.contacts.get(handle).ok_or(PhysicsError::StaleHandle)
    }

    pub fn contacts(&self) -> impl Iterator<Item = (ContactHandle, &Contact)> + '_ {
        self.contact_manager.contacts.iter()
    }

    pub fn contact_count(&self) -> usize {
        self.contact_manager.contact_count()
    }

    pub fn proxy_count(&self) -> usize {
        self.contact_manager.broad_phase.get_proxy_count()
    }

    pub fn tree_height(&self) -> i32 {
        self.contact_manager.broad_phase.get_tree_height()
    }

    pub fn tree_balance(&self) -> i32 {
        self.contact_manager.broad_phase.get_tree_balance()
    }

    /// Ratio of the summed node perimeters to the root perimeter.
    pub fn tree_quality(&self) -> f64 {
        self.contact_manager.broad_phase.get_tree_quality()
    }

    /// Reports each fixture child whose fat broadphase AABB overlaps `aabb`.
    /// Chain fixtures may be reported once per child. Return `false` to stop.
    pub fn query_aabb_with<F>(&self, aabb: &AABB, mut callback: F)
    where
        F: FnMut(FixtureHandle) -> bool,
    {
        let broad_phase = &self.contact_manager.broad_phase;
        broad_phase.query(aabb, |proxy_id| match broad_phase.get_user_data(proxy_id) {
            Some(child) => callback(child.fixture),
            None => true,
        });
    }

    /// Fixtures whose current tight AABB overlaps `aabb`, each reported once.
    pub fn query_aabb(&self, aabb: &AABB) -> Vec<FixtureHandle> {
        let broad_phase = &self.contact_manager.broad_phase;
        let mut found = Vec::new();
        broad_phase.query(aabb, |proxy_id| {
            let Some(FixtureChild { fixture, child_index }) = broad_phase.get_user_data(proxy_id) else {
                return true;
            };
            if found.contains(&fixture) {
                return true;
            }
            let Some(body) = self.fixtures.get(fixture).and_then(|f| self.bodies.get(f.body)) else {
                return true;
            };
            if self.fixtures[fixture].shape().compute_aabb(&body.xf, child_index).overlaps(aabb) {
                found.push(fixture);
            }
            true
        });
        found
    }

    /// Casts a ray from `p1` to `p2` against every fixture it may hit.
    ///
    /// The callback receives the fixture, hit point, surface normal and
    /// fraction, and returns how to continue: `-1` ignores the hit, `0`
    /// stops, a fraction clips the ray there and `1` continues unclipped.
    /// Hits are not reported in order.
    pub fn ray_cast<F>(&self, p1: Vec2, p2: Vec2, mut callback: F)
    where
        F: FnMut(FixtureHandle, Vec2, Vec2, f64) -> f64,
    {
        let broad_phase = &self.contact_manager.broad_phase;
        let input = RayCastInput {
            p1,
            p2,
            max_fraction: 1.0,
        };
        broad_phase.ray_cast(&input, |sub_input, proxy_id| {
            let Some(FixtureChild { fixture, child_index }) = broad_phase.get_user_data(proxy_id) else {
                return sub_input.max_fraction;
            };
            let Some(fixture_ref) = self.fixtures.get(fixture) else {
                return sub_input.max_fraction;
            };
            let Some(body) = self.bodies.get(fixture_ref.body) else {
                return sub_input.max_fraction;
            };
            match fixture_ref.ray_cast(sub_input, &body.xf, child_index) {
                Some(output) => {
                    let fraction = output.fraction;
                    let point = p1 * (1.0 - fraction) + p2 * fraction;
                    callback(fixture, point, output.normal, fraction)
                }
                None => sub_input.max_fraction,
            }
        });
    }

    // ---- Stepping -----------------------------------------------------

    /// Advances the world by `dt` seconds.
    ///
    /// Runs the narrowphase, solves every awake island, then resolves
    /// time-of-impact events for fast bodies. Forces are cleared afterwards
    /// unless auto clearing is off.
    pub fn step(&mut self, dt: f64, velocity_iterations: usize, position_iterations: usize) {
        // If new fixtures were added, we need to find the new contacts.
        if self.new_fixtures {
            self.contact_manager.find_new_contacts(&mut self.bodies, &self.fixtures, &self.joints);
            self.new_fixtures = false;
        }

        self.locked = true;

        let mut step = TimeStep::new(dt, velocity_iterations, position_iterations);
        step.dt_ratio = self.inv_dt0 * dt;
        step.warm_starting = self.settings.warm_starting;

        // Update contacts. This is where some contacts are destroyed.
        trace!(contacts = self.contact_manager.contact_count(), "collide");
        self.contact_manager.collide(&mut self.bodies, &self.fixtures, &self.joints);

        // Integrate velocities, solve velocity constraints, and integrate positions.
        if self.step_complete && step.dt > 0.0 {
            self.solve(&step);
        }

        // Handle TOI events.
        if self.settings.continuous_physics && step.dt > 0.0 {
            self.solve_toi(&step);
        }

        if step.dt > 0.0 {
            self.inv_dt0 = step.inv_dt;
        }

        if self.auto_clear_forces {
            self.clear_forces();
        }

        self.locked = false;
    }

    /// Builds islands from awake bodies and solves them.
    fn solve(&mut self, step: &TimeStep) {
        // Clear all the island flags.
        for (_, body) in self.bodies.iter_mut() {
            body.island_flag = false;
        }
        for (_, contact) in self.contact_manager.contacts.iter_mut() {
            contact.island_flag = false;
        }
        for (_, joint) in self.joints.iter_mut() {
            joint.island_flag = false;
        }

        let mut island = std::mem::take(&mut self.island);
        let mut stack: Vec<BodyHandle> = Vec::with_capacity(self.bodies.len());
        let mut island_count = 0usize;

        for seed in self.bodies.handles() {
            let body = &mut self.bodies[seed];
            if body.island_flag || !body.awake || !body.enabled {
                continue;
            }
            // The seed can be dynamic or kinematic.
            if body.body_type == BodyType::Static {
                continue;
            }

            // Reset island and stack.
            island.clear();
            stack.clear();
            stack.push(seed);
            body.island_flag = true;

            // Perform a depth first search (DFS) on the constraint graph.
            while let Some(handle) = stack.pop() {
                let body = &mut self.bodies[handle];
                island.add_body(handle, body);

                // Make sure the body is awake.
                body.set_awake(true);

                // To keep islands as small as possible, we don't
                // propagate islands across static bodies.
                if body.body_type == BodyType::Static {
                    continue;
                }

                // Search all contacts connected to this body.
                for i in 0..self.bodies[handle].contact_edges.len() {
                    let edge = self.bodies[handle].contact_edges[i];
                    let contact = &mut self.contact_manager.contacts[edge.contact];

                    // Has this contact already been added to an island?
                    if contact.island_flag {
                        continue;
                    }
                    // Is this contact solid and touching?
                    if !contact.enabled || !contact.touching || contact.sensor {
                        continue;
                    }

                    island.add_contact(edge.contact);
                    contact.island_flag = true;

                    let other = &mut self.bodies[edge.other];
                    // Was the other body already added to this island?
                    if other.island_flag {
                        continue;
                    }
                    stack.push(edge.other);
                    other.island_flag = true;
                }

                // Search all joints connect to this body.
                for i in 0..self.bodies[handle].joint_edges.len() {
                    let edge = self.bodies[handle].joint_edges[i];
                    if self.joints[edge.joint].island_flag {
                        continue;
                    }

                    let other = &mut self.bodies[edge.other];
                    // Don't simulate joints connected to disabled bodies.
                    if !other.enabled {
                        continue;
                    }

                    island.add_joint(edge.joint);
                    self.joints[edge.joint].island_flag = true;

                    if other.island_flag {
                        continue;
                    }
                    stack.push(edge.other);
                    other.island_flag = true;
                }
            }

            let mut ctx = SolverContext {
                bodies: &mut self.bodies,
                fixtures: &self.fixtures,
                contacts: &mut self.contact_manager.contacts,
                joints: &mut self.joints,
                listener: &mut self.contact_manager.listener,
                settings: &self.settings,
            };
            island.solve(&mut ctx, step, self.gravity, self.settings.allow_sleeping);
            island_count += 1;

            // Post solve cleanup.
            for &handle in &island.bodies {
                // Allow static bodies to participate in other islands.
                let body = &mut self.bodies[handle];
                if body.body_type == BodyType::Static {
                    body.island_flag = false;
                }
            }
        }
        island.clear();
        self.island = island;
        trace!(islands = island_count, "islands solved");

        // Synchronize fixtures, check for out of range bodies.
        for (_, body) in self.bodies.iter() {
            // If a body was not in an island then it did not move.
            if !body.island_flag || body.body_type == BodyType::Static {
                continue;
            }
            // Update fixtures (for broad-phase).
            synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
        }

        // Look for new contacts.
        self.contact_manager.find_new_contacts(&mut self.bodies, &self.fixtures, &self.joints);
    }

    /// Finds the earliest time of impact among contacts that need continuous
    /// handling, or `None` when no contact hits before the end of the step.
    fn find_min_toi(&mut self) -> Option<(ContactHandle, f64)> {
        let mut min_contact = None;
        let mut min_alpha = 1.0;

        for handle in self.contact_manager.contacts.handles() {
            let contact = &self.contact_manager.contacts[handle];

            // Is this contact disabled?
            if !contact.enabled {
                continue;
            }
            // Prevent excessive sub-stepping.
            if contact.toi_count > self.settings.max_sub_steps {
                continue;
            }

            let alpha = if contact.toi_flag {
                // This contact has a valid cached TOI.
                contact.toi
            } else {
                let fixture_a = &self.fixtures[contact.fixture_a];
                let fixture_b = &self.fixtures[contact.fixture_b];

                // Is there a sensor?
                if fixture_a.is_sensor() || fixture_b.is_sensor() {
                    continue;
                }

                let (handle_a, handle_b) = (contact.body_a, contact.body_b);
                let Some((body_a, body_b)) = self.bodies.get2_mut(handle_a, handle_b) else {
                    continue;
                };
                let (type_a, type_b) = (body_a.body_type, body_b.body_type);
                debug_assert!(type_a == BodyType::Dynamic || type_b == BodyType::Dynamic);

                let active_a = body_a.awake && type_a != BodyType::Static;
                let active_b = body_b.awake && type_b != BodyType::Static;

                // Is at least one body active (awake and dynamic or kinematic)?
                if !active_a && !active_b {
                    continue;
                }

                let collide_a = body_a.bullet || type_a != BodyType::Dynamic;
                let collide_b = body_b.bullet || type_b != BodyType::Dynamic;

                // Are these two non-bullet dynamic bodies?
                if !collide_a && !collide_b {
                    continue;
                }

                // Compute the TOI for this contact.
                // Put the sweeps onto the same time interval.
                let mut alpha0 = body_a.sweep.alpha0;
                if body_a.sweep.alpha0 < body_b.sweep.alpha0 {
                    alpha0 = body_b.sweep.alpha0;
                    body_a.sweep.advance(alpha0);
                } else if body_b.sweep.alpha0 < body_a.sweep.alpha0 {
                    alpha0 = body_a.sweep.alpha0;
                    body_b.sweep.advance(alpha0);
                }
                debug_assert!(alpha0 < 1.0);

                // Compute the time of impact in interval [0, min_toi]
                let proxy_a = DistanceProxy::new(fixture_a.shape(), contact.child_a);
                let proxy_b = DistanceProxy::new(fixture_b.shape(), contact.child_b);
                let output = time_of_impact(&ToiInput {
                    proxy_a: &proxy_a,
                    proxy_b: &proxy_b,
                    sweep_a: body_a.sweep,
                    sweep_b: body_b.sweep,
                    t_max: 1.0,
                });

                // Beta is the fraction of the remaining portion of the step.
                let beta = output.t;
                let alpha = if output.state == ToiState::Touching {
                    (alpha0 + (1.0 - alpha0) * beta).min(1.0)
                } else {
                    1.0
                };

                let contact = &mut self.contact_manager.contacts[handle];
                contact.toi = alpha;
                contact.toi_flag = true;
                alpha
            };

            if alpha < min_alpha {
                // This is the minimum TOI found so far.
                min_contact = Some(handle);
                min_alpha = alpha;
            }
        }

        match min_contact {
            Some(handle) if min_alpha < 1.0 - 10.0 * f64::EPSILON => Some((handle, min_alpha)),
            _ => None,
        }
    }

    /// Continuous collision: advances fast bodies to their first time of
    /// impact and resolves it in a sub-step, until no impacts remain.
    fn solve_toi(&mut self, step: &TimeStep) {
        let mut island = std::mem::take(&mut self.island);

        if self.step_complete {
            for (_, body) in self.bodies.iter_mut() {
                body.island_flag = false;
                body.sweep.alpha0 = 0.0;
            }
            for (_, contact) in self.contact_manager.contacts.iter_mut() {
                // Invalidate TOI
                contact.toi_flag = false;
                contact.island_flag = false;
                contact.bullet_hit = false;
                contact.toi_count = 0;
                contact.toi = 1.0;
            }
        }

        // Find TOI events and solve them.
        loop {
            let Some((min_contact, min_alpha)) = self.find_min_toi() else {
                // No more TOI events. Done!
                self.step_complete = true;
                break;
            };

            // Advance the bodies to the TOI.
            let contact = &self.contact_manager.contacts[min_contact];
            let (handle_a, handle_b) = (contact.body_a, contact.body_b);
            let backup_a = self.bodies[handle_a].sweep;
            let backup_b = self.bodies[handle_b].sweep;
            self.bodies[handle_a].advance(min_alpha);
            self.bodies[handle_b].advance(min_alpha);
            trace!(contact = ?min_contact, alpha = min_alpha, "time of impact");

            // The TOI contact likely has some new contact points.
            self.update_contact(min_contact);
            let contact = &mut self.contact_manager.contacts[min_contact];
            contact.toi_flag = false;
            contact.toi_count += 1;

            // Is the contact solid?
            if !contact.enabled || !contact.touching {
                // Restore the sweeps.
                contact.set_enabled(false);
                restore_sweep(&mut self.bodies[handle_a], backup_a);
                restore_sweep(&mut self.bodies[handle_b], backup_b);
                continue;
            }
            contact.bullet_hit = self.bodies[handle_a].bullet || self.bodies[handle_b].bullet;

            self.bodies[handle_a].set_awake(true);
            self.bodies[handle_b].set_awake(true);

            // Build the island
            island.clear();
            island.add_body(handle_a, &mut self.bodies[handle_a]);
            island.add_body(handle_b, &mut self.bodies[handle_b]);
            island.add_contact(min_contact);

            self.bodies[handle_a].island_flag = true;
            self.bodies[handle_b].island_flag = true;
            self.contact_manager.contacts[min_contact].island_flag = true;

            // Get contacts on body A and body B.
            for body_handle in [handle_a, handle_b] {
                self.gather_toi_contacts(&mut island, body_handle, min_alpha);
            }

            let mut sub_step = TimeStep::new((1.0 - min_alpha) * step.dt, step.velocity_iterations, TOI_POSITION_ITERATIONS);
            sub_step.warm_starting = false;

            let (index_a, index_b) = (self.bodies[handle_a].island_index, self.bodies[handle_b].island_index);
            let mut ctx = SolverContext {
                bodies: &mut self.bodies,
                fixtures: &self.fixtures,
                contacts: &mut self.contact_manager.contacts,
                joints: &mut self.joints,
                listener: &mut self.contact_manager.listener,
                settings: &self.settings,
            };
            island.solve_toi(&mut ctx, &sub_step, index_a, index_b);

            // Reset island flags and synchronize broad-phase proxies.
            for &handle in &island.bodies {
                let body = &mut self.bodies[handle];
                body.island_flag = false;

                if body.body_type != BodyType::Dynamic {
                    continue;
                }

                synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);

                // Invalidate all contact TOIs on this displaced body.
                for edge in &body.contact_edges {
                    if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                        contact.toi_flag = false;
                        contact.island_flag = false;
                    }
                }
            }

            // Commit fixture proxy movements to the broad-phase so that new contacts are created.
            // Also, some contacts can be destroyed.
            self.contact_manager.find_new_contacts(&mut self.bodies, &self.fixtures, &self.joints);

            if self.settings.sub_stepping {
                self.step_complete = false;
                break;
            }
        }

        island.clear();
        self.island = island;
    }

    /// Adds the solid contacts of a TOI body against static, kinematic or
    /// bullet bodies, advancing those bodies to the impact time.
    fn gather_toi_contacts(&mut self, island: &mut Island, body_handle: BodyHandle, min_alpha: f64) {
        let body = &self.bodies[body_handle];
        if body.body_type != BodyType::Dynamic {
            return;
        }
        let body_bullet = body.bullet;
        let max_contacts = self.settings.max_toi_contacts;

        for i in 0..self.bodies[body_handle].contact_edges.len() {
            if island.bodies.len() >= 2 * max_contacts || island.contacts.len() >= max_contacts {
                break;
            }
            let edge = self.bodies[body_handle].contact_edges[i];

            // Has this contact already been added to the island?
            let contact = &self.contact_manager.contacts[edge.contact];
            if contact.island_flag || contact.sensor {
                continue;
            }

            // Only add static, kinematic, or bullet bodies.
            let other = &self.bodies[edge.other];
            if other.body_type == BodyType::Dynamic && !body_bullet && !other.bullet {
                continue;
            }

            // Tentatively advance the body to the TOI.
            let backup = other.sweep;
            if !other.island_flag {
                self.bodies[edge.other].advance(min_alpha);
            }

            // Update the contact points
            self.update_contact(edge.contact);

            // Was the contact disabled by the user? Are there contact points?
            let contact = &self.contact_manager.contacts[edge.contact];
            if !contact.enabled || !contact.touching {
                restore_sweep(&mut self.bodies[edge.other], backup);
                continue;
            }

            // Add the contact to the island
            self.contact_manager.contacts[edge.contact].island_flag = true;
            island.add_contact(edge.contact);

            // Has the other body already been added to the island?
            let other = &mut self.bodies[edge.other];
            if other.island_flag {
                continue;
            }

            // Add the other body to the island.
            other.island_flag = true;
            if other.body_type != BodyType::Static {
                other.set_awake(true);
            }
            island.add_body(edge.other, other);
        }
    }

    /// Re-runs the narrowphase for one contact at the current body poses.
    fn update_contact(&mut self, handle: ContactHandle) {
        let Some(contact) = self.contact_manager.contacts.get_mut(handle) else {
            return;
        };
        let (body_a, body_b) = (contact.body_a, contact.body_b);
        let (xf_a, xf_b) = (self.bodies[body_a].xf, self.bodies[body_b].xf);
        let update = contact.update(
            &self.fixtures[contact.fixture_a],
            &self.fixtures[contact.fixture_b],
            &xf_a,
            &xf_b,
            listener_mut(&mut self.contact_manager.listener),
        );
        if (update.began || update.ended) && !contact.sensor {
            self.bodies[body_a].set_awake(true);
            self.bodies[body_b].set_awake(true);
        }
    }
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("gravity", &self.gravity)
            .field("bodies", &self.bodies.len())
            .field("fixtures", &self.fixtures.len())
            .field("joints", &self.joints.len())
            .field("contacts", &self.contact_manager.contact_count())
            .field("locked", &self.locked)
            .finish()
    }
}

/// Moves a body's proxies to cover its motion over the step, from the start
/// of the sweep to its current transform.
fn synchronize_fixtures(body: &RigidBody, fixtures: &mut Arena<Fixture>, broad_phase: &mut BroadPhase<FixtureChild>) {
    let xf1 = sweep_start_transform(&body.sweep);
    for &handle in &body.fixtures {
        if let Some(fixture) = fixtures.get_mut(handle) {
            fixture.synchronize(broad_phase, &xf1, &body.xf);
        }
    }
}

fn sweep_start_transform(sweep: &Sweep) -> Transform {
    let rot = Rot::new(sweep.a0);
    Transform {
        position: sweep.c0 - rot.apply(sweep.local_center),
        rot,
    }
}

fn restore_sweep(body: &mut RigidBody, backup: Sweep) {
    body.sweep = backup;
    body.synchronize_transform();
}
