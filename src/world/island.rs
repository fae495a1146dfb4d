//! Islands: bodies linked by touching contacts and joints, solved as a unit
//! and put to sleep together.

use tracing::debug;

use crate::common::{Arena, Settings};
use crate::constraints::{Joint, JointHandle, SolverData};
use crate::contacts::contact_solver::ContactSolver;
use crate::contacts::{Contact, ContactHandle};
use crate::integration::{integrate_position, integrate_velocity};
use crate::math::Vec2;
use crate::objects::fixture::Fixture;
use crate::objects::rigid_body::{BodyHandle, BodyType, RigidBody};
use crate::world::callbacks::ContactListener;
use crate::world::time_step::{Position, TimeStep, Velocity};

/// World storage an island reads and writes while solving.
pub(crate) struct SolverContext<'a> {
    pub bodies: &'a mut Arena<RigidBody>,
    pub fixtures: &'a Arena<Fixture>,
    pub contacts: &'a mut Arena<Contact>,
    pub joints: &'a mut Arena<Joint>,
    pub listener: &'a mut Option<Box<dyn ContactListener>>,
    pub settings: &'a Settings,
}

#[derive(Debug, Default)]
pub(crate) struct Island {
    pub bodies: Vec<BodyHandle>,
    pub contacts: Vec<ContactHandle>,
    pub joints: Vec<JointHandle>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
}

impl Island {
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
    }

    /// Adds a body and records its slot in the island arrays.
    pub fn add_body(&mut self, handle: BodyHandle, body: &mut RigidBody) {
        body.island_index = self.bodies.len();
        self.bodies.push(handle);
    }

    pub fn add_contact(&mut self, handle: ContactHandle) {
        self.contacts.push(handle);
    }

    pub fn add_joint(&mut self, handle: JointHandle) {
        self.joints.push(handle);
    }

    /// Loads body state into the island arrays.
    fn load_bodies(&mut self, bodies: &Arena<RigidBody>) {
        self.positions.clear();
        self.velocities.clear();
        for &handle in &self.bodies {
            let body = &bodies[handle];
            self.positions.push(Position {
                c: body.sweep.c,
                a: body.sweep.a,
            });
            self.velocities.push(Velocity {
                v: body.linear_velocity,
                w: body.angular_velocity,
            });
        }
    }

    /// Writes solved state back and refreshes the body transforms.
    fn store_bodies(&self, bodies: &mut Arena<RigidBody>) {
        for (i, &handle) in self.bodies.iter().enumerate() {
            let body = &mut bodies[handle];
            body.sweep.c = self.positions[i].c;
            body.sweep.a = self.positions[i].a;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.synchronize_transform();
        }
    }

    /// Discrete solve: integrate velocities, solve velocity constraints,
    /// integrate positions, solve position constraints, then update sleep
    /// timers.
    pub fn solve(&mut self, ctx: &mut SolverContext<'_>, step: &TimeStep, gravity: Vec2, allow_sleep: bool) {
        let h = step.dt;
        let settings = ctx.settings;

        // Integrate velocities and apply damping. Initialize the body state.
        self.load_bodies(ctx.bodies);
        for (i, &handle) in self.bodies.iter().enumerate() {
            let body = &mut ctx.bodies[handle];
            // Store positions for continuous collision.
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;
            integrate_velocity(&mut self.velocities[i], body, gravity, h);
        }

        let mut contact_solver = ContactSolver::new(step, settings, &self.contacts, ctx.contacts, ctx.fixtures, ctx.bodies);
        contact_solver.initialize_velocity_constraints(ctx.contacts, &self.positions, &self.velocities);
        if step.warm_starting {
            contact_solver.warm_start(&mut self.velocities);
        }

        let mut data = SolverData {
            step: *step,
            settings,
            positions: &mut self.positions,
            velocities: &mut self.velocities,
        };

        for &handle in &self.joints {
            ctx.joints[handle].init_velocity_constraints(ctx.bodies, &mut data);
        }

        // Solve velocity constraints
        for _ in 0..step.velocity_iterations {
            for &handle in &self.joints {
                ctx.joints[handle].solve_velocity_constraints(&mut data);
            }
            contact_solver.solve_velocity_constraints(data.velocities);
        }

        // Store impulses for warm starting
        contact_solver.store_impulses(ctx.contacts);

        // Integrate positions
        for (position, velocity) in data.positions.iter_mut().zip(data.velocities.iter_mut()) {
            integrate_position(position, velocity, h, settings);
        }

        // Solve position constraints
        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_okay = contact_solver.solve_position_constraints(data.positions);

            let mut joints_okay = true;
            for &handle in &self.joints {
                let joint_okay = ctx.joints[handle].solve_position_constraints(&mut data);
                joints_okay = joints_okay && joint_okay;
            }

            if contacts_okay && joints_okay {
                // Exit early if the position errors are small.
                position_solved = true;
                break;
            }
        }

        self.store_bodies(ctx.bodies);
        report(&contact_solver, ctx.contacts, ctx.listener);

        if !allow_sleep {
            return;
        }

        let lin_tol_sqr = settings.linear_sleep_tolerance * settings.linear_sleep_tolerance;
        let ang_tol_sqr = settings.angular_sleep_tolerance * settings.angular_sleep_tolerance;

        let mut min_sleep_time = f64::MAX;
        for &handle in &self.bodies {
            let body = &mut ctx.bodies[handle];
            if body.body_type == BodyType::Static {
                continue;
            }

            if !body.allow_sleep
                || body.angular_velocity * body.angular_velocity > ang_tol_sqr
                || body.linear_velocity.dot(body.linear_velocity) > lin_tol_sqr
            {
                body.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                body.sleep_time += h;
                min_sleep_time = min_sleep_time.min(body.sleep_time);
            }
        }

        // A bounce this step means the island is still settling.
        let bounced = contact_solver
            .velocity_constraints
            .iter()
            .any(|vc| vc.points[..vc.point_count].iter().any(|point| point.velocity_bias > 0.0));

        if min_sleep_time >= settings.time_to_sleep && position_solved && !bounced {
            for &handle in &self.bodies {
                ctx.bodies[handle].set_awake(false);
            }
            debug!(bodies = self.bodies.len(), contacts = self.contacts.len(), "island fell asleep");
        }
    }

    /// Sub-step solve after a time of impact. Only the two bodies at
    /// `toi_index_a` and `toi_index_b` are moved by position correction.
    pub fn solve_toi(&mut self, ctx: &mut SolverContext<'_>, sub_step: &TimeStep, toi_index_a: usize, toi_index_b: usize) {
        debug_assert!(toi_index_a < self.bodies.len());
        debug_assert!(toi_index_b < self.bodies.len());
        let settings = ctx.settings;

        self.load_bodies(ctx.bodies);

        let mut contact_solver =
            ContactSolver::new(sub_step, settings, &self.contacts, ctx.contacts, ctx.fixtures, ctx.bodies);

        // Solve position constraints.
        for _ in 0..sub_step.position_iterations {
            if contact_solver.solve_toi_position_constraints(&mut self.positions, toi_index_a, toi_index_b) {
                break;
            }
        }

        // Leap of faith to new safe state.
        for index in [toi_index_a, toi_index_b] {
            let body = &mut ctx.bodies[self.bodies[index]];
            body.sweep.c0 = self.positions[index].c;
            body.sweep.a0 = self.positions[index].a;
        }

        // No warm starting is needed for TOI events because warm starting
        // impulses were applied in the discrete solver.
        contact_solver.initialize_velocity_constraints(ctx.contacts, &self.positions, &self.velocities);

        for _ in 0..sub_step.velocity_iterations {
            contact_solver.solve_velocity_constraints(&mut self.velocities);
        }

        // Don't store the TOI contact forces for warm starting because they
        // can be quite large.

        let h = sub_step.dt;
        for (position, velocity) in self.positions.iter_mut().zip(self.velocities.iter_mut()) {
            integrate_position(position, velocity, h, settings);
        }

        self.store_bodies(ctx.bodies);
        report(&contact_solver, ctx.contacts, ctx.listener);
    }
}

/// Hands the solved impulses to the listener.
fn report(contact_solver: &ContactSolver, contacts: &Arena<Contact>, listener: &mut Option<Box<dyn ContactListener>>) {
    let Some(listener) = listener.as_deref_mut() else {
        return;
    };
    for vc in &contact_solver.velocity_constraints {
        if let Some(contact) = contacts.get(vc.contact) {
            listener.post_solve(contact, &vc.impulse());
        }
    }
}
