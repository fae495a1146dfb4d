//! Sequential impulse solver for contact constraints.
//!
//! Velocity constraints enforce non-penetration (with restitution) and
//! Coulomb friction. Position constraints then remove the remaining overlap
//! with a Baumgarte-scaled, clamped pseudo impulse.

use super::contact::{Contact, ContactHandle};
use crate::collision::ManifoldType;
use crate::collision::WorldManifold;
use crate::common::settings::{LINEAR_SLOP, MAX_MANIFOLD_POINTS};
use crate::common::{Arena, FrictionOrder, Settings};
use crate::math::{Mat22, Rot, Transform, Vec2};
use crate::objects::fixture::Fixture;
use crate::objects::rigid_body::RigidBody;
use crate::world::callbacks::ContactImpulse;
use crate::world::time_step::{Position, TimeStep, Velocity};

/// Upper bound on the condition number of the block solver's K matrix.
const MAX_CONDITION_NUMBER: f64 = 1000.0;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct VelocityConstraintPoint {
    pub r_a: Vec2,
    pub r_b: Vec2,
    pub normal_impulse: f64,
    pub tangent_impulse: f64,
    pub normal_mass: f64,
    pub tangent_mass: f64,
    pub velocity_bias: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct ContactVelocityConstraint {
    pub points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    pub normal: Vec2,
    pub normal_mass: Mat22,
    pub k: Mat22,
    pub index_a: usize,
    pub index_b: usize,
    pub inv_mass_a: f64,
    pub inv_mass_b: f64,
    pub inv_i_a: f64,
    pub inv_i_b: f64,
    pub friction: f64,
    pub restitution: f64,
    pub tangent_speed: f64,
    pub point_count: usize,
    pub contact: ContactHandle,
}

impl ContactVelocityConstraint {
    /// Impulses applied this step, in manifold point order.
    pub fn impulse(&self) -> ContactImpulse {
        let mut impulse = ContactImpulse {
            count: self.point_count,
            ..Default::default()
        };
        for (j, point) in self.points.iter().take(self.point_count).enumerate() {
            impulse.normal_impulses[j] = point.normal_impulse;
            impulse.tangent_impulses[j] = point.tangent_impulse;
        }
        impulse
    }
}

#[derive(Debug, Clone)]
struct ContactPositionConstraint {
    local_points: [Vec2; MAX_MANIFOLD_POINTS],
    local_normal: Vec2,
    local_point: Vec2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f64,
    inv_mass_b: f64,
    local_center_a: Vec2,
    local_center_b: Vec2,
    inv_i_a: f64,
    inv_i_b: f64,
    manifold_type: ManifoldType,
    radius_a: f64,
    radius_b: f64,
    point_count: usize,
}

impl ContactPositionConstraint {
    /// World normal, contact point and separation of point `index` at the
    /// given body transforms.
    fn evaluate(&self, xf_a: &Transform, xf_b: &Transform, index: usize) -> (Vec2, Vec2, f64) {
        match self.manifold_type {
            ManifoldType::Circles => {
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.local_points[0]);
                let normal = (point_b - point_a).normalize_or(Vec2::X);
                let point = (point_a + point_b) * 0.5;
                let separation = (point_b - point_a).dot(normal) - self.radius_a - self.radius_b;
                (normal, point, separation)
            }
            ManifoldType::FaceA => {
                let normal = xf_a.rot.apply(self.local_normal);
                let plane_point = xf_a.apply(self.local_point);
                let clip_point = xf_b.apply(self.local_points[index]);
                let separation = (clip_point - plane_point).dot(normal) - self.radius_a - self.radius_b;
                (normal, clip_point, separation)
            }
            ManifoldType::FaceB => {
                let normal = xf_b.rot.apply(self.local_normal);
                let plane_point = xf_b.apply(self.local_point);
                let clip_point = xf_a.apply(self.local_points[index]);
                let separation = (clip_point - plane_point).dot(normal) - self.radius_a - self.radius_b;
                // Ensure normal points from A to B
                (-normal, clip_point, separation)
            }
        }
    }
}

fn body_transform(position: &Position, local_center: Vec2) -> Transform {
    let rot = Rot::new(position.a);
    Transform {
        position: position.c - rot.apply(local_center),
        rot,
    }
}

pub(crate) struct ContactSolver {
    velocity_threshold: f64,
    block_solve: bool,
    friction_order: FrictionOrder,
    baumgarte: f64,
    toi_baumgarte: f64,
    max_linear_correction: f64,
    pub velocity_constraints: Vec<ContactVelocityConstraint>,
    position_constraints: Vec<ContactPositionConstraint>,
}

impl ContactSolver {
    /// Gathers constraint data for the island contacts. Body indices come
    /// from each body's island index.
    pub fn new(
        step: &TimeStep,
        settings: &Settings,
        contact_handles: &[ContactHandle],
        contacts: &Arena<Contact>,
        fixtures: &Arena<Fixture>,
        bodies: &Arena<RigidBody>,
    ) -> Self {
        let mut velocity_constraints = Vec::with_capacity(contact_handles.len());
        let mut position_constraints = Vec::with_capacity(contact_handles.len());

        for &handle in contact_handles {
            let contact = &contacts[handle];
            let radius_a = fixtures[contact.fixture_a].shape().radius();
            let radius_b = fixtures[contact.fixture_b].shape().radius();
            let body_a = &bodies[contact.body_a];
            let body_b = &bodies[contact.body_b];
            let manifold = &contact.manifold;
            let point_count = manifold.point_count;
            debug_assert!(point_count > 0);

            let mut vc = ContactVelocityConstraint {
                points: [VelocityConstraintPoint::default(); MAX_MANIFOLD_POINTS],
                normal: Vec2::ZERO,
                normal_mass: Mat22::ZERO,
                k: Mat22::ZERO,
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                friction: contact.friction,
                restitution: contact.restitution,
                tangent_speed: contact.tangent_speed,
                point_count,
                contact: handle,
            };

            let mut pc = ContactPositionConstraint {
                local_points: [Vec2::ZERO; MAX_MANIFOLD_POINTS],
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                local_center_a: body_a.sweep.local_center,
                local_center_b: body_b.sweep.local_center,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                manifold_type: manifold.manifold_type,
                radius_a,
                radius_b,
                point_count,
            };

            for (j, cp) in manifold.points().iter().enumerate() {
                let vcp = &mut vc.points[j];
                if step.warm_starting {
                    vcp.normal_impulse = step.dt_ratio * cp.normal_impulse;
                    vcp.tangent_impulse = step.dt_ratio * cp.tangent_impulse;
                }
                pc.local_points[j] = cp.local_point;
            }

            velocity_constraints.push(vc);
            position_constraints.push(pc);
        }

        ContactSolver {
            velocity_threshold: settings.velocity_threshold,
            block_solve: settings.block_solve,
            friction_order: settings.friction_order,
            baumgarte: settings.baumgarte,
            toi_baumgarte: settings.toi_baumgarte,
            max_linear_correction: settings.max_linear_correction,
            velocity_constraints,
            position_constraints,
        }
    }

    /// Computes anchors, effective masses and restitution bias from the
    /// current positions.
    pub fn initialize_velocity_constraints(
        &mut self,
        contacts: &Arena<Contact>,
        positions: &[Position],
        velocities: &[Velocity],
    ) {
        for (vc, pc) in self.velocity_constraints.iter_mut().zip(&self.position_constraints) {
            let manifold = &contacts[vc.contact].manifold;

            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
            let pos_a = positions[vc.index_a];
            let pos_b = positions[vc.index_b];
            let vel_a = velocities[vc.index_a];
            let vel_b = velocities[vc.index_b];

            let xf_a = body_transform(&pos_a, pc.local_center_a);
            let xf_b = body_transform(&pos_b, pc.local_center_b);

            let world_manifold = WorldManifold::new(manifold, &xf_a, pc.radius_a, &xf_b, pc.radius_b);
            vc.normal = world_manifold.normal;
            let tangent = vc.normal.cross_scalar(1.0);

            for j in 0..vc.point_count {
                let vcp = &mut vc.points[j];
                vcp.r_a = world_manifold.points[j] - pos_a.c;
                vcp.r_b = world_manifold.points[j] - pos_b.c;

                let rn_a = vcp.r_a.cross(vc.normal);
                let rn_b = vcp.r_b.cross(vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = vcp.r_a.cross(tangent);
                let rt_b = vcp.r_b.cross(tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Setup a velocity bias for restitution.
                vcp.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    vel_b.v + Vec2::scalar_cross(vel_b.w, vcp.r_b) - vel_a.v - Vec2::scalar_cross(vel_a.w, vcp.r_a),
                );
                if v_rel < -self.velocity_threshold {
                    vcp.velocity_bias = -vc.restitution * v_rel;
                }
            }

            // If we have two points, then prepare the block solver.
            if vc.point_count == 2 && self.block_solve {
                let vcp1 = vc.points[0];
                let vcp2 = vc.points[1];

                let rn1_a = vcp1.r_a.cross(vc.normal);
                let rn1_b = vcp1.r_b.cross(vc.normal);
                let rn2_a = vcp2.r_a.cross(vc.normal);
                let rn2_b = vcp2.r_b.cross(vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    // K is safe to invert.
                    vc.k = Mat22::new(Vec2::new(k11, k12), Vec2::new(k12, k22));
                    vc.normal_mass = vc.k.get_inverse();
                } else {
                    // The constraints are redundant, just use one.
                    vc.point_count = 1;
                }
            }
        }
    }

    /// Applies the carried-over impulses.
    pub fn warm_start(&self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
            let mut vel_a = velocities[vc.index_a];
            let mut vel_b = velocities[vc.index_b];
            let tangent = vc.normal.cross_scalar(1.0);

            for vcp in &vc.points[..vc.point_count] {
                let p = vc.normal * vcp.normal_impulse + tangent * vcp.tangent_impulse;
                vel_a.w -= i_a * vcp.r_a.cross(p);
                vel_a.v -= p * m_a;
                vel_b.w += i_b * vcp.r_b.cross(p);
                vel_b.v += p * m_b;
            }

            velocities[vc.index_a] = vel_a;
            velocities[vc.index_b] = vel_b;
        }
    }

    pub fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        let block_solve = self.block_solve;
        let friction_order = self.friction_order;
        for vc in &mut self.velocity_constraints {
            let mut vel_a = velocities[vc.index_a];
            let mut vel_b = velocities[vc.index_b];

            match friction_order {
                FrictionOrder::NormalFirst => {
                    solve_normal(vc, &mut vel_a, &mut vel_b, block_solve);
                    solve_tangent(vc, &mut vel_a, &mut vel_b);
                }
                FrictionOrder::TangentFirst => {
                    solve_tangent(vc, &mut vel_a, &mut vel_b);
                    solve_normal(vc, &mut vel_a, &mut vel_b, block_solve);
                }
            }

            velocities[vc.index_a] = vel_a;
            velocities[vc.index_b] = vel_b;
        }
    }

    /// Writes accumulated impulses back to the manifolds for warm starting.
    pub fn store_impulses(&self, contacts: &mut Arena<Contact>) {
        for vc in &self.velocity_constraints {
            let Some(contact) = contacts.get_mut(vc.contact) else {
                continue;
            };
            // A redundant second point was dropped when the block solver was
            // prepared; its manifold impulse is left as it was.
            let points = contact.manifold.points_mut();
            for (point, vcp) in points.iter_mut().zip(&vc.points[..vc.point_count]) {
                point.normal_impulse = vcp.normal_impulse;
                point.tangent_impulse = vcp.tangent_impulse;
            }
        }
    }

    /// One sweep of non-linear Gauss-Seidel on positions. Returns true when
    /// the worst separation is within tolerance.
    pub fn solve_position_constraints(&self, positions: &mut [Position]) -> bool {
        let mut min_separation: f64 = 0.0;

        for pc in &self.position_constraints {
            let (m_a, m_b, i_a, i_b) = (pc.inv_mass_a, pc.inv_mass_b, pc.inv_i_a, pc.inv_i_b);
            min_separation = min_separation.min(solve_position_constraint(
                pc,
                positions,
                (m_a, i_a),
                (m_b, i_b),
                self.baumgarte,
                self.max_linear_correction,
            ));
        }

        // We can't expect min_separation >= -LINEAR_SLOP because we don't
        // push the separation above -LINEAR_SLOP.
        min_separation >= -3.0 * LINEAR_SLOP
    }

    /// Position correction for a time-of-impact sub-step. Only the two TOI
    /// bodies move; everything else is treated as static.
    pub fn solve_toi_position_constraints(
        &self,
        positions: &mut [Position],
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> bool {
        let mut min_separation: f64 = 0.0;

        for pc in &self.position_constraints {
            let movable = |index: usize| index == toi_index_a || index == toi_index_b;
            let a = if movable(pc.index_a) {
                (pc.inv_mass_a, pc.inv_i_a)
            } else {
                (0.0, 0.0)
            };
            let b = if movable(pc.index_b) {
                (pc.inv_mass_b, pc.inv_i_b)
            } else {
                (0.0, 0.0)
            };
            min_separation = min_separation.min(solve_position_constraint(
                pc,
                positions,
                a,
                b,
                self.toi_baumgarte,
                self.max_linear_correction,
            ));
        }

        // We can't expect min_separation >= -LINEAR_SLOP because we don't
        // push the separation above -LINEAR_SLOP.
        min_separation >= -1.5 * LINEAR_SLOP
    }
}

fn apply_impulse(vc: &ContactVelocityConstraint, j: usize, p: Vec2, vel_a: &mut Velocity, vel_b: &mut Velocity) {
    let vcp = &vc.points[j];
    vel_a.v -= p * vc.inv_mass_a;
    vel_a.w -= vc.inv_i_a * vcp.r_a.cross(p);
    vel_b.v += p * vc.inv_mass_b;
    vel_b.w += vc.inv_i_b * vcp.r_b.cross(p);
}

fn relative_velocity(vc: &ContactVelocityConstraint, j: usize, vel_a: &Velocity, vel_b: &Velocity) -> Vec2 {
    let vcp = &vc.points[j];
    vel_b.v + Vec2::scalar_cross(vel_b.w, vcp.r_b) - vel_a.v - Vec2::scalar_cross(vel_a.w, vcp.r_a)
}

/// Friction, clamped per point by the current normal impulse.
fn solve_tangent(vc: &mut ContactVelocityConstraint, vel_a: &mut Velocity, vel_b: &mut Velocity) {
    let tangent = vc.normal.cross_scalar(1.0);
    for j in 0..vc.point_count {
        let dv = relative_velocity(vc, j, vel_a, vel_b);
        let vt = dv.dot(tangent) - vc.tangent_speed;

        let vcp = &mut vc.points[j];
        let mut lambda = vcp.tangent_mass * (-vt);

        // Clamp the accumulated force
        let max_friction = vc.friction * vcp.normal_impulse;
        let new_impulse = (vcp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
        lambda = new_impulse - vcp.tangent_impulse;
        vcp.tangent_impulse = new_impulse;

        apply_impulse(vc, j, tangent * lambda, vel_a, vel_b);
    }
}

fn solve_normal(vc: &mut ContactVelocityConstraint, vel_a: &mut Velocity, vel_b: &mut Velocity, block_solve: bool) {
    if vc.point_count == 1 || !block_solve {
        for j in 0..vc.point_count {
            let vn = relative_velocity(vc, j, vel_a, vel_b).dot(vc.normal);

            let vcp = &mut vc.points[j];
            let mut lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

            // Clamp the accumulated impulse
            let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
            lambda = new_impulse - vcp.normal_impulse;
            vcp.normal_impulse = new_impulse;

            apply_impulse(vc, j, vc.normal * lambda, vel_a, vel_b);
        }
        return;
    }

    // Block solver. Solves the LCP
    //   vn = A * x + b, vn >= 0, x >= 0, vn_i * x_i = 0
    // for the incremental impulse by enumerating the four cases of which
    // points are active. b holds the velocity with the old impulses removed.
    let a = Vec2::new(vc.points[0].normal_impulse, vc.points[1].normal_impulse);
    debug_assert!(a.x >= 0.0 && a.y >= 0.0);

    let vn1 = relative_velocity(vc, 0, vel_a, vel_b).dot(vc.normal);
    let vn2 = relative_velocity(vc, 1, vel_a, vel_b).dot(vc.normal);
    let mut b = Vec2::new(vn1 - vc.points[0].velocity_bias, vn2 - vc.points[1].velocity_bias);
    b -= vc.k.mul_vec(a);

    let x = 'cases: {
        // Case 1: both points active, vn = 0.
        let x = -vc.normal_mass.mul_vec(b);
        if x.x >= 0.0 && x.y >= 0.0 {
            break 'cases Some(x);
        }

        // Case 2: point 1 active, vn2 >= 0.
        let x = Vec2::new(-vc.points[0].normal_mass * b.x, 0.0);
        let vn2 = vc.k.ex.y * x.x + b.y;
        if x.x >= 0.0 && vn2 >= 0.0 {
            break 'cases Some(x);
        }

        // Case 3: point 2 active, vn1 >= 0.
        let x = Vec2::new(0.0, -vc.points[1].normal_mass * b.y);
        let vn1 = vc.k.ey.x * x.y + b.x;
        if x.y >= 0.0 && vn1 >= 0.0 {
            break 'cases Some(x);
        }

        // Case 4: no point active.
        if b.x >= 0.0 && b.y >= 0.0 {
            break 'cases Some(Vec2::ZERO);
        }

        // No solution, give up. Happens only with degenerate input.
        None
    };

    if let Some(x) = x {
        let d = x - a;
        apply_impulse(vc, 0, vc.normal * d.x, vel_a, vel_b);
        apply_impulse(vc, 1, vc.normal * d.y, vel_a, vel_b);
        vc.points[0].normal_impulse = x.x;
        vc.points[1].normal_impulse = x.y;
    }
}

/// Pushes one contact's bodies apart and returns the smallest separation seen.
fn solve_position_constraint(
    pc: &ContactPositionConstraint,
    positions: &mut [Position],
    (m_a, i_a): (f64, f64),
    (m_b, i_b): (f64, f64),
    baumgarte: f64,
    max_linear_correction: f64,
) -> f64 {
    let mut pos_a = positions[pc.index_a];
    let mut pos_b = positions[pc.index_b];
    let mut min_separation = f64::MAX;

    // Solve normal constraints
    for j in 0..pc.point_count {
        let xf_a = body_transform(&pos_a, pc.local_center_a);
        let xf_b = body_transform(&pos_b, pc.local_center_b);

        let (normal, point, separation) = pc.evaluate(&xf_a, &xf_b, j);
        let r_a = point - pos_a.c;
        let r_b = point - pos_b.c;

        // Track max constraint error.
        min_separation = min_separation.min(separation);

        // Prevent large corrections and allow slop.
        let c = (baumgarte * (separation + LINEAR_SLOP)).clamp(-max_linear_correction, 0.0);

        // Compute the effective mass.
        let rn_a = r_a.cross(normal);
        let rn_b = r_b.cross(normal);
        let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;

        // Compute normal impulse
        let impulse = if k > 0.0 { -c / k } else { 0.0 };
        let p = normal * impulse;

        pos_a.c -= p * m_a;
        pos_a.a -= i_a * r_a.cross(p);
        pos_b.c += p * m_b;
        pos_b.a += i_b * r_b.cross(p);
    }

    positions[pc.index_a] = pos_a;
    positions[pc.index_b] = pos_b;
    min_separation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::fixture::FixtureDef;
    use crate::objects::rigid_body::BodyDef;
    use crate::shapes::Polygon;
    use approx::assert_abs_diff_eq;

    /// Ground box and a unit box resting on it, already collided.
    struct Pair {
        bodies: Arena<RigidBody>,
        fixtures: Arena<Fixture>,
        contacts: Arena<Contact>,
        handle: ContactHandle,
        positions: Vec<Position>,
        velocities: Vec<Velocity>,
    }

    fn resting_pair(drop_speed: f64, overlap: f64, restitution: f64) -> Pair {
        let mut bodies = Arena::new();
        let ground = bodies.insert(RigidBody::new(&BodyDef::fixed(Vec2::ZERO)));
        let mut def = BodyDef::dynamic(Vec2::new(0.0, 1.0 - overlap));
        def.linear_velocity = Vec2::new(0.0, -drop_speed);
        let body = bodies.insert(RigidBody::new(&def));

        let mut fixtures = Arena::new();
        let fg = fixtures.insert(Fixture::new(
            ground,
            &FixtureDef::new(Polygon::new_box(5.0, 0.5).unwrap().into()).with_restitution(restitution),
        ));
        let fb = fixtures.insert(Fixture::new(
            body,
            &FixtureDef::new(Polygon::new_box(0.5, 0.5).unwrap().into())
                .with_density(1.0)
                .with_restitution(restitution),
        ));
        bodies[ground].fixtures.push(fg);
        bodies[body].fixtures.push(fb);
        bodies[body].reset_mass_data(&fixtures);
        bodies[ground].island_index = 0;
        bodies[body].island_index = 1;

        let mut contacts = Arena::new();
        let mut contact = Contact::new(fg, &fixtures[fg], 0, fb, &fixtures[fb], 0).unwrap();
        let (xf_g, xf_b) = (bodies[ground].xf, bodies[body].xf);
        contact.update(&fixtures[fg], &fixtures[fb], &xf_g, &xf_b, None);
        assert_eq!(contact.manifold.point_count, 2);
        let handle = contacts.insert(contact);

        let positions = vec![
            Position { c: bodies[ground].sweep.c, a: 0.0 },
            Position { c: bodies[body].sweep.c, a: 0.0 },
        ];
        let velocities = vec![
            Velocity::default(),
            Velocity {
                v: def.linear_velocity,
                w: 0.0,
            },
        ];
        Pair {
            bodies,
            fixtures,
            contacts,
            handle,
            positions,
            velocities,
        }
    }

    fn build_solver(pair: &Pair, settings: &Settings) -> ContactSolver {
        let step = TimeStep::new(1.0 / 60.0, 8, 3);
        let mut solver = ContactSolver::new(&step, settings, &[pair.handle], &pair.contacts, &pair.fixtures, &pair.bodies);
        solver.initialize_velocity_constraints(&pair.contacts, &pair.positions, &pair.velocities);
        solver
    }

    #[test]
    fn test_normal_impulse_stops_approach() {
        for block_solve in [true, false] {
            let mut pair = resting_pair(2.0, 0.0, 0.0);
            let settings = Settings {
                block_solve,
                ..Settings::default()
            };
            let mut solver = build_solver(&pair, &settings);
            for _ in 0..100 {
                solver.solve_velocity_constraints(&mut pair.velocities);
            }
            assert_abs_diff_eq!(pair.velocities[1].v.y, 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(pair.velocities[1].w, 0.0, epsilon = 1e-6);
            // Ground is static.
            assert_eq!(pair.velocities[0], Velocity::default());

            let impulse = solver.velocity_constraints[0].impulse();
            let total = impulse.normal_impulses[0] + impulse.normal_impulses[1];
            // Removes m * v of momentum
            assert_abs_diff_eq!(total, pair.bodies.iter().nth(1).unwrap().1.mass() * 2.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_restitution_above_threshold() {
        let mut pair = resting_pair(4.0, 0.0, 0.5);
        let mut solver = build_solver(&pair, &Settings::default());
        for _ in 0..100 {
            solver.solve_velocity_constraints(&mut pair.velocities);
        }
        assert_abs_diff_eq!(pair.velocities[1].v.y, 2.0, epsilon = 1e-6);

        // Below the threshold there is no bounce.
        let mut pair = resting_pair(0.5, 0.0, 0.5);
        let mut solver = build_solver(&pair, &Settings::default());
        for _ in 0..100 {
            solver.solve_velocity_constraints(&mut pair.velocities);
        }
        assert_abs_diff_eq!(pair.velocities[1].v.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_friction_is_bounded_by_normal_impulse() {
        let mut pair = resting_pair(1.0, 0.0, 0.0);
        pair.velocities[1].v.x = 10.0;
        for order in [FrictionOrder::NormalFirst, FrictionOrder::TangentFirst] {
            let settings = Settings {
                friction_order: order,
                ..Settings::default()
            };
            let mut velocities = pair.velocities.clone();
            let mut solver = build_solver(&pair, &settings);
            for _ in 0..10 {
                solver.solve_velocity_constraints(&mut velocities);
            }
            let vc = &solver.velocity_constraints[0];
            for p in &vc.points[..vc.point_count] {
                assert!(p.tangent_impulse.abs() <= vc.friction * p.normal_impulse + 1e-6);
            }
            // Friction slows the slide but cannot reverse it.
            assert!(velocities[1].v.x < 10.0 && velocities[1].v.x > 0.0);
        }
    }

    #[test]
    fn test_store_impulses_and_warm_start() {
        let mut pair = resting_pair(2.0, 0.0, 0.0);
        let mut solver = build_solver(&pair, &Settings::default());
        for _ in 0..100 {
            solver.solve_velocity_constraints(&mut pair.velocities);
        }
        solver.store_impulses(&mut pair.contacts);
        let stored: f64 = pair.contacts[pair.handle].manifold.points().iter().map(|p| p.normal_impulse).sum();
        assert!(stored > 0.0);

        // A fresh solver warm starts with the same impulse and stops the
        // body without any iteration.
        let mut velocities = vec![Velocity::default(), Velocity { v: Vec2::new(0.0, -2.0), w: 0.0 }];
        let solver = build_solver(&pair, &Settings::default());
        solver.warm_start(&mut velocities);
        assert_abs_diff_eq!(velocities[1].v.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_store_impulses_skips_dropped_point() {
        let mut pair = resting_pair(2.0, 0.0, 0.0);
        // Without rotation both points see the same effective mass, so the
        // block solver keeps only the first.
        let body = pair.bodies.handles()[1];
        pair.bodies[body].fixed_rotation = true;
        pair.bodies[body].reset_mass_data(&pair.fixtures);
        for point in pair.contacts[pair.handle].manifold.points_mut() {
            point.normal_impulse = 0.3;
        }

        let step = TimeStep {
            dt_ratio: 0.5,
            ..TimeStep::new(1.0 / 60.0, 8, 3)
        };
        let settings = Settings::default();
        let mut solver =
            ContactSolver::new(&step, &settings, &[pair.handle], &pair.contacts, &pair.fixtures, &pair.bodies);
        solver.initialize_velocity_constraints(&pair.contacts, &pair.positions, &pair.velocities);
        assert_eq!(solver.velocity_constraints[0].point_count, 1);

        for _ in 0..10 {
            solver.solve_velocity_constraints(&mut pair.velocities);
        }
        solver.store_impulses(&mut pair.contacts);

        let points = pair.contacts[pair.handle].manifold.points();
        assert_eq!(points.len(), 2);
        assert_abs_diff_eq!(points[0].normal_impulse, solver.velocity_constraints[0].points[0].normal_impulse);
        assert!(points[0].normal_impulse > 0.3);
        assert_eq!(points[1].normal_impulse, 0.3);
    }

    #[test]
    fn test_position_correction_reduces_overlap() {
        let mut pair = resting_pair(0.0, 0.1, 0.0);
        let solver = build_solver(&pair, &Settings::default());
        let before = pair.positions[1].c.y;
        let mut solved = false;
        for _ in 0..20 {
            solved = solver.solve_position_constraints(&mut pair.positions);
        }
        assert!(solved);
        assert!(pair.positions[1].c.y > before);
        // Ground never moves.
        assert_eq!(pair.positions[0].c, Vec2::ZERO);
    }

    #[test]
    fn test_toi_position_only_moves_toi_bodies() {
        let mut pair = resting_pair(0.0, 0.1, 0.0);
        let solver = build_solver(&pair, &Settings::default());
        let before = pair.positions[1].c.y;
        // Body 1 is not a TOI body, so nothing moves.
        solver.solve_toi_position_constraints(&mut pair.positions, 0, 0);
        assert_eq!(pair.positions[1].c.y, before);
        solver.solve_toi_position_constraints(&mut pair.positions, 0, 1);
        assert!(pair.positions[1].c.y > before);
    }

    #[test]
    fn test_circles_evaluate_separation() {
        let pc = ContactPositionConstraint {
            local_points: [Vec2::ZERO; MAX_MANIFOLD_POINTS],
            local_normal: Vec2::ZERO,
            local_point: Vec2::ZERO,
            index_a: 0,
            index_b: 1,
            inv_mass_a: 1.0,
            inv_mass_b: 1.0,
            local_center_a: Vec2::ZERO,
            local_center_b: Vec2::ZERO,
            inv_i_a: 0.0,
            inv_i_b: 0.0,
            manifold_type: ManifoldType::Circles,
            radius_a: 1.0,
            radius_b: 1.0,
            point_count: 1,
        };
        let (normal, point, separation) = pc.evaluate(
            &Transform::identity(),
            &Transform::new(Vec2::new(0.0, 1.5), 0.0),
            0,
        );
        assert_abs_diff_eq!(normal.y, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(point.y, 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(separation, -0.5, epsilon = 1e-12);

    }
}
