use super::{check_finite, point_angle_mass, soft_constraint, Constraint, JointBodies, SolverData};
use crate::common::settings::{ANGULAR_SLOP, LINEAR_SLOP};
use crate::common::{PhysicsError, Result};
use crate::math::{Mat33, Rot, Vec2, Vec3};
use crate::objects::rigid_body::RigidBody;

/// Definition of a [`WeldJoint`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WeldJointDef {
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub reference_angle: f64,
    /// Angular spring frequency. Zero makes the weld rigid.
    pub frequency_hz: f64,
    pub damping_ratio: f64,
}

impl WeldJointDef {
    /// Builds the definition from a world anchor and the current body poses.
    pub fn initialize(body_a: &RigidBody, body_b: &RigidBody, anchor: Vec2) -> Self {
        WeldJointDef {
            local_anchor_a: body_a.local_point(anchor),
            local_anchor_b: body_b.local_point(anchor),
            reference_angle: body_b.angle() - body_a.angle(),
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_finite(
            &[
                self.local_anchor_a.x,
                self.local_anchor_a.y,
                self.local_anchor_b.x,
                self.local_anchor_b.y,
                self.reference_angle,
                self.frequency_hz,
                self.damping_ratio,
            ],
            "weld joint parameters",
        )?;
        if self.frequency_hz < 0.0 || self.damping_ratio < 0.0 {
            return Err(PhysicsError::InvalidDefinition(
                "weld joint frequency and damping must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Glues two bodies together at an anchor, optionally with a soft angular spring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeldJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    reference_angle: f64,
    frequency_hz: f64,
    damping_ratio: f64,

    // Solver state
    impulse: Vec3,
    gamma: f64,
    bias: f64,
    r_a: Vec2,
    r_b: Vec2,
    mass: Mat33,
}

impl WeldJoint {
    pub(crate) fn new(def: &WeldJointDef) -> Self {
        WeldJoint {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: Vec3::ZERO,
            gamma: 0.0,
            bias: 0.0,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat33::default(),
        }
    }

    pub fn reference_angle(&self) -> f64 {
        self.reference_angle
    }

    pub fn frequency(&self) -> f64 {
        self.frequency_hz
    }

    pub fn set_frequency(&mut self, hz: f64) {
        self.frequency_hz = hz.max(0.0);
    }

    pub fn damping_ratio(&self) -> f64 {
        self.damping_ratio
    }

    pub fn set_damping_ratio(&mut self, ratio: f64) {
        self.damping_ratio = ratio.max(0.0);
    }
}

impl Constraint for WeldJoint {
    fn init_velocity_constraints(&mut self, b: &JointBodies, data: &mut SolverData<'_>) {
        let a_a = data.positions[b.index_a].a;
        let a_b = data.positions[b.index_b].a;
        let mut vel_a = data.velocities[b.index_a];
        let mut vel_b = data.velocities[b.index_b];
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);

        self.r_a = Rot::new(a_a).apply(self.local_anchor_a - b.local_center_a);
        self.r_b = Rot::new(a_b).apply(self.local_anchor_b - b.local_center_b);

        // J = [-I -r1_skew I r2_skew]
        //     [ 0       -1 0       1]
        let k = point_angle_mass(b, self.r_a, self.r_b);

        if self.frequency_hz > 0.0 {
            self.mass = k.get_inverse22();

            let mut inv_m = i_a + i_b;
            let m = if inv_m > 0.0 { 1.0 / inv_m } else { 0.0 };

            let c = a_b - a_a - self.reference_angle;
            let (gamma, bias) = soft_constraint(m, self.frequency_hz, self.damping_ratio, data.step.dt, c);
            self.gamma = gamma;
            self.bias = bias;

            inv_m += self.gamma;
            self.mass.ez.z = if inv_m != 0.0 { 1.0 / inv_m } else { 0.0 };
        } else if k.ez.z == 0.0 {
            self.mass = k.get_inverse22();
            self.gamma = 0.0;
            self.bias = 0.0;
        } else {
            self.mass = k.get_sym_inverse33();
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            // Scale impulses to support a variable time step
            self.impulse *= data.step.dt_ratio;

            let p = self.impulse.xy();
            vel_a.v -= p * m_a;
            vel_a.w -= i_a * (self.r_a.cross(p) + self.impulse.z);
            vel_b.v += p * m_b;
            vel_b.w += i_b * (self.r_b.cross(p) + self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
        }

        data.velocities[b.index_a] = vel_a;
        data.velocities[b.index_b] = vel_b;
    }

    fn solve_velocity_constraints(&mut self, b: &JointBodies, data: &mut SolverData<'_>) {
        let mut vel_a = data.velocities[b.index_a];
        let mut vel_b = data.velocities[b.index_b];
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);

        if self.frequency_hz > 0.0 {
            let cdot2 = vel_b.w - vel_a.w;
            let impulse2 = -self.mass.ez.z * (cdot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;

            vel_a.w -= i_a * impulse2;
            vel_b.w += i_b * impulse2;

            let cdot1 = vel_b.v + Vec2::scalar_cross(vel_b.w, self.r_b)
                - vel_a.v
                - Vec2::scalar_cross(vel_a.w, self.r_a);
            let impulse1 = -self.mass.mul_vec22(cdot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;

            vel_a.v -= impulse1 * m_a;
            vel_a.w -= i_a * self.r_a.cross(impulse1);
            vel_b.v += impulse1 * m_b;
            vel_b.w += i_b * self.r_b.cross(impulse1);
        } else {
            let cdot1 = vel_b.v + Vec2::scalar_cross(vel_b.w, self.r_b)
                - vel_a.v
                - Vec2::scalar_cross(vel_a.w, self.r_a);
            let cdot2 = vel_b.w - vel_a.w;
            let cdot = Vec3::new(cdot1.x, cdot1.y, cdot2);

            let impulse = -self.mass.mul_vec(cdot);
            self.impulse += impulse;

            let p = impulse.xy();
            vel_a.v -= p * m_a;
            vel_a.w -= i_a * (self.r_a.cross(p) + impulse.z);
            vel_b.v += p * m_b;
            vel_b.w += i_b * (self.r_b.cross(p) + impulse.z);
        }

        data.velocities[b.index_a] = vel_a;
        data.velocities[b.index_b] = vel_b;
    }

    fn solve_position_constraints(&mut self, b: &JointBodies, data: &mut SolverData<'_>) -> bool {
        let mut pos_a = data.positions[b.index_a];
        let mut pos_b = data.positions[b.index_b];
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);

        let r_a = Rot::new(pos_a.a).apply(self.local_anchor_a - b.local_center_a);
        let r_b = Rot::new(pos_b.a).apply(self.local_anchor_b - b.local_center_b);

        let k = point_angle_mass(b, r_a, r_b);
        let c1 = pos_b.c + r_b - pos_a.c - r_a;

        let (position_error, angular_error, impulse) = if self.frequency_hz > 0.0 {
            // The angular spring is soft, so only the anchors are corrected
            let p = -k.solve22(c1);
            (c1.magnitude(), 0.0, Vec3::new(p.x, p.y, 0.0))
        } else {
            let c2 = pos_b.a - pos_a.a - self.reference_angle;
            let impulse = if k.ez.z > 0.0 {
                -k.solve33(Vec3::new(c1.x, c1.y, c2))
            } else {
                let impulse2 = -k.solve22(c1);
                Vec3::new(impulse2.x, impulse2.y, 0.0)
            };
            (c1.magnitude(), c2.abs(), impulse)
        };

        let p = impulse.xy();
        pos_a.c -= p * m_a;
        pos_a.a -= i_a * (r_a.cross(p) + impulse.z);
        pos_b.c += p * m_b;
        pos_b.a += i_b * (r_b.cross(p) + impulse.z);

        data.positions[b.index_a] = pos_a;
        data.positions[b.index_b] = pos_b;

        position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }

    fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        self.impulse.xy() * inv_dt
    }

    fn reaction_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.impulse.z
    }
}
