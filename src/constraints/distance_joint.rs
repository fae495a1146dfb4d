use super::{check_finite, soft_constraint, Constraint, JointBodies, SolverData};
use crate::common::settings::LINEAR_SLOP;
use crate::common::{PhysicsError, Result};
use crate::math::{Rot, Vec2};
use crate::objects::rigid_body::RigidBody;

/// Definition of a [`DistanceJoint`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceJointDef {
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Rest length. Must be positive.
    pub length: f64,
    /// Spring frequency. Zero makes the joint rigid.
    pub frequency_hz: f64,
    /// Zero is undamped, one is critically damped.
    pub damping_ratio: f64,
}

impl Default for DistanceJointDef {
    fn default() -> Self {
        DistanceJointDef {
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length: 1.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }
}

impl DistanceJointDef {
    /// Builds the definition from world anchors. The rest length is the current
    /// anchor separation.
    pub fn initialize(body_a: &RigidBody, body_b: &RigidBody, anchor_a: Vec2, anchor_b: Vec2) -> Self {
        DistanceJointDef {
            local_anchor_a: body_a.local_point(anchor_a),
            local_anchor_b: body_b.local_point(anchor_b),
            length: anchor_a.distance(anchor_b),
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
                self.length,
                self.frequency_hz,
                self.damping_ratio,
            ],
            "distance joint parameters",
        )?;
        if self.length <= 0.0 {
            return Err(PhysicsError::InvalidDefinition(format!(
                "distance joint length must be positive, got {}",
                self.length
            )));
        }
        if self.frequency_hz < 0.0 || self.damping_ratio < 0.0 {
            return Err(PhysicsError::InvalidDefinition(
                "distance joint frequency and damping must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Keeps two anchor points at a fixed distance, optionally as a soft spring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    length: f64,
    frequency_hz: f64,
    damping_ratio: f64,

    // Solver state
    impulse: f64,
    gamma: f64,
    bias: f64,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f64,
}

impl DistanceJoint {
    pub(crate) fn new(def: &DistanceJointDef) -> Self {
        DistanceJoint {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length: def.length,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: 0.0,
            gamma: 0.0,
            bias: 0.0,
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        }
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Sets the rest length. Non-positive lengths are clamped to the linear slop.
    pub fn set_length(&mut self, length: f64) {
        self.length = length.max(LINEAR_SLOP);
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

impl Constraint for DistanceJoint {
    fn init_velocity_constraints(&mut self, b: &JointBodies, data: &mut SolverData<'_>) {
        let pos_a = data.positions[b.index_a];
        let pos_b = data.positions[b.index_b];
        let mut vel_a = data.velocities[b.index_a];
        let mut vel_b = data.velocities[b.index_b];

        let q_a = Rot::new(pos_a.a);
        let q_b = Rot::new(pos_b.a);
        self.r_a = q_a.apply(self.local_anchor_a - b.local_center_a);
        self.r_b = q_b.apply(self.local_anchor_b - b.local_center_b);
        self.u = pos_b.c + self.r_b - pos_a.c - self.r_a;

        // Handle singularity
        let current_length = self.u.magnitude();
        if current_length > LINEAR_SLOP {
            self.u = self.u * (1.0 / current_length);
        } else {
            self.u = Vec2::ZERO;
        }

        let cr_a = self.r_a.cross(self.u);
        let cr_b = self.r_b.cross(self.u);
        let mut inv_mass = b.inv_mass_a + b.inv_i_a * cr_a * cr_a + b.inv_mass_b + b.inv_i_b * cr_b * cr_b;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.frequency_hz > 0.0 {
            let c = current_length - self.length;
            let (gamma, bias) = soft_constraint(self.mass, self.frequency_hz, self.damping_ratio, data.step.dt, c);
            self.gamma = gamma;
            self.bias = bias;
            inv_mass += self.gamma;
            self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            // Scale the impulse to support a variable time step
            self.impulse *= data.step.dt_ratio;
            let p = self.u * self.impulse;
            vel_a.v -= p * b.inv_mass_a;
            vel_a.w -= b.inv_i_a * self.r_a.cross(p);
            vel_b.v += p * b.inv_mass_b;
            vel_b.w += b.inv_i_b * self.r_b.cross(p);
        } else {
            self.impulse = 0.0;
        }

        data.velocities[b.index_a] = vel_a;
        data.velocities[b.index_b] = vel_b;
    }

    fn solve_velocity_constraints(&mut self, b: &JointBodies, data: &mut SolverData<'_>) {
        let mut vel_a = data.velocities[b.index_a];
        let mut vel_b = data.velocities[b.index_b];

        // Cdot = dot(u, v + cross(w, r))
        let vp_a = vel_a.v + Vec2::scalar_cross(vel_a.w, self.r_a);
        let vp_b = vel_b.v + Vec2::scalar_cross(vel_b.w, self.r_b);
        let cdot = self.u.dot(vp_b - vp_a);

        let impulse = -self.mass * (cdot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;

        let p = self.u * impulse;
        vel_a.v -= p * b.inv_mass_a;
        vel_a.w -= b.inv_i_a * self.r_a.cross(p);
        vel_b.v += p * b.inv_mass_b;
        vel_b.w += b.inv_i_b * self.r_b.cross(p);

        data.velocities[b.index_a] = vel_a;
        data.velocities[b.index_b] = vel_b;
    }

    fn solve_position_constraints(&mut self, b: &JointBodies, data: &mut SolverData<'_>) -> bool {
        if self.frequency_hz > 0.0 {
            // There is no position correction for soft distance constraints
            return true;
        }

        let mut pos_a = data.positions[b.index_a];
        let mut pos_b = data.positions[b.index_b];

        let r_a = Rot::new(pos_a.a).apply(self.local_anchor_a - b.local_center_a);
        let r_b = Rot::new(pos_b.a).apply(self.local_anchor_b - b.local_center_b);
        let (u, length) = (pos_b.c + r_b - pos_a.c - r_a).normalize_and_length();

        let max_correction = data.settings.max_linear_correction;
        let c = (length - self.length).clamp(-max_correction, max_correction);

        let impulse = -self.mass * c;
        let p = u * impulse;
        pos_a.c -= p * b.inv_mass_a;
        pos_a.a -= b.inv_i_a * r_a.cross(p);
        pos_b.c += p * b.inv_mass_b;
        pos_b.a += b.inv_i_b * r_b.cross(p);

        data.positions[b.index_a] = pos_a;
        data.positions[b.index_b] = pos_b;

        c.abs() < LINEAR_SLOP
    }

    fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        self.u * (inv_dt * self.impulse)
    }

    fn reaction_torque(&self, _inv_dt: f64) -> f64 {
        0.0
    }
}
