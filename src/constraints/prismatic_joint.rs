use super::{check_finite, Constraint, JointBodies, LimitState, SolverData};
use crate::common::settings::{ANGULAR_SLOP, LINEAR_SLOP};
use crate::common::{PhysicsError, Result};
use crate::math::{Mat22, Mat33, Rot, Vec2, Vec3};
use crate::objects::rigid_body::RigidBody;

/// Definition of a [`PrismaticJoint`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrismaticJointDef {
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Translation axis in body A's frame. Normalized on creation.
    pub local_axis_a: Vec2,
    pub reference_angle: f64,
    pub enable_limit: bool,
    pub lower_translation: f64,
    pub upper_translation: f64,
    pub enable_motor: bool,
    pub motor_speed: f64,
    pub max_motor_force: f64,
}

impl Default for PrismaticJointDef {
    fn default() -> Self {
        PrismaticJointDef {
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            local_axis_a: Vec2::X,
            reference_angle: 0.0,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_force: 0.0,
        }
    }
}

impl PrismaticJointDef {
    /// Builds the definition from a world anchor and world axis, using the
    /// current body poses.
    pub fn initialize(body_a: &RigidBody, body_b: &RigidBody, anchor: Vec2, axis: Vec2) -> Self {
        PrismaticJointDef {
            local_anchor_a: body_a.local_point(anchor),
            local_anchor_b: body_b.local_point(anchor),
            local_axis_a: body_a.local_vector(axis),
            reference_angle: body_b.angle() - body_a.angle(),
            ..Default::default()
        }
    }

    pub fn with_limits(mut self, lower: f64, upper: f64) -> Self {
        self.enable_limit = true;
        self.lower_translation = lower;
        self.upper_translation = upper;
        self
    }

    pub fn with_motor(mut self, speed: f64, max_force: f64) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_force = max_force;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_finite(
            &[
                self.local_anchor_a.x,
                self.local_anchor_a.y,
                self.local_anchor_b.x,
                self.local_anchor_b.y,
                self.local_axis_a.x,
                self.local_axis_a.y,
                self.reference_angle,
                self.lower_translation,
                self.upper_translation,
                self.motor_speed,
                self.max_motor_force,
            ],
            "prismatic joint parameters",
        )?;
        if self.local_axis_a.magnitude_squared() < f64::EPSILON * f64::EPSILON {
            return Err(PhysicsError::InvalidDefinition("prismatic joint axis must be non-zero".into()));
        }
        if self.lower_translation > self.upper_translation {
            return Err(PhysicsError::InvalidDefinition(format!(
                "prismatic joint lower translation {} exceeds upper translation {}",
                self.lower_translation, self.upper_translation
            )));
        }
        if self.max_motor_force < 0.0 {
            return Err(PhysicsError::InvalidDefinition("max motor force must be non-negative".into()));
        }
        Ok(())
    }
}

/// Lets body B slide along an axis fixed in body A, with no relative rotation.
/// Supports a translation limit and a motor with bounded force.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrismaticJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    local_x_axis_a: Vec2,
    local_y_axis_a: Vec2,
    reference_angle: f64,
    enable_limit: bool,
    lower_translation: f64,
    upper_translation: f64,
    enable_motor: bool,
    motor_speed: f64,
    max_motor_force: f64,

    // Solver state: x is the perpendicular impulse, y the angular, z the limit.
    impulse: Vec3,
    motor_impulse: f64,
    axis: Vec2,
    perp: Vec2,
    s1: f64,
    s2: f64,
    a1: f64,
    a2: f64,
    k: Mat33,
    motor_mass: f64,
    limit_state: LimitState,
}

impl PrismaticJoint {
    pub(crate) fn new(def: &PrismaticJointDef) -> Self {
        let local_x_axis_a = def.local_axis_a.normalize();
        PrismaticJoint {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            local_x_axis_a,
            local_y_axis_a: Vec2::scalar_cross(1.0, local_x_axis_a),
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_translation: def.lower_translation,
            upper_translation: def.upper_translation,
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_force: def.max_motor_force,
            impulse: Vec3::ZERO,
            motor_impulse: 0.0,
            axis: Vec2::ZERO,
            perp: Vec2::ZERO,
            s1: 0.0,
            s2: 0.0,
            a1: 0.0,
            a2: 0.0,
            k: Mat33::default(),
            motor_mass: 0.0,
            limit_state: LimitState::Inactive,
        }
    }

    pub fn local_axis_a(&self) -> Vec2 {
        self.local_x_axis_a
    }

    pub fn reference_angle(&self) -> f64 {
        self.reference_angle
    }

    /// Current translation of the anchors along the axis.
    pub fn joint_translation(&self, body_a: &RigidBody, body_b: &RigidBody) -> f64 {
        let p_a = body_a.world_point(self.local_anchor_a);
        let p_b = body_b.world_point(self.local_anchor_b);
        let axis = body_a.world_vector(self.local_x_axis_a);
        (p_b - p_a).dot(axis)
    }

    /// Current translation speed along the axis.
    pub fn joint_speed(&self, body_a: &RigidBody, body_b: &RigidBody) -> f64 {
        let r_a = body_a.xf.rot.apply(self.local_anchor_a - body_a.sweep.local_center);
        let r_b = body_b.xf.rot.apply(self.local_anchor_b - body_b.sweep.local_center);
        let p1 = body_a.sweep.c + r_a;
        let p2 = body_b.sweep.c + r_b;
        let d = p2 - p1;
        let axis = body_a.world_vector(self.local_x_axis_a);

        let (v_a, v_b) = (body_a.linear_velocity, body_b.linear_velocity);
        let (w_a, w_b) = (body_a.angular_velocity, body_b.angular_velocity);

        d.dot(Vec2::scalar_cross(w_a, axis))
            + axis.dot(v_b + Vec2::scalar_cross(w_b, r_b) - v_a - Vec2::scalar_cross(w_a, r_a))
    }

    pub fn is_limit_enabled(&self) -> bool {
        self.enable_limit
    }

    pub fn enable_limit(&mut self, flag: bool) {
        if flag != self.enable_limit {
            self.enable_limit = flag;
            self.impulse.z = 0.0;
        }
    }

    pub fn lower_limit(&self) -> f64 {
        self.lower_translation
    }

    pub fn upper_limit(&self) -> f64 {
        self.upper_translation
    }

    pub fn set_limits(&mut self, lower: f64, upper: f64) -> Result<()> {
        if lower > upper {
            return Err(PhysicsError::InvalidDefinition(format!(
                "prismatic joint lower translation {lower} exceeds upper translation {upper}"
            )));
        }
        if lower != self.lower_translation || upper != self.upper_translation {
            self.impulse.z = 0.0;
            self.lower_translation = lower;
            self.upper_translation = upper;
        }
        Ok(())
    }

    pub fn is_motor_enabled(&self) -> bool {
        self.enable_motor
    }

    pub fn enable_motor(&mut self, flag: bool) {
        self.enable_motor = flag;
    }

    pub fn motor_speed(&self) -> f64 {
        self.motor_speed
    }

    pub fn set_motor_speed(&mut self, speed: f64) {
        self.motor_speed = speed;
    }

    pub fn max_motor_force(&self) -> f64 {
        self.max_motor_force
    }

    pub fn set_max_motor_force(&mut self, force: f64) {
        self.max_motor_force = force.max(0.0);
    }

    /// Motor force applied over the last step, in newtons.
    pub fn motor_force(&self, inv_dt: f64) -> f64 {
        inv_dt * self.motor_impulse
    }

    pub fn limit_state(&self) -> LimitState {
        self.limit_state
    }
}

impl Constraint for PrismaticJoint {
    fn init_velocity_constraints(&mut self, b: &JointBodies, data: &mut SolverData<'_>) {
        let pos_a = data.positions[b.index_a];
        let pos_b = data.positions[b.index_b];
        let mut vel_a = data.velocities[b.index_a];
        let mut vel_b = data.velocities[b.index_b];
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);

        let q_a = Rot::new(pos_a.a);
        let q_b = Rot::new(pos_b.a);
        let r_a = q_a.apply(self.local_anchor_a - b.local_center_a);
        let r_b = q_b.apply(self.local_anchor_b - b.local_center_b);
        let d = pos_b.c - pos_a.c + r_b - r_a;

        // Motor Jacobian and effective mass
        self.axis = q_a.apply(self.local_x_axis_a);
        self.a1 = (d + r_a).cross(self.axis);
        self.a2 = r_b.cross(self.axis);

        self.motor_mass = m_a + m_b + i_a * self.a1 * self.a1 + i_b * self.a2 * self.a2;
        if self.motor_mass > 0.0 {
            self.motor_mass = 1.0 / self.motor_mass;
        }

        // Prismatic constraint
        self.perp = q_a.apply(self.local_y_axis_a);
        self.s1 = (d + r_a).cross(self.perp);
        self.s2 = r_b.cross(self.perp);
        self.k = constraint_mass(m_a, m_b, i_a, i_b, self.s1, self.s2, self.a1, self.a2);

        if self.enable_limit {
            let joint_translation = self.axis.dot(d);
            if (self.upper_translation - self.lower_translation).abs() < 2.0 * LINEAR_SLOP {
                self.limit_state = LimitState::Equal;
            } else if joint_translation <= self.lower_translation {
                if self.limit_state != LimitState::AtLower {
                    self.limit_state = LimitState::AtLower;
                    self.impulse.z = 0.0;
                }
            } else if joint_translation >= self.upper_translation {
                if self.limit_state != LimitState::AtUpper {
                    self.limit_state = LimitState::AtUpper;
                    self.impulse.z = 0.0;
                }
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
            self.impulse.z = 0.0;
        }

        if !self.enable_motor {
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            // Account for variable time step
            self.impulse *= data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let axial = self.motor_impulse + self.impulse.z;
            let p = self.perp * self.impulse.x + self.axis * axial;
            let l_a = self.impulse.x * self.s1 + self.impulse.y + axial * self.a1;
            let l_b = self.impulse.x * self.s2 + self.impulse.y + axial * self.a2;

            vel_a.v -= p * m_a;
            vel_a.w -= i_a * l_a;
            vel_b.v += p * m_b;
            vel_b.w += i_b * l_b;
        } else {
            self.impulse = Vec3::ZERO;
            self.motor_impulse = 0.0;
        }

        data.velocities[b.index_a] = vel_a;
        data.velocities[b.index_b] = vel_b;
    }

    fn solve_velocity_constraints(&mut self, b: &JointBodies, data: &mut SolverData<'_>) {
        let mut vel_a = data.velocities[b.index_a];
        let mut vel_b = data.velocities[b.index_b];
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);

        // Solve the linear motor constraint
        if self.enable_motor && self.limit_state != LimitState::Equal {
            let cdot = self.axis.dot(vel_b.v - vel_a.v) + self.a2 * vel_b.w - self.a1 * vel_a.w;
            let impulse = self.motor_mass * (self.motor_speed - cdot);
            let old_impulse = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_force;
            self.motor_impulse = (old_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old_impulse;

            let p = self.axis * impulse;
            vel_a.v -= p * m_a;
            vel_a.w -= i_a * impulse * self.a1;
            vel_b.v += p * m_b;
            vel_b.w += i_b * impulse * self.a2;
        }

        let cdot1 = Vec2::new(
            self.perp.dot(vel_b.v - vel_a.v) + self.s2 * vel_b.w - self.s1 * vel_a.w,
            vel_b.w - vel_a.w,
        );

        let df = if self.enable_limit && self.limit_state != LimitState::Inactive {
            // Solve prismatic and limit constraint in block form
            let cdot2 = self.axis.dot(vel_b.v - vel_a.v) + self.a2 * vel_b.w - self.a1 * vel_a.w;
            let cdot = Vec3::new(cdot1.x, cdot1.y, cdot2);

            let f1 = self.impulse;
            self.impulse += self.k.solve33(-cdot);

            match self.limit_state {
                LimitState::AtLower => self.impulse.z = self.impulse.z.max(0.0),
                LimitState::AtUpper => self.impulse.z = self.impulse.z.min(0.0),
                _ => {}
            }

            // f2(1:2) = invK(1:2,1:2) * (-Cdot(1:2) - K(1:2,3) * (f2(3) - f1(3))) + f1(1:2)
            let rhs = -cdot1 - Vec2::new(self.k.ez.x, self.k.ez.y) * (self.impulse.z - f1.z);
            let f2r = self.k.solve22(rhs) + Vec2::new(f1.x, f1.y);
            self.impulse.x = f2r.x;
            self.impulse.y = f2r.y;

            self.impulse - f1
        } else {
            // Limit is inactive, just solve the prismatic constraint in block form
            let df = self.k.solve22(-cdot1);
            self.impulse.x += df.x;
            self.impulse.y += df.y;
            Vec3::new(df.x, df.y, 0.0)
        };

        let p = self.perp * df.x + self.axis * df.z;
        let l_a = df.x * self.s1 + df.y + df.z * self.a1;
        let l_b = df.x * self.s2 + df.y + df.z * self.a2;

        vel_a.v -= p * m_a;
        vel_a.w -= i_a * l_a;
        vel_b.v += p * m_b;
        vel_b.w += i_b * l_b;

        data.velocities[b.index_a] = vel_a;
        data.velocities[b.index_b] = vel_b;
    }

    fn solve_position_constraints(&mut self, b: &JointBodies, data: &mut SolverData<'_>) -> bool {
        let mut pos_a = data.positions[b.index_a];
        let mut pos_b = data.positions[b.index_b];
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);
        let max_correction = data.settings.max_linear_correction;

        let q_a = Rot::new(pos_a.a);
        let q_b = Rot::new(pos_b.a);
        let r_a = q_a.apply(self.local_anchor_a - b.local_center_a);
        let r_b = q_b.apply(self.local_anchor_b - b.local_center_b);
        let d = pos_b.c + r_b - pos_a.c - r_a;

        let axis = q_a.apply(self.local_x_axis_a);
        let a1 = (d + r_a).cross(axis);
        let a2 = r_b.cross(axis);
        let perp = q_a.apply(self.local_y_axis_a);
        let s1 = (d + r_a).cross(perp);
        let s2 = r_b.cross(perp);

        let c1 = Vec2::new(perp.dot(d), pos_b.a - pos_a.a - self.reference_angle);

        let mut linear_error = c1.x.abs();
        let angular_error = c1.y.abs();

        let mut active = false;
        let mut c2 = 0.0;
        if self.enable_limit {
            let translation = axis.dot(d);
            if (self.upper_translation - self.lower_translation).abs() < 2.0 * LINEAR_SLOP {
                // Prevent large angular corrections
                c2 = (translation - self.lower_translation).clamp(-max_correction, max_correction);
                linear_error = linear_error.max((translation - self.lower_translation).abs());
                active = true;
            } else if translation <= self.lower_translation {
                // Prevent large linear corrections and allow some slop
                c2 = (translation - self.lower_translation + LINEAR_SLOP).clamp(-max_correction, 0.0);
                linear_error = linear_error.max(self.lower_translation - translation);
                active = true;
            } else if translation >= self.upper_translation {
                c2 = (translation - self.upper_translation - LINEAR_SLOP).clamp(0.0, max_correction);
                linear_error = linear_error.max(translation - self.upper_translation);
                active = true;
            }
        }

        let impulse = if active {
            let k = constraint_mass(m_a, m_b, i_a, i_b, s1, s2, a1, a2);
            k.solve33(-Vec3::new(c1.x, c1.y, c2))
        } else {
            let k11 = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
            let k12 = i_a * s1 + i_b * s2;
            let mut k22 = i_a + i_b;
            if k22 == 0.0 {
                k22 = 1.0;
            }
            let k = Mat22::new(Vec2::new(k11, k12), Vec2::new(k12, k22));
            let impulse1 = k.solve(-c1);
            Vec3::new(impulse1.x, impulse1.y, 0.0)
        };

        let p = perp * impulse.x + axis * impulse.z;
        let l_a = impulse.x * s1 + impulse.y + impulse.z * a1;
        let l_b = impulse.x * s2 + impulse.y + impulse.z * a2;

        pos_a.c -= p * m_a;
        pos_a.a -= i_a * l_a;
        pos_b.c += p * m_b;
        pos_b.a += i_b * l_b;

        data.positions[b.index_a] = pos_a;
        data.positions[b.index_b] = pos_b;

        linear_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }

    fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        (self.perp * self.impulse.x + self.axis * (self.motor_impulse + self.impulse.z)) * inv_dt
    }

    fn reaction_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.impulse.y
    }
}

/// Effective mass of the perpendicular, angular and axial rows.
#[allow(clippy::too_many_arguments)]
fn constraint_mass(m_a: f64, m_b: f64, i_a: f64, i_b: f64, s1: f64, s2: f64, a1: f64, a2: f64) -> Mat33 {
    let k11 = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
    let k12 = i_a * s1 + i_b * s2;
    let k13 = i_a * s1 * a1 + i_b * s2 * a2;
    let mut k22 = i_a + i_b;
    if k22 == 0.0 {
        // For bodies with fixed rotation
        k22 = 1.0;
    }
    let k23 = i_a * a1 + i_b * a2;
    let k33 = m_a + m_b + i_a * a1 * a1 + i_b * a2 * a2;

    Mat33 {
        ex: Vec3::new(k11, k12, k13),
        ey: Vec3::new(k12, k22, k23),
        ez: Vec3::new(k13, k23, k33),
    }
}
