use super::{check_finite, point_angle_mass, Constraint, JointBodies, LimitState, SolverData};
use crate::common::settings::{ANGULAR_SLOP, LINEAR_SLOP};
use crate::common::{PhysicsError, Result};
use crate::math::{Mat22, Mat33, Rot, Vec2, Vec3};
use crate::objects::rigid_body::RigidBody;

/// Definition of a [`RevoluteJoint`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RevoluteJointDef {
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Body B angle minus body A angle in the reference state.
    pub reference_angle: f64,
    pub enable_limit: bool,
    pub lower_angle: f64,
    pub upper_angle: f64,
    pub enable_motor: bool,
    /// Desired relative angular speed, in rad/s.
    pub motor_speed: f64,
    pub max_motor_torque: f64,
}

impl RevoluteJointDef {
    /// Builds the definition from a shared world anchor and the current body poses.
    pub fn initialize(body_a: &RigidBody, body_b: &RigidBody, anchor: Vec2) -> Self {
        RevoluteJointDef {
            local_anchor_a: body_a.local_point(anchor),
            local_anchor_b: body_b.local_point(anchor),
            reference_angle: body_b.angle() - body_a.angle(),
            ..Default::default()
        }
    }

    pub fn with_limits(mut self, lower: f64, upper: f64) -> Self {
        self.enable_limit = true;
        self.lower_angle = lower;
        self.upper_angle = upper;
        self
    }

    pub fn with_motor(mut self, speed: f64, max_torque: f64) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_finite(
            &[
                self.local_anchor_a.x,
                self.local_anchor_a.y,
                self.local_anchor_b.x,
                self.local_anchor_b.y,
                self.reference_angle,
                self.lower_angle,
                self.upper_angle,
                self.motor_speed,
                self.max_motor_torque,
            ],
            "revolute joint parameters",
        )?;
        if self.lower_angle > self.upper_angle {
            return Err(PhysicsError::InvalidDefinition(format!(
                "revolute joint lower angle {} exceeds upper angle {}",
                self.lower_angle, self.upper_angle
            )));
        }
        if self.max_motor_torque < 0.0 {
            return Err(PhysicsError::InvalidDefinition("max motor torque must be non-negative".into()));
        }
        Ok(())
    }
}

/// Pins two bodies at a shared anchor, leaving relative rotation free.
/// Supports an angle limit and a motor with bounded torque.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevoluteJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    reference_angle: f64,
    enable_limit: bool,
    lower_angle: f64,
    upper_angle: f64,
    enable_motor: bool,
    motor_speed: f64,
    max_motor_torque: f64,

    // Solver state. The z component of `impulse` is the limit impulse.
    impulse: Vec3,
    motor_impulse: f64,
    r_a: Vec2,
    r_b: Vec2,
    mass: Mat33,
    motor_mass: f64,
    limit_state: LimitState,
}

impl RevoluteJoint {
    pub(crate) fn new(def: &RevoluteJointDef) -> Self {
        RevoluteJoint {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_angle: def.lower_angle,
            upper_angle: def.upper_angle,
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_torque: def.max_motor_torque,
            impulse: Vec3::ZERO,
            motor_impulse: 0.0,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat33::default(),
            motor_mass: 0.0,
            limit_state: LimitState::Inactive,
        }
    }

    pub fn reference_angle(&self) -> f64 {
        self.reference_angle
    }

    /// Current joint angle, in radians.
    pub fn joint_angle(&self, body_a: &RigidBody, body_b: &RigidBody) -> f64 {
        body_b.sweep.a - body_a.sweep.a - self.reference_angle
    }

    /// Current relative angular speed, in rad/s.
    pub fn joint_speed(&self, body_a: &RigidBody, body_b: &RigidBody) -> f64 {
        body_b.angular_velocity - body_a.angular_velocity
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
        self.lower_angle
    }

    pub fn upper_limit(&self) -> f64 {
        self.upper_angle
    }

    pub fn set_limits(&mut self, lower: f64, upper: f64) -> Result<()> {
        if lower > upper {
            return Err(PhysicsError::InvalidDefinition(format!(
                "revolute joint lower angle {lower} exceeds upper angle {upper}"
            )));
        }
        if lower != self.lower_angle || upper != self.upper_angle {
            self.impulse.z = 0.0;
            self.lower_angle = lower;
            self.upper_angle = upper;
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

    pub fn max_motor_torque(&self) -> f64 {
        self.max_motor_torque
    }

    pub fn set_max_motor_torque(&mut self, torque: f64) {
        self.max_motor_torque = torque.max(0.0);
    }

    /// Motor torque applied over the last step, in N*m.
    pub fn motor_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.motor_impulse
    }

    pub fn limit_state(&self) -> LimitState {
        self.limit_state
    }
}

impl Constraint for RevoluteJoint {
    fn init_velocity_constraints(&mut self, b: &JointBodies, data: &mut SolverData<'_>) {
        let a_a = data.positions[b.index_a].a;
        let a_b = data.positions[b.index_b].a;
        let mut vel_a = data.velocities[b.index_a];
        let mut vel_b = data.velocities[b.index_b];

        self.r_a = Rot::new(a_a).apply(self.local_anchor_a - b.local_center_a);
        self.r_b = Rot::new(a_b).apply(self.local_anchor_b - b.local_center_b);

        // J = [-I -r1_skew I r2_skew]
        //     [ 0       -1 0       1]
        self.mass = point_angle_mass(b, self.r_a, self.r_b);

        let (i_a, i_b) = (b.inv_i_a, b.inv_i_b);
        let fixed_rotation = i_a + i_b == 0.0;

        self.motor_mass = i_a + i_b;
        if self.motor_mass > 0.0 {
            self.motor_mass = 1.0 / self.motor_mass;
        }

        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = 0.0;
        }

        if self.enable_limit && !fixed_rotation {
            let joint_angle = a_b - a_a - self.reference_angle;
            if (self.upper_angle - self.lower_angle).abs() < 2.0 * ANGULAR_SLOP {
                self.limit_state = LimitState::Equal;
            } else if joint_angle <= self.lower_angle {
                if self.limit_state != LimitState::AtLower {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtLower;
            } else if joint_angle >= self.upper_angle {
                if self.limit_state != LimitState::AtUpper {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtUpper;
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
        }

        if data.step.warm_starting {
            // Scale impulses to support a variable time step
            self.impulse *= data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let p = self.impulse.xy();
            let angular = self.motor_impulse + self.impulse.z;
            vel_a.v -= p * b.inv_mass_a;
            vel_a.w -= i_a * (self.r_a.cross(p) + angular);
            vel_b.v += p * b.inv_mass_b;
            vel_b.w += i_b * (self.r_b.cross(p) + angular);
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
        let fixed_rotation = i_a + i_b == 0.0;

        // Solve the motor constraint
        if self.enable_motor && self.limit_state != LimitState::Equal && !fixed_rotation {
            let cdot = vel_b.w - vel_a.w - self.motor_speed;
            let impulse = -self.motor_mass * cdot;
            let old_impulse = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_torque;
            self.motor_impulse = (old_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old_impulse;

            vel_a.w -= i_a * impulse;
            vel_b.w += i_b * impulse;
        }

        let cdot1 = vel_b.v + Vec2::scalar_cross(vel_b.w, self.r_b)
            - vel_a.v
            - Vec2::scalar_cross(vel_a.w, self.r_a);

        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            // Solve the point and limit constraints together
            let cdot2 = vel_b.w - vel_a.w;
            let cdot = Vec3::new(cdot1.x, cdot1.y, cdot2);
            let mut impulse = -self.mass.solve33(cdot);

            let clamp_lower = self.limit_state == LimitState::AtLower && self.impulse.z + impulse.z < 0.0;
            let clamp_upper = self.limit_state == LimitState::AtUpper && self.impulse.z + impulse.z > 0.0;

            if clamp_lower || clamp_upper {
                // The accumulated limit impulse would change sign. Release it and
                // re-solve the point constraint alone.
                let rhs = -cdot1 + Vec2::new(self.mass.ez.x, self.mass.ez.y) * self.impulse.z;
                let reduced = self.mass.solve22(rhs);
                impulse = Vec3::new(reduced.x, reduced.y, -self.impulse.z);
                self.impulse.x += reduced.x;
                self.impulse.y += reduced.y;
                self.impulse.z = 0.0;
            } else {
                self.impulse += impulse;
            }

            let p = impulse.xy();
            vel_a.v -= p * m_a;
            vel_a.w -= i_a * (self.r_a.cross(p) + impulse.z);
            vel_b.v += p * m_b;
            vel_b.w += i_b * (self.r_b.cross(p) + impulse.z);
        } else {
            // Solve the point constraint
            let impulse = self.mass.solve22(-cdot1);
            self.impulse.x += impulse.x;
            self.impulse.y += impulse.y;

            vel_a.v -= impulse * m_a;
            vel_a.w -= i_a * self.r_a.cross(impulse);
            vel_b.v += impulse * m_b;
            vel_b.w += i_b * self.r_b.cross(impulse);
        }

        data.velocities[b.index_a] = vel_a;
        data.velocities[b.index_b] = vel_b;
    }

    fn solve_position_constraints(&mut self, b: &JointBodies, data: &mut SolverData<'_>) -> bool {
        let mut pos_a = data.positions[b.index_a];
        let mut pos_b = data.positions[b.index_b];
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);
        let fixed_rotation = i_a + i_b == 0.0;
        let max_angular = data.settings.max_angular_correction;

        let mut angular_error = 0.0;

        // Solve the angular limit constraint
        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let angle = pos_b.a - pos_a.a - self.reference_angle;
            let c = match self.limit_state {
                LimitState::Equal => {
                    let c = (angle - self.lower_angle).clamp(-max_angular, max_angular);
                    angular_error = c.abs();
                    c
                }
                LimitState::AtLower => {
                    let c = angle - self.lower_angle;
                    angular_error = -c;
                    // Prevent large angular corrections and allow some slop
                    (c + ANGULAR_SLOP).clamp(-max_angular, 0.0)
                }
                LimitState::AtUpper => {
                    let c = angle - self.upper_angle;
                    angular_error = c;
                    (c - ANGULAR_SLOP).clamp(0.0, max_angular)
                }
                LimitState::Inactive => 0.0,
            };
            let limit_impulse = -self.motor_mass * c;
            pos_a.a -= i_a * limit_impulse;
            pos_b.a += i_b * limit_impulse;
        }

        // Solve the point-to-point constraint
        let r_a = Rot::new(pos_a.a).apply(self.local_anchor_a - b.local_center_a);
        let r_b = Rot::new(pos_b.a).apply(self.local_anchor_b - b.local_center_b);

        let c = pos_b.c + r_b - pos_a.c - r_a;
        let position_error = c.magnitude();

        let k = Mat22::new(
            Vec2::new(
                m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y,
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
            ),
            Vec2::new(
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x,
            ),
        );
        let impulse = -k.solve(c);

        pos_a.c -= impulse * m_a;
        pos_a.a -= i_a * r_a.cross(impulse);
        pos_b.c += impulse * m_b;
        pos_b.a += i_b * r_b.cross(impulse);

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::test_support::Rig;
    use approx::assert_relative_eq;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_revolute_joint_brings_anchors_together() {
        // Bodies at (0,0) and (4,0), both anchored at their centers.
        let mut rig = Rig::new(Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0), 0.0);
        let mut joint = RevoluteJoint::new(&RevoluteJointDef::default());
        rig.init(&mut joint);

        // Without rotation the point constraint is linear and solved in one pass.
        rig.solve_position(&mut joint, 2);
        assert_relative_eq!(rig.positions[0].c.x, 2.0, epsilon = EPSILON);
        assert_relative_eq!(rig.positions[1].c.x, 2.0, epsilon = EPSILON);
    }

    #[test]
    fn test_revolute_joint_with_offset_anchor_converges() {
        let mut rig = Rig::new(Vec2::new(0.0, 0.0), Vec2::new(1.3, 0.4), 1.0);
        rig.positions[1].a = 0.3;
        let mut joint = RevoluteJoint::new(&RevoluteJointDef {
            local_anchor_a: Vec2::new(0.5, 0.0),
            local_anchor_b: Vec2::new(-0.5, 0.0),
            ..Default::default()
        });
        rig.init(&mut joint);
        assert!(rig.solve_position(&mut joint, 30).is_some());

        let anchor_a = rig.positions[0].c + Rot::new(rig.positions[0].a).apply(Vec2::new(0.5, 0.0));
        let anchor_b = rig.positions[1].c + Rot::new(rig.positions[1].a).apply(Vec2::new(-0.5, 0.0));
        assert!(anchor_a.distance(anchor_b) <= LINEAR_SLOP);
    }

    #[test]
    fn test_revolute_joint_cancels_relative_anchor_velocity() {
        let mut rig = Rig::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), 1.0).fix_a();
        rig.velocities[1].v = Vec2::new(0.0, -2.0);
        let mut joint = RevoluteJoint::new(&RevoluteJointDef {
            local_anchor_a: Vec2::new(0.0, 0.0),
            local_anchor_b: Vec2::new(-1.0, 0.0),
            ..Default::default()
        });
        rig.init(&mut joint);
        rig.solve_velocity(&mut joint, 1);

        // The anchor on B stays put. B swings around it.
        let vel_b = rig.velocities[1];
        let anchor_velocity = vel_b.v + Vec2::scalar_cross(vel_b.w, Vec2::new(-1.0, 0.0));
        assert_relative_eq!(anchor_velocity.x, 0.0, epsilon = EPSILON);
        assert_relative_eq!(anchor_velocity.y, 0.0, epsilon = EPSILON);
        // B sits right of the pivot and moves down, so it turns clockwise.
        assert_relative_eq!(vel_b.w, -1.0, epsilon = EPSILON);
    }

    #[test]
    fn test_revolute_motor_respects_max_torque() {
        let mut rig = Rig::new(Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0), 1.0).fix_a();
        let mut joint = RevoluteJoint::new(&RevoluteJointDef::default().with_motor(10.0, 6.0));
        rig.init(&mut joint);
        rig.solve_velocity(&mut joint, 8);

        // Torque 6 over one step on unit inertia gives at most 6 * dt of speed.
        let max_speed = 6.0 * rig.step.dt;
        assert_relative_eq!(rig.velocities[1].w, max_speed, epsilon = EPSILON);
        assert_relative_eq!(joint.motor_torque(rig.step.inv_dt), 6.0, epsilon = 1e-6);

        // A strong motor reaches the target speed.
        let mut rig = Rig::new(Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0), 1.0).fix_a();
        let mut joint = RevoluteJoint::new(&RevoluteJointDef::default().with_motor(1.0, 1000.0));
        rig.init(&mut joint);
        rig.solve_velocity(&mut joint, 1);
        assert_relative_eq!(rig.velocities[1].w, 1.0, epsilon = EPSILON);
    }

    #[test]
    fn test_revolute_limit_stops_rotation_past_upper() {
        let mut rig = Rig::new(Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0), 1.0).fix_a();
        rig.positions[1].a = 0.5;
        rig.velocities[1].w = 3.0;
        let mut joint = RevoluteJoint::new(&RevoluteJointDef::default().with_limits(-0.25, 0.25));
        rig.init(&mut joint);
        assert_eq!(joint.limit_state(), LimitState::AtUpper);

        rig.solve_velocity(&mut joint, 4);
        assert!(rig.velocities[1].w <= EPSILON);

        // Corrections stop once the angle is within the slop of the limit.
        rig.solve_position(&mut joint, 20);
        let angle = rig.positions[1].a;
        assert!(angle >= 0.25);
        assert!(angle <= 0.25 + ANGULAR_SLOP + EPSILON);
    }

    #[test]
    fn test_revolute_limit_releases_when_moving_away() {
        let mut rig = Rig::new(Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0), 1.0).fix_a();
        rig.positions[1].a = 0.3;
        rig.velocities[1].w = -2.0;
        let mut joint = RevoluteJoint::new(&RevoluteJointDef::default().with_limits(-0.25, 0.25));
        rig.init(&mut joint);
        rig.solve_velocity(&mut joint, 4);

        // The limit may only push, so rotation back inside the range is kept.
        assert_relative_eq!(rig.velocities[1].w, -2.0, epsilon = EPSILON);
        assert_relative_eq!(joint.reaction_torque(rig.step.inv_dt), 0.0, epsilon = EPSILON);
    }

    #[test]
    fn test_revolute_def_validation() {
        assert!(RevoluteJointDef::default().with_limits(-1.0, 1.0).validate().is_ok());
        let inverted = RevoluteJointDef::default().with_limits(1.0, -1.0);
        assert!(matches!(inverted.validate(), Err(PhysicsError::InvalidDefinition(_))));

        let mut joint = RevoluteJoint::new(&RevoluteJointDef::default());
        assert!(joint.set_limits(0.5, 0.1).is_err());
        assert!(joint.set_limits(-0.5, 0.5).is_ok());
        assert_eq!(joint.upper_limit(), 0.5);
    }
}
