//! Joints between pairs of bodies, solved alongside contacts.

use crate::common::{Arena, Handle, PhysicsError, Result, Settings};
use crate::math::{Mat33, Vec2, Vec3};
use crate::objects::rigid_body::{BodyHandle, RigidBody};
use crate::world::time_step::{Position, TimeStep, Velocity};

pub mod distance_joint;
pub mod prismatic_joint;
pub mod revolute_joint;
pub mod weld_joint;

// Re-export the joint types for easier access
pub use distance_joint::{DistanceJoint, DistanceJointDef};
pub use prismatic_joint::{PrismaticJoint, PrismaticJointDef};
pub use revolute_joint::{RevoluteJoint, RevoluteJointDef};
pub use weld_joint::{WeldJoint, WeldJointDef};

pub type JointHandle = Handle<Joint>;

/// Island-local view of the bodies being solved.
pub struct SolverData<'a> {
    pub step: TimeStep,
    pub settings: &'a Settings,
    pub positions: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
}

/// Solver data of a joint's two bodies, gathered when the joint's island
/// starts solving.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointBodies {
    pub index_a: usize,
    pub index_b: usize,
    pub local_center_a: Vec2,
    pub local_center_b: Vec2,
    pub inv_mass_a: f64,
    pub inv_mass_b: f64,
    pub inv_i_a: f64,
    pub inv_i_b: f64,
}

impl JointBodies {
    fn gather(body_a: &RigidBody, body_b: &RigidBody) -> Self {
        JointBodies {
            index_a: body_a.island_index,
            index_b: body_b.island_index,
            local_center_a: body_a.sweep.local_center,
            local_center_b: body_b.sweep.local_center,
            inv_mass_a: body_a.inv_mass,
            inv_mass_b: body_b.inv_mass,
            inv_i_a: body_a.inv_inertia,
            inv_i_b: body_b.inv_inertia,
        }
    }
}

/// State of a joint limit for the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitState {
    #[default]
    Inactive,
    AtLower,
    AtUpper,
    /// Lower and upper limits coincide.
    Equal,
}

/// A trait representing a joint's velocity and position constraints.
///
/// Implementations read and write the island arrays in [`SolverData`] at the
/// indices given by [`JointBodies`].
pub trait Constraint {
    /// Computes effective masses and applies warm-start impulses.
    fn init_velocity_constraints(&mut self, bodies: &JointBodies, data: &mut SolverData<'_>);

    fn solve_velocity_constraints(&mut self, bodies: &JointBodies, data: &mut SolverData<'_>);

    /// Returns true when the position error is within tolerance.
    fn solve_position_constraints(&mut self, bodies: &JointBodies, data: &mut SolverData<'_>) -> bool;

    /// Anchor on body A, in body A's frame.
    fn local_anchor_a(&self) -> Vec2;

    fn local_anchor_b(&self) -> Vec2;

    /// Reaction force on body B at the anchor, in newtons.
    fn reaction_force(&self, inv_dt: f64) -> Vec2;

    /// Reaction torque on body B, in N*m.
    fn reaction_torque(&self, inv_dt: f64) -> f64;
}

/// Type-specific joint data.
#[derive(Debug, Clone, PartialEq)]
pub enum JointKind {
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Prismatic(PrismaticJoint),
    Weld(WeldJoint),
}

impl JointKind {
    pub fn as_constraint(&self) -> &dyn Constraint {
        match self {
            JointKind::Distance(joint) => joint,
            JointKind::Revolute(joint) => joint,
            JointKind::Prismatic(joint) => joint,
            JointKind::Weld(joint) => joint,
        }
    }

    pub fn as_constraint_mut(&mut self) -> &mut dyn Constraint {
        match self {
            JointKind::Distance(joint) => joint,
            JointKind::Revolute(joint) => joint,
            JointKind::Prismatic(joint) => joint,
            JointKind::Weld(joint) => joint,
        }
    }
}

/// Type-specific joint definition.
#[derive(Debug, Clone, PartialEq)]
pub enum JointDefKind {
    Distance(DistanceJointDef),
    Revolute(RevoluteJointDef),
    Prismatic(PrismaticJointDef),
    Weld(WeldJointDef),
}

impl From<DistanceJointDef> for JointDefKind {
    fn from(def: DistanceJointDef) -> Self {
        JointDefKind::Distance(def)
    }
}

impl From<RevoluteJointDef> for JointDefKind {
    fn from(def: RevoluteJointDef) -> Self {
        JointDefKind::Revolute(def)
    }
}

impl From<PrismaticJointDef> for JointDefKind {
    fn from(def: PrismaticJointDef) -> Self {
        JointDefKind::Prismatic(def)
    }
}

impl From<WeldJointDef> for JointDefKind {
    fn from(def: WeldJointDef) -> Self {
        JointDefKind::Weld(def)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Let the two bodies keep colliding with each other.
    pub collide_connected: bool,
    pub user_data: u64,
    pub kind: JointDefKind,
}

impl JointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, kind: impl Into<JointDefKind>) -> Self {
        JointDef {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            kind: kind.into(),
        }
    }

    pub fn with_collide_connected(mut self, flag: bool) -> Self {
        self.collide_connected = flag;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.body_a == self.body_b {
            return Err(PhysicsError::InvalidDefinition("joint must connect two different bodies".into()));
        }
        match &self.kind {
            JointDefKind::Distance(def) => def.validate(),
            JointDefKind::Revolute(def) => def.validate(),
            JointDefKind::Prismatic(def) => def.validate(),
            JointDefKind::Weld(def) => def.validate(),
        }
    }
}

/// A joint: the common header plus its type-specific constraint.
#[derive(Debug, Clone)]
pub struct Joint {
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    pub(crate) collide_connected: bool,
    pub(crate) island_flag: bool,
    pub(crate) user_data: u64,
    pub(crate) kind: JointKind,
    solver_bodies: JointBodies,
}

impl Joint {
    pub(crate) fn new(def: &JointDef) -> Result<Self> {
        def.validate()?;
        let kind = match &def.kind {
            JointDefKind::Distance(d) => JointKind::Distance(DistanceJoint::new(d)),
            JointDefKind::Revolute(d) => JointKind::Revolute(RevoluteJoint::new(d)),
            JointDefKind::Prismatic(d) => JointKind::Prismatic(PrismaticJoint::new(d)),
            JointDefKind::Weld(d) => JointKind::Weld(WeldJoint::new(d)),
        };
        Ok(Joint {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            island_flag: false,
            user_data: def.user_data,
            kind,
            solver_bodies: JointBodies::default(),
        })
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    pub fn set_user_data(&mut self, data: u64) {
        self.user_data = data;
    }

    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    /// World anchor on body A.
    pub fn anchor_a(&self, body_a: &RigidBody) -> Vec2 {
        body_a.world_point(self.kind.as_constraint().local_anchor_a())
    }

    /// World anchor on body B.
    pub fn anchor_b(&self, body_b: &RigidBody) -> Vec2 {
        body_b.world_point(self.kind.as_constraint().local_anchor_b())
    }

    pub fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        self.kind.as_constraint().reaction_force(inv_dt)
    }

    pub fn reaction_torque(&self, inv_dt: f64) -> f64 {
        self.kind.as_constraint().reaction_torque(inv_dt)
    }

    pub(crate) fn init_velocity_constraints(&mut self, bodies: &Arena<RigidBody>, data: &mut SolverData<'_>) {
        self.solver_bodies = JointBodies::gather(&bodies[self.body_a], &bodies[self.body_b]);
        let solver_bodies = self.solver_bodies;
        self.kind.as_constraint_mut().init_velocity_constraints(&solver_bodies, data);
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let solver_bodies = self.solver_bodies;
        self.kind.as_constraint_mut().solve_velocity_constraints(&solver_bodies, data);
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let solver_bodies = self.solver_bodies;
        self.kind.as_constraint_mut().solve_position_constraints(&solver_bodies, data)
    }
}

/// Effective mass matrix of a point-to-point constraint plus a relative
/// rotation constraint, shared by revolute and weld joints.
pub(crate) fn point_angle_mass(b: &JointBodies, r_a: Vec2, r_b: Vec2) -> Mat33 {
    let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);
    let ex = Vec3::new(
        m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b,
        -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b,
        -r_a.y * i_a - r_b.y * i_b,
    );
    let ey = Vec3::new(
        ex.y,
        m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b,
        r_a.x * i_a + r_b.x * i_b,
    );
    let ez = Vec3::new(ex.z, ey.z, i_a + i_b);
    Mat33 { ex, ey, ez }
}

/// Spring softening for a constraint of effective `mass` and error `c`.
/// Returns `(gamma, bias)`; zero frequency gives a rigid constraint.
pub(crate) fn soft_constraint(mass: f64, frequency_hz: f64, damping_ratio: f64, dt: f64, c: f64) -> (f64, f64) {
    let omega = 2.0 * std::f64::consts::PI * frequency_hz;
    // Damping coefficient and spring stiffness
    let d = 2.0 * mass * damping_ratio * omega;
    let k = mass * omega * omega;

    let mut gamma = dt * (d + dt * k);
    gamma = if gamma != 0.0 { 1.0 / gamma } else { 0.0 };
    let bias = c * dt * k * gamma;
    (gamma, bias)
}

pub(crate) fn check_finite(values: &[f64], what: &str) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(PhysicsError::InvalidDefinition(format!("{what} must be finite")))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Two bodies in island slots 0 and 1.
    pub struct Rig {
        pub bodies: JointBodies,
        pub positions: Vec<Position>,
        pub velocities: Vec<Velocity>,
        pub settings: Settings,
        pub step: TimeStep,
    }

    impl Rig {
        pub fn new(c_a: Vec2, c_b: Vec2, inv_i: f64) -> Self {
            Rig {
                bodies: JointBodies {
                    index_a: 0,
                    index_b: 1,
                    local_center_a: Vec2::ZERO,
                    local_center_b: Vec2::ZERO,
                    inv_mass_a: 1.0,
                    inv_mass_b: 1.0,
                    inv_i_a: inv_i,
                    inv_i_b: inv_i,
                },
                positions: vec![Position { c: c_a, a: 0.0 }, Position { c: c_b, a: 0.0 }],
                velocities: vec![Velocity::default(); 2],
                settings: Settings::default(),
                step: TimeStep::new(1.0 / 60.0, 8, 3),
            }
        }

        /// Pins body A in place.
        pub fn fix_a(mut self) -> Self {
            self.bodies.inv_mass_a = 0.0;
            self.bodies.inv_i_a = 0.0;
            self
        }

        pub fn init(&mut self, joint: &mut dyn Constraint) {
            let mut data = SolverData {
                step: self.step,
                settings: &self.settings,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            };
            joint.init_velocity_constraints(&self.bodies, &mut data);
        }

        pub fn solve_velocity(&mut self, joint: &mut dyn Constraint, iterations: usize) {
            let mut data = SolverData {
                step: self.step,
                settings: &self.settings,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            };
            for _ in 0..iterations {
                joint.solve_velocity_constraints(&self.bodies, &mut data);
            }
        }

        /// Runs position iterations until solved. Returns the iteration count.
        pub fn solve_position(&mut self, joint: &mut dyn Constraint, max_iterations: usize) -> Option<usize> {
            let mut data = SolverData {
                step: self.step,
                settings: &self.settings,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            };
            (1..=max_iterations).find(|_| joint.solve_position_constraints(&self.bodies, &mut data))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::rigid_body::BodyDef;

    #[test]
    fn test_joint_def_rejects_same_body() {
        let mut bodies = Arena::new();
        let a = bodies.insert(RigidBody::new(&BodyDef::default()));
        let b = bodies.insert(RigidBody::new(&BodyDef::default()));
        let def = JointDef::new(a, a, RevoluteJointDef::default());
        assert!(matches!(Joint::new(&def), Err(PhysicsError::InvalidDefinition(_))));

        let joint = Joint::new(&JointDef::new(a, b, RevoluteJointDef::default())).unwrap();
        assert!(!joint.collide_connected());
        assert!(matches!(joint.kind(), JointKind::Revolute(_)));
    }

    #[test]
    fn test_point_angle_mass_is_symmetric() {
        let bodies = JointBodies {
            inv_mass_a: 1.0,
            inv_mass_b: 0.5,
            inv_i_a: 2.0,
            inv_i_b: 3.0,
            ..Default::default()
        };
        let k = point_angle_mass(&bodies, Vec2::new(0.3, -0.2), Vec2::new(-0.1, 0.4));
        assert_eq!(k.ex.y, k.ey.x);
        assert_eq!(k.ex.z, k.ez.x);
        assert_eq!(k.ey.z, k.ez.y);
        assert_eq!(k.ez.z, 5.0);
    }

    #[test]
    fn test_soft_constraint_rigid_when_no_frequency() {
        let (gamma, bias) = soft_constraint(2.0, 0.0, 0.7, 1.0 / 60.0, 0.5);
        assert_eq!(gamma, 0.0);
        assert_eq!(bias, 0.0);

        let (gamma, bias) = soft_constraint(2.0, 4.0, 0.7, 1.0 / 60.0, 0.5);
        assert!(gamma > 0.0);
        assert!(bias > 0.0);
    }
}
