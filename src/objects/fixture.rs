//! Fixtures bind a shape to a body and carry its material and filtering data.

use crate::collision::{BroadPhase, ProxyId, RayCastInput, RayCastOutput, AABB};
use crate::common::{Handle, Material, PhysicsError, Result};
use crate::math::{Transform, Vec2};
use crate::objects::rigid_body::BodyHandle;
use crate::shapes::{MassData, Shape, ShapeType};

pub type FixtureHandle = Handle<Fixture>;

/// Collision filtering data.
///
/// Two fixtures in the same non-zero group always collide (positive group)
/// or never collide (negative group). Otherwise each fixture's mask must
/// accept the other's category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    pub category_bits: u16,
    pub mask_bits: u16,
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Filter {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

impl Filter {
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }
        (self.mask_bits & other.category_bits) != 0 && (self.category_bits & other.mask_bits) != 0
    }
}

/// Broadphase user data: one fixture child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixtureChild {
    pub fixture: FixtureHandle,
    pub child_index: usize,
}

/// A broadphase leaf owned by a fixture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixtureProxy {
    /// Tight AABB covering the child's motion over the last step.
    pub aabb: AABB,
    pub child_index: usize,
    pub proxy_id: ProxyId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixtureDef {
    pub shape: Shape,
    pub material: Material,
    /// Sensors report overlap but generate no collision response.
    pub is_sensor: bool,
    pub filter: Filter,
    pub user_data: u64,
}

impl FixtureDef {
    pub fn new(shape: Shape) -> Self {
        FixtureDef {
            shape,
            material: Material::default(),
            is_sensor: false,
            filter: Filter::default(),
            user_data: 0,
        }
    }

    pub fn with_density(mut self, density: f64) -> Self {
        self.material.density = density;
        self
    }

    pub fn with_friction(mut self, friction: f64) -> Self {
        self.material.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.material.restitution = restitution;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.shape.validate()?;
        let m = &self.material;
        if !(m.density.is_finite() && m.density >= 0.0) {
            return Err(PhysicsError::InvalidDefinition(format!("fixture density {} must be >= 0", m.density)));
        }
        if !(m.friction.is_finite() && m.friction >= 0.0) {
            return Err(PhysicsError::InvalidDefinition(format!("fixture friction {} must be >= 0", m.friction)));
        }
        if !(m.restitution.is_finite() && m.restitution >= 0.0) {
            return Err(PhysicsError::InvalidDefinition(format!(
                "fixture restitution {} must be >= 0",
                m.restitution
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Fixture {
    pub(crate) body: BodyHandle,
    pub(crate) shape: Shape,
    pub(crate) material: Material,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    pub(crate) proxies: Vec<FixtureProxy>,
    pub(crate) user_data: u64,
}

impl Fixture {
    pub(crate) fn new(body: BodyHandle, def: &FixtureDef) -> Self {
        Fixture {
            body,
            shape: def.shape.clone(),
            material: def.material,
            is_sensor: def.is_sensor,
            filter: def.filter,
            proxies: Vec::with_capacity(def.shape.child_count()),
            user_data: def.user_data,
        }
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shape.shape_type()
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn density(&self) -> f64 {
        self.material.density
    }

    /// Takes effect on the body once its mass data is reset.
    pub fn set_density(&mut self, density: f64) {
        self.material.density = density.max(0.0);
    }

    pub fn friction(&self) -> f64 {
        self.material.friction
    }

    /// Existing contacts keep their mixed friction.
    pub fn set_friction(&mut self, friction: f64) {
        self.material.friction = friction;
    }

    pub fn restitution(&self) -> f64 {
        self.material.restitution
    }

    pub fn set_restitution(&mut self, restitution: f64) {
        self.material.restitution = restitution;
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn set_sensor(&mut self, flag: bool) {
        self.is_sensor = flag;
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    pub fn set_user_data(&mut self, data: u64) {
        self.user_data = data;
    }

    pub fn proxies(&self) -> &[FixtureProxy] {
        &self.proxies
    }

    pub fn mass_data(&self) -> MassData {
        self.shape.compute_mass(self.material.density)
    }

    /// Point test against the shape placed at `xf` (the body transform).
    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        self.shape.test_point(xf, p)
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform, child_index: usize) -> Option<RayCastOutput> {
        self.shape.ray_cast(input, xf, child_index)
    }

    /// Broadphase AABB of a child, as of the last synchronization.
    pub fn aabb(&self, child_index: usize) -> Option<AABB> {
        self.proxies.get(child_index).map(|proxy| proxy.aabb)
    }

    /// Inserts one proxy per shape child.
    pub(crate) fn create_proxies(
        &mut self,
        broad_phase: &mut BroadPhase<FixtureChild>,
        xf: &Transform,
        handle: FixtureHandle,
    ) {
        debug_assert!(self.proxies.is_empty());
        for child_index in 0..self.shape.child_count() {
            let aabb = self.shape.compute_aabb(xf, child_index);
            let proxy_id = broad_phase.create_proxy(&aabb, FixtureChild { fixture: handle, child_index });
            self.proxies.push(FixtureProxy {
                aabb,
                child_index,
                proxy_id,
            });
        }
    }

    pub(crate) fn destroy_proxies(&mut self, broad_phase: &mut BroadPhase<FixtureChild>) {
        for proxy in self.proxies.drain(..) {
            broad_phase.destroy_proxy(proxy.proxy_id);
        }
    }

    /// Moves every proxy to cover the motion from `xf1` to `xf2`.
    pub(crate) fn synchronize(&mut self, broad_phase: &mut BroadPhase<FixtureChild>, xf1: &Transform, xf2: &Transform) {
        let displacement = xf2.position - xf1.position;
        for proxy in &mut self.proxies {
            let aabb1 = self.shape.compute_aabb(xf1, proxy.child_index);
            let aabb2 = self.shape.compute_aabb(xf2, proxy.child_index);
            proxy.aabb = AABB::combine(&aabb1, &aabb2);
            broad_phase.move_proxy(proxy.proxy_id, &proxy.aabb, displacement);
        }
    }

    /// Queue every proxy so its pairs are re-examined on the next step.
    pub(crate) fn touch_proxies(&self, broad_phase: &mut BroadPhase<FixtureChild>) {
        for proxy in &self.proxies {
            broad_phase.touch_proxy(proxy.proxy_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Arena;
    use crate::objects::rigid_body::{BodyDef, RigidBody};
    use crate::shapes::{Chain, Circle};

    fn owner() -> BodyHandle {
        let mut bodies = Arena::new();
        bodies.insert(RigidBody::new(&BodyDef::default()))
    }

    #[test]
    fn test_filter_categories() {
        let player = Filter {
            category_bits: 0x0002,
            mask_bits: 0xFFFF & !0x0002,
            group_index: 0,
        };
        let wall = Filter::default();
        assert!(player.should_collide(&wall));
        assert!(wall.should_collide(&player));
        // Players do not collide with each other.
        assert!(!player.should_collide(&player));
    }

    #[test]
    fn test_filter_groups_override_masks() {
        let mut a = Filter::default();
        let mut b = Filter::default();
        a.group_index = -3;
        b.group_index = -3;
        assert!(!a.should_collide(&b));

        a.group_index = 4;
        b.group_index = 4;
        a.mask_bits = 0;
        assert!(a.should_collide(&b));

        // Different groups fall back to category rules.
        b.group_index = 5;
        assert!(!a.should_collide(&b));
    }

    #[test]
    fn test_fixture_def_validation() {
        let shape: Shape = Circle::new(1.0).unwrap().into();
        assert!(FixtureDef::new(shape.clone()).with_density(1.0).validate().is_ok());
        assert!(FixtureDef::new(shape.clone()).with_density(-1.0).validate().is_err());
        assert!(FixtureDef::new(shape.clone()).with_friction(-0.1).validate().is_err());
        assert!(FixtureDef::new(shape).with_restitution(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_fixture_def_checks_hand_built_shapes() {
        let negative = Shape::Circle(Circle { position: Vec2::ZERO, radius: -1.0 });
        assert!(matches!(
            FixtureDef::new(negative).validate(),
            Err(PhysicsError::InvalidShape(_))
        ));

        let lone = Shape::Chain(Chain {
            vertices: vec![Vec2::ZERO],
            prev_vertex: None,
            next_vertex: None,
            is_loop: false,
            radius: 0.0,
        });
        assert!(FixtureDef::new(lone).validate().is_err());
    }

    #[test]
    fn test_proxies_per_child() {
        let chain = Chain::new_chain(vec![Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(2.0, 1.0)]).unwrap();
        let def = FixtureDef::new(chain.into());
        let mut fixtures = Arena::new();
        let handle = fixtures.insert(Fixture::new(owner(), &def));

        let mut bp = BroadPhase::default();
        fixtures[handle].create_proxies(&mut bp, &Transform::identity(), handle);
        assert_eq!(fixtures[handle].proxies().len(), 2);
        assert_eq!(bp.get_proxy_count(), 2);
        let child = bp.get_user_data(fixtures[handle].proxies()[1].proxy_id).unwrap();
        assert_eq!(child, FixtureChild { fixture: handle, child_index: 1 });

        fixtures[handle].destroy_proxies(&mut bp);
        assert_eq!(bp.get_proxy_count(), 0);
        assert!(fixtures[handle].proxies().is_empty());
    }

    #[test]
    fn test_synchronize_covers_both_poses() {
        let def = FixtureDef::new(Circle::new(0.5).unwrap().into());
        let mut fixtures = Arena::new();
        let handle = fixtures.insert(Fixture::new(owner(), &def));
        let mut bp = BroadPhase::default();
        fixtures[handle].create_proxies(&mut bp, &Transform::identity(), handle);

        let xf2 = Transform::new(Vec2::new(3.0, 0.0), 0.0);
        fixtures[handle].synchronize(&mut bp, &Transform::identity(), &xf2);
        let aabb = fixtures[handle].aabb(0).unwrap();
        assert_eq!(aabb.min, Vec2::new(-0.5, -0.5));
        assert_eq!(aabb.max, Vec2::new(3.5, 0.5));
        assert!(bp.get_fat_aabb(fixtures[handle].proxies()[0].proxy_id).contains(&aabb));
    }
}
