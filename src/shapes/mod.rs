pub mod chain;
pub mod circle;
pub mod edge;
pub mod polygon;

pub use chain::Chain;
pub use circle::Circle;
pub use edge::Edge;
pub use polygon::Polygon;

use crate::collision::aabb::AABB;
use crate::collision::ray::{RayCastInput, RayCastOutput};
use crate::common::error::{PhysicsError, Result};
use crate::math::{Transform, Vec2};

/// Mass properties of a shape. `inertia` is about the shape's local origin,
/// not about `center`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MassData {
    pub mass: f64,
    pub center: Vec2,
    pub inertia: f64,
}

/// Discriminant of [`Shape`], used to index the collision dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeType {
    Circle,
    Edge,
    Polygon,
    Chain,
}

/// Enum representing the geometric shape attached to a fixture.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle(Circle),
    Polygon(Polygon),
    Edge(Edge),
    Chain(Chain),
}

impl Shape {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Circle(_) => ShapeType::Circle,
            Shape::Polygon(_) => ShapeType::Polygon,
            Shape::Edge(_) => ShapeType::Edge,
            Shape::Chain(_) => ShapeType::Chain,
        }
    }

    /// Skin radius. For circles this is the circle radius.
    pub fn radius(&self) -> f64 {
        match self {
            Shape::Circle(c) => c.radius,
            Shape::Polygon(p) => p.radius,
            Shape::Edge(e) => e.radius,
            Shape::Chain(c) => c.radius,
        }
    }

    /// Number of broadphase children. Only chains have more than one.
    pub fn child_count(&self) -> usize {
        match self {
            Shape::Chain(c) => c.child_count(),
            _ => 1,
        }
    }

    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        match self {
            Shape::Circle(c) => c.test_point(xf, p),
            Shape::Polygon(poly) => poly.test_point(xf, p),
            Shape::Edge(e) => e.test_point(xf, p),
            Shape::Chain(c) => c.test_point(xf, p),
        }
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform, child: usize) -> Option<RayCastOutput> {
        match self {
            Shape::Circle(c) => c.ray_cast(input, xf),
            Shape::Polygon(p) => p.ray_cast(input, xf),
            Shape::Edge(e) => e.ray_cast(input, xf),
            Shape::Chain(c) => c.ray_cast(input, xf, child),
        }
    }

    pub fn compute_aabb(&self, xf: &Transform, child: usize) -> AABB {
        match self {
            Shape::Circle(c) => c.compute_aabb(xf),
            Shape::Polygon(p) => p.compute_aabb(xf),
            Shape::Edge(e) => e.compute_aabb(xf),
            Shape::Chain(c) => c.compute_aabb(xf, child),
        }
    }

    pub fn compute_mass(&self, density: f64) -> MassData {
        match self {
            Shape::Circle(c) => c.compute_mass(density),
            Shape::Polygon(p) => p.compute_mass(density),
            Shape::Edge(e) => e.compute_mass(density),
            Shape::Chain(c) => c.compute_mass(density),
        }
    }

    /// Re-checks the geometry. Shapes have public fields, so one assembled
    /// by hand can skip the checks its constructors run.
    pub fn validate(&self) -> Result<()> {
        match self {
            Shape::Circle(c) => c.validate(),
            Shape::Polygon(p) => p.validate(),
            Shape::Edge(e) => e.validate(),
            Shape::Chain(c) => c.validate(),
        }
    }
}

fn validate_skin(radius: f64) -> Result<()> {
    if radius.is_finite() && radius >= 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::InvalidShape(format!(
            "skin radius must be finite and non-negative, got {radius}"
        )))
    }
}

fn validate_ghosts(ghosts: [Option<Vec2>; 2]) -> Result<()> {
    if ghosts.iter().flatten().all(|v| v.is_valid()) {
        Ok(())
    } else {
        Err(PhysicsError::InvalidShape("ghost vertex is not finite".into()))
    }
}

impl From<Circle> for Shape {
    fn from(c: Circle) -> Self {
        Shape::Circle(c)
    }
}

impl From<Polygon> for Shape {
    fn from(p: Polygon) -> Self {
        Shape::Polygon(p)
    }
}

impl From<Edge> for Shape {
    fn from(e: Edge) -> Self {
        Shape::Edge(e)
    }
}

impl From<Chain> for Shape {
    fn from(c: Chain) -> Self {
        Shape::Chain(c)
    }
}
