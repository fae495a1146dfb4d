//! Shape pair dispatch for manifold generation.
//!
//! Each supported unordered pair has one collider that expects its shapes in
//! a fixed order: edges and chains first, then polygons, then circles.
//! Contacts store their fixtures in that order so the collider never needs to
//! flip its result.

use super::collide_circle::{collide_circles, collide_polygon_and_circle};
use super::collide_edge::{collide_edge_and_circle, collide_edge_and_polygon};
use super::collide_polygon::collide_polygons;
use super::manifold::Manifold;
use crate::math::Transform;
use crate::shapes::{Shape, ShapeType};

fn rank(shape_type: ShapeType) -> u8 {
    match shape_type {
        ShapeType::Circle => 0,
        ShapeType::Polygon => 1,
        ShapeType::Edge | ShapeType::Chain => 2,
    }
}

/// How a pair of shape types is handed to the collider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOrder {
    /// Already in collider order.
    Keep,
    /// Swap A and B before colliding.
    Swap,
    /// No collider exists for this pair (edge or chain against edge or chain).
    Unsupported,
}

/// Classifies a shape type pair against the dispatch table.
pub fn pair_order(type_a: ShapeType, type_b: ShapeType) -> PairOrder {
    let (ra, rb) = (rank(type_a), rank(type_b));
    if ra == 2 && rb == 2 {
        PairOrder::Unsupported
    } else if ra >= rb {
        PairOrder::Keep
    } else {
        PairOrder::Swap
    }
}

/// Generates the local manifold for a shape pair already in collider order.
/// Pairs not in the table produce an empty manifold.
pub fn collide(
    shape_a: &Shape,
    child_a: usize,
    xf_a: &Transform,
    shape_b: &Shape,
    _child_b: usize,
    xf_b: &Transform,
) -> Manifold {
    match (shape_a, shape_b) {
        (Shape::Circle(a), Shape::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Circle(b)) => collide_polygon_and_circle(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(a, xf_a, b, xf_b),
        (Shape::Edge(a), Shape::Circle(b)) => collide_edge_and_circle(a, xf_a, b, xf_b),
        (Shape::Edge(a), Shape::Polygon(b)) => collide_edge_and_polygon(a, xf_a, b, xf_b),
        (Shape::Chain(a), Shape::Circle(b)) => collide_edge_and_circle(&a.child_edge(child_a), xf_a, b, xf_b),
        (Shape::Chain(a), Shape::Polygon(b)) => collide_edge_and_polygon(&a.child_edge(child_a), xf_a, b, xf_b),
        _ => Manifold::default(),
    }
}
