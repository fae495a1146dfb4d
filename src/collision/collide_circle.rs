use super::manifold::{ContactId, Manifold, ManifoldPoint, ManifoldType};
use crate::math::{Transform, Vec2};
use crate::shapes::{Circle, Polygon};

/// Checks for collision between two circles.
/// Returns an empty manifold when they are apart.
pub fn collide_circles(circle_a: &Circle, xf_a: &Transform, circle_b: &Circle, xf_b: &Transform) -> Manifold {
    let mut manifold = Manifold::new(ManifoldType::Circles);

    let p_a = xf_a.apply(circle_a.position);
    let p_b = xf_b.apply(circle_b.position);

    let dist_sq = p_a.distance_squared(p_b);
    let radii_sum = circle_a.radius + circle_b.radius;
    if dist_sq > radii_sum * radii_sum {
        return manifold;
    }

    manifold.local_point = circle_a.position;
    manifold.local_normal = Vec2::ZERO;
    manifold.push(ManifoldPoint {
        local_point: circle_b.position,
        id: ContactId::default(),
        ..ManifoldPoint::default()
    });
    manifold
}

/// Polygon A against circle B. Produces a `FaceA` manifold with one point.
pub fn collide_polygon_and_circle(
    polygon_a: &Polygon,
    xf_a: &Transform,
    circle_b: &Circle,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::new(ManifoldType::FaceA);

    // Compute circle position in the frame of the polygon.
    let c = xf_b.apply(circle_b.position);
    let c_local = xf_a.apply_inverse(c);

    // Find the min separating edge.
    let radius = polygon_a.radius + circle_b.radius;
    let vertices = &polygon_a.vertices;
    let normals = &polygon_a.normals;
    let vertex_count = vertices.len();

    let mut normal_index = 0;
    let mut separation = f64::MIN;
    for i in 0..vertex_count {
        let s = normals[i].dot(c_local - vertices[i]);
        if s > radius {
            // Early out.
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    // Vertices that subtend the incident face.
    let v1 = vertices[normal_index];
    let v2 = vertices[(normal_index + 1) % vertex_count];

    let point = ManifoldPoint {
        local_point: circle_b.position,
        id: ContactId::default(),
        ..ManifoldPoint::default()
    };

    // If the center is inside the polygon.
    if separation < f64::EPSILON {
        manifold.local_normal = normals[normal_index];
        manifold.local_point = (v1 + v2) * 0.5;
        manifold.push(point);
        return manifold;
    }

    // Compute barycentric coordinates.
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        if c_local.distance_squared(v1) > radius * radius {
            return manifold;
        }
        manifold.local_normal = (c_local - v1).normalize();
        manifold.local_point = v1;
    } else if u2 <= 0.0 {
        if c_local.distance_squared(v2) > radius * radius {
            return manifold;
        }
        manifold.local_normal = (c_local - v2).normalize();
        manifold.local_point = v2;
    } else {
        let face_center = (v1 + v2) * 0.5;
        let s = (c_local - face_center).dot(normals[normal_index]);
        if s > radius {
            return manifold;
        }
        manifold.local_normal = normals[normal_index];
        manifold.local_point = face_center;
    }
    manifold.push(point);
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::manifold::WorldManifold;
    use approx::assert_relative_eq;

    #[test]
    fn test_circles_overlapping() {
        let a = Circle::new(1.0).unwrap();
        let b = Circle::new(0.5).unwrap();
        let xf_a = Transform::new(Vec2::new(0.0, 0.0), 0.0);
        let xf_b = Transform::new(Vec2::new(1.2, 0.0), 0.7);

        let manifold = collide_circles(&a, &xf_a, &b, &xf_b);
        assert_eq!(manifold.point_count, 1);
        assert_eq!(manifold.manifold_type, ManifoldType::Circles);

        let wm = WorldManifold::new(&manifold, &xf_a, a.radius, &xf_b, b.radius);
        assert_relative_eq!(wm.normal.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(wm.separations[0], 1.2 - 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_circles_apart() {
        let a = Circle::new(1.0).unwrap();
        let xf_b = Transform::new(Vec2::new(2.5, 0.0), 0.0);
        let manifold = collide_circles(&a, &Transform::identity(), &a, &xf_b);
        assert_eq!(manifold.point_count, 0);
    }

    #[test]
    fn test_polygon_circle_face_region() {
        let square = Polygon::new_box(1.0, 1.0).unwrap();
        let circle = Circle::new(0.5).unwrap();
        let xf_b = Transform::new(Vec2::new(0.0, 1.4), 0.0);

        let manifold = collide_polygon_and_circle(&square, &Transform::identity(), &circle, &xf_b);
        assert_eq!(manifold.point_count, 1);
        assert_eq!(manifold.local_normal, Vec2::UP);

        let wm = WorldManifold::new(&manifold, &Transform::identity(), square.radius, &xf_b, circle.radius);
        assert_relative_eq!(wm.separations[0], 0.4 - 0.5 - square.radius, epsilon = 1e-12);
    }

    #[test]
    fn test_polygon_circle_vertex_region() {
        let square = Polygon::new_box(1.0, 1.0).unwrap();
        let circle = Circle::new(0.5).unwrap();

        let near = Transform::new(Vec2::new(1.3, 1.3), 0.0);
        let manifold = collide_polygon_and_circle(&square, &Transform::identity(), &circle, &near);
        assert_eq!(manifold.point_count, 1);
        assert_relative_eq!(manifold.local_normal.x, std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);

        let far = Transform::new(Vec2::new(1.5, 1.5), 0.0);
        let manifold = collide_polygon_and_circle(&square, &Transform::identity(), &circle, &far);
        assert_eq!(manifold.point_count, 0);
    }

    #[test]
    fn test_polygon_circle_center_inside() {
        let square = Polygon::new_box(1.0, 1.0).unwrap();
        let circle = Circle::new(0.1).unwrap();
        let xf_b = Transform::new(Vec2::new(0.9, 0.0), 0.0);
        let manifold = collide_polygon_and_circle(&square, &Transform::identity(), &circle, &xf_b);
        assert_eq!(manifold.point_count, 1);
        assert_relative_eq!(manifold.local_normal.x, 1.0);
    }
}
