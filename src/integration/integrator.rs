use crate::common::Settings;
use crate::math::Vec2;
use crate::objects::rigid_body::{BodyType, RigidBody};
use crate::world::time_step::{Position, Velocity};

/// Integrates a body's velocity over `dt` using semi-implicit Euler.
///
/// Gravity and accumulated forces only act on dynamic bodies. Damping uses
/// the Pade approximation `v *= 1 / (1 + dt * c)`, which stays stable for
/// large damping coefficients.
pub fn integrate_velocity(velocity: &mut Velocity, body: &RigidBody, gravity: Vec2, dt: f64) {
    if body.body_type != BodyType::Dynamic {
        return;
    }

    // v = v + (g + F/m) * dt
    let linear_acceleration = gravity * body.gravity_scale + body.force * body.inv_mass;
    velocity.v += linear_acceleration * dt;
    // w = w + (T/I) * dt
    velocity.w += dt * body.inv_inertia * body.torque;

    velocity.v = velocity.v * (1.0 / (1.0 + dt * body.linear_damping));
    velocity.w *= 1.0 / (1.0 + dt * body.angular_damping);
}

/// Advances a position by the velocity, capping translation and rotation per
/// step. The cap scales the velocity so the two stay consistent.
pub fn integrate_position(position: &mut Position, velocity: &mut Velocity, dt: f64, settings: &Settings) {
    let translation = velocity.v * dt;
    if translation.dot(translation) > settings.max_translation * settings.max_translation {
        let ratio = settings.max_translation / translation.magnitude();
        velocity.v = velocity.v * ratio;
    }

    let rotation = dt * velocity.w;
    if rotation * rotation > settings.max_rotation * settings.max_rotation {
        let ratio = settings.max_rotation / rotation.abs();
        velocity.w *= ratio;
    }

    position.c += velocity.v * dt;
    position.a += dt * velocity.w;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::rigid_body::BodyDef;
    const EPSILON: f64 = 1e-9; // Slightly larger epsilon for integration tests

    fn dynamic_body() -> RigidBody {
        RigidBody::new(&BodyDef::dynamic(Vec2::ZERO))
    }

    #[test]
    fn test_integrate_linear_motion_no_force() {
        let mut position = Position::default();
        let mut velocity = Velocity {
            v: Vec2::new(10.0, -5.0),
            w: 0.0,
        };
        let dt = 0.1;
        integrate_velocity(&mut velocity, &dynamic_body(), Vec2::ZERO, dt);
        integrate_position(&mut position, &mut velocity, dt, &Settings::default());

        assert!((velocity.v.x - 10.0).abs() < EPSILON);
        assert!((position.c.x - 1.0).abs() < EPSILON);
        assert!((position.c.y - (-0.5)).abs() < EPSILON);
    }

    #[test]
    fn test_integrate_with_force_and_gravity() {
        let mut body = dynamic_body();
        body.inv_mass = 0.5;
        body.apply_force_to_center(Vec2::new(4.0, 0.0), true);
        let mut velocity = Velocity::default();
        integrate_velocity(&mut velocity, &body, Vec2::new(0.0, -10.0), 0.1);

        // a = F/m = 2, g = -10
        assert!((velocity.v.x - 0.2).abs() < EPSILON);
        assert!((velocity.v.y - (-1.0)).abs() < EPSILON);
    }

    #[test]
    fn test_integrate_angular_motion_with_torque() {
        let mut body = dynamic_body();
        body.inv_inertia = 0.25;
        body.apply_torque(8.0, true);
        let mut velocity = Velocity::default();
        let mut position = Position::default();
        integrate_velocity(&mut velocity, &body, Vec2::ZERO, 0.5);
        integrate_position(&mut position, &mut velocity, 0.5, &Settings::default());

        // alpha = T/I = 2, w = 1, a = 0.5
        assert!((velocity.w - 1.0).abs() < EPSILON);
        assert!((position.a - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_static_and_kinematic_ignore_gravity() {
        let ground = RigidBody::new(&BodyDef::fixed(Vec2::ZERO));
        let mut velocity = Velocity::default();
        integrate_velocity(&mut velocity, &ground, Vec2::new(0.0, -10.0), 1.0);
        assert_eq!(velocity.v, Vec2::ZERO);

        let mut def = BodyDef::dynamic(Vec2::ZERO);
        def.body_type = BodyType::Kinematic;
        let mover = RigidBody::new(&def);
        let mut velocity = Velocity {
            v: Vec2::new(1.0, 0.0),
            w: 0.0,
        };
        integrate_velocity(&mut velocity, &mover, Vec2::new(0.0, -10.0), 1.0);
        assert_eq!(velocity.v, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_damping_reduces_speed() {
        let mut body = dynamic_body();
        body.linear_damping = 1.0;
        let mut velocity = Velocity {
            v: Vec2::new(2.0, 0.0),
            w: 0.0,
        };
        integrate_velocity(&mut velocity, &body, Vec2::ZERO, 1.0);
        assert!((velocity.v.x - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_translation_is_clamped() {
        let settings = Settings::default();
        let mut position = Position::default();
        let mut velocity = Velocity {
            v: Vec2::new(1000.0, 0.0),
            w: 100.0,
        };
        integrate_position(&mut position, &mut velocity, 0.1, &settings);
        assert!((position.c.x - settings.max_translation).abs() < EPSILON);
        assert!((position.a - settings.max_rotation).abs() < EPSILON);
        assert!((velocity.v.x - settings.max_translation / 0.1).abs() < EPSILON);
    }
}
