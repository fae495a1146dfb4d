//! Surface material properties and the rules for mixing them across a contact.

/// Surface properties of a fixture that affect collision response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Coefficient of friction, usually in [0, 1].
    pub friction: f64,
    /// Coefficient of restitution (bounciness), usually in [0, 1].
    pub restitution: f64,
    /// Mass per unit area, in kg/m^2.
    pub density: f64,
}

impl Material {
    pub fn new(friction: f64, restitution: f64, density: f64) -> Self {
        Material {
            friction,
            restitution,
            density,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Material {
            friction: 0.2,
            restitution: 0.0,
            density: 0.0,
        }
    }
}

/// Friction mixing: geometric mean, so a frictionless surface always slides.
pub fn mix_friction(friction_a: f64, friction_b: f64) -> f64 {
    (friction_a * friction_b).sqrt()
}

/// Restitution mixing: the bouncier surface wins.
pub fn mix_restitution(restitution_a: f64, restitution_b: f64) -> f64 {
    restitution_a.max(restitution_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_friction_is_geometric_mean() {
        assert!((mix_friction(0.4, 0.9) - 0.6).abs() < 1e-12);
        assert_eq!(mix_friction(0.0, 1.0), 0.0);
    }

    #[test]
    fn test_mix_restitution_takes_max() {
        assert_eq!(mix_restitution(0.1, 0.7), 0.7);
        assert_eq!(mix_restitution(0.5, 0.0), 0.5);
    }
}
