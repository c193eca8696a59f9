use crate::config::ConfigError;

/// Static output map of the plant model and its inverse.
pub trait Nonlinearity {
    /// Maps the model state (normalized effort) to wheel speed.
    fn phi(&self, x: f32) -> f32;

    /// Effort that holds the wheel at speed `w` in steady state.
    fn phi_inv(&self, w: f32) -> f32;
}

/// Pass-through map for a linear plant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Identity;

impl Nonlinearity for Identity {
    fn phi(&self, x: f32) -> f32 {
        x
    }

    fn phi_inv(&self, w: f32) -> f32 {
        w
    }
}

/// Quadratic effort/speed relation `u = c1 w + c2 w^2`.
///
/// `phi` is the positive root: `w = (sqrt(c1^2 + 4 c2 u) - c1) / (2 c2)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadraticNonlinearity {
    c1: f32,
    c2: f32,
}

impl QuadraticNonlinearity {
    /// Requires finite coefficients with `c2 > 0` and `c1 >= 0` so the map is
    /// monotonic on `[0, 1]`.
    pub fn new(c1: f32, c2: f32) -> Result<Self, ConfigError> {
        if !c1.is_finite() || !c2.is_finite() || c2 <= 0.0 || c1 < 0.0 {
            return Err(ConfigError::InvalidNonlinearity);
        }
        Ok(Self { c1, c2 })
    }

    #[must_use]
    pub fn coefficients(&self) -> (f32, f32) {
        (self.c1, self.c2)
    }
}

impl Nonlinearity for QuadraticNonlinearity {
    fn phi(&self, x: f32) -> f32 {
        let radicand = (self.c1 * self.c1 + 4.0 * self.c2 * x).max(0.0);
        (libm::sqrtf(radicand) - self.c1) / (2.0 * self.c2)
    }

    fn phi_inv(&self, w: f32) -> f32 {
        self.c1 * w + self.c2 * w * w
    }
}

impl<T: Nonlinearity + ?Sized> Nonlinearity for &T {
    fn phi(&self, x: f32) -> f32 {
        (**self).phi(x)
    }

    fn phi_inv(&self, w: f32) -> f32 {
        (**self).phi_inv(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_map_inverts_itself() {
        let map = QuadraticNonlinearity::new(0.004, 0.000_06).unwrap();
        for speed in [0.0_f32, 5.0, 40.0, 100.0] {
            let effort = map.phi_inv(speed);
            let back = map.phi(effort);
            assert!((back - speed).abs() < 1e-2, "{speed} -> {effort} -> {back}");
        }
        assert!((map.phi_inv(100.0) - 1.0).abs() < 1e-5, "full effort is 100 rad/s");
    }

    #[test]
    fn rejects_degenerate_coefficients() {
        assert_eq!(
            QuadraticNonlinearity::new(0.004, 0.0),
            Err(ConfigError::InvalidNonlinearity)
        );
        assert_eq!(
            QuadraticNonlinearity::new(f32::NAN, 1.0),
            Err(ConfigError::InvalidNonlinearity)
        );
    }

    #[test]
    fn identity_is_transparent() {
        assert_eq!(Identity.phi(0.25), 0.25);
        assert_eq!(Identity.phi_inv(0.25), 0.25);
    }
}
