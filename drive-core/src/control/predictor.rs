use crate::config::ConfigError;
use crate::delay_line::DelayLine;

use super::nonlinearity::{Identity, Nonlinearity};

/// Transport delay expressed against the loop period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelaySpec {
    pub delay_ms: u32,
    pub period_ms: u32,
}

impl DelaySpec {
    #[must_use]
    pub const fn new(delay_ms: u32, period_ms: u32) -> Self {
        Self {
            delay_ms,
            period_ms,
        }
    }

    /// Number of loop periods covered by the delay.
    pub fn steps(&self) -> Result<usize, ConfigError> {
        if self.period_ms == 0 {
            return Err(ConfigError::InvalidPeriod);
        }
        if self.delay_ms % self.period_ms != 0 {
            return Err(ConfigError::DelayNotMultiple {
                delay_ms: self.delay_ms,
                period_ms: self.period_ms,
            });
        }
        Ok((self.delay_ms / self.period_ms) as usize)
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn period_s(&self) -> f32 {
        self.period_ms as f32 / 1000.0
    }
}

/// Undelayed plant model plus a `D`-sample delay line.
///
/// The model is `x' = -a x + a sat(u)` discretized with Backward Euler. Every
/// update pushes the next state; the newest sample is the undelayed prediction
/// and the oldest one is what the real wheel should be showing right now.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InternalModelPredictor<const D: usize, F = Identity> {
    states: DelayLine<f32, D>,
    a_sp: f32,
    b_sp: f32,
    nonlinearity: F,
}

impl<const D: usize, F: Nonlinearity> InternalModelPredictor<D, F> {
    /// Fails when `delay` does not span exactly `D` periods or the model pole
    /// is not a positive finite number.
    pub fn new(model_a: f32, delay: DelaySpec, nonlinearity: F) -> Result<Self, ConfigError> {
        let steps = delay.steps()?;
        if steps != D {
            return Err(ConfigError::DelayLengthMismatch {
                expected: D,
                actual: steps,
            });
        }
        if !model_a.is_finite() || model_a <= 0.0 {
            return Err(ConfigError::InvalidGain);
        }

        let ts = delay.period_s();
        let a_sp = 1.0 / (1.0 + model_a * ts);
        Ok(Self {
            states: DelayLine::new(0.0),
            a_sp,
            b_sp: a_sp * model_a * ts,
            nonlinearity,
        })
    }

    /// Advances the model one period with effort `u` (clamped to `[0, 1]`).
    pub fn update(&mut self, u: f32) {
        let next = self.a_sp * self.states.back() + self.b_sp * u.clamp(0.0, 1.0);
        self.states.push_back(next);
    }

    /// Delayed model output.
    #[must_use]
    pub fn state(&self) -> f32 {
        self.nonlinearity.phi(self.states.front())
    }

    /// Undelayed model output.
    #[must_use]
    pub fn state_predict(&self) -> f32 {
        self.nonlinearity.phi(self.states.back())
    }

    /// Forgets every past input.
    pub fn reset(&mut self) {
        self.states.fill(0.0);
    }

    #[must_use]
    pub fn nonlinearity(&self) -> &F {
        &self.nonlinearity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::QuadraticNonlinearity;

    const D: usize = 40;

    fn linear() -> InternalModelPredictor<D> {
        InternalModelPredictor::new(6.0, DelaySpec::new(80, 2), Identity).unwrap()
    }

    #[test]
    fn delay_spec_counts_periods() {
        assert_eq!(DelaySpec::new(80, 2).steps(), Ok(40));
        assert_eq!(DelaySpec::new(10, 0).steps(), Err(ConfigError::InvalidPeriod));
        assert_eq!(
            DelaySpec::new(7, 2).steps(),
            Err(ConfigError::DelayNotMultiple {
                delay_ms: 7,
                period_ms: 2
            })
        );
    }

    #[test]
    fn mismatched_line_length_is_rejected() {
        let result = InternalModelPredictor::<10, _>::new(6.0, DelaySpec::new(80, 2), Identity);
        assert_eq!(
            result.err(),
            Some(ConfigError::DelayLengthMismatch {
                expected: 10,
                actual: 40
            })
        );
    }

    #[test]
    fn delayed_output_lags_by_the_line_length() {
        let mut predictor = linear();
        let first = 1.0 / (1.0 + 6.0 * 0.002) * 6.0 * 0.002;

        for k in 1..=D {
            predictor.update(1.0);
            if k < D {
                assert_eq!(predictor.state(), 0.0, "update {k} must not reach the output");
            }
        }

        assert!((predictor.state() - first).abs() < 1e-6);
        assert!(predictor.state_predict() > predictor.state());
    }

    #[test]
    fn effort_is_saturated_before_entering_the_model() {
        let mut clamped = linear();
        let mut reference = linear();
        clamped.update(4.0);
        reference.update(1.0);
        assert_eq!(clamped.state_predict(), reference.state_predict());

        clamped.update(-2.0);
        reference.update(0.0);
        assert_eq!(clamped.state_predict(), reference.state_predict());
    }

    #[test]
    fn settles_to_the_mapped_steady_state() {
        let map = QuadraticNonlinearity::new(0.004, 0.000_06).unwrap();
        let mut predictor =
            InternalModelPredictor::<D, _>::new(6.0, DelaySpec::new(80, 2), map).unwrap();
        for _ in 0..5_000 {
            predictor.update(0.5);
        }

        let expected = map.phi(0.5);
        assert!((predictor.state() - expected).abs() < 1e-2);
        assert!((predictor.state_predict() - expected).abs() < 1e-2);
    }

    #[test]
    fn reset_clears_history() {
        let mut predictor = linear();
        for _ in 0..100 {
            predictor.update(0.7);
        }
        predictor.reset();
        assert_eq!(predictor.state(), 0.0);
        assert_eq!(predictor.state_predict(), 0.0);
    }
}
