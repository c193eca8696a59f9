use crate::config::{ConfigError, ControlConfig, DELAY_STEPS};

use super::nonlinearity::{Nonlinearity, QuadraticNonlinearity};
use super::pi::PiController;
use super::predictor::InternalModelPredictor;

/// PI speed controller with Smith predictor and nonlinear feedforward.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClosedLoopController<const D: usize, F> {
    pi: PiController,
    predictor: InternalModelPredictor<D, F>,
}

/// Traction controller with the compiled delay length and quadratic map.
pub type TractionController = ClosedLoopController<DELAY_STEPS, QuadraticNonlinearity>;

impl<const D: usize, F: Nonlinearity> ClosedLoopController<D, F> {
    #[must_use]
    pub fn new(kp: f32, ki: f32, ts: f32, predictor: InternalModelPredictor<D, F>) -> Self {
        Self {
            pi: PiController::new(kp, ki, ts),
            predictor,
        }
    }

    /// Computes the effort for reference `r` (rad/s) given the measured wheel
    /// speed `y`, then feeds it to the internal model.
    ///
    /// The returned effort is not saturated; the actuator map does that.
    pub fn update(&mut self, r: f32, y: f32) -> f32 {
        let y_hat = y - self.predictor.state() + self.predictor.state_predict();
        let e = r - y_hat;
        let u = self.predictor.nonlinearity().phi_inv(r) + self.pi.update(e);
        self.predictor.update(u);
        u
    }

    /// Clears the integrator and the model history.
    pub fn reset(&mut self) {
        self.pi.reset(0.0);
        self.predictor.reset();
    }

    #[must_use]
    pub fn pi(&self) -> &PiController {
        &self.pi
    }

    #[must_use]
    pub fn predictor(&self) -> &InternalModelPredictor<D, F> {
        &self.predictor
    }
}

impl TractionController {
    /// Builds the traction controller from validated parameters.
    pub fn from_config(config: &ControlConfig) -> Result<Self, ConfigError> {
        let nonlinearity = QuadraticNonlinearity::new(config.nonlin_a, config.nonlin_b)?;
        let predictor = InternalModelPredictor::new(config.model_a, config.delay(), nonlinearity)?;
        Ok(Self::new(
            config.kp,
            config.ki,
            config.period_s(),
            predictor,
        ))
    }
}
