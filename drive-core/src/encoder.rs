//! Wheel speed from encoder edge counts.

use crate::config::ControlConfig;
use crate::observer::HighGainObserver;

/// Accumulated angle above which the estimator shifts its origin back.
pub const RECENTER_THRESHOLD_RAD: f32 = 512.0;

/// Integrates encoder edges into a wheel angle and differentiates it through
/// a third-order high-gain observer.
///
/// The angle only grows (the encoder is not quadrature), so it is pulled back
/// by [`RECENTER_THRESHOLD_RAD`] together with the observer estimate to keep
/// f32 resolution on long runs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WheelEstimator {
    theta: f32,
    radians_per_edge: f32,
    observer: HighGainObserver<3>,
}

impl WheelEstimator {
    #[must_use]
    pub fn new(radians_per_edge: f32, observer: HighGainObserver<3>) -> Self {
        Self {
            theta: 0.0,
            radians_per_edge,
            observer,
        }
    }

    #[must_use]
    pub fn from_config(config: &ControlConfig) -> Self {
        let [l1, l2, l3] = config.observer_gains;
        let observer =
            HighGainObserver::<3>::new(l1, l2, l3, config.observer_epsilon, config.period_s());
        Self::new(config.radians_per_edge, observer)
    }

    /// Adds the edges seen since the previous tick and returns the filtered
    /// angular velocity in rad/s.
    pub fn update(&mut self, edges: u16) -> f32 {
        self.theta += f32::from(edges) * self.radians_per_edge;
        if self.theta >= RECENTER_THRESHOLD_RAD {
            self.theta -= RECENTER_THRESHOLD_RAD;
            self.observer.shift_angle(-RECENTER_THRESHOLD_RAD);
        }
        self.observer.update(self.theta)
    }

    #[must_use]
    pub fn omega(&self) -> f32 {
        self.observer.velocity()
    }

    #[must_use]
    pub fn theta(&self) -> f32 {
        self.theta
    }

    /// Zeroes the accumulated angle and the observer state.
    pub fn reset(&mut self) {
        self.theta = 0.0;
        self.observer.reset();
    }
}
