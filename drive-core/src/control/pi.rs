/// PI controller discretized with Backward Euler.
///
/// The raw gains are converted once: `ki = ki_in`, `kp = kp_in + ts * ki_in`.
/// Each call produces `u = ki * ei + kp * e` from the integral accumulated so
/// far and only then adds `ts * e` to it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PiController {
    kp: f32,
    ki: f32,
    ts: f32,
    ei: f32,
}

impl PiController {
    #[must_use]
    pub fn new(kp: f32, ki: f32, ts: f32) -> Self {
        Self {
            kp: kp + ts * ki,
            ki,
            ts,
            ei: 0.0,
        }
    }

    /// Computes the command for error `e` and advances the integral.
    pub fn update(&mut self, e: f32) -> f32 {
        let u = self.ki * self.ei + self.kp * e;
        self.ei += self.ts * e;
        u
    }

    /// Sets the integral term directly (use `0.0` for a cold start).
    pub fn reset(&mut self, ei0: f32) {
        self.ei = ei0;
    }

    #[must_use]
    pub fn integral(&self) -> f32 {
        self.ei
    }

    /// Discretized proportional gain.
    #[must_use]
    pub fn kp(&self) -> f32 {
        self.kp
    }

    #[must_use]
    pub fn ki(&self) -> f32 {
        self.ki
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_error_holds_integral_contribution() {
        let mut pi = PiController::new(1.5, 0.5, 0.01);
        pi.reset(2.0);
        for _ in 0..5 {
            assert_eq!(pi.update(0.0), 1.0, "output must stay at ki * ei");
        }
        assert_eq!(pi.integral(), 2.0);
    }

    #[test]
    fn output_uses_integral_before_update() {
        let mut pi = PiController::new(1.0, 2.0, 0.5);
        assert_eq!(pi.kp(), 2.0);

        // First call: ei = 0, so only the discretized proportional term.
        assert_eq!(pi.update(1.0), 2.0);
        assert_eq!(pi.integral(), 0.5);
        // Second call sees ei = 0.5.
        assert_eq!(pi.update(1.0), 2.0 * 0.5 + 2.0);
    }

    #[test]
    fn integral_is_independent_of_error_order() {
        let trace = [1.0, -2.0, 3.0, 4.0, -0.5];
        let mut forward = PiController::new(0.3, 0.7, 0.5);
        let mut reverse = PiController::new(0.3, 0.7, 0.5);

        for e in trace {
            forward.update(e);
        }
        for e in trace.iter().rev() {
            reverse.update(*e);
        }

        let expected: f32 = trace.iter().map(|e| 0.5 * e).sum();
        assert_eq!(forward.integral(), expected);
        assert_eq!(reverse.integral(), expected);
    }
}
