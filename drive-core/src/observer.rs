//! Discretized high-gain observer for incremental encoders.
//!
//! The observer tracks the accumulated wheel angle `y` with the model
//!
//! ```text
//! x' = A x + E(eps) L (C x - y)
//! ```
//!
//! where `A` is a chain of integrators, `C = [1 0 ..]` and
//! `E(eps) = diag(1/eps, 1/eps^2[, 1/eps^3])`. The gains `L` are usually taken
//! as `-lqr(A', C', I, 1)'`, so they are negative; `eps` then sets the
//! bandwidth (poles scale with `1/eps`).
//!
//! The continuous system is discretized once with Backward Euler
//! (`s = (z - 1) / (ts z)`):
//!
//! ```text
//! A_L = (I - ts (A + E L C))^-1
//! B_L = ts A_L E L
//! x_k = A_L x_{k-1} - B_L y_k
//! ```
//!
//! and every tick costs one matrix-vector product. The second state is the
//! angular velocity estimate. Nothing is clamped: a jump in `y` goes straight
//! into the estimate, so reset the observer whenever the angle is reset.

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HighGainObserver<const N: usize> {
    x: [f32; N],
    al: [[f32; N]; N],
    bl: [f32; N],
}

impl HighGainObserver<2> {
    /// Second-order observer (angle, velocity).
    #[must_use]
    pub fn new(l1: f32, l2: f32, epsilon: f32, ts: f32) -> Self {
        let l1 = l1 / epsilon;
        let l2 = l2 / (epsilon * epsilon);
        let det = 1.0 - ts * l1 - ts * ts * l2;

        let al = [
            [1.0 / det, ts / det],
            [ts * l2 / det, (1.0 - ts * l1) / det],
        ];
        Self::from_discretization(al, [l1, l2], ts)
    }
}

impl HighGainObserver<3> {
    /// Third-order observer (angle, velocity, acceleration).
    #[must_use]
    pub fn new(l1: f32, l2: f32, l3: f32, epsilon: f32, ts: f32) -> Self {
        let l1 = l1 / epsilon;
        let l2 = l2 / (epsilon * epsilon);
        let l3 = l3 / (epsilon * epsilon * epsilon);
        let ts2 = ts * ts;
        let det = 1.0 - l1 * ts - l2 * ts2 - l3 * ts2 * ts;

        let al = [
            [1.0 / det, ts / det, ts2 / det],
            [
                (l3 * ts2 + l2 * ts) / det,
                (1.0 - l1 * ts) / det,
                ts * (1.0 - l1 * ts) / det,
            ],
            [
                l3 * ts / det,
                l3 * ts2 / det,
                (1.0 - l1 * ts - l2 * ts2) / det,
            ],
        ];
        Self::from_discretization(al, [l1, l2, l3], ts)
    }
}

impl<const N: usize> HighGainObserver<N> {
    fn from_discretization(al: [[f32; N]; N], scaled_gains: [f32; N], ts: f32) -> Self {
        let mut bl = [0.0; N];
        for (row, out) in al.iter().zip(bl.iter_mut()) {
            *out = ts
                * row
                    .iter()
                    .zip(scaled_gains.iter())
                    .map(|(a, l)| a * l)
                    .sum::<f32>();
        }

        Self {
            x: [0.0; N],
            al,
            bl,
        }
    }

    /// Advances the observer with a new angle measurement and returns the
    /// velocity estimate.
    pub fn update(&mut self, y: f32) -> f32 {
        let mut next = [0.0; N];
        for ((out, row), b) in next.iter_mut().zip(self.al.iter()).zip(self.bl.iter()) {
            let mut acc = -b * y;
            for (a, x) in row.iter().zip(self.x.iter()) {
                acc += a * x;
            }
            *out = acc;
        }
        self.x = next;
        self.velocity()
    }

    /// Current velocity estimate.
    #[must_use]
    pub fn velocity(&self) -> f32 {
        self.x[1]
    }

    #[must_use]
    pub fn state(&self) -> [f32; N] {
        self.x
    }

    /// Zeroes the internal state.
    pub fn reset(&mut self) {
        self.x = [0.0; N];
    }

    /// Moves the angle estimate by `delta`. The observer is shift invariant in
    /// angle, so shifting both the estimate and the measurement by the same
    /// amount leaves velocity untouched.
    pub fn shift_angle(&mut self, delta: f32) {
        self.x[0] += delta;
    }
}
