//! One-dimensional piecewise-linear lookup tables with saturation.
//!
//! Tables are built once from `B` breakpoints and evaluated every control
//! tick. Evaluation below the first breakpoint returns the low saturation
//! value, at or above the last breakpoint the high saturation value, and
//! anything in between interpolates on the bracketing segment. The segment is
//! located with a linear scan, which is cheap for the handful of breakpoints
//! the actuator and receiver maps use.
//!
//! Breakpoint ordering is *not* enforced at construction. Call
//! [`LookupTable::is_valid`] once after building a table; an unordered table
//! still evaluates to a defined value, just not a meaningful one.

use num_traits::float::FloatCore;

/// Piecewise-linear interpolator over `B` breakpoints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LookupTable<T, const B: usize> {
    x: [T; B],
    y: [T; B],
    /// `slope[i]` belongs to the segment `x[i - 1]..x[i]`; `slope[0]` is unused.
    slope: [T; B],
    low_saturation: T,
    high_saturation: T,
}

impl<T: FloatCore, const B: usize> LookupTable<T, B> {
    const NON_EMPTY: () = assert!(B > 0, "lookup table needs at least one breakpoint");

    /// Builds a table that saturates to the first and last `y` value.
    #[must_use]
    pub fn new(x: [T; B], y: [T; B]) -> Self {
        let () = Self::NON_EMPTY;
        let low = y[0];
        let high = y[B - 1];
        Self::with_saturation_bounds(x, y, low, high)
    }

    /// Builds a table that returns `saturation` outside the breakpoint range.
    #[must_use]
    pub fn with_saturation(x: [T; B], y: [T; B], saturation: T) -> Self {
        Self::with_saturation_bounds(x, y, saturation, saturation)
    }

    /// Builds a table with independent below-range and above-range values.
    #[must_use]
    pub fn with_saturation_bounds(x: [T; B], y: [T; B], low: T, high: T) -> Self {
        let () = Self::NON_EMPTY;
        let mut slope = [T::zero(); B];
        for i in 1..B {
            let dx = x[i] - x[i - 1];
            slope[i] = if dx == T::zero() {
                T::zero()
            } else {
                (y[i] - y[i - 1]) / dx
            };
        }

        Self {
            x,
            y,
            slope,
            low_saturation: low,
            high_saturation: high,
        }
    }

    /// Replaces the value returned at or below the first breakpoint.
    pub fn set_low_saturation(&mut self, value: T) {
        self.low_saturation = value;
    }

    /// Replaces the value returned at or above the last breakpoint.
    pub fn set_high_saturation(&mut self, value: T) {
        self.high_saturation = value;
    }

    /// Returns `true` when the breakpoints are strictly increasing.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.x.windows(2).all(|pair| pair[0] < pair[1])
    }

    /// Evaluates the table at `z`.
    #[must_use]
    pub fn eval(&self, z: T) -> T {
        if z <= self.x[0] {
            return self.low_saturation;
        }
        if z >= self.x[B - 1] {
            return self.high_saturation;
        }

        for i in 1..B {
            if z < self.x[i] {
                return self.y[i - 1] + self.slope[i] * (z - self.x[i - 1]);
            }
            if z == self.x[i] {
                return self.y[i];
            }
        }

        // Only reachable with unordered breakpoints or a NaN query.
        self.high_saturation
    }

    #[must_use]
    pub fn x_min(&self) -> T {
        self.x[0]
    }

    #[must_use]
    pub fn x_max(&self) -> T {
        self.x[B - 1]
    }

    #[must_use]
    pub fn low_saturation(&self) -> T {
        self.low_saturation
    }

    #[must_use]
    pub fn high_saturation(&self) -> T {
        self.high_saturation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn esc_map() -> LookupTable<f32, 2> {
        LookupTable::new([0.0, 1.0], [7010.0, 8412.0])
    }

    #[test]
    fn interpolates_midpoint_of_esc_range() {
        let table = esc_map();
        assert!(table.is_valid());
        assert_eq!(table.eval(0.5), 7711.0);
    }

    #[test]
    fn saturates_outside_the_domain() {
        let table = esc_map();
        assert_eq!(table.eval(-1.0), 7010.0);
        assert_eq!(table.eval(0.0), 7010.0);
        assert_eq!(table.eval(1.0), 8412.0);
        assert_eq!(table.eval(2.0), 8412.0);
    }

    #[test]
    fn breakpoints_are_returned_exactly() {
        let x = [980.0_f32, 1250.0, 1504.0, 1760.0, 2024.0];
        let y = [5608.0_f32, 6400.0, 7010.0, 7600.0, 8412.0];
        let table = LookupTable::new(x, y);

        for (xi, yi) in x.iter().zip(y.iter()) {
            assert_eq!(table.eval(*xi), *yi, "breakpoint {xi} should map to {yi}");
        }
    }

    #[test]
    fn shared_saturation_replaces_both_ends() {
        let table = LookupTable::with_saturation([0.0_f64, 1.0, 2.0], [1.0, 3.0, 2.0], -5.0);
        assert_eq!(table.eval(-0.1), -5.0);
        assert_eq!(table.eval(2.1), -5.0);
        assert_eq!(table.eval(1.5), 2.5);
    }

    #[test]
    fn saturation_bounds_are_independently_settable() {
        let mut table = LookupTable::with_saturation_bounds([0.0_f32, 1.0], [0.0, 10.0], -1.0, 11.0);
        assert_eq!(table.eval(-3.0), -1.0);
        assert_eq!(table.eval(3.0), 11.0);

        table.set_low_saturation(-2.0);
        assert_eq!(table.eval(-3.0), -2.0);
        assert_eq!(table.eval(3.0), 11.0, "high saturation must be untouched");

        table.set_high_saturation(12.0);
        assert_eq!(table.eval(3.0), 12.0);
    }

    #[test]
    fn unordered_breakpoints_are_reported_but_still_evaluate() {
        let table = LookupTable::new([0.0_f32, 2.0, 1.0, 3.0], [0.0, 2.0, 1.0, 3.0]);
        assert!(!table.is_valid());
        assert!(table.eval(1.5).is_finite());
    }
}
