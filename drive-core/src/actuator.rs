//! PWM actuator wrappers.
//!
//! An [`Actuator`] owns a duty-cycle sink plus its bounds. Requests are queued
//! and only reach the sink on [`Actuator::apply`], and only when the queued
//! value differs from what is already on the output.

use core::fmt;

use crate::lookup::LookupTable;
use crate::mode::Mode;

/// Hardware side of an actuator: one PWM compare register.
pub trait ActuatorSink {
    fn write_command(&mut self, duty: u16);
}

impl<T: ActuatorSink + ?Sized> ActuatorSink for &mut T {
    fn write_command(&mut self, duty: u16) {
        (**self).write_command(duty);
    }
}

/// Sink that discards every command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoopActuatorSink;

impl ActuatorSink for NoopActuatorSink {
    fn write_command(&mut self, _duty: u16) {}
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActuatorKind {
    Traction,
    Steering,
}

impl fmt::Display for ActuatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorKind::Traction => f.write_str("traction"),
            ActuatorKind::Steering => f.write_str("steering"),
        }
    }
}

/// Inclusive duty bounds and the safe resting value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ActuatorLimits {
    pub min: u16,
    pub idle: u16,
    pub max: u16,
}

impl ActuatorLimits {
    #[must_use]
    pub const fn new(min: u16, idle: u16, max: u16) -> Self {
        Self { min, idle, max }
    }

    #[must_use]
    pub const fn contains(&self, duty: u16) -> bool {
        duty >= self.min && duty <= self.max
    }
}

/// Out-of-range request while the vehicle is under autonomous control.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ActuatorFault {
    pub actuator: ActuatorKind,
    pub requested: u16,
}

impl fmt::Display for ActuatorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} duty {} outside limits, holding idle",
            self.actuator, self.requested
        )
    }
}

/// Bounds-checked, change-driven PWM output.
#[derive(Debug)]
pub struct Actuator<S> {
    kind: ActuatorKind,
    sink: S,
    limits: ActuatorLimits,
    value: u16,
    queued: u16,
    effort_map: LookupTable<f32, 2>,
}

impl<S: ActuatorSink> Actuator<S> {
    /// Wraps `sink` and immediately drives it to idle.
    #[must_use]
    pub fn new(kind: ActuatorKind, sink: S, limits: ActuatorLimits) -> Self {
        let effort_map = LookupTable::new(
            [0.0, 1.0],
            [f32::from(limits.idle), f32::from(limits.max)],
        );
        let mut actuator = Self {
            kind,
            sink,
            limits,
            value: limits.idle,
            queued: limits.idle,
            effort_map,
        };
        actuator.stop();
        actuator
    }

    /// Queues a raw duty. Out-of-range values queue idle instead; under Auto
    /// that is also reported as a fault.
    pub fn set(&mut self, duty: u16, mode: Mode) -> Result<(), ActuatorFault> {
        if self.limits.contains(duty) {
            self.queued = duty;
            return Ok(());
        }

        self.queued = self.limits.idle;
        if mode == Mode::Auto {
            Err(ActuatorFault {
                actuator: self.kind,
                requested: duty,
            })
        } else {
            Ok(())
        }
    }

    /// Queues a normalized effort, mapping `[0, 1]` onto `[idle, max]`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn ctrl(&mut self, effort: f32) {
        self.queued = if effort.is_finite() {
            // The map saturates to [idle, max], so the cast cannot wrap.
            libm::roundf(self.effort_map.eval(effort)) as u16
        } else {
            self.limits.idle
        };
    }

    /// Queues idle without touching the output until the next apply.
    pub fn hold_idle(&mut self) {
        self.queued = self.limits.idle;
    }

    /// Writes the queued value if it changed.
    pub fn apply(&mut self) {
        if self.value != self.queued {
            self.value = self.queued;
            self.sink.write_command(self.value);
        }
    }

    /// Forces idle on the output right away.
    pub fn stop(&mut self) {
        self.value = self.limits.idle;
        self.queued = self.limits.idle;
        self.sink.write_command(self.value);
    }

    /// Duty currently on the output.
    #[must_use]
    pub fn value(&self) -> u16 {
        self.value
    }

    #[must_use]
    pub fn queued(&self) -> u16 {
        self.queued
    }

    #[must_use]
    pub fn kind(&self) -> ActuatorKind {
        self.kind
    }

    #[must_use]
    pub fn limits(&self) -> ActuatorLimits {
        self.limits
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ESC_LIMITS, SERVO_LIMITS};

    #[derive(Default)]
    struct CountingSink {
        writes: u32,
        last: Option<u16>,
    }

    impl ActuatorSink for CountingSink {
        fn write_command(&mut self, duty: u16) {
            self.writes += 1;
            self.last = Some(duty);
        }
    }

    fn esc() -> Actuator<CountingSink> {
        Actuator::new(ActuatorKind::Traction, CountingSink::default(), ESC_LIMITS)
    }

    #[test]
    fn construction_drives_idle() {
        let esc = esc();
        assert_eq!(esc.sink().last, Some(ESC_LIMITS.idle));
        assert_eq!(esc.value(), ESC_LIMITS.idle);
    }

    #[test]
    fn apply_writes_only_on_change() {
        let mut esc = esc();
        esc.set(7500, Mode::Auto).expect("in range");
        esc.apply();
        esc.apply();
        esc.set(7500, Mode::Auto).expect("in range");
        esc.apply();

        assert_eq!(esc.sink().writes, 2, "one write at construction, one for 7500");
        assert_eq!(esc.value(), 7500);
    }

    #[test]
    fn out_of_range_faults_only_in_auto() {
        let mut esc = esc();
        assert_eq!(
            esc.set(9000, Mode::Auto),
            Err(ActuatorFault {
                actuator: ActuatorKind::Traction,
                requested: 9000
            })
        );
        assert_eq!(esc.queued(), ESC_LIMITS.idle);

        assert_eq!(esc.set(100, Mode::Manual), Ok(()));
        assert_eq!(esc.queued(), ESC_LIMITS.idle);
    }

    #[test]
    fn effort_maps_onto_idle_to_max() {
        let mut esc = esc();
        esc.ctrl(0.5);
        assert_eq!(esc.queued(), 7711);
        esc.ctrl(-0.3);
        assert_eq!(esc.queued(), ESC_LIMITS.idle);
        esc.ctrl(1.7);
        assert_eq!(esc.queued(), ESC_LIMITS.max);
        esc.ctrl(f32::NAN);
        assert_eq!(esc.queued(), ESC_LIMITS.idle);
    }

    #[test]
    fn stop_writes_idle_immediately() {
        let mut servo = Actuator::new(ActuatorKind::Steering, CountingSink::default(), SERVO_LIMITS);
        servo.set(SERVO_LIMITS.max, Mode::Auto).expect("full lock is valid");
        servo.apply();
        servo.stop();

        assert_eq!(servo.value(), SERVO_LIMITS.idle);
        assert_eq!(servo.sink().last, Some(SERVO_LIMITS.idle));
    }
}
