//! Build-time configuration and startup validation.
//!
//! Constants describe the vehicle this firmware was tuned for: loop timing,
//! the identified plant model, observer and PI gains, actuator duty limits,
//! receiver pulse windows and the pin routing table for the capture layer.
//! [`SchedulerConfig::validate`] runs every startup check; any error is fatal
//! and must keep the control loop from starting.

use core::fmt;

use crate::actuator::ActuatorLimits;
use crate::capture::{self, GroupId, PinRoute};
use crate::control::{DelaySpec, QuadraticNonlinearity};
use crate::lookup::LookupTable;

/// Control loop period in milliseconds.
pub const LOOP_PERIOD_MS: u32 = 2;

/// Identified actuator transport delay in milliseconds.
pub const CTRL_SYSTEM_DELAY_MS: u32 = 80;

const _: () = assert!(
    CTRL_SYSTEM_DELAY_MS % LOOP_PERIOD_MS == 0,
    "actuator delay must be a whole number of loop periods"
);

/// Length of the predictor delay line.
pub const DELAY_STEPS: usize = (CTRL_SYSTEM_DELAY_MS / LOOP_PERIOD_MS) as usize;

/// Pole of the one-state plant model (1/s).
pub const CTRL_MODEL_A: f32 = 6.0;
/// Linear coefficient of the effort/speed map.
pub const CTRL_NONLIN_A: f32 = 0.004;
/// Quadratic coefficient of the effort/speed map.
pub const CTRL_NONLIN_B: f32 = 0.000_06;
/// PI proportional gain (effort per rad/s).
pub const CTRL_KP: f32 = 0.004;
/// PI integral gain (effort per rad).
pub const CTRL_KI: f32 = 0.02;

/// High-gain observer gains; negative entries give a triple pole at `-1/epsilon`.
pub const HG_L1: f32 = -3.0;
pub const HG_L2: f32 = -3.0;
pub const HG_L3: f32 = -1.0;
pub const HG_EPSILON: f32 = 0.05;

/// Encoder resolution: one falling edge per slot, 100 slots per revolution.
pub const ENCODER_EDGES_PER_REV: u16 = 100;
pub const RADIANS_PER_EDGE: f32 = core::f32::consts::TAU / ENCODER_EDGES_PER_REV as f32;

/// ESC duty bounds (16-bit timer compare values); idle stops the motor.
pub const ESC_LIMITS: ActuatorLimits = ActuatorLimits::new(5608, 7010, 8412);
/// Servo duty bounds: full right, centre, full left.
pub const SERVO_LIMITS: ActuatorLimits = ActuatorLimits::new(5024, 6881, 8738);

/// Receiver mode channel pulse centres (µs).
pub const MODE_PULSE_MANUAL_US: u32 = 980;
pub const MODE_PULSE_SECURE_US: u32 = 1504;
pub const MODE_PULSE_AUTO_US: u32 = 2024;
/// Half width of each mode window (µs).
pub const MODE_PULSE_OFFSET_US: u32 = 75;
/// A reading further than this from the accepted pulse counts toward a change.
pub const MODE_PULSE_DELTA_US: u32 = 500;
/// Consecutive differing readings required before a mode pulse is accepted.
pub const MODE_STABILIZER_COUNT: u8 = 10;

/// Receiver traction stick: pulse (µs) to ESC duty.
pub const MANUAL_TRACTION_PULSE_US: [f32; 3] = [1000.0, 1500.0, 2032.0];
pub const MANUAL_TRACTION_DUTY: [f32; 3] = [5608.0, 7010.0, 8412.0];
/// Receiver steering stick: pulse (µs) to servo duty.
pub const MANUAL_STEERING_PULSE_US: [f32; 3] = [1052.0, 1476.0, 1890.0];
pub const MANUAL_STEERING_DUTY: [f32; 3] = [5024.0, 6881.0, 8738.0];

/// Board pin identifiers (port index * 16 + pin).
pub mod pins {
    pub const RIGHT_WHEEL: u8 = 0; // PA0
    pub const LEFT_WHEEL: u8 = 1; // PA1
    pub const STEERING: u8 = 38; // PC6
    pub const TRACTION: u8 = 39; // PC7
    pub const MODE: u8 = 40; // PC8
}

/// Maximum readers multiplexed on one port group.
pub const PORT_GROUP_CAPACITY: usize = 4;

/// Every pin the capture layer may watch, with its group and level bit.
pub const PIN_ROUTES: [PinRoute; 5] = [
    PinRoute::new(pins::RIGHT_WHEEL, GroupId::Wheels, 0x01),
    PinRoute::new(pins::LEFT_WHEEL, GroupId::Wheels, 0x02),
    PinRoute::new(pins::STEERING, GroupId::Receiver, 0x01),
    PinRoute::new(pins::TRACTION, GroupId::Receiver, 0x02),
    PinRoute::new(pins::MODE, GroupId::Receiver, 0x04),
];

/// Lookup tables checked at startup.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TableId {
    ManualTraction,
    ManualSteering,
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableId::ManualTraction => f.write_str("manual-traction"),
            TableId::ManualSteering => f.write_str("manual-steering"),
        }
    }
}

/// Fatal configuration problems detected before the control loop starts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// Pin is not wired to any known interrupt source.
    UnknownPin(u8),
    /// Pin route targets a different port group than the one registering it.
    WrongGroup { pin: u8 },
    /// Watched mask must be exactly one bit.
    InvalidMask(u8),
    /// Watched mask overlaps a reader already registered on the group.
    MaskConflict { pin: u8, mask: u8 },
    /// Port group dispatch list is at capacity.
    GroupFull,
    /// Pin appears twice in the routing table.
    DuplicatePin(u8),
    /// Loop period is zero.
    InvalidPeriod,
    /// Transport delay is not a whole number of loop periods.
    DelayNotMultiple { delay_ms: u32, period_ms: u32 },
    /// Delay line length does not match the delay/period ratio.
    DelayLengthMismatch { expected: usize, actual: usize },
    /// Lookup table breakpoints are not strictly increasing.
    InvalidTable(TableId),
    /// Nonlinearity coefficients produce an undefined inverse.
    InvalidNonlinearity,
    /// Gain or model parameter is negative, zero where forbidden, or non-finite.
    InvalidGain,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownPin(pin) => write!(f, "pin {pin} has no interrupt route"),
            ConfigError::WrongGroup { pin } => {
                write!(f, "pin {pin} is routed to a different port group")
            }
            ConfigError::InvalidMask(mask) => write!(f, "mask {mask:#04x} is not a single bit"),
            ConfigError::MaskConflict { pin, mask } => {
                write!(f, "pin {pin} mask {mask:#04x} overlaps a registered reader")
            }
            ConfigError::GroupFull => f.write_str("port group dispatch list is full"),
            ConfigError::DuplicatePin(pin) => write!(f, "pin {pin} is routed twice"),
            ConfigError::InvalidPeriod => f.write_str("loop period must be non-zero"),
            ConfigError::DelayNotMultiple {
                delay_ms,
                period_ms,
            } => write!(
                f,
                "delay {delay_ms}ms is not a multiple of the {period_ms}ms loop period"
            ),
            ConfigError::DelayLengthMismatch { expected, actual } => write!(
                f,
                "delay line holds {expected} samples but the delay needs {actual}"
            ),
            ConfigError::InvalidTable(table) => write!(f, "lookup table {table} is not ordered"),
            ConfigError::InvalidNonlinearity => f.write_str("nonlinearity coefficients invalid"),
            ConfigError::InvalidGain => f.write_str("gain or model parameter out of range"),
        }
    }
}

/// Parameters of the closed-loop traction controller and wheel observers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ControlConfig {
    pub period_ms: u32,
    pub delay_ms: u32,
    pub model_a: f32,
    pub nonlin_a: f32,
    pub nonlin_b: f32,
    pub kp: f32,
    pub ki: f32,
    pub observer_gains: [f32; 3],
    pub observer_epsilon: f32,
    pub radians_per_edge: f32,
}

impl ControlConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            period_ms: LOOP_PERIOD_MS,
            delay_ms: CTRL_SYSTEM_DELAY_MS,
            model_a: CTRL_MODEL_A,
            nonlin_a: CTRL_NONLIN_A,
            nonlin_b: CTRL_NONLIN_B,
            kp: CTRL_KP,
            ki: CTRL_KI,
            observer_gains: [HG_L1, HG_L2, HG_L3],
            observer_epsilon: HG_EPSILON,
            radians_per_edge: RADIANS_PER_EDGE,
        }
    }

    /// Loop period in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn period_s(&self) -> f32 {
        self.period_ms as f32 / 1000.0
    }

    #[must_use]
    pub const fn delay(&self) -> DelaySpec {
        DelaySpec::new(self.delay_ms, self.period_ms)
    }

    /// Checks gains, the delay ratio and the nonlinearity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let steps = self.delay().steps()?;
        if steps != DELAY_STEPS {
            return Err(ConfigError::DelayLengthMismatch {
                expected: DELAY_STEPS,
                actual: steps,
            });
        }

        let non_negative = [self.kp, self.ki];
        if non_negative.iter().any(|gain| !gain.is_finite() || *gain < 0.0) {
            return Err(ConfigError::InvalidGain);
        }

        let positive = [self.model_a, self.observer_epsilon, self.radians_per_edge];
        if positive.iter().any(|value| !value.is_finite() || *value <= 0.0) {
            return Err(ConfigError::InvalidGain);
        }

        // Observer poles are the roots of s^3 - l1 s^2 - l2 s - l3, which is
        // Hurwitz only if every gain is negative.
        if self
            .observer_gains
            .iter()
            .any(|gain| !gain.is_finite() || *gain >= 0.0)
        {
            return Err(ConfigError::InvalidGain);
        }

        QuadraticNonlinearity::new(self.nonlin_a, self.nonlin_b)?;
        Ok(())
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Top-level configuration consumed by the control loop scheduler.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    pub control: ControlConfig,
    /// Manual mode remaps receiver sticks to the actuators; disabled it behaves as Secure.
    pub manual_enabled: bool,
}

impl SchedulerConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            control: ControlConfig::new(),
            manual_enabled: true,
        }
    }

    /// Runs every startup check, including the routing table and lookup tables.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.control.validate()?;
        capture::validate_routes(&PIN_ROUTES)?;

        if !manual_traction_table().is_valid() {
            return Err(ConfigError::InvalidTable(TableId::ManualTraction));
        }
        if !manual_steering_table().is_valid() {
            return Err(ConfigError::InvalidTable(TableId::ManualSteering));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver traction stick map; a lost signal saturates to the ESC idle duty.
#[must_use]
pub fn manual_traction_table() -> LookupTable<f32, 3> {
    LookupTable::with_saturation(
        MANUAL_TRACTION_PULSE_US,
        MANUAL_TRACTION_DUTY,
        MANUAL_TRACTION_DUTY[1],
    )
}

/// Receiver steering stick map, saturating to the full-lock duties.
#[must_use]
pub fn manual_steering_table() -> LookupTable<f32, 3> {
    LookupTable::with_saturation_bounds(
        MANUAL_STEERING_PULSE_US,
        MANUAL_STEERING_DUTY,
        f32::from(SERVO_LIMITS.min),
        f32::from(SERVO_LIMITS.max),
    )
}
