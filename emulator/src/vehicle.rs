//! Simulated vehicle: drivetrain plant, wheel encoders and RC receiver.
//!
//! The drivetrain is the same delayed first-order model the controller
//! predicts with, optionally with a different pole so the loop has something
//! to correct. Encoder edges and receiver pulses are replayed into real port
//! groups, so the scheduler sees exactly what the capture interrupts would
//! hand it on the target.

use drive_core::capture::{CaptureChannel, GroupId, SharedPortGroup, Ticks, route_for};
use drive_core::config::{
    ConfigError, ControlConfig, DELAY_STEPS, ESC_LIMITS, MODE_PULSE_AUTO_US,
    MODE_PULSE_MANUAL_US, MODE_PULSE_SECURE_US, PIN_ROUTES, PORT_GROUP_CAPACITY, pins,
};
use drive_core::control::{InternalModelPredictor, QuadraticNonlinearity};
use drive_core::mode::Mode;
use drive_core::telemetry::TimestampMicros;

/// Receiver frame period.
pub const RECEIVER_FRAME_US: TimestampMicros = 20_000;


/// Encoder pulses are this wide; anything shorter than a tick works.
const ENCODER_PULSE_US: Ticks = 10;

pub type EmulatedChannel = CaptureChannel<'static, PORT_GROUP_CAPACITY>;

/// Handles the scheduler needs, claimed from the emulated banks.
pub struct VehicleInputs {
    pub left: EmulatedChannel,
    pub right: EmulatedChannel,
    pub traction: EmulatedChannel,
    pub steering: EmulatedChannel,
    pub mode: EmulatedChannel,
}

/// Receiver stick and switch positions, in microseconds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReceiverState {
    pub mode_us: u32,
    pub traction_us: u32,
    pub steering_us: u32,
}

impl Default for ReceiverState {
    fn default() -> Self {
        Self {
            mode_us: MODE_PULSE_SECURE_US,
            traction_us: 1_500,
            steering_us: 1_476,
        }
    }
}

impl ReceiverState {
    /// Moves the mode switch to the centre of `mode`'s window.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode_us = match mode {
            Mode::Auto => MODE_PULSE_AUTO_US,
            Mode::Secure => MODE_PULSE_SECURE_US,
            Mode::Manual => MODE_PULSE_MANUAL_US,
        };
    }
}

/// Level bits of every emulated pin, taken from the routing table.
#[derive(Copy, Clone, Debug)]
struct LevelMasks {
    right: u8,
    left: u8,
    steering: u8,
    traction: u8,
    mode: u8,
}

impl LevelMasks {
    fn from_routes() -> Result<Self, ConfigError> {
        let mask = |pin| route_for(&PIN_ROUTES, pin).map(|route| route.mask);
        Ok(Self {
            right: mask(pins::RIGHT_WHEEL)?,
            left: mask(pins::LEFT_WHEEL)?,
            steering: mask(pins::STEERING)?,
            traction: mask(pins::TRACTION)?,
            mode: mask(pins::MODE)?,
        })
    }
}

pub struct Vehicle {
    masks: LevelMasks,
    wheels: &'static SharedPortGroup<PORT_GROUP_CAPACITY>,
    receiver: &'static SharedPortGroup<PORT_GROUP_CAPACITY>,
    drivetrain: InternalModelPredictor<DELAY_STEPS, QuadraticNonlinearity>,
    period_s: f32,
    radians_per_edge: f32,
    /// Fractional encoder edges carried into the next tick.
    travelled: f32,
    next_frame_us: TimestampMicros,
    pub receiver_state: ReceiverState,
}

impl Vehicle {
    /// Builds a vehicle whose drivetrain pole is `model_a` (1/s). The port
    /// groups are leaked; a vehicle lives for the whole session.
    pub fn new(
        config: &ControlConfig,
        model_a: f32,
    ) -> Result<(Self, VehicleInputs), ConfigError> {
        let wheels: &'static SharedPortGroup<PORT_GROUP_CAPACITY> =
            Box::leak(Box::new(SharedPortGroup::new(GroupId::Wheels)));
        let receiver: &'static SharedPortGroup<PORT_GROUP_CAPACITY> =
            Box::leak(Box::new(SharedPortGroup::new(GroupId::Receiver)));

        let inputs = VehicleInputs {
            left: wheels.claim(&PIN_ROUTES, pins::LEFT_WHEEL)?,
            right: wheels.claim(&PIN_ROUTES, pins::RIGHT_WHEEL)?,
            traction: receiver.claim(&PIN_ROUTES, pins::TRACTION)?,
            steering: receiver.claim(&PIN_ROUTES, pins::STEERING)?,
            mode: receiver.claim(&PIN_ROUTES, pins::MODE)?,
        };

        let map = QuadraticNonlinearity::new(config.nonlin_a, config.nonlin_b)?;
        let drivetrain = InternalModelPredictor::new(model_a, config.delay(), map)?;

        Ok((
            Self {
                masks: LevelMasks::from_routes()?,
                wheels,
                receiver,
                drivetrain,
                period_s: config.period_s(),
                radians_per_edge: config.radians_per_edge,
                travelled: 0.0,
                next_frame_us: 0,
                receiver_state: ReceiverState::default(),
            },
            inputs,
        ))
    }

    /// True wheel speed in rad/s.
    #[must_use]
    pub fn omega(&self) -> f32 {
        self.drivetrain.state()
    }

    /// Replays the encoder edges and receiver frames that fall inside the
    /// period ending at `now_us`.
    pub fn advance(&mut self, now_us: TimestampMicros) {
        while self.next_frame_us <= now_us {
            self.emit_receiver_frame(self.next_frame_us);
            self.next_frame_us += RECEIVER_FRAME_US;
        }

        self.travelled += self.omega() * self.period_s / self.radians_per_edge;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let edges = self.travelled.floor().max(0.0) as u32;
        #[allow(clippy::cast_precision_loss)]
        let whole = edges as f32;
        self.travelled -= whole;

        let start = ticks(now_us);
        let both = self.masks.right | self.masks.left;
        for edge in 0..edges {
            let at = start.wrapping_add(edge * 2 * ENCODER_PULSE_US);
            self.wheels.dispatch(both, at);
            self.wheels.dispatch(0, at.wrapping_add(ENCODER_PULSE_US));
        }
    }

    /// Feeds the ESC duty applied this tick into the drivetrain.
    pub fn drive(&mut self, esc_duty: u16) {
        self.drivetrain.update(effort_from_duty(esc_duty));
    }

    /// All three channels rise together and fall in width order.
    fn emit_receiver_frame(&self, start_us: TimestampMicros) {
        let state = self.receiver_state;
        let masks = self.masks;
        let mut falls = [
            (state.steering_us, masks.steering),
            (state.traction_us, masks.traction),
            (state.mode_us, masks.mode),
        ];
        falls.sort_unstable();

        let start = ticks(start_us);
        let mut levels = masks.steering | masks.traction | masks.mode;
        self.receiver.dispatch(levels, start);
        for (width, mask) in falls {
            levels &= !mask;
            self.receiver.dispatch(levels, start.wrapping_add(width));
        }
    }
}

/// Capture timestamps are the low 32 bits of the microsecond clock.
#[allow(clippy::cast_possible_truncation)]
fn ticks(now_us: TimestampMicros) -> Ticks {
    now_us as Ticks
}

/// Inverts the ESC map; reverse and brake duties give no drive effort.
#[must_use]
pub fn effort_from_duty(duty: u16) -> f32 {
    let span = f32::from(ESC_LIMITS.max - ESC_LIMITS.idle);
    ((f32::from(duty) - f32::from(ESC_LIMITS.idle)) / span).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effort_spans_the_forward_range() {
        assert_eq!(effort_from_duty(ESC_LIMITS.idle), 0.0);
        assert_eq!(effort_from_duty(ESC_LIMITS.max), 1.0);
        assert_eq!(effort_from_duty(ESC_LIMITS.min), 0.0);
    }

    #[test]
    fn receiver_frames_reach_every_channel() {
        use drive_core::capture::PulseSource;

        let config = ControlConfig::default();
        let (mut vehicle, inputs) =
            Vehicle::new(&config, config.model_a).expect("default config is valid");
        vehicle.receiver_state.set_mode(Mode::Auto);
        vehicle.advance(0);

        assert_eq!(inputs.mode.sample().pulse_width, MODE_PULSE_AUTO_US);
        assert_eq!(inputs.traction.sample().pulse_width, 1_500);
        assert_eq!(inputs.steering.sample().pulse_width, 1_476);
        assert_eq!(inputs.mode.take_edges(), 1);
    }

    #[test]
    fn a_stationary_vehicle_produces_no_encoder_edges() {
        use drive_core::capture::PulseSource;

        let config = ControlConfig::default();
        let (mut vehicle, inputs) =
            Vehicle::new(&config, config.model_a).expect("default config is valid");
        for tick in 0..100_u64 {
            vehicle.drive(ESC_LIMITS.idle);
            vehicle.advance(tick * 2_000);
        }
        assert_eq!(inputs.left.take_edges(), 0);
        assert_eq!(inputs.right.take_edges(), 0);
    }
}
