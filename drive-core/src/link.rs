//! Host link records.
//!
//! The host sends a 4-byte command record and reads back a 6-byte telemetry
//! record. All fields are big-endian 16-bit integers.
//!
//! ```text
//! command:   traction:i16  steering:i16
//! telemetry: omega_right:u16  omega_left:u16  esc_duty:u16
//! ```
//!
//! A non-negative traction field is a wheel speed reference in hundredths of
//! rad/s; a negative one carries a raw ESC duty (its magnitude) that bypasses
//! the speed controller.

use core::fmt;

use heapless::Vec;

use crate::config::SERVO_LIMITS;

pub const COMMAND_LEN: usize = 4;
pub const FRAME_LEN: usize = 6;

/// Fixed-point scale of speeds on the wire.
pub const SPEED_SCALE: f32 = 100.0;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkError {
    /// Record shorter than its fixed length.
    Truncated { expected: usize, actual: usize },
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Truncated { expected, actual } => {
                write!(f, "record truncated: {actual} of {expected} bytes")
            }
        }
    }
}

/// What the host wants from the traction actuator.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TractionRequest {
    /// Wheel speed reference in rad/s.
    Speed(f32),
    /// ESC duty written as-is after bounds checking.
    RawDuty(u16),
}

/// Inbound command record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinkCommand {
    pub traction: i16,
    pub steering: i16,
}

impl Default for LinkCommand {
    /// Zero speed, wheels centred.
    fn default() -> Self {
        Self {
            traction: 0,
            steering: i16::try_from(SERVO_LIMITS.idle).unwrap_or(i16::MAX),
        }
    }
}

impl LinkCommand {
    #[must_use]
    pub const fn new(traction: i16, steering: i16) -> Self {
        Self { traction, steering }
    }

    /// Command for a speed reference in rad/s, saturated to the wire range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn speed(omega: f32, steering: u16) -> Self {
        let scaled = libm::roundf(omega * SPEED_SCALE);
        let traction = if scaled.is_nan() {
            0
        } else {
            scaled.clamp(0.0, f32::from(i16::MAX)) as i16
        };
        Self {
            traction,
            steering: i16::try_from(steering).unwrap_or(i16::MAX),
        }
    }

    /// Command for a raw ESC duty.
    #[must_use]
    pub fn raw_duty(duty: u16, steering: u16) -> Self {
        let magnitude = i16::try_from(duty).unwrap_or(i16::MAX);
        Self {
            traction: -magnitude,
            steering: i16::try_from(steering).unwrap_or(i16::MAX),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, LinkError> {
        let [t0, t1, s0, s1, ..] = *bytes else {
            return Err(LinkError::Truncated {
                expected: COMMAND_LEN,
                actual: bytes.len(),
            });
        };
        Ok(Self {
            traction: i16::from_be_bytes([t0, t1]),
            steering: i16::from_be_bytes([s0, s1]),
        })
    }

    #[must_use]
    pub fn encode(&self) -> [u8; COMMAND_LEN] {
        let [t0, t1] = self.traction.to_be_bytes();
        let [s0, s1] = self.steering.to_be_bytes();
        [t0, t1, s0, s1]
    }

    #[must_use]
    pub fn traction_request(&self) -> TractionRequest {
        if self.traction >= 0 {
            TractionRequest::Speed(f32::from(self.traction) / SPEED_SCALE)
        } else {
            TractionRequest::RawDuty(self.traction.unsigned_abs())
        }
    }

    /// Requested servo duty; a negative field maps to 0, which is out of range.
    #[must_use]
    pub fn steering_duty(&self) -> u16 {
        u16::try_from(self.steering).unwrap_or(0)
    }
}

/// Outbound telemetry record.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TelemetryFrame {
    pub omega_right: u16,
    pub omega_left: u16,
    pub esc_duty: u16,
}

impl TelemetryFrame {
    #[must_use]
    pub fn from_measurements(omega_right: f32, omega_left: f32, esc_duty: u16) -> Self {
        Self {
            omega_right: speed_to_wire(omega_right),
            omega_left: speed_to_wire(omega_left),
            esc_duty,
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut out = [0; FRAME_LEN];
        out[0..2].copy_from_slice(&self.omega_right.to_be_bytes());
        out[2..4].copy_from_slice(&self.omega_left.to_be_bytes());
        out[4..6].copy_from_slice(&self.esc_duty.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, LinkError> {
        let [r0, r1, l0, l1, e0, e1, ..] = *bytes else {
            return Err(LinkError::Truncated {
                expected: FRAME_LEN,
                actual: bytes.len(),
            });
        };
        Ok(Self {
            omega_right: u16::from_be_bytes([r0, r1]),
            omega_left: u16::from_be_bytes([l0, l1]),
            esc_duty: u16::from_be_bytes([e0, e1]),
        })
    }

    /// Right wheel speed in rad/s.
    #[must_use]
    pub fn omega_right(&self) -> f32 {
        f32::from(self.omega_right) / SPEED_SCALE
    }

    /// Left wheel speed in rad/s.
    #[must_use]
    pub fn omega_left(&self) -> f32 {
        f32::from(self.omega_left) / SPEED_SCALE
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn speed_to_wire(omega: f32) -> u16 {
    let scaled = libm::roundf(omega * SPEED_SCALE);
    if scaled.is_nan() {
        0
    } else {
        scaled.clamp(0.0, f32::from(u16::MAX)) as u16
    }
}

/// Reassembles command records from a byte stream.
#[derive(Clone, Debug, Default)]
pub struct LinkDecoder {
    pending: Vec<u8, COMMAND_LEN>,
}

impl LinkDecoder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Adds one byte; returns a command once a full record has arrived.
    pub fn push(&mut self, byte: u8) -> Option<LinkCommand> {
        // Capacity is one record and it is drained as soon as it fills.
        let _ = self.pending.push(byte);
        if self.pending.is_full() {
            let command = LinkCommand::decode(&self.pending).ok();
            self.pending.clear();
            return command;
        }
        None
    }

    /// Drops a partial record and returns how many bytes were discarded.
    pub fn reset(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_fields_are_big_endian_traction_first() {
        let command = LinkCommand::decode(&[0x0F, 0xA0, 0x1A, 0xE1]).expect("complete record");
        assert_eq!(command.traction, 4000);
        assert_eq!(command.steering, 6881);
        assert_eq!(command.traction_request(), TractionRequest::Speed(40.0));
        assert_eq!(command.steering_duty(), 6881);
    }

    #[test]
    fn negative_traction_is_a_raw_duty() {
        let command = LinkCommand::raw_duty(7500, 6881);
        assert_eq!(command.traction, -7500);
        assert_eq!(command.traction_request(), TractionRequest::RawDuty(7500));
        assert_eq!(LinkCommand::decode(&command.encode()), Ok(command));
    }

    #[test]
    fn short_records_are_rejected() {
        assert_eq!(
            LinkCommand::decode(&[1, 2, 3]),
            Err(LinkError::Truncated {
                expected: COMMAND_LEN,
                actual: 3
            })
        );
        assert!(TelemetryFrame::decode(&[0; 5]).is_err());
    }

    #[test]
    fn frame_speeds_are_rounded_and_saturated() {
        let frame = TelemetryFrame::from_measurements(12.346, -3.0, 7010);
        assert_eq!(frame.omega_right, 1235);
        assert_eq!(frame.omega_left, 0);
        assert_eq!(frame.encode(), [0x04, 0xD3, 0x00, 0x00, 0x1B, 0x62]);

        let fast = TelemetryFrame::from_measurements(1_000.0, f32::NAN, 0);
        assert_eq!(fast.omega_right, u16::MAX);
        assert_eq!(fast.omega_left, 0);
    }

    #[test]
    fn default_command_is_stopped_and_centred() {
        let command = LinkCommand::default();
        assert_eq!(command.traction_request(), TractionRequest::Speed(0.0));
        assert_eq!(command.steering_duty(), SERVO_LIMITS.idle);
    }

    #[test]
    fn decoder_emits_one_command_per_record() {
        let mut decoder = LinkDecoder::new();
        let bytes = LinkCommand::speed(25.5, 7000).encode();

        assert_eq!(decoder.push(bytes[0]), None);
        assert_eq!(decoder.push(bytes[1]), None);
        assert_eq!(decoder.reset(), 2);

        let mut decoded = None;
        for byte in bytes {
            decoded = decoder.push(byte);
        }
        assert_eq!(decoded, Some(LinkCommand::new(2550, 7000)));
        assert_eq!(decoder.pending(), 0);
    }
}
