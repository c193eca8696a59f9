//! Operating mode selection from the receiver mode channel.

use core::fmt;

use crate::capture::PulseSource;
use crate::config::{
    MODE_PULSE_AUTO_US, MODE_PULSE_DELTA_US, MODE_PULSE_MANUAL_US, MODE_PULSE_OFFSET_US,
    MODE_PULSE_SECURE_US, MODE_STABILIZER_COUNT,
};

/// Who drives the actuators.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Mode {
    /// Host link commands through the closed-loop controller.
    Auto,
    /// Actuators held at idle.
    #[default]
    Secure,
    /// Receiver sticks remapped onto the actuators.
    Manual,
}

impl Mode {
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            Mode::Auto => 0,
            Mode::Secure => 1,
            Mode::Manual => 2,
        }
    }

    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Mode::Auto),
            1 => Some(Mode::Secure),
            2 => Some(Mode::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Auto => f.write_str("auto"),
            Mode::Secure => f.write_str("secure"),
            Mode::Manual => f.write_str("manual"),
        }
    }
}

/// Supplies the mode for the current control tick.
pub trait ModeSource {
    fn current_mode(&mut self) -> Mode;
}

impl<T: ModeSource + ?Sized> ModeSource for &mut T {
    fn current_mode(&mut self) -> Mode {
        (**self).current_mode()
    }
}

/// Mode source that never changes unless told to.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FixedMode(pub Mode);

impl ModeSource for FixedMode {
    fn current_mode(&mut self) -> Mode {
        self.0
    }
}

/// Maps a mode pulse width onto a mode. Pulses outside every window are Secure.
#[must_use]
pub fn classify(pulse_us: u32) -> Mode {
    let within = |centre: u32| pulse_us.abs_diff(centre) <= MODE_PULSE_OFFSET_US;
    if within(MODE_PULSE_SECURE_US) {
        Mode::Secure
    } else if within(MODE_PULSE_AUTO_US) {
        Mode::Auto
    } else if within(MODE_PULSE_MANUAL_US) {
        Mode::Manual
    } else {
        Mode::Secure
    }
}

/// Debounces the mode pulse: a new width is accepted only after
/// [`MODE_STABILIZER_COUNT`] consecutive readings far from the accepted one.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PulseStabilizer {
    accepted: u32,
    count: u8,
}

impl PulseStabilizer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            accepted: 0,
            count: 0,
        }
    }

    /// Feeds one completed pulse and returns the accepted width.
    pub fn feed(&mut self, pulse_us: u32) -> u32 {
        if pulse_us.abs_diff(self.accepted) > MODE_PULSE_DELTA_US {
            self.count += 1;
        } else {
            self.count = 0;
        }

        if self.count >= MODE_STABILIZER_COUNT {
            self.accepted = pulse_us;
            self.count = 0;
        }
        self.accepted
    }

    #[must_use]
    pub fn accepted(&self) -> u32 {
        self.accepted
    }
}

/// Mode source backed by the receiver mode channel.
pub struct ModeSelector<P> {
    source: P,
    stabilizer: PulseStabilizer,
}

impl<P: PulseSource> ModeSelector<P> {
    #[must_use]
    pub const fn new(source: P) -> Self {
        Self {
            source,
            stabilizer: PulseStabilizer::new(),
        }
    }

    #[must_use]
    pub fn accepted_pulse(&self) -> u32 {
        self.stabilizer.accepted()
    }
}

impl<P: PulseSource> ModeSource for ModeSelector<P> {
    fn current_mode(&mut self) -> Mode {
        // Only completed pulses are fed, so an idle channel keeps the last mode.
        if self.source.take_edges() > 0 {
            self.stabilizer.feed(self.source.sample().pulse_width);
        }
        classify(self.stabilizer.accepted())
    }
}
