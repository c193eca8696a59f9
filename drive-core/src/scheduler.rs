//! Fixed-period control loop.
//!
//! [`ControlLoopScheduler::tick`] is called once per loop period by the
//! firmware control task (or the emulator). Every tick it:
//!
//! 1. reads the mode and, on a change, stops both actuators and resets the
//!    controller (leaving or entering Auto also resets the wheel estimators);
//! 2. drains each wheel's edge counter into its estimator;
//! 3. runs the mode: Auto follows the host command, Manual remaps the receiver
//!    sticks, Secure holds idle;
//! 4. applies the queued actuator values and reports what happened.

use heapless::Vec;

use crate::actuator::{Actuator, ActuatorFault, ActuatorKind, ActuatorSink};
use crate::capture::PulseSource;
use crate::config::{
    ConfigError, ESC_LIMITS, SERVO_LIMITS, SchedulerConfig, manual_steering_table,
    manual_traction_table,
};
use crate::control::TractionController;
use crate::encoder::WheelEstimator;
use crate::link::{LinkCommand, TelemetryFrame, TractionRequest};
use crate::lookup::LookupTable;
use crate::mode::{Mode, ModeSource};
use crate::telemetry::{TelemetryRecorder, TimestampMicros};

/// Encoder channels of the two driven wheels.
pub struct WheelInputs<P> {
    pub left: P,
    pub right: P,
}

/// Receiver stick channels used in Manual mode.
pub struct ManualInputs<P> {
    pub traction: P,
    pub steering: P,
}

/// Everything the scheduler drives, handed over at construction.
pub struct SchedulerParts<M, P, T, S> {
    pub mode_source: M,
    pub wheels: WheelInputs<P>,
    /// `None` on boards without receiver stick inputs; Manual then acts as Secure.
    pub manual: Option<ManualInputs<P>>,
    pub traction: T,
    pub steering: S,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModeTransition {
    pub from: Mode,
    pub to: Mode,
}

/// Outcome of one control tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    pub timestamp_us: TimestampMicros,
    pub mode: Mode,
    pub transition: Option<ModeTransition>,
    pub omega_left: f32,
    pub omega_right: f32,
    /// Closed-loop effort, when the speed controller ran this tick.
    pub effort: Option<f32>,
    pub esc_duty: u16,
    pub servo_duty: u16,
    pub faults: Vec<ActuatorFault, 2>,
}

impl TickReport {
    /// Outbound host link record for this tick.
    #[must_use]
    pub fn frame(&self) -> TelemetryFrame {
        TelemetryFrame::from_measurements(self.omega_right, self.omega_left, self.esc_duty)
    }
}

pub struct ControlLoopScheduler<M, P, T, S> {
    mode_source: M,
    wheels: WheelInputs<P>,
    manual: Option<ManualInputs<P>>,
    esc: Actuator<T>,
    servo: Actuator<S>,
    controller: TractionController,
    left: WheelEstimator,
    right: WheelEstimator,
    manual_traction: LookupTable<f32, 3>,
    manual_steering: LookupTable<f32, 3>,
    manual_enabled: bool,
    mode: Mode,
    closed_loop_active: bool,
    telemetry: TelemetryRecorder,
}

impl<M, P, T, S> ControlLoopScheduler<M, P, T, S>
where
    M: ModeSource,
    P: PulseSource,
    T: ActuatorSink,
    S: ActuatorSink,
{
    /// Validates `config` and takes ownership of the parts. Both actuators
    /// are driven to idle before this returns.
    pub fn new(
        parts: SchedulerParts<M, P, T, S>,
        config: &SchedulerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let controller = TractionController::from_config(&config.control)?;

        Ok(Self {
            mode_source: parts.mode_source,
            wheels: parts.wheels,
            manual_enabled: config.manual_enabled && parts.manual.is_some(),
            manual: parts.manual,
            esc: Actuator::new(ActuatorKind::Traction, parts.traction, ESC_LIMITS),
            servo: Actuator::new(ActuatorKind::Steering, parts.steering, SERVO_LIMITS),
            controller,
            left: WheelEstimator::from_config(&config.control),
            right: WheelEstimator::from_config(&config.control),
            manual_traction: manual_traction_table(),
            manual_steering: manual_steering_table(),
            mode: Mode::Secure,
            closed_loop_active: false,
            telemetry: TelemetryRecorder::new(),
        })
    }

    /// Runs one control period. `command` is the latest host link record.
    pub fn tick(&mut self, now_us: TimestampMicros, command: LinkCommand) -> TickReport {
        let mode = self.effective_mode();
        let transition = self.enter_mode(mode, now_us);

        let omega_left = self.left.update(self.wheels.left.take_edges());
        let omega_right = self.right.update(self.wheels.right.take_edges());

        let mut faults = Vec::new();
        let mut effort = None;
        match mode {
            Mode::Auto => {
                effort = self.run_auto(command, 0.5 * (omega_left + omega_right), &mut faults);
            }
            Mode::Manual => self.run_manual(),
            Mode::Secure => {
                self.esc.hold_idle();
                self.servo.hold_idle();
            }
        }

        for fault in &faults {
            self.telemetry.record_fault(*fault, now_us);
        }

        self.esc.apply();
        self.servo.apply();

        TickReport {
            timestamp_us: now_us,
            mode,
            transition,
            omega_left,
            omega_right,
            effort,
            esc_duty: self.esc.value(),
            servo_duty: self.servo.value(),
            faults,
        }
    }

    fn effective_mode(&mut self) -> Mode {
        match self.mode_source.current_mode() {
            Mode::Manual if !self.manual_enabled => Mode::Secure,
            mode => mode,
        }
    }

    fn enter_mode(&mut self, mode: Mode, now_us: TimestampMicros) -> Option<ModeTransition> {
        let from = self.mode;
        if mode == from {
            return None;
        }

        self.esc.stop();
        self.servo.stop();
        self.controller.reset();
        self.closed_loop_active = false;
        if from == Mode::Auto || mode == Mode::Auto {
            self.left.reset();
            self.right.reset();
        }

        self.telemetry.record_mode_change(from, mode, now_us);
        self.mode = mode;
        Some(ModeTransition { from, to: mode })
    }

    fn run_auto(
        &mut self,
        command: LinkCommand,
        y: f32,
        faults: &mut Vec<ActuatorFault, 2>,
    ) -> Option<f32> {
        let effort = match command.traction_request() {
            TractionRequest::Speed(reference) => {
                let u = self.controller.update(reference, y);
                self.esc.ctrl(u);
                self.closed_loop_active = true;
                Some(u)
            }
            TractionRequest::RawDuty(duty) => {
                if self.closed_loop_active {
                    self.controller.reset();
                    self.closed_loop_active = false;
                }
                if let Err(fault) = self.esc.set(duty, Mode::Auto) {
                    let _ = faults.push(fault);
                }
                None
            }
        };

        if let Err(fault) = self.servo.set(command.steering_duty(), Mode::Auto) {
            let _ = faults.push(fault);
        }

        // Any rejected request idles the whole vehicle for this tick.
        if !faults.is_empty() {
            self.esc.hold_idle();
            self.servo.hold_idle();
        }
        effort
    }

    #[allow(clippy::cast_precision_loss)]
    fn run_manual(&mut self) {
        let Some(inputs) = &self.manual else {
            self.esc.hold_idle();
            self.servo.hold_idle();
            return;
        };

        let traction = inputs.traction.sample().pulse_width;
        let steering = inputs.steering.sample().pulse_width;

        // A zero width means no pulse has completed yet.
        if traction == 0 {
            self.esc.hold_idle();
        } else {
            let duty = table_duty(&self.manual_traction, traction as f32);
            let _ = self.esc.set(duty, Mode::Manual);
        }
        if steering == 0 {
            self.servo.hold_idle();
        } else {
            let duty = table_duty(&self.manual_steering, steering as f32);
            let _ = self.servo.set(duty, Mode::Manual);
        }
    }

    /// Mode applied during the last tick.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    pub fn telemetry_mut(&mut self) -> &mut TelemetryRecorder {
        &mut self.telemetry
    }

    #[must_use]
    pub fn controller(&self) -> &TractionController {
        &self.controller
    }

    #[must_use]
    pub fn esc(&self) -> &Actuator<T> {
        &self.esc
    }

    #[must_use]
    pub fn servo(&self) -> &Actuator<S> {
        &self.servo
    }

    #[must_use]
    pub fn wheel_estimators(&self) -> (&WheelEstimator, &WheelEstimator) {
        (&self.left, &self.right)
    }

    pub fn mode_source_mut(&mut self) -> &mut M {
        &mut self.mode_source
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn table_duty(table: &LookupTable<f32, 3>, pulse_us: f32) -> u16 {
    let duty = libm::roundf(table.eval(pulse_us));
    if duty.is_finite() {
        duty.clamp(0.0, f32::from(u16::MAX)) as u16
    } else {
        0
    }
}
