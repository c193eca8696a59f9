use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant as HostInstant};

use drive_core::actuator::NoopActuatorSink;
use drive_core::config::{LOOP_PERIOD_MS, SERVO_LIMITS, SchedulerConfig};
use drive_core::console::{self, ConsoleCommand, HELP};
use drive_core::link::{LinkCommand, LinkDecoder};
use drive_core::mode::{Mode, ModeSelector};
use drive_core::scheduler::{
    ControlLoopScheduler, ManualInputs, SchedulerParts, TickReport, WheelInputs,
};
use drive_core::telemetry::TimestampMicros;

use crate::vehicle::{EmulatedChannel, Vehicle};

#[allow(clippy::cast_lossless)]
const TICK_US: TimestampMicros = LOOP_PERIOD_MS as TimestampMicros * 1_000;

/// Upper bound for a single `run`, one minute of simulated time.
const MAX_RUN_TICKS: u32 = 30_000;

type EmulatedScheduler = ControlLoopScheduler<
    ModeSelector<EmulatedChannel>,
    EmulatedChannel,
    NoopActuatorSink,
    NoopActuatorSink,
>;

/// Host-side stand-in for the companion computer plus the RC transmitter.
pub struct Session {
    scheduler: EmulatedScheduler,
    vehicle: Vehicle,
    decoder: LinkDecoder,
    /// Command last delivered over the emulated link.
    command: LinkCommand,
    /// Speed reference when the link carries one.
    reference: Option<f32>,
    steering: u16,
    now_us: TimestampMicros,
    last_report: Option<TickReport>,
    transcript: Option<TranscriptLogger>,
    started_at: HostInstant,
}

impl Session {
    /// Builds the scheduler around a simulated vehicle whose drivetrain pole
    /// is `plant_a`. Lines are mirrored to `transcript` when given.
    pub fn new(plant_a: f32, transcript: Option<&Path>) -> io::Result<Self> {
        let config = SchedulerConfig::new();
        let (vehicle, inputs) = Vehicle::new(&config.control, plant_a).map_err(config_error)?;
        let parts = SchedulerParts {
            mode_source: ModeSelector::new(inputs.mode),
            wheels: WheelInputs {
                left: inputs.left,
                right: inputs.right,
            },
            manual: Some(ManualInputs {
                traction: inputs.traction,
                steering: inputs.steering,
            }),
            traction: NoopActuatorSink,
            steering: NoopActuatorSink,
        };
        let scheduler = ControlLoopScheduler::new(parts, &config).map_err(config_error)?;
        let transcript = transcript.map(TranscriptLogger::create).transpose()?;

        Ok(Self {
            scheduler,
            vehicle,
            decoder: LinkDecoder::new(),
            command: LinkCommand::default(),
            reference: None,
            steering: SERVO_LIMITS.idle,
            now_us: 0,
            last_report: None,
            transcript,
            started_at: HostInstant::now(),
        })
    }

    /// Parses and runs one console line, returning the lines to print.
    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let elapsed = self.started_at.elapsed();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_line(elapsed, TranscriptRole::Host, line)?;
        }

        let responses = match console::parse(line) {
            Ok(command) => self.execute(command),
            Err(error) => vec![format!("ERR {error}")],
        };

        if let Some(transcript) = self.transcript.as_mut() {
            for response in &responses {
                transcript.append_line(elapsed, TranscriptRole::Emulator, response)?;
            }
        }
        Ok(responses)
    }

    fn execute(&mut self, command: ConsoleCommand) -> Vec<String> {
        match command {
            ConsoleCommand::Help => HELP.lines().map(str::to_string).collect(),
            ConsoleCommand::Status => vec![self.status_line()],
            ConsoleCommand::Mode(mode) => {
                self.set_mode_switch(mode);
                vec![format!("OK mode switch -> {mode}")]
            }
            ConsoleCommand::Speed(omega) => {
                self.set_speed(omega);
                vec![format!("OK speed reference {omega:.2} rad/s")]
            }
            ConsoleCommand::Duty(duty) => {
                self.reference = None;
                self.send(LinkCommand::raw_duty(duty, self.steering));
                vec![format!("OK raw duty {duty}")]
            }
            ConsoleCommand::Steer(duty) => {
                self.steering = duty;
                self.send(LinkCommand::new(self.command.traction, steering_wire(duty)));
                vec![format!("OK steering {duty}")]
            }
            ConsoleCommand::Stick {
                traction_us,
                steering_us,
            } => {
                self.set_sticks(traction_us, steering_us);
                vec![format!("OK sticks traction={traction_us}us steering={steering_us}us")]
            }
            ConsoleCommand::Run(ticks) => {
                if ticks > MAX_RUN_TICKS {
                    return vec![format!("ERR run is limited to {MAX_RUN_TICKS} ticks")];
                }
                self.run(ticks)
            }
        }
    }

    /// Moves the receiver mode switch; the scheduler follows once the pulse
    /// has been stable for long enough.
    pub fn set_mode_switch(&mut self, mode: Mode) {
        self.vehicle.receiver_state.set_mode(mode);
    }

    /// Moves the receiver sticks; only Manual reads them.
    pub fn set_sticks(&mut self, traction_us: u32, steering_us: u32) {
        self.vehicle.receiver_state.traction_us = traction_us;
        self.vehicle.receiver_state.steering_us = steering_us;
    }

    pub fn set_speed(&mut self, omega: f32) {
        self.reference = Some(omega);
        self.send(LinkCommand::speed(omega, self.steering));
    }

    #[must_use]
    pub fn reference(&self) -> Option<f32> {
        self.reference
    }

    /// True drivetrain speed, as opposed to the estimate in the report.
    #[must_use]
    pub fn plant_omega(&self) -> f32 {
        self.vehicle.omega()
    }

    /// Advances the simulation by one control period.
    pub fn step(&mut self) -> TickReport {
        self.vehicle.advance(self.now_us);
        let report = self.scheduler.tick(self.now_us, self.command);
        self.vehicle.drive(report.esc_duty);
        self.now_us += TICK_US;
        self.last_report = Some(report.clone());
        report
    }

    fn run(&mut self, ticks: u32) -> Vec<String> {
        let mut lines = Vec::new();
        for _ in 0..ticks {
            let report = self.step();
            if let Some(transition) = report.transition {
                lines.push(format!(
                    "t={}ms mode {} -> {}",
                    report.timestamp_us / 1_000,
                    transition.from,
                    transition.to
                ));
            }
            for fault in &report.faults {
                lines.push(format!(
                    "t={}ms {} rejected {}",
                    report.timestamp_us / 1_000,
                    fault.actuator,
                    fault.requested
                ));
            }
        }
        lines.push(self.status_line());
        lines
    }

    /// Pushes `command` through the wire codec, as the companion would.
    fn send(&mut self, command: LinkCommand) {
        for byte in command.encode() {
            if let Some(decoded) = self.decoder.push(byte) {
                self.command = decoded;
            }
        }
    }

    fn status_line(&self) -> String {
        let Some(report) = self.last_report.as_ref() else {
            return format!("mode={} (not started)", self.scheduler.mode());
        };
        let effort = report
            .effort
            .map_or_else(|| "-".to_string(), |effort| format!("{effort:.3}"));
        let reference = self
            .reference()
            .map_or_else(|| "-".to_string(), |omega| format!("{omega:.2}"));
        format!(
            "t={}ms mode={} ref={} omega_l={:.2} omega_r={:.2} plant={:.2} effort={} esc={} servo={} events={}",
            report.timestamp_us / 1_000,
            report.mode,
            reference,
            report.omega_left,
            report.omega_right,
            self.plant_omega(),
            effort,
            report.esc_duty,
            report.servo_duty,
            self.scheduler.telemetry().len()
        )
    }
}

fn steering_wire(duty: u16) -> i16 {
    i16::try_from(duty).unwrap_or(i16::MAX)
}

fn config_error(error: drive_core::config::ConfigError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, error.to_string())
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# drive emulator transcript")?;
        Ok(logger)
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[{:>8}ms] {} {line}",
            elapsed.as_millis(),
            role.prefix()
        )?;
        self.writer.flush()
    }
}

#[derive(Clone, Copy)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use drive_core::config::{CTRL_MODEL_A, ESC_LIMITS};

    use super::*;

    fn session() -> Session {
        Session::new(CTRL_MODEL_A, None).expect("default configuration is valid")
    }

    /// Ten receiver frames of ten ticks each, with margin.
    const SWITCH_TICKS: u32 = 150;

    #[test]
    fn switch_to_auto_is_accepted_after_stable_frames() {
        let mut session = session();
        session.set_mode_switch(Mode::Auto);
        let mut entered = None;
        for tick in 0..SWITCH_TICKS {
            if session.step().mode == Mode::Auto {
                entered = Some(tick);
                break;
            }
        }
        let tick = entered.expect("auto mode should be entered");
        assert!(tick >= 90, "switch accepted too early at tick {tick}");
    }

    #[test]
    fn auto_tracks_the_speed_reference() {
        let mut session = session();
        session.set_mode_switch(Mode::Auto);
        session.set_speed(30.0);
        let mut last = session.step();
        let mut tail = Vec::new();
        for tick in 0..3_000 {
            last = session.step();
            if tick >= 2_800 {
                tail.push(session.plant_omega());
            }
        }

        assert_eq!(last.mode, Mode::Auto);
        #[allow(clippy::cast_precision_loss)]
        let mean = tail.iter().sum::<f32>() / tail.len() as f32;
        assert!((mean - 30.0).abs() < 2.0, "plant speed {mean}");
        assert!(last.esc_duty > ESC_LIMITS.idle);
    }

    #[test]
    fn secure_mode_ignores_the_host() {
        let mut session = session();
        session.set_speed(30.0);
        for _ in 0..500 {
            let report = session.step();
            assert_eq!(report.esc_duty, ESC_LIMITS.idle);
        }
        assert!(session.plant_omega().abs() < 1e-3);
    }

    #[test]
    fn manual_mode_follows_the_sticks() {
        let mut session = session();
        session
            .handle_command("mode manual")
            .expect("no transcript");
        session
            .handle_command("stick 2000 1250")
            .expect("no transcript");

        let mut last = session.step();
        for _ in 0..SWITCH_TICKS {
            last = session.step();
        }

        assert_eq!(last.mode, Mode::Manual);
        assert_eq!(last.esc_duty, 8328);
        assert_eq!(last.servo_duty, 5891);
        assert!(session.plant_omega() > 0.0, "vehicle should start rolling");
    }

    #[test]
    fn console_lines_drive_the_session() {
        let mut session = session();
        let reply = session.handle_command("duty 7500").expect("no transcript");
        assert_eq!(reply, vec!["OK raw duty 7500".to_string()]);

        let reply = session.handle_command("bogus").expect("no transcript");
        assert!(reply[0].starts_with("ERR"));

        let reply = session.handle_command("run 5").expect("no transcript");
        assert!(reply.last().expect("status line").contains("mode=secure"));
    }
}
