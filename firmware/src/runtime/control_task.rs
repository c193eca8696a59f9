use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::gpio::OutputType;
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::low_level::CountingMode;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm, SimplePwmChannel};
use embassy_time::{Duration, Instant, Ticker};

use drive_core::actuator::ActuatorSink;
use drive_core::config::LOOP_PERIOD_MS;
use drive_core::link::LinkCommand;

use super::FirmwareScheduler;
use crate::link::{self, FrameSignal, LinkChannel};
use crate::{status, telemetry};

/// Servo frame rate; a full 16-bit duty spans one period, so 7010 counts is
/// a 1.5 ms pulse.
const PWM_FREQUENCY_HZ: u32 = 71;

/// One TIM3 compare channel driven as a 16-bit duty fraction.
pub struct PwmSink {
    channel: SimplePwmChannel<'static, hal::peripherals::TIM3>,
}

impl ActuatorSink for PwmSink {
    fn write_command(&mut self, duty: u16) {
        self.channel.set_duty_cycle_fraction(duty, u16::MAX);
    }
}

/// Configures TIM3 with the ESC on CH1 (PA6) and the steering servo on CH2
/// (PA7).
pub fn pwm_outputs(
    tim: Peri<'static, hal::peripherals::TIM3>,
    esc_pin: Peri<'static, hal::peripherals::PA6>,
    servo_pin: Peri<'static, hal::peripherals::PA7>,
) -> (PwmSink, PwmSink) {
    let pwm = SimplePwm::new(
        tim,
        Some(PwmPin::new(esc_pin, OutputType::PushPull)),
        Some(PwmPin::new(servo_pin, OutputType::PushPull)),
        None,
        None,
        Hertz(PWM_FREQUENCY_HZ),
        CountingMode::EdgeAlignedUp,
    );

    let channels = pwm.split();
    let mut esc = channels.ch1;
    let mut servo = channels.ch2;
    esc.enable();
    servo.enable();

    (PwmSink { channel: esc }, PwmSink { channel: servo })
}

#[embassy_executor::task]
pub async fn run(
    mut scheduler: FirmwareScheduler,
    events: &'static LinkChannel,
    frames: &'static FrameSignal,
) -> ! {
    let receiver = events.receiver();
    let mut command = LinkCommand::default();
    let mut ticker = Ticker::every(Duration::from_millis(u64::from(LOOP_PERIOD_MS)));

    loop {
        ticker.next().await;
        let now_us = Instant::now().as_micros();

        let discarded = link::drain(&receiver, &mut command);
        if discarded > 0 {
            scheduler.telemetry_mut().record_link_drop(discarded, now_us);
            telemetry::log_link_drop(discarded, now_us);
        }

        let report = scheduler.tick(now_us, command);
        status::record_report(&report);
        telemetry::log_report(&report);
        let snapshot = status::snapshot();
        if status::heartbeat_due(snapshot.ticks) {
            telemetry::log_status(&snapshot);
        }
        frames.signal(report.frame());
    }
}
