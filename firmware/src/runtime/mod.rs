use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Level, Output, Pull, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_time::{Duration, Timer};

use drive_core::capture::GroupId;
use drive_core::config::{ConfigError, PIN_ROUTES, SchedulerConfig, pins};
use drive_core::mode::ModeSelector;
use drive_core::scheduler::{
    ControlLoopScheduler, ManualInputs, SchedulerParts, WheelInputs,
};

use crate::capture::{CaptureBank, CaptureMasks, FirmwareChannel};
use crate::link::{FrameSignal, LinkChannel};
use crate::telemetry;

mod capture_task;
mod control_task;
mod link_task;

use control_task::PwmSink;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        cortex_m::interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                cortex_m::interrupt::enable();
            }
        }
    }
}

pub(super) static WHEEL_BANK: CaptureBank = CaptureBank::new(GroupId::Wheels);
pub(super) static RECEIVER_BANK: CaptureBank = CaptureBank::new(GroupId::Receiver);
pub(super) static LINK_EVENTS: LinkChannel = LinkChannel::new();
pub(super) static FRAMES: FrameSignal = FrameSignal::new();

/// Runs the capture tasks above the thread-mode control loop.
static CAPTURE_EXECUTOR: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SPI1() {
    unsafe { CAPTURE_EXECUTOR.on_interrupt() }
}

pub(super) type FirmwareScheduler =
    ControlLoopScheduler<ModeSelector<FirmwareChannel>, FirmwareChannel, PwmSink, PwmSink>;

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA5,
        PA6,
        PA7,
        PB0,
        PB1,
        PC6,
        PC7,
        PC8,
        EXTI0,
        EXTI1,
        EXTI6,
        EXTI7,
        EXTI8,
        TIM3,
        USART5,
        ..
    } = hal::init(config);

    let (esc, servo) = control_task::pwm_outputs(TIM3, PA6, PA7);

    let (masks, scheduler) = match startup(esc, servo) {
        Ok(parts) => parts,
        Err(error) => {
            telemetry::log_config_error(&error);
            fatal_blink(Output::new(PA5, Level::Low, Speed::Low)).await;
        }
    };

    interrupt::SPI1.set_priority(Priority::P1);
    let capture = CAPTURE_EXECUTOR.start(interrupt::SPI1);
    let watched = [
        (&WHEEL_BANK, ExtiInput::new(PA0, EXTI0, Pull::None), masks.right),
        (&WHEEL_BANK, ExtiInput::new(PA1, EXTI1, Pull::None), masks.left),
        (&RECEIVER_BANK, ExtiInput::new(PC6, EXTI6, Pull::None), masks.steering),
        (&RECEIVER_BANK, ExtiInput::new(PC7, EXTI7, Pull::None), masks.traction),
        (&RECEIVER_BANK, ExtiInput::new(PC8, EXTI8, Pull::None), masks.mode),
    ];
    for (bank, input, mask) in watched {
        capture
            .spawn(capture_task::watch_pin(bank, input, mask))
            .expect("failed to spawn capture task");
    }

    spawner
        .spawn(link_task::run(&LINK_EVENTS, &FRAMES, USART5, PB0, PB1))
        .expect("failed to spawn link task");
    spawner
        .spawn(control_task::run(scheduler, &LINK_EVENTS, &FRAMES))
        .expect("failed to spawn control task");

    core::future::pending::<()>().await;
}

/// Resolves the capture masks and assembles the control loop. Any routing or
/// tuning error aborts startup.
fn startup(
    esc: PwmSink,
    servo: PwmSink,
) -> Result<(CaptureMasks, FirmwareScheduler), ConfigError> {
    let masks = CaptureMasks::from_routes(&PIN_ROUTES)?;
    let scheduler = build_scheduler(esc, servo, &SchedulerConfig::new())?;
    Ok((masks, scheduler))
}

/// Claims every capture channel and builds the scheduler around them.
fn build_scheduler(
    esc: PwmSink,
    servo: PwmSink,
    config: &SchedulerConfig,
) -> Result<FirmwareScheduler, ConfigError> {
    let wheels = WheelInputs {
        left: WHEEL_BANK.group().claim(&PIN_ROUTES, pins::LEFT_WHEEL)?,
        right: WHEEL_BANK.group().claim(&PIN_ROUTES, pins::RIGHT_WHEEL)?,
    };
    let manual = ManualInputs {
        traction: RECEIVER_BANK.group().claim(&PIN_ROUTES, pins::TRACTION)?,
        steering: RECEIVER_BANK.group().claim(&PIN_ROUTES, pins::STEERING)?,
    };
    let mode_source = ModeSelector::new(RECEIVER_BANK.group().claim(&PIN_ROUTES, pins::MODE)?);

    ControlLoopScheduler::new(
        SchedulerParts {
            mode_source,
            wheels,
            manual: Some(manual),
            traction: esc,
            steering: servo,
        },
        config,
    )
}

/// Blinks the status LED in a long-short-short pattern forever.
async fn fatal_blink(mut led: Output<'static>) -> ! {
    const PATTERN_MS: [(bool, u64); 6] = [
        (true, 2_000),
        (false, 500),
        (true, 500),
        (false, 500),
        (true, 500),
        (false, 500),
    ];

    loop {
        for (on, duration_ms) in PATTERN_MS {
            if on {
                led.set_high();
            } else {
                led.set_low();
            }
            Timer::after(Duration::from_millis(duration_ms)).await;
        }
    }
}
