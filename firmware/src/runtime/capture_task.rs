//! Edge capture for the wheel encoders and the RC receiver.
//!
//! One task per pin, all polled by the high-priority interrupt executor so an
//! edge is stamped as soon as its EXTI line fires, ahead of the control tick.
//! Each task keeps its own edge future alive across iterations.

use embassy_stm32::exti::ExtiInput;
use embassy_time::Instant;

use drive_core::capture::Ticks;

use crate::capture::CaptureBank;

/// Capture timestamps wrap with the 32-bit tick counter.
#[allow(clippy::cast_possible_truncation)]
fn now_ticks() -> Ticks {
    Instant::now().as_micros() as Ticks
}

// Two wheel encoders plus three receiver channels.
#[embassy_executor::task(pool_size = 5)]
pub async fn watch_pin(bank: &'static CaptureBank, mut input: ExtiInput<'static>, mask: u8) -> ! {
    bank.on_edge(mask, input.is_high(), now_ticks());

    loop {
        input.wait_for_any_edge().await;
        bank.on_edge(mask, input.is_high(), now_ticks());
    }
}
