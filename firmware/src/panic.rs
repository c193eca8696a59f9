use core::panic::PanicInfo;

/// Logs the panic and traps. Interrupts are masked first so no capture or
/// link handler runs on a corrupted state.
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    cortex_m::interrupt::disable();
    defmt::error!("panic: {}", defmt::Display2Format(info));
    cortex_m::asm::udf();
}
