use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Duration, Timer, with_timeout};
use embedded_io_async::{Read, Write};
use static_cell::StaticCell;

use drive_core::link::{COMMAND_LEN, FRAME_LEN, LinkDecoder, TelemetryFrame};

use crate::link::{FrameSignal, LINK_BAUD, LINK_GAP_MS, LINK_QUEUE_DEPTH, LinkChannel, LinkEvent};
use crate::status;

const LINK_UART_BUFFER_SIZE: usize = (COMMAND_LEN + FRAME_LEN) * LINK_QUEUE_DEPTH;

static UART_TX_BUFFER: StaticCell<[u8; LINK_UART_BUFFER_SIZE]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; LINK_UART_BUFFER_SIZE]> = StaticCell::new();

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

/// Reads command records from the host and answers each one with the latest
/// telemetry frame. A gap inside a record discards the partial bytes.
#[embassy_executor::task]
pub async fn run(
    events: &'static LinkChannel,
    frames: &'static FrameSignal,
    usart: Peri<'static, hal::peripherals::USART5>,
    tx_pin: Peri<'static, hal::peripherals::PB0>,
    rx_pin: Peri<'static, hal::peripherals::PB1>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = LINK_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let uart = BufferedUart::new(
        usart,
        rx_pin,
        tx_pin,
        UART_TX_BUFFER.init([0; LINK_UART_BUFFER_SIZE]),
        UART_RX_BUFFER.init([0; LINK_UART_BUFFER_SIZE]),
        UartIrqs,
        config,
    )
    .expect("failed to initialize link UART");

    let (mut uart_tx, mut uart_rx) = uart.split();
    let sender = events.sender();
    let mut decoder = LinkDecoder::new();
    let mut latest = TelemetryFrame::default();
    let mut byte = [0u8; 1];

    loop {
        let read = if decoder.pending() == 0 {
            Ok(uart_rx.read(&mut byte).await)
        } else {
            with_timeout(
                Duration::from_millis(LINK_GAP_MS),
                uart_rx.read(&mut byte),
            )
            .await
        };

        match read {
            Ok(Ok(1)) => {
                let Some(command) = decoder.push(byte[0]) else {
                    continue;
                };
                if sender.try_send(LinkEvent::Command(command)).is_err() {
                    defmt::warn!("link: command queue full");
                }

                if let Some(frame) = frames.try_take() {
                    latest = frame;
                }
                if uart_tx.write_all(&latest.encode()).await.is_err() {
                    defmt::warn!("link: UART write error");
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(_)) => {
                defmt::warn!("link: UART read error");
                decoder.reset();
                Timer::after(Duration::from_millis(LINK_GAP_MS)).await;
            }
            Err(_) => {
                let discarded = decoder.reset();
                status::record_link_drop();
                if sender.try_send(LinkEvent::Dropped { discarded }).is_err() {
                    defmt::warn!("link: command queue full");
                }
            }
        }
    }
}
