//! Channels between the host link task and the control task.
//!
//! The link task decodes command records from the UART and forwards them as
//! [`LinkEvent`]s; the control task drains the queue once per tick and
//! publishes the newest outbound frame through a [`FrameSignal`]. Only the
//! latest frame matters, so a signal (overwrite on write) is used instead of a
//! queue.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use drive_core::link::{LinkCommand, TelemetryFrame};
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_sync::signal::Signal;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;

#[cfg(target_os = "none")]
type LinkMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type LinkMutex = NoopRawMutex;

/// Events buffered between two control ticks.
pub const LINK_QUEUE_DEPTH: usize = 4;

/// Inter-byte gap after which a partial record is discarded.
pub const LINK_GAP_MS: u64 = 5;

/// Host link baud rate.
pub const LINK_BAUD: u32 = 250_000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkEvent {
    /// A complete command record arrived.
    Command(LinkCommand),
    /// A partial record timed out and was thrown away.
    Dropped { discarded: usize },
}

pub type LinkChannel = Channel<LinkMutex, LinkEvent, LINK_QUEUE_DEPTH>;
pub type LinkSender<'a> = Sender<'a, LinkMutex, LinkEvent, LINK_QUEUE_DEPTH>;
pub type LinkReceiver<'a> = Receiver<'a, LinkMutex, LinkEvent, LINK_QUEUE_DEPTH>;

/// Latest outbound telemetry frame.
pub type FrameSignal = Signal<LinkMutex, TelemetryFrame>;

/// Folds queued events into the command in effect; returns the number of
/// bytes dropped since the previous call.
pub fn drain(receiver: &LinkReceiver<'_>, command: &mut LinkCommand) -> usize {
    let mut discarded_total = 0;
    while let Ok(event) = receiver.try_receive() {
        match event {
            LinkEvent::Command(next) => *command = next,
            LinkEvent::Dropped { discarded } => discarded_total += discarded,
        }
    }
    discarded_total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_keeps_the_newest_command() {
        let channel = LinkChannel::new();
        let sender = channel.sender();
        sender
            .try_send(LinkEvent::Command(LinkCommand::new(100, 6881)))
            .expect("queue has room");
        sender
            .try_send(LinkEvent::Dropped { discarded: 3 })
            .expect("queue has room");
        sender
            .try_send(LinkEvent::Command(LinkCommand::new(-7200, 7000)))
            .expect("queue has room");

        let mut command = LinkCommand::default();
        let dropped = drain(&channel.receiver(), &mut command);

        assert_eq!(command, LinkCommand::new(-7200, 7000));
        assert_eq!(dropped, 3);
        assert!(channel.is_empty());
    }

    #[test]
    fn empty_queue_keeps_the_previous_command() {
        let channel = LinkChannel::new();
        let mut command = LinkCommand::new(2500, 6000);
        assert_eq!(drain(&channel.receiver(), &mut command), 0);
        assert_eq!(command, LinkCommand::new(2500, 6000));
    }
}
