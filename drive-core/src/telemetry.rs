//! Telemetry event catalog and in-memory history.
//!
//! Events encode to compact numeric codes so they can travel over the
//! diagnostics channel next to the host link frames. The recorder keeps the
//! most recent records in a fixed-size ring; older entries are overwritten.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::actuator::{ActuatorFault, ActuatorKind};
use crate::mode::Mode;

/// Canonical timestamp units for telemetry records (microseconds).
pub type TimestampMicros = u64;

/// Monotonic identifier assigned to every record.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    /// The control loop switched to the given mode.
    ModeChanged(Mode),
    /// An actuator request was out of range under Auto.
    ActuatorFault(ActuatorKind),
    /// A partial host record was discarded.
    LinkDropped,
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::ModeChanged(mode) => write!(f, "mode-changed {mode}"),
            TelemetryEventKind::ActuatorFault(kind) => write!(f, "actuator-fault {kind}"),
            TelemetryEventKind::LinkDropped => f.write_str("link-dropped"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    const MODE_CHANGED_BASE: u16 = 0x0000;
    const ACTUATOR_FAULT_BASE: u16 = 0x0004;
    const LINK_DROPPED_CODE: u16 = 0x0008;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::ModeChanged(mode) => Self::MODE_CHANGED_BASE + mode.to_raw() as u16,
            TelemetryEventKind::ActuatorFault(kind) => {
                Self::ACTUATOR_FAULT_BASE + actuator_index(kind)
            }
            TelemetryEventKind::LinkDropped => Self::LINK_DROPPED_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`TelemetryEventKind::Custom`].
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        match code {
            Self::LINK_DROPPED_CODE => TelemetryEventKind::LinkDropped,
            value if (Self::MODE_CHANGED_BASE..Self::ACTUATOR_FAULT_BASE).contains(&value) => {
                u8::try_from(value - Self::MODE_CHANGED_BASE)
                    .ok()
                    .and_then(Mode::from_raw)
                    .map_or(TelemetryEventKind::Custom(value), |mode| {
                        TelemetryEventKind::ModeChanged(mode)
                    })
            }
            value if (Self::ACTUATOR_FAULT_BASE..Self::LINK_DROPPED_CODE).contains(&value) => {
                actuator_from_index(value - Self::ACTUATOR_FAULT_BASE)
                    .map_or(TelemetryEventKind::Custom(value), |kind| {
                        TelemetryEventKind::ActuatorFault(kind)
                    })
            }
            other => TelemetryEventKind::Custom(other),
        }
    }
}

const fn actuator_index(kind: ActuatorKind) -> u16 {
    match kind {
        ActuatorKind::Traction => 0,
        ActuatorKind::Steering => 1,
    }
}

fn actuator_from_index(index: u16) -> Option<ActuatorKind> {
    match index {
        0 => Some(ActuatorKind::Traction),
        1 => Some(ActuatorKind::Steering),
        _ => None,
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    None,
    /// Mode left by the transition.
    Transition { from: Mode },
    /// Duty that was refused.
    Fault { requested: u16 },
    /// Bytes thrown away with the partial record.
    Link { discarded: u8 },
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub timestamp_us: TimestampMicros,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: HistoryBuf<TelemetryRecord, CAPACITY>,
    last_transition_at: Option<TimestampMicros>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_transition_at: None,
            next_event_id: 0,
        }
    }

    /// Iterates the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Timestamp of the last recorded mode change.
    #[must_use]
    pub fn last_transition_at(&self) -> Option<TimestampMicros> {
        self.last_transition_at
    }

    pub fn record_mode_change(
        &mut self,
        from: Mode,
        to: Mode,
        timestamp_us: TimestampMicros,
    ) -> EventId {
        self.last_transition_at = Some(timestamp_us);
        self.record(
            TelemetryEventKind::ModeChanged(to),
            TelemetryPayload::Transition { from },
            timestamp_us,
        )
    }

    pub fn record_fault(&mut self, fault: ActuatorFault, timestamp_us: TimestampMicros) -> EventId {
        self.record(
            TelemetryEventKind::ActuatorFault(fault.actuator),
            TelemetryPayload::Fault {
                requested: fault.requested,
            },
            timestamp_us,
        )
    }

    pub fn record_link_drop(&mut self, discarded: usize, timestamp_us: TimestampMicros) -> EventId {
        self.record(
            TelemetryEventKind::LinkDropped,
            TelemetryPayload::Link {
                discarded: u8::try_from(discarded).unwrap_or(u8::MAX),
            },
            timestamp_us,
        )
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        details: TelemetryPayload,
        timestamp_us: TimestampMicros,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp_us,
            event,
            details,
        });

        id
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_round_trip() {
        let events = [
            TelemetryEventKind::ModeChanged(Mode::Auto),
            TelemetryEventKind::ModeChanged(Mode::Manual),
            TelemetryEventKind::ActuatorFault(ActuatorKind::Steering),
            TelemetryEventKind::LinkDropped,
            TelemetryEventKind::Custom(0x0100),
        ];
        for event in events {
            assert_eq!(TelemetryEventKind::from_raw(event.to_raw()), event);
        }
        assert_eq!(
            TelemetryEventKind::from_raw(0x0003),
            TelemetryEventKind::Custom(0x0003),
            "unused mode slot decodes as custom"
        );
    }

    #[test]
    fn recorder_overwrites_the_oldest_entries() {
        let mut recorder = TelemetryRecorder::<4>::new();
        for tick in 0..6_u64 {
            recorder.record_link_drop(1, tick * 2_000);
        }

        assert_eq!(recorder.len(), 4);
        let ids: heapless::Vec<EventId, 4> =
            recorder.oldest_first().map(|record| record.id).collect();
        assert_eq!(ids.as_slice(), &[2, 3, 4, 5]);
    }

    #[test]
    fn mode_changes_track_the_last_transition() {
        let mut recorder = TelemetryRecorder::<8>::new();
        recorder.record_mode_change(Mode::Secure, Mode::Auto, 4_000);
        recorder.record_fault(
            ActuatorFault {
                actuator: ActuatorKind::Traction,
                requested: 9_000,
            },
            6_000,
        );

        assert_eq!(recorder.last_transition_at(), Some(4_000));
        let latest = recorder.latest().expect("two records");
        assert_eq!(latest.details, TelemetryPayload::Fault { requested: 9_000 });
    }
}
