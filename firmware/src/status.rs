#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The control task publishes the outcome of every tick into a handful of
//! atomics and logs a [`StatusSnapshot`] of them as a periodic heartbeat.

use drive_core::mode::Mode;
use drive_core::scheduler::TickReport;
use portable_atomic::{AtomicF32, AtomicU8, AtomicU16, AtomicU32, Ordering};

static MODE: AtomicU8 = AtomicU8::new(Mode::Secure.to_raw());
static ESC_DUTY: AtomicU16 = AtomicU16::new(0);
static SERVO_DUTY: AtomicU16 = AtomicU16::new(0);
static OMEGA_LEFT: AtomicF32 = AtomicF32::new(0.0);
static OMEGA_RIGHT: AtomicF32 = AtomicF32::new(0.0);
/// Rejected actuator commands since boot.
static FAULTS: AtomicU32 = AtomicU32::new(0);
/// Partial link records dropped since boot.
static LINK_DROPS: AtomicU32 = AtomicU32::new(0);
/// Control ticks completed since boot.
static TICKS: AtomicU32 = AtomicU32::new(0);

/// One heartbeat per second at the 2 ms loop period.
pub const HEARTBEAT_TICKS: u32 = 500;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub mode: Mode,
    pub esc_duty: u16,
    pub servo_duty: u16,
    pub omega_left: f32,
    pub omega_right: f32,
    pub faults: u32,
    pub link_drops: u32,
    pub ticks: u32,
}

/// Publishes the outcome of one control tick.
pub fn record_report(report: &TickReport) {
    MODE.store(report.mode.to_raw(), Ordering::Relaxed);
    ESC_DUTY.store(report.esc_duty, Ordering::Relaxed);
    SERVO_DUTY.store(report.servo_duty, Ordering::Relaxed);
    OMEGA_LEFT.store(report.omega_left, Ordering::Relaxed);
    OMEGA_RIGHT.store(report.omega_right, Ordering::Relaxed);
    if !report.faults.is_empty() {
        #[allow(clippy::cast_possible_truncation)]
        FAULTS.fetch_add(report.faults.len() as u32, Ordering::Relaxed);
    }
    TICKS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_link_drop() {
    LINK_DROPS.fetch_add(1, Ordering::Relaxed);
}

/// True on the ticks that should log a heartbeat.
pub const fn heartbeat_due(ticks: u32) -> bool {
    ticks != 0 && ticks % HEARTBEAT_TICKS == 0
}

pub fn snapshot() -> StatusSnapshot {
    StatusSnapshot {
        mode: Mode::from_raw(MODE.load(Ordering::Relaxed)).unwrap_or_default(),
        esc_duty: ESC_DUTY.load(Ordering::Relaxed),
        servo_duty: SERVO_DUTY.load(Ordering::Relaxed),
        omega_left: OMEGA_LEFT.load(Ordering::Relaxed),
        omega_right: OMEGA_RIGHT.load(Ordering::Relaxed),
        faults: FAULTS.load(Ordering::Relaxed),
        link_drops: LINK_DROPS.load(Ordering::Relaxed),
        ticks: TICKS.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use drive_core::actuator::{ActuatorFault, ActuatorKind};
    use heapless::Vec;

    use super::*;

    // The statics are process-wide, so everything lives in one test.
    #[test]
    fn snapshot_reflects_published_reports() {
        let before = snapshot();

        let mut faults = Vec::new();
        faults
            .push(ActuatorFault {
                actuator: ActuatorKind::Traction,
                requested: 9000,
            })
            .expect("room for one fault");
        let report = TickReport {
            timestamp_us: 2_000,
            mode: Mode::Auto,
            transition: None,
            omega_left: 1.5,
            omega_right: -2.0,
            effort: Some(0.25),
            esc_duty: 7010,
            servo_duty: 6881,
            faults,
        };
        record_report(&report);
        record_link_drop();

        let after = snapshot();
        assert_eq!(after.mode, Mode::Auto);
        assert_eq!(after.esc_duty, 7010);
        assert_eq!(after.servo_duty, 6881);
        assert_eq!(after.omega_left, 1.5);
        assert_eq!(after.omega_right, -2.0);
        assert_eq!(after.faults, before.faults + 1);
        assert_eq!(after.link_drops, before.link_drops + 1);
        assert_eq!(after.ticks, before.ticks + 1);
    }

    #[test]
    fn heartbeat_fires_once_per_period() {
        assert!(!heartbeat_due(0));
        assert!(!heartbeat_due(HEARTBEAT_TICKS - 1));
        assert!(heartbeat_due(HEARTBEAT_TICKS));
        assert!(!heartbeat_due(HEARTBEAT_TICKS + 1));
        assert!(heartbeat_due(3 * HEARTBEAT_TICKS));
    }
}
