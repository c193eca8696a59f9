//! Logging hooks for control-loop events.
//!
//! The recorder ring itself lives in `drive_core::telemetry` and is owned by
//! the scheduler; this module mirrors the interesting parts of each tick to
//! defmt on the target and stdout on the host.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use drive_core::actuator::{ActuatorFault, ActuatorKind};
use drive_core::config::ConfigError;
use drive_core::mode::Mode;
use drive_core::scheduler::TickReport;

use crate::status::StatusSnapshot;

/// Logs mode transitions and actuator faults carried by `report`.
pub fn log_report(report: &TickReport) {
    if let Some(transition) = report.transition {
        emit_transition(
            mode_label(transition.from),
            mode_label(transition.to),
            report.timestamp_us,
        );
    }
    for fault in &report.faults {
        emit_fault(fault, report.timestamp_us);
    }
}

pub fn log_link_drop(discarded: usize, timestamp_us: u64) {
    emit_link_drop(discarded, timestamp_us);
}

pub fn log_config_error(error: &ConfigError) {
    emit_config_error(error);
}

pub fn log_status(snapshot: &StatusSnapshot) {
    emit_status(mode_label(snapshot.mode), snapshot);
}

const fn mode_label(mode: Mode) -> &'static str {
    match mode {
        Mode::Auto => "auto",
        Mode::Secure => "secure",
        Mode::Manual => "manual",
    }
}

const fn actuator_label(fault: &ActuatorFault) -> &'static str {
    match fault.actuator {
        ActuatorKind::Traction => "traction",
        ActuatorKind::Steering => "steering",
    }
}

#[cfg(target_os = "none")]
fn emit_transition(from: &'static str, to: &'static str, timestamp_us: u64) {
    defmt::info!("telemetry:mode {} -> {} t={}us", from, to, timestamp_us);
}

#[cfg(not(target_os = "none"))]
fn emit_transition(from: &'static str, to: &'static str, timestamp_us: u64) {
    println!("telemetry:mode {from} -> {to} t={timestamp_us}us");
}

#[cfg(target_os = "none")]
fn emit_fault(fault: &ActuatorFault, timestamp_us: u64) {
    defmt::warn!(
        "telemetry:fault {} rejected {} t={}us",
        actuator_label(fault),
        fault.requested,
        timestamp_us
    );
}

#[cfg(not(target_os = "none"))]
fn emit_fault(fault: &ActuatorFault, timestamp_us: u64) {
    println!(
        "telemetry:fault {} rejected {} t={}us",
        actuator_label(fault),
        fault.requested,
        timestamp_us
    );
}

#[cfg(target_os = "none")]
fn emit_link_drop(discarded: usize, timestamp_us: u64) {
    defmt::warn!(
        "telemetry:link dropped {} bytes t={}us",
        discarded,
        timestamp_us
    );
}

#[cfg(not(target_os = "none"))]
fn emit_link_drop(discarded: usize, timestamp_us: u64) {
    println!("telemetry:link dropped {discarded} bytes t={timestamp_us}us");
}

#[cfg(target_os = "none")]
fn emit_status(mode: &'static str, snapshot: &StatusSnapshot) {
    defmt::info!(
        "status: ticks={} mode={} esc={} servo={} omega_l={} omega_r={} faults={} link_drops={}",
        snapshot.ticks,
        mode,
        snapshot.esc_duty,
        snapshot.servo_duty,
        snapshot.omega_left,
        snapshot.omega_right,
        snapshot.faults,
        snapshot.link_drops
    );
}

#[cfg(not(target_os = "none"))]
fn emit_status(mode: &'static str, snapshot: &StatusSnapshot) {
    println!("{}", status_line(mode, snapshot));
}

#[cfg(not(target_os = "none"))]
fn status_line(mode: &'static str, snapshot: &StatusSnapshot) -> String {
    format!(
        "status: ticks={} mode={mode} esc={} servo={} omega_l={:.2} omega_r={:.2} faults={} link_drops={}",
        snapshot.ticks,
        snapshot.esc_duty,
        snapshot.servo_duty,
        snapshot.omega_left,
        snapshot.omega_right,
        snapshot.faults,
        snapshot.link_drops
    )
}

#[cfg(target_os = "none")]
fn emit_config_error(error: &ConfigError) {
    defmt::error!("config: {}", defmt::Display2Format(error));
}

#[cfg(not(target_os = "none"))]
fn emit_config_error(error: &ConfigError) {
    eprintln!("config: {error}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_cover_every_mode() {
        assert_eq!(mode_label(Mode::Auto), "auto");
        assert_eq!(mode_label(Mode::Secure), "secure");
        assert_eq!(mode_label(Mode::Manual), "manual");
    }

    #[test]
    fn status_line_carries_the_snapshot() {
        let snapshot = StatusSnapshot {
            mode: Mode::Auto,
            esc_duty: 7010,
            servo_duty: 6881,
            omega_left: 1.5,
            omega_right: 2.25,
            faults: 3,
            link_drops: 1,
            ticks: 500,
        };
        assert_eq!(
            status_line(mode_label(snapshot.mode), &snapshot),
            "status: ticks=500 mode=auto esc=7010 servo=6881 omega_l=1.50 omega_r=2.25 faults=3 link_drops=1"
        );
    }
}
