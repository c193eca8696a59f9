#![no_std]

// Sensing, estimation and control logic for the traction firmware.
//
// Everything here is allocation free and independent of the executor so the
// same code runs inside the MCU firmware, the host emulator and unit tests.

pub mod actuator;
pub mod capture;
pub mod config;
pub mod console;
pub mod control;
pub mod delay_line;
pub mod encoder;
pub mod link;
pub mod lookup;
pub mod mode;
pub mod observer;
pub mod scheduler;
pub mod telemetry;
