#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Capture banks fed by the per-pin EXTI tasks.
//!
//! Every watched pin reports its own edges. The bank folds the new level into
//! its level word and replays the whole word to the port group, so readers
//! see the same interface they would get from a port-wide interrupt.

use core::cell::Cell;

use critical_section::Mutex;
use drive_core::capture::{
    CaptureChannel, GroupId, PinRoute, SharedPortGroup, Ticks, route_for,
};
use drive_core::config::{ConfigError, PORT_GROUP_CAPACITY, pins};

pub type FirmwareChannel = CaptureChannel<'static, PORT_GROUP_CAPACITY>;

pub struct CaptureBank {
    group: SharedPortGroup<PORT_GROUP_CAPACITY>,
    levels: Mutex<Cell<u8>>,
}

impl CaptureBank {
    pub const fn new(id: GroupId) -> Self {
        Self {
            group: SharedPortGroup::new(id),
            levels: Mutex::new(Cell::new(0)),
        }
    }

    pub const fn group(&self) -> &SharedPortGroup<PORT_GROUP_CAPACITY> {
        &self.group
    }

    /// Records that the pin behind `mask` is now `high` and dispatches the
    /// updated level word stamped with `now`.
    pub fn on_edge(&self, mask: u8, high: bool, now: Ticks) {
        critical_section::with(|cs| {
            let cell = self.levels.borrow(cs);
            let levels = if high {
                cell.get() | mask
            } else {
                cell.get() & !mask
            };
            cell.set(levels);
            self.group.dispatch(levels, now);
        });
    }

    pub fn levels(&self) -> u8 {
        critical_section::with(|cs| self.levels.borrow(cs).get())
    }
}

/// Level-word bit of every captured pin, taken from the routing table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CaptureMasks {
    pub right: u8,
    pub left: u8,
    pub steering: u8,
    pub traction: u8,
    pub mode: u8,
}

impl CaptureMasks {
    pub fn from_routes(routes: &[PinRoute]) -> Result<Self, ConfigError> {
        let mask = |pin| route_for(routes, pin).map(|route| route.mask);
        Ok(Self {
            right: mask(pins::RIGHT_WHEEL)?,
            left: mask(pins::LEFT_WHEEL)?,
            steering: mask(pins::STEERING)?,
            traction: mask(pins::TRACTION)?,
            mode: mask(pins::MODE)?,
        })
    }
}
