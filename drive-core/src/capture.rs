//! Interrupt-driven pulse capture shared across I/O banks.
//!
//! Each watched pin owns a [`PulseCapture`] state machine. Readers that share a
//! hardware interrupt vector are collected in a [`PortGroup`]; the interrupt
//! handler hands the group the current level bits of the bank and a
//! timestamp, and the group runs every registered reader.
//!
//! The foreground task never touches the readers directly. [`SharedPortGroup`]
//! keeps the group behind a `critical_section::Mutex` so the interrupt side
//! updates a whole bank in one critical section and the foreground side copies
//! a complete [`PulseSample`], never a mix of old and new fields.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Vec;

use crate::config::ConfigError;

/// Free-running capture timer ticks (microseconds on every supported target).
pub type Ticks = u32;

/// Interrupt sources that can host pulse readers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GroupId {
    /// Wheel encoder bank.
    Wheels,
    /// RC receiver bank (traction, steering and mode channels).
    Receiver,
}

/// Routing entry describing where a pin's level appears.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinRoute {
    pub pin: u8,
    pub group: GroupId,
    /// Bit of the group's level word that mirrors this pin.
    pub mask: u8,
}

impl PinRoute {
    #[must_use]
    pub const fn new(pin: u8, group: GroupId, mask: u8) -> Self {
        Self { pin, group, mask }
    }
}

/// Looks up the route for `pin`; unknown pins are a fatal configuration error.
pub fn route_for(routes: &[PinRoute], pin: u8) -> Result<PinRoute, ConfigError> {
    routes
        .iter()
        .copied()
        .find(|route| route.pin == pin)
        .ok_or(ConfigError::UnknownPin(pin))
}

/// Checks a routing table once at startup: single-bit masks, no duplicate
/// pins and disjoint masks within each group.
pub fn validate_routes(routes: &[PinRoute]) -> Result<(), ConfigError> {
    for (index, route) in routes.iter().enumerate() {
        if !route.mask.is_power_of_two() {
            return Err(ConfigError::InvalidMask(route.mask));
        }

        for earlier in &routes[..index] {
            if earlier.pin == route.pin {
                return Err(ConfigError::DuplicatePin(route.pin));
            }
            if earlier.group == route.group && earlier.mask & route.mask != 0 {
                return Err(ConfigError::MaskConflict {
                    pin: route.pin,
                    mask: route.mask,
                });
            }
        }
    }
    Ok(())
}

/// Copy of one pin's capture state.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PulseSample {
    /// Last observed level.
    pub level: bool,
    /// Timestamp of the most recent rising edge.
    pub rising_edge_at: Ticks,
    /// Duration of the most recently completed high phase.
    pub pulse_width: Ticks,
    /// Falling edges since the counter was last cleared (saturating).
    pub edge_count: u16,
}

/// Edge-timing state machine for one pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PulseCapture {
    mask: u8,
    sample: PulseSample,
    /// Set once a rising edge has been seen, so the first falling edge after
    /// boot does not report a width measured from time zero.
    armed: bool,
}

impl PulseCapture {
    #[must_use]
    pub const fn new(mask: u8) -> Self {
        Self {
            mask,
            sample: PulseSample {
                level: false,
                rising_edge_at: 0,
                pulse_width: 0,
                edge_count: 0,
            },
            armed: false,
        }
    }

    /// Processes a bank level change. Returns `true` if this pin toggled.
    pub fn on_port_change(&mut self, levels: u8, now: Ticks) -> bool {
        let level = levels & self.mask != 0;
        if level == self.sample.level {
            return false;
        }
        self.sample.level = level;

        if level {
            self.sample.rising_edge_at = now;
            self.armed = true;
        } else {
            if self.armed {
                self.sample.pulse_width = now.wrapping_sub(self.sample.rising_edge_at);
            }
            self.sample.edge_count = self.sample.edge_count.saturating_add(1);
        }
        true
    }

    /// Clears the edge counter; the pulse width is kept.
    pub fn reset_counter(&mut self) {
        self.sample.edge_count = 0;
    }

    #[must_use]
    pub const fn sample(&self) -> PulseSample {
        self.sample
    }

    #[must_use]
    pub const fn mask(&self) -> u8 {
        self.mask
    }
}

/// Index of a reader inside its port group.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReaderHandle(u8);

impl ReaderHandle {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Readers multiplexed onto one interrupt source.
#[derive(Clone, Debug)]
pub struct PortGroup<const N: usize> {
    id: GroupId,
    readers: Vec<PulseCapture, N>,
    claimed: u8,
}

impl<const N: usize> PortGroup<N> {
    #[must_use]
    pub const fn new(id: GroupId) -> Self {
        Self {
            id,
            readers: Vec::new(),
            claimed: 0,
        }
    }

    #[must_use]
    pub const fn id(&self) -> GroupId {
        self.id
    }

    /// Adds a reader for `route`. The mask must be a single bit not already
    /// claimed by another reader on this group.
    pub fn register(&mut self, route: PinRoute) -> Result<ReaderHandle, ConfigError> {
        if route.group != self.id {
            return Err(ConfigError::WrongGroup { pin: route.pin });
        }
        if !route.mask.is_power_of_two() {
            return Err(ConfigError::InvalidMask(route.mask));
        }
        if self.claimed & route.mask != 0 {
            return Err(ConfigError::MaskConflict {
                pin: route.pin,
                mask: route.mask,
            });
        }

        let index = u8::try_from(self.readers.len()).map_err(|_| ConfigError::GroupFull)?;
        self.readers
            .push(PulseCapture::new(route.mask))
            .map_err(|_| ConfigError::GroupFull)?;
        self.claimed |= route.mask;
        Ok(ReaderHandle(index))
    }

    /// Runs every registered reader against the bank's level bits.
    pub fn dispatch(&mut self, levels: u8, now: Ticks) {
        for reader in &mut self.readers {
            reader.on_port_change(levels, now);
        }
    }

    /// Union of every registered mask.
    #[must_use]
    pub const fn watched_mask(&self) -> u8 {
        self.claimed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.readers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    #[must_use]
    pub fn sample(&self, handle: ReaderHandle) -> PulseSample {
        self.readers
            .get(handle.index())
            .map(PulseCapture::sample)
            .unwrap_or_default()
    }

    /// Returns the edge count and clears it in one step.
    pub fn take_edges(&mut self, handle: ReaderHandle) -> u16 {
        self.readers.get_mut(handle.index()).map_or(0, |reader| {
            let edges = reader.sample().edge_count;
            reader.reset_counter();
            edges
        })
    }

    pub fn reset_counter(&mut self, handle: ReaderHandle) {
        if let Some(reader) = self.readers.get_mut(handle.index()) {
            reader.reset_counter();
        }
    }
}

/// Port group shared between an interrupt handler and the foreground task.
pub struct SharedPortGroup<const N: usize> {
    inner: Mutex<RefCell<PortGroup<N>>>,
}

impl<const N: usize> SharedPortGroup<N> {
    #[must_use]
    pub const fn new(id: GroupId) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(PortGroup::new(id))),
        }
    }

    /// Resolves `pin` through `routes` and registers a reader for it.
    pub fn claim<'a>(
        &'a self,
        routes: &[PinRoute],
        pin: u8,
    ) -> Result<CaptureChannel<'a, N>, ConfigError> {
        let route = route_for(routes, pin)?;
        let handle =
            critical_section::with(|cs| self.inner.borrow_ref_mut(cs).register(route))?;
        Ok(CaptureChannel {
            group: self,
            handle,
        })
    }

    /// Interrupt entry point: updates every reader on the bank atomically with
    /// respect to the foreground readers.
    pub fn dispatch(&self, levels: u8, now: Ticks) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).dispatch(levels, now));
    }

    #[must_use]
    pub fn snapshot(&self, handle: ReaderHandle) -> PulseSample {
        critical_section::with(|cs| self.inner.borrow_ref(cs).sample(handle))
    }

    pub fn take_edges(&self, handle: ReaderHandle) -> u16 {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).take_edges(handle))
    }

    #[must_use]
    pub fn watched_mask(&self) -> u8 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).watched_mask())
    }
}

/// Foreground view of one captured pin.
pub trait PulseSource {
    /// Consistent copy of the pin's capture record.
    fn sample(&self) -> PulseSample;

    /// Falling edges since the previous call; the counter is cleared.
    fn take_edges(&self) -> u16;
}

impl<T: PulseSource + ?Sized> PulseSource for &T {
    fn sample(&self) -> PulseSample {
        (**self).sample()
    }

    fn take_edges(&self) -> u16 {
        (**self).take_edges()
    }
}

/// Registered reader on a [`SharedPortGroup`].
#[derive(Copy, Clone)]
pub struct CaptureChannel<'a, const N: usize> {
    group: &'a SharedPortGroup<N>,
    handle: ReaderHandle,
}

impl<const N: usize> CaptureChannel<'_, N> {
    #[must_use]
    pub const fn handle(&self) -> ReaderHandle {
        self.handle
    }
}

impl<const N: usize> PulseSource for CaptureChannel<'_, N> {
    fn sample(&self) -> PulseSample {
        self.group.snapshot(self.handle)
    }

    fn take_edges(&self) -> u16 {
        self.group.take_edges(self.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHEEL: PinRoute = PinRoute::new(0, GroupId::Wheels, 0x01);
    const OTHER_WHEEL: PinRoute = PinRoute::new(1, GroupId::Wheels, 0x02);

    #[test]
    fn falling_edge_completes_a_pulse() {
        let mut capture = PulseCapture::new(0x01);

        assert!(capture.on_port_change(0x01, 100));
        assert_eq!(capture.sample().rising_edge_at, 100);
        assert_eq!(capture.sample().edge_count, 0);

        assert!(capture.on_port_change(0x00, 1_600));
        let sample = capture.sample();
        assert_eq!(sample.pulse_width, 1_500);
        assert_eq!(sample.edge_count, 1);
        assert!(!sample.level);
    }

    #[test]
    fn unrelated_bits_are_ignored() {
        let mut capture = PulseCapture::new(0x02);
        assert!(!capture.on_port_change(0x01, 10));
        assert_eq!(capture.sample(), PulseSample::default());
    }

    #[test]
    fn width_survives_timer_wraparound() {
        let mut capture = PulseCapture::new(0x01);
        capture.on_port_change(0x01, u32::MAX - 9);
        capture.on_port_change(0x00, 10);
        assert_eq!(capture.sample().pulse_width, 20);
    }

    #[test]
    fn first_falling_edge_without_rising_edge_keeps_width() {
        let mut late = PulseCapture::new(0x01);
        // Pin high at boot: the first observed transition is a falling edge.
        late.sample.level = true;
        late.on_port_change(0x00, 5_000);

        assert_eq!(late.sample().pulse_width, 0);
        assert_eq!(late.sample().edge_count, 1);
    }

    #[test]
    fn reset_counter_keeps_pulse_width() {
        let mut capture = PulseCapture::new(0x01);
        capture.on_port_change(0x01, 0);
        capture.on_port_change(0x00, 40);
        capture.reset_counter();

        assert_eq!(capture.sample().edge_count, 0);
        assert_eq!(capture.sample().pulse_width, 40);
    }

    #[test]
    fn group_rejects_overlapping_masks() {
        let mut group = PortGroup::<4>::new(GroupId::Wheels);
        group.register(WHEEL).expect("first reader registers");

        let clash = PinRoute::new(7, GroupId::Wheels, 0x01);
        assert_eq!(
            group.register(clash),
            Err(ConfigError::MaskConflict { pin: 7, mask: 0x01 })
        );
    }

    #[test]
    fn group_rejects_multi_bit_masks_and_foreign_routes() {
        let mut group = PortGroup::<4>::new(GroupId::Wheels);
        assert_eq!(
            group.register(PinRoute::new(3, GroupId::Wheels, 0x03)),
            Err(ConfigError::InvalidMask(0x03))
        );
        assert_eq!(
            group.register(PinRoute::new(38, GroupId::Receiver, 0x01)),
            Err(ConfigError::WrongGroup { pin: 38 })
        );
    }

    #[test]
    fn group_capacity_is_fixed() {
        let mut group = PortGroup::<1>::new(GroupId::Wheels);
        group.register(WHEEL).expect("capacity for one reader");
        assert_eq!(group.register(OTHER_WHEEL), Err(ConfigError::GroupFull));
        assert_eq!(group.watched_mask(), 0x01);
    }

    #[test]
    fn dispatch_runs_every_reader() {
        let mut group = PortGroup::<2>::new(GroupId::Wheels);
        let right = group.register(WHEEL).unwrap();
        let left = group.register(OTHER_WHEEL).unwrap();

        group.dispatch(0x03, 10);
        group.dispatch(0x02, 30);
        group.dispatch(0x00, 70);

        assert_eq!(group.sample(right).pulse_width, 20);
        assert_eq!(group.sample(left).pulse_width, 60);
        assert_eq!(group.take_edges(right), 1);
        assert_eq!(group.take_edges(right), 0, "take_edges clears the counter");
        assert_eq!(group.sample(left).edge_count, 1);
    }

    #[test]
    fn unknown_pin_is_a_configuration_error() {
        let routes = [WHEEL, OTHER_WHEEL];
        assert_eq!(route_for(&routes, 99), Err(ConfigError::UnknownPin(99)));
        assert_eq!(route_for(&routes, 1), Ok(OTHER_WHEEL));
    }

    #[test]
    fn routing_table_validation_finds_conflicts() {
        let duplicate = [WHEEL, PinRoute::new(0, GroupId::Receiver, 0x04)];
        assert_eq!(validate_routes(&duplicate), Err(ConfigError::DuplicatePin(0)));

        let overlap = [WHEEL, PinRoute::new(5, GroupId::Wheels, 0x01)];
        assert_eq!(
            validate_routes(&overlap),
            Err(ConfigError::MaskConflict { pin: 5, mask: 0x01 })
        );

        let shared_bit_other_group = [WHEEL, PinRoute::new(38, GroupId::Receiver, 0x01)];
        assert_eq!(validate_routes(&shared_bit_other_group), Ok(()));
    }

    #[test]
    fn shared_group_hands_out_consistent_snapshots() {
        static GROUP: SharedPortGroup<2> = SharedPortGroup::new(GroupId::Wheels);
        let routes = [WHEEL, OTHER_WHEEL];

        let channel = GROUP.claim(&routes, 0).expect("wheel pin is routed");
        assert!(GROUP.claim(&routes, 42).is_err());

        GROUP.dispatch(0x01, 1_000);
        GROUP.dispatch(0x00, 1_250);

        let sample = channel.sample();
        assert_eq!(sample.pulse_width, 250);
        assert_eq!(sample.edge_count, 1);
        assert_eq!(channel.take_edges(), 1);
        assert_eq!(channel.sample().edge_count, 0);
        assert_eq!(GROUP.watched_mask(), 0x01);
    }
}
