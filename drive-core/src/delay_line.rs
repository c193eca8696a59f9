//! Fixed-capacity circular delay line.
//!
//! A [`DelayLine`] always holds exactly `N` samples. Pushing a new sample
//! overwrites the oldest one, so after `N` pushes the line reproduces its input
//! delayed by `N - 1` positions. The smith predictor uses it to emulate the
//! actuator transport delay; it also works as a plain ring buffer.

use core::ops::Index;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayLine<T, const N: usize> {
    data: [T; N],
    /// Physical index of the oldest element.
    offset: usize,
}

impl<T: Copy, const N: usize> DelayLine<T, N> {
    const NON_EMPTY: () = assert!(N > 0, "delay line capacity must be non-zero");

    /// Creates a delay line pre-filled with `value`.
    #[must_use]
    pub const fn new(value: T) -> Self {
        let () = Self::NON_EMPTY;
        Self {
            data: [value; N],
            offset: 0,
        }
    }

    /// Overwrites every element with `value`.
    pub fn fill(&mut self, value: T) {
        self.data = [value; N];
        self.offset = 0;
    }

    /// Appends `value` as the newest element, dropping the oldest.
    pub fn push_back(&mut self, value: T) {
        self.data[self.offset] = value;
        self.offset = (self.offset + 1) % N;
    }

    /// Oldest element.
    #[must_use]
    pub fn front(&self) -> T {
        self.data[self.offset]
    }

    /// Newest element.
    #[must_use]
    pub fn back(&self) -> T {
        self.data[self.physical(N - 1)]
    }

    /// Mutable access to the newest element.
    pub fn back_mut(&mut self) -> &mut T {
        let index = self.physical(N - 1);
        &mut self.data[index]
    }

    /// Element at logical position `index` (0 = oldest), wrapping modulo `N`.
    #[must_use]
    pub fn get(&self, index: usize) -> T {
        self.data[self.physical(index)]
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        N
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Iterates from the oldest to the newest element.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..N).map(move |index| self.get(index))
    }

    fn physical(&self, index: usize) -> usize {
        (self.offset + index % N) % N
    }
}

impl<T: Copy, const N: usize> Index<usize> for DelayLine<T, N> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.data[self.physical(index)]
    }
}

impl<T: Copy + Default, const N: usize> Default for DelayLine<T, N> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
