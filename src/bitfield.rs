//! Packed fixed-width counters.
//!
//! A [`CounterArray`] views a byte region as a sequence of small unsigned
//! counters. Counter `i` occupies bits `[i * w, (i + 1) * w)` of the region,
//! least significant bit first within each byte. Widths always divide 8, so a
//! counter never straddles two bytes and every update masks only its own field.
//!
//! Counters saturate at `2^w - 1`. A saturated counter has lost track of how
//! many keys share its position, so it stays saturated until [`CounterArray::reset`]
//! is called; decrements leave it alone.

use serde::{Deserialize, Serialize};

/// Width of a single counter cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CounterWidth {
    /// 2-bit counters, saturating at 3.
    Two = 2,
    /// 4-bit counters, saturating at 15.
    #[default]
    Four = 4,
    /// 8-bit counters, saturating at 255.
    Eight = 8,
}

impl CounterWidth {
    /// Convert from a bit count.
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            2 => Some(CounterWidth::Two),
            4 => Some(CounterWidth::Four),
            8 => Some(CounterWidth::Eight),
            _ => None,
        }
    }

    /// Number of bits per counter.
    pub fn bits(self) -> u32 {
        self as u32
    }

    /// Largest value a counter can hold.
    pub fn max_value(self) -> u8 {
        ((1u16 << self.bits()) - 1) as u8
    }

    /// Bytes needed to store `len` counters.
    pub fn bytes_for(self, len: u64) -> u64 {
        (len * self.bits() as u64).div_ceil(8)
    }
}

/// A packed array of fixed-width counters over a byte buffer.
///
/// The buffer can be anything byte-like: a `Vec<u8>` in tests, or a mutable
/// slice of a memory-mapped file.
#[derive(Debug)]
pub struct CounterArray<B> {
    bytes: B,
    width: CounterWidth,
    len: usize,
}

impl<B: AsRef<[u8]>> CounterArray<B> {
    /// Wraps `bytes` as `len` counters of the given width.
    ///
    /// Returns `None` if the buffer is too small to hold `len` counters.
    pub fn new(bytes: B, width: CounterWidth, len: usize) -> Option<Self> {
        if (bytes.as_ref().len() as u64) < width.bytes_for(len as u64) {
            return None;
        }
        Some(Self { bytes, width, len })
    }

    /// Wraps a buffer whose size the caller has already validated.
    pub(crate) fn new_unchecked(bytes: B, width: CounterWidth, len: usize) -> Self {
        debug_assert!(bytes.as_ref().len() as u64 >= width.bytes_for(len as u64));
        Self { bytes, width, len }
    }

    /// Number of counters.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the array holds no counters.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Counter width.
    pub fn width(&self) -> CounterWidth {
        self.width
    }

    /// Reads the counter at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> u8 {
        debug_assert!(index < self.len, "counter {} out of range {}", index, self.len);
        let (byte, shift) = self.locate(index);
        (self.bytes.as_ref()[byte] >> shift) & self.width.max_value()
    }

    /// Returns true if the counter at `index` is pinned at its maximum.
    pub fn is_saturated(&self, index: usize) -> bool {
        self.get(index) == self.width.max_value()
    }

    /// Number of nonzero counters.
    pub fn count_nonzero(&self) -> usize {
        (0..self.len).filter(|&i| self.get(i) != 0).count()
    }

    /// Bit offset of the counter at `index`, as byte index and shift.
    #[inline]
    fn locate(&self, index: usize) -> (usize, u32) {
        let bit = index * self.width.bits() as usize;
        (bit / 8, (bit % 8) as u32)
    }

    /// Consumes the array and returns the underlying buffer.
    pub fn into_inner(self) -> B {
        self.bytes
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> CounterArray<B> {
    /// Increments the counter at `index`, saturating at the maximum.
    ///
    /// Returns the new value.
    #[inline]
    pub fn increment(&mut self, index: usize) -> u8 {
        let value = self.get(index);
        if value == self.width.max_value() {
            return value;
        }
        self.set(index, value + 1);
        value + 1
    }

    /// Decrements the counter at `index`.
    ///
    /// Returns `None` when the counter was already zero; nothing is written in
    /// that case. A saturated counter is left as is and its value returned.
    #[inline]
    pub fn decrement(&mut self, index: usize) -> Option<u8> {
        let value = self.get(index);
        if value == 0 {
            return None;
        }
        if value == self.width.max_value() {
            return Some(value);
        }
        self.set(index, value - 1);
        Some(value - 1)
    }

    /// Clears the counter at `index`, including a saturated one.
    pub fn reset(&mut self, index: usize) {
        self.set(index, 0);
    }

    #[inline]
    fn set(&mut self, index: usize, value: u8) {
        let (byte, shift) = self.locate(index);
        let mask = self.width.max_value() << shift;
        let cell = &mut self.bytes.as_mut()[byte];
        *cell = (*cell & !mask) | ((value << shift) & mask);
    }
}
