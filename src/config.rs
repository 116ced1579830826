//! Configuration options for a scaling bloom filter.

use crate::bitfield::CounterWidth;

/// Configuration options for creating or loading a filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Number of keys each layer accepts before a new layer is allocated.
    /// Default: 100_000
    pub capacity: u64,

    /// Target false positive rate across all layers combined.
    /// Default: 0.01 (1%)
    pub error_rate: f64,

    /// Width of each counter cell.
    /// Default: 4 bits
    pub counter_width: CounterWidth,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            error_rate: 0.01,
            counter_width: CounterWidth::default(),
        }
    }
}

impl Options {
    /// Creates options for the given per-layer capacity and error rate.
    pub fn new(capacity: u64, error_rate: f64) -> Self {
        Self {
            capacity,
            error_rate,
            ..Self::default()
        }
    }

    /// Sets the per-layer capacity.
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the target false positive rate.
    pub fn error_rate(mut self, error_rate: f64) -> Self {
        self.error_rate = error_rate;
        self
    }

    /// Sets the counter width.
    pub fn counter_width(mut self, width: CounterWidth) -> Self {
        self.counter_width = width;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.capacity == 0 {
            return Err(crate::Error::invalid_argument("capacity must be > 0"));
        }
        // NaN fails both comparisons, so test for the valid range positively.
        if !(self.error_rate > 0.0 && self.error_rate < 1.0) {
            return Err(crate::Error::invalid_argument("error_rate must be between 0 and 1"));
        }
        Ok(())
    }
}
