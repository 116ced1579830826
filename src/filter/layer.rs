//! A single counting bloom layer.
//!
//! A layer is a fixed block of the backing file: a 64-byte header followed by
//! the packed counter array. [`BloomLayer`] keeps a decoded copy of the header
//! and writes it back through the block on every mutation, so the mapped bytes
//! always carry the current usage count.
//!
//! Block header format:
//! ```text
//! [capacity: u64][count: u64][counts_per_func: u64][nfuncs: u32][reserved: u32]
//! [error_rate: f64][min_id: u64][max_id: u64][removed: u64]
//! ```

use crate::bitfield::{CounterArray, CounterWidth};
use crate::error::{Error, Result};
use crate::filter::hash::KeyHash;
use bytes::{Buf, BufMut};

/// Size of the per-layer block header.
pub const LAYER_HEADER_SIZE: usize = 64;

/// Upper bound on hash functions per layer. Rates needing more are rejected.
pub const MAX_HASH_FUNCTIONS: u32 = 256;

/// Returned by [`BloomLayer::add`] when the layer has reached its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("layer is full ({count}/{capacity} keys)")]
pub struct LayerFull {
    /// Keys inserted into the layer.
    pub count: u64,
    /// Capacity threshold of the layer.
    pub capacity: u64,
}

/// Size and hash-function count of a layer, derived from its capacity and
/// error rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerGeometry {
    /// Keys the layer accepts before it is full.
    pub capacity: u64,
    /// False positive rate the layer was sized for.
    pub error_rate: f64,
    /// Number of hash functions (and counter partitions).
    pub nfuncs: u32,
    /// Counters per partition.
    pub counts_per_func: u64,
}

impl LayerGeometry {
    /// Compute the geometry for `capacity` keys at `error_rate`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the rate needs more than
    /// [`MAX_HASH_FUNCTIONS`] hash functions, or if the layer would be too
    /// large to address in memory.
    pub fn new(capacity: u64, error_rate: f64) -> Result<Self> {
        if capacity == 0 || !(error_rate > 0.0 && error_rate < 1.0) {
            return Err(Error::invalid_argument(format!(
                "Invalid layer parameters: capacity={}, error_rate={}",
                capacity, error_rate
            )));
        }

        let nfuncs = Self::optimal_num_hashes(error_rate)
            .ok_or_else(|| Error::invalid_argument("error_rate too small"))?;
        let counts_per_func = Self::optimal_counts_per_func(capacity, error_rate, nfuncs)
            .ok_or_else(|| Error::invalid_argument("capacity too large"))?;

        let geometry = Self {
            capacity,
            error_rate,
            nfuncs,
            counts_per_func,
        };
        // 8-bit counters give the largest block; if that fits, every width does.
        geometry
            .checked_block_len(CounterWidth::Eight)
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| Error::invalid_argument("capacity too large"))?;
        Ok(geometry)
    }

    /// k = ceil(log2(1 / p))
    fn optimal_num_hashes(error_rate: f64) -> Option<u32> {
        let k = (1.0 / error_rate).log2().ceil();
        if !k.is_finite() || k > MAX_HASH_FUNCTIONS as f64 {
            return None;
        }
        Some((k as u32).max(1))
    }

    /// Counters per partition: m = -n * ln(p) / ln(2)^2, split over k partitions.
    fn optimal_counts_per_func(capacity: u64, error_rate: f64, nfuncs: u32) -> Option<u64> {
        let n = capacity as f64;
        let m = n * error_rate.ln().abs() / 2.0_f64.ln().powi(2);
        let per_func = (m / nfuncs as f64).ceil();
        if !per_func.is_finite() || per_func >= u64::MAX as f64 {
            return None;
        }
        Some((per_func as u64).max(1))
    }

    /// Bytes of the whole block, or `None` if the size overflows.
    pub fn checked_block_len(&self, width: CounterWidth) -> Option<u64> {
        (self.nfuncs as u64)
            .checked_mul(self.counts_per_func)?
            .checked_mul(width.bits() as u64)?
            .div_ceil(8)
            .checked_next_multiple_of(8)?
            .checked_add(LAYER_HEADER_SIZE as u64)
    }

    /// Total number of counters.
    pub fn num_counters(&self) -> u64 {
        self.nfuncs as u64 * self.counts_per_func
    }

    /// Bytes of counter storage, padded to an 8-byte boundary.
    pub fn counter_bytes(&self, width: CounterWidth) -> u64 {
        width.bytes_for(self.num_counters()).next_multiple_of(8)
    }

    /// Bytes of the whole block, header included.
    pub fn block_len(&self, width: CounterWidth) -> u64 {
        LAYER_HEADER_SIZE as u64 + self.counter_bytes(width)
    }
}

/// One generation of a scaling bloom filter.
#[derive(Debug, Clone, PartialEq)]
pub struct BloomLayer {
    geometry: LayerGeometry,
    width: CounterWidth,
    /// Keys ever inserted; never decremented, so a full layer stays full.
    count: u64,
    /// Successful removals.
    removed: u64,
    min_id: u64,
    max_id: u64,
}

impl BloomLayer {
    /// Create an empty layer.
    pub fn new(geometry: LayerGeometry, width: CounterWidth) -> Self {
        Self {
            geometry,
            width,
            count: 0,
            removed: 0,
            min_id: u64::MAX,
            max_id: 0,
        }
    }

    /// Decode a layer from its block, validating that the block is large
    /// enough for the geometry the header declares.
    pub fn decode(block: &[u8], width: CounterWidth) -> Result<Self> {
        if block.len() < LAYER_HEADER_SIZE {
            return Err(Error::corruption("Layer header truncated"));
        }

        let mut buf = &block[..LAYER_HEADER_SIZE];
        let capacity = buf.get_u64_le();
        let count = buf.get_u64_le();
        let counts_per_func = buf.get_u64_le();
        let nfuncs = buf.get_u32_le();
        let _reserved = buf.get_u32_le();
        let error_rate = buf.get_f64_le();
        let min_id = buf.get_u64_le();
        let max_id = buf.get_u64_le();
        let removed = buf.get_u64_le();

        if capacity == 0 || nfuncs == 0 || nfuncs > MAX_HASH_FUNCTIONS || counts_per_func == 0 {
            return Err(Error::corruption(format!(
                "Invalid layer geometry: capacity={}, nfuncs={}, counts_per_func={}",
                capacity, nfuncs, counts_per_func
            )));
        }
        if !(error_rate > 0.0 && error_rate < 1.0) {
            return Err(Error::corruption(format!("Invalid layer error rate: {}", error_rate)));
        }
        if count > capacity || removed > count {
            return Err(Error::corruption(format!(
                "Invalid layer usage: count={}, removed={}, capacity={}",
                count, removed, capacity
            )));
        }

        let geometry = LayerGeometry {
            capacity,
            error_rate,
            nfuncs,
            counts_per_func,
        };
        match geometry.checked_block_len(width) {
            Some(needed) if needed <= block.len() as u64 => {}
            _ => return Err(Error::corruption("Layer counter array truncated")),
        }

        Ok(Self {
            geometry,
            width,
            count,
            removed,
            min_id,
            max_id,
        })
    }

    /// Write the header into the first [`LAYER_HEADER_SIZE`] bytes of `block`.
    pub fn encode_header(&self, block: &mut [u8]) {
        let mut buf = &mut block[..LAYER_HEADER_SIZE];
        buf.put_u64_le(self.geometry.capacity);
        buf.put_u64_le(self.count);
        buf.put_u64_le(self.geometry.counts_per_func);
        buf.put_u32_le(self.geometry.nfuncs);
        buf.put_u32_le(0);
        buf.put_f64_le(self.geometry.error_rate);
        buf.put_u64_le(self.min_id);
        buf.put_u64_le(self.max_id);
        buf.put_u64_le(self.removed);
    }

    fn counters<'a>(&self, block: &'a [u8]) -> CounterArray<&'a [u8]> {
        CounterArray::new_unchecked(
            &block[LAYER_HEADER_SIZE..],
            self.width,
            self.geometry.num_counters() as usize,
        )
    }

    fn counters_mut<'a>(&self, block: &'a mut [u8]) -> CounterArray<&'a mut [u8]> {
        CounterArray::new_unchecked(
            &mut block[LAYER_HEADER_SIZE..],
            self.width,
            self.geometry.num_counters() as usize,
        )
    }

    /// Returns true if every counter for the key is nonzero.
    pub fn check(&self, block: &[u8], hash: KeyHash) -> bool {
        let counters = self.counters(block);
        hash.positions(self.geometry.nfuncs, self.geometry.counts_per_func)
            .all(|pos| counters.get(pos) != 0)
    }

    /// Insert a key under `id`.
    pub fn add(
        &mut self,
        block: &mut [u8],
        hash: KeyHash,
        id: u64,
    ) -> std::result::Result<(), LayerFull> {
        if self.is_full() {
            return Err(LayerFull {
                count: self.count,
                capacity: self.geometry.capacity,
            });
        }

        let mut counters = self.counters_mut(block);
        let max = self.width.max_value();
        for pos in hash.positions(self.geometry.nfuncs, self.geometry.counts_per_func) {
            if counters.increment(pos) == max {
                log::debug!("Counter {} saturated at {}", pos, max);
            }
        }

        self.count += 1;
        self.min_id = self.min_id.min(id);
        self.max_id = self.max_id.max(id);
        self.encode_header(block);
        Ok(())
    }

    /// Remove a key.
    ///
    /// Returns false without touching any counter if one of the key's counters
    /// is already zero, i.e. the key is not in this layer.
    pub fn remove(&mut self, block: &mut [u8], hash: KeyHash) -> bool {
        if !self.check(block, hash) {
            return false;
        }

        let mut counters = self.counters_mut(block);
        for pos in hash.positions(self.geometry.nfuncs, self.geometry.counts_per_func) {
            // Every counter was nonzero a moment ago, so this cannot underflow.
            let _ = counters.decrement(pos);
        }

        self.removed = (self.removed + 1).min(self.count);
        self.encode_header(block);
        true
    }

    /// Returns true once the layer has accepted `capacity` keys.
    pub fn is_full(&self) -> bool {
        self.count >= self.geometry.capacity
    }

    /// Returns true if `id` falls within the identifiers this layer accepted.
    pub fn contains_id(&self, id: u64) -> bool {
        self.count > 0 && self.min_id <= id && id <= self.max_id
    }

    /// Lowest and highest accepted identifier, if any key was added.
    pub fn id_span(&self) -> Option<(u64, u64)> {
        (self.count > 0).then_some((self.min_id, self.max_id))
    }

    /// Layer geometry.
    pub fn geometry(&self) -> &LayerGeometry {
        &self.geometry
    }

    /// Keys ever inserted.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Successful removals.
    pub fn removed(&self) -> u64 {
        self.removed
    }

    /// Keys inserted and not yet removed.
    pub fn live_keys(&self) -> u64 {
        self.count - self.removed
    }

    /// Size of this layer's block in the backing file.
    pub fn block_len(&self) -> u64 {
        self.geometry.block_len(self.width)
    }

    /// Number of counters pinned at their maximum.
    pub fn saturated_counters(&self, block: &[u8]) -> usize {
        let counters = self.counters(block);
        (0..counters.len()).filter(|&i| counters.is_saturated(i)).count()
    }

    /// Fraction of counters that are nonzero.
    pub fn fill_ratio(&self, block: &[u8]) -> f64 {
        let counters = self.counters(block);
        counters.count_nonzero() as f64 / counters.len() as f64
    }

    /// Estimate the false positive rate from the number of live keys.
    ///
    /// p = (1 - e^(-kn/m))^k
    /// where k = nfuncs, n = live keys, m = total counters
    pub fn estimated_false_positive_rate(&self) -> f64 {
        let n = self.live_keys();
        if n == 0 {
            return 0.0;
        }

        let k = self.geometry.nfuncs as f64;
        let m = self.geometry.num_counters() as f64;
        let exp = (-k * n as f64 / m).exp();
        (1.0 - exp).powf(k)
    }
}
