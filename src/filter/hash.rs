//! Key hashing for bloom layers.
//!
//! Each key is hashed exactly once with 128-bit xxh3. The digest is split into
//! two 64-bit halves and combined by double hashing, `h1 + i * h2`, to derive
//! as many positions as a layer has hash functions. Function `i` indexes only
//! its own partition of the counter array, so a key's positions never collide
//! with each other.
//!
//! The derivation is part of the file format: changing it makes every
//! persisted filter report false negatives.

use xxhash_rust::xxh3::xxh3_128;

/// The digest of a single key, reusable across layers of different geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHash {
    h1: u64,
    h2: u64,
}

impl KeyHash {
    /// Hash a key.
    pub fn of(key: &[u8]) -> Self {
        let digest = xxh3_128(key);
        Self { h1: digest as u64, h2: (digest >> 64) as u64 }
    }

    /// Counter positions for a layer with `nfuncs` partitions of
    /// `counts_per_func` counters each.
    pub fn positions(self, nfuncs: u32, counts_per_func: u64) -> impl Iterator<Item = usize> {
        (0..nfuncs as u64).map(move |i| {
            let hash = self.h1.wrapping_add(i.wrapping_mul(self.h2));
            ((hash % counts_per_func) + i * counts_per_func) as usize
        })
    }
}
