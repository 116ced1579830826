//! Counting bloom filter implementations.
//!
//! [`BloomLayer`] is a single fixed-size counting bloom filter over a block of
//! bytes. [`ScalingBloom`] stacks layers in a memory-mapped file and grows by
//! appending a new layer whenever the newest one is full.

pub mod hash;
pub mod layer;
pub mod scaling;

pub use hash::KeyHash;
pub use layer::{BloomLayer, LayerFull, LayerGeometry, LAYER_HEADER_SIZE, MAX_HASH_FUNCTIONS};
pub use scaling::{layer_error_rate, ScalingBloom, MAX_TIGHTENING_STEPS, TIGHTENING_RATIO};
