//! # scalebloom - A Disk-Backed Scaling Counting Bloom Filter
//!
//! scalebloom is a probabilistic set-membership index for opaque byte keys.
//! It supports deletion, grows its capacity as keys are inserted, and persists
//! to a single memory-mapped file with explicit, crash-consistent flushes.
//!
//! ## Architecture
//!
//! The engine consists of several key components:
//!
//! - **Bit-field codec**: Small fixed-width counters packed into bytes
//! - **Bloom layer**: One counting bloom filter with its own error budget
//! - **Scaling controller**: Appends layers as earlier ones fill up
//! - **Storage**: A memory-mapped file holding the header and every layer
//! - **Sequence numbers**: Track which mutations are in memory vs. on disk
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use scalebloom::{Options, ScalingBloom};
//!
//! # fn main() -> Result<(), scalebloom::Error> {
//! // Create a filter expecting 100 keys per layer at a 1% error rate
//! let mut filter = ScalingBloom::create("/tmp/f.bin", Options::new(100, 0.01))?;
//!
//! // Keys are added under a caller-supplied identifier
//! filter.add(b"user:42", 1)?;
//! assert!(filter.check(b"user:42"));
//!
//! // Remove with the same identifier it was added under
//! assert!(filter.remove(b"user:42", 1));
//!
//! // Make every mutation so far durable
//! filter.flush()?;
//! assert_eq!(filter.disk_seqnum(), filter.mem_seqnum());
//!
//! // Later, or after a restart
//! let filter = ScalingBloom::load("/tmp/f.bin", Options::new(100, 0.01))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Caller contract
//!
//! Counting bloom filters cannot tell a removed key from one that was never
//! added. Removing a key that was not added, or removing it more often than it
//! was added, decrements counters shared with other keys and can make them
//! report absent. Counters never go below zero.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod bitfield;
pub mod config;
pub mod error;
pub mod filter;
pub mod shared;
pub mod stats;
pub mod storage;

// Re-exports
pub use bitfield::CounterWidth;
pub use config::Options;
pub use error::{Error, Result};
pub use filter::ScalingBloom;
pub use shared::SharedFilter;
pub use stats::{FilterStats, LayerStats};

/// Version of the engine build.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the version of the engine build.
pub fn version() -> &'static str {
    VERSION
}
