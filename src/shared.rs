//! Thread-safe filter handle.
//!
//! [`ScalingBloom`] needs `&mut self` to mutate, which serializes writers at
//! compile time. [`SharedFilter`] moves that rule to runtime so one filter can
//! be used from many threads: lookups take a shared read lock and run
//! concurrently, while `add`, `remove` and `flush` take the write lock.

use crate::error::Result;
use crate::filter::ScalingBloom;
use crate::stats::FilterStats;
use parking_lot::RwLock;
use std::sync::Arc;

/// A cloneable, thread-safe handle to a [`ScalingBloom`].
#[derive(Debug, Clone)]
pub struct SharedFilter {
    inner: Arc<RwLock<ScalingBloom>>,
}

impl SharedFilter {
    /// Wrap a filter.
    pub fn new(filter: ScalingBloom) -> Self {
        Self { inner: Arc::new(RwLock::new(filter)) }
    }

    /// See [`ScalingBloom::add`].
    pub fn add(&self, key: &[u8], id: u64) -> Result<()> {
        self.inner.write().add(key, id)
    }

    /// See [`ScalingBloom::remove`].
    pub fn remove(&self, key: &[u8], id: u64) -> bool {
        self.inner.write().remove(key, id)
    }

    /// See [`ScalingBloom::check`].
    pub fn check(&self, key: &[u8]) -> bool {
        self.inner.read().check(key)
    }

    /// See [`ScalingBloom::contains`].
    pub fn contains(&self, key: &[u8]) -> bool {
        self.check(key)
    }

    /// See [`ScalingBloom::flush`].
    pub fn flush(&self) -> Result<()> {
        self.inner.write().flush()
    }

    /// See [`ScalingBloom::mem_seqnum`].
    pub fn mem_seqnum(&self) -> u64 {
        self.inner.read().mem_seqnum()
    }

    /// See [`ScalingBloom::disk_seqnum`].
    pub fn disk_seqnum(&self) -> u64 {
        self.inner.read().disk_seqnum()
    }

    /// See [`ScalingBloom::stats`].
    pub fn stats(&self) -> FilterStats {
        self.inner.read().stats()
    }

    /// Unwrap the filter if this is the last handle.
    pub fn try_unwrap(self) -> std::result::Result<ScalingBloom, Self> {
        Arc::try_unwrap(self.inner).map(RwLock::into_inner).map_err(|inner| Self { inner })
    }
}

impl From<ScalingBloom> for SharedFilter {
    fn from(filter: ScalingBloom) -> Self {
        Self::new(filter)
    }
}
