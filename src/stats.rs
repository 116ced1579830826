//! Filter statistics.

use crate::error::Result;
use crate::filter::BloomLayer;
use serde::{Deserialize, Serialize};

/// Statistics for one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStats {
    /// Position of the layer, oldest first.
    pub index: usize,
    /// Keys the layer accepts before it is full.
    pub capacity: u64,
    /// Keys ever inserted.
    pub count: u64,
    /// Successful removals.
    pub removed: u64,
    /// Number of hash functions.
    pub nfuncs: u32,
    /// Counters per hash function.
    pub counts_per_func: u64,
    /// Error rate the layer was sized for.
    pub error_rate: f64,
    /// Size of the layer block in bytes.
    pub bytes: u64,
    /// Lowest and highest accepted identifier.
    pub id_span: Option<(u64, u64)>,
    /// Fraction of nonzero counters.
    pub fill_ratio: f64,
    /// Counters pinned at their maximum.
    pub saturated_counters: usize,
    /// Estimated false positive rate at the current fill.
    pub estimated_false_positive_rate: f64,
}

impl LayerStats {
    pub(crate) fn collect(index: usize, layer: &BloomLayer, block: &[u8]) -> Self {
        let geometry = layer.geometry();
        Self {
            index,
            capacity: geometry.capacity,
            count: layer.count(),
            removed: layer.removed(),
            nfuncs: geometry.nfuncs,
            counts_per_func: geometry.counts_per_func,
            error_rate: geometry.error_rate,
            bytes: layer.block_len(),
            id_span: layer.id_span(),
            fill_ratio: layer.fill_ratio(block),
            saturated_counters: layer.saturated_counters(block),
            estimated_false_positive_rate: layer.estimated_false_positive_rate(),
        }
    }
}

/// Statistics for a whole filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStats {
    /// Per-layer capacity.
    pub capacity: u64,
    /// Global target error rate.
    pub error_rate: f64,
    /// Counter width in bits.
    pub counter_width: u32,
    /// Number of layers.
    pub num_layers: usize,
    /// Keys added and not removed.
    pub live_keys: u64,
    /// Highest identifier ever added.
    pub max_id: u64,
    /// Memory sequence number.
    pub mem_seqnum: u64,
    /// Disk sequence number.
    pub disk_seqnum: u64,
    /// Size of the backing file.
    pub file_size: u64,
    /// Estimated false positive rate across all layers.
    pub estimated_false_positive_rate: f64,
    /// Per-layer statistics, oldest first.
    pub layers: Vec<LayerStats>,
}

impl FilterStats {
    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
