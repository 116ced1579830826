//! Scaling counting bloom filter.
//!
//! A [`ScalingBloom`] is an ordered sequence of [`BloomLayer`]s stored back to
//! back in one memory-mapped file. New keys always go to the newest layer; when
//! it fills up a new layer is appended and the file grows to hold it. Lookups
//! consult every layer, since a key may have been added before any number of
//! scale events.
//!
//! ## Error budget
//!
//! Layer `i` is sized for `r * (1 - P) * P^i` with `P = TIGHTENING_RATIO`.
//! The per-layer rates form a geometric series summing to less than `r`, and
//! the union of independent layers is bounded by that sum.
//!
//! Tightening stops at layer [`MAX_TIGHTENING_STEPS`]: every later layer
//! reuses that layer's rate of `r * 2^-49`. Past that point the bound creeps
//! up by `r * 2^-49` per layer, so exceeding `r` by 1% takes over five
//! trillion layers, while hash-function counts and block sizes stay bounded.
//!
//! ## Sequence numbers
//!
//! Every successful `add` or `remove` advances the memory sequence number by
//! one. `flush` syncs the mapping and then records the memory sequence number
//! as the disk sequence number, so after a crash the reloaded filter reports
//! exactly which prefix of the caller's mutation stream it is guaranteed to
//! contain. Mutations past that point may or may not have reached disk; callers
//! that replay a log should replay from `disk_seqnum`.

use crate::bitfield::CounterWidth;
use crate::config::Options;
use crate::error::{Error, Result};
use crate::filter::hash::KeyHash;
use crate::filter::layer::{BloomLayer, LayerGeometry};
use crate::stats::{FilterStats, LayerStats};
use crate::storage::{BloomFile, FileHeader, HEADER_SIZE};
use std::path::Path;

/// Share of the remaining error budget passed on to the next layer.
pub const TIGHTENING_RATIO: f64 = 0.5;

/// Layer index after which per-layer error rates stop tightening.
pub const MAX_TIGHTENING_STEPS: usize = 48;

/// Error rate layer `index` is sized for, given the filter's global rate.
pub fn layer_error_rate(error_rate: f64, index: usize) -> f64 {
    error_rate * (1.0 - TIGHTENING_RATIO) * TIGHTENING_RATIO.powi(index as i32)
}

/// A layer together with the offset of its block in the file.
#[derive(Debug)]
struct LayerSlot {
    layer: BloomLayer,
    offset: usize,
}

impl LayerSlot {
    fn len(&self) -> usize {
        self.layer.block_len() as usize
    }
}

/// A disk-backed, growable counting bloom filter.
///
/// # Example
/// ```rust,no_run
/// use scalebloom::{Options, ScalingBloom};
///
/// # fn main() -> Result<(), scalebloom::Error> {
/// let mut filter = ScalingBloom::create("/tmp/users.bloom", Options::new(100, 0.01))?;
/// filter.add(b"user:42", 1)?;
/// assert!(filter.check(b"user:42"));
///
/// assert!(filter.remove(b"user:42", 1));
/// filter.flush()?;
/// assert_eq!(filter.disk_seqnum(), filter.mem_seqnum());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ScalingBloom {
    /// Options the filter was created or loaded with
    options: Options,
    /// Decoded copy of the mapped header, rewritten on every change
    header: FileHeader,
    /// Mapped backing file
    storage: BloomFile,
    /// Layers, oldest first
    layers: Vec<LayerSlot>,
}

impl ScalingBloom {
    /// Creates a new filter at `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the options are invalid or the path is empty
    /// - the file cannot be created, sized or mapped
    pub fn create<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let path = path.as_ref();
        Self::validate(path, &options)?;

        let header = FileHeader::new(options.capacity, options.error_rate, options.counter_width);
        let storage = BloomFile::create(path, HEADER_SIZE as u64)?;

        let mut filter = Self {
            options,
            header,
            storage,
            layers: Vec::new(),
        };
        filter.push_layer()?;
        filter.storage.sync()?;

        log::info!(
            "Created filter {:?}: capacity={}, error_rate={}, counter_width={}",
            path,
            filter.options.capacity,
            filter.options.error_rate,
            filter.options.counter_width.bits()
        );
        Ok(filter)
    }

    /// Loads an existing filter from `path`.
    ///
    /// The persisted disk sequence number seeds both sequence numbers.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the options are invalid or the path is empty
    /// - the file cannot be opened or mapped
    /// - the file is truncated or malformed
    /// - the file was created with a different capacity, error rate or counter width
    pub fn load<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let path = path.as_ref();
        Self::validate(path, &options)?;

        let mut storage = BloomFile::open(path)?;
        let mut header = FileHeader::decode(storage.header())?;
        Self::check_compatible(&header, &options)?;

        if header.num_layers == 0 {
            return Err(Error::corruption("Filter file has no layers"));
        }

        let width = header.counter_width;
        let mut layers = Vec::new();
        let mut offset = HEADER_SIZE;
        for index in 0..header.num_layers {
            let block = &storage.bytes()[offset..];
            let layer = BloomLayer::decode(block, width)
                .map_err(|e| Error::corruption(format!("Layer {}: {}", index, e)))?;
            let len = layer.block_len() as usize;
            if block.len() < len {
                return Err(Error::corruption(format!("Layer {} block truncated", index)));
            }
            layers.push(LayerSlot { layer, offset });
            offset += len;
        }

        if storage.len() > offset {
            // A crash between growing the file and recording the new layer
            // leaves zeroed bytes behind; the next scale event reuses them.
            log::warn!(
                "Ignoring {} trailing bytes after {} layers in {:?}",
                storage.len() - offset,
                layers.len(),
                path
            );
        }

        if header.mem_seqnum != header.disk_seqnum {
            log::warn!(
                "Filter {:?} has {} unflushed mutations; resuming from disk_seqnum {}",
                path,
                header.mem_seqnum - header.disk_seqnum,
                header.disk_seqnum
            );
        }
        header.mem_seqnum = header.disk_seqnum;
        header.encode(storage.header_mut());

        log::info!(
            "Loaded filter {:?}: {} layers, disk_seqnum={}",
            path,
            layers.len(),
            header.disk_seqnum
        );

        Ok(Self {
            options,
            header,
            storage,
            layers,
        })
    }

    /// Loads the filter at `path` if the file exists, otherwise creates it.
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path, options)
        } else {
            Self::create(path, options)
        }
    }

    fn validate(path: &Path, options: &Options) -> Result<()> {
        options.validate()?;
        if path.as_os_str().is_empty() {
            return Err(Error::invalid_argument("path required"));
        }
        // The first layer and the tightest one bound every layer the filter
        // can ever allocate.
        for index in [0, MAX_TIGHTENING_STEPS] {
            LayerGeometry::new(options.capacity, layer_error_rate(options.error_rate, index))?;
        }
        Ok(())
    }

    fn check_compatible(header: &FileHeader, options: &Options) -> Result<()> {
        if header.capacity != options.capacity {
            return Err(Error::config_mismatch(format!(
                "file capacity {} != requested {}",
                header.capacity, options.capacity
            )));
        }
        if header.error_rate != options.error_rate {
            return Err(Error::config_mismatch(format!(
                "file error_rate {} != requested {}",
                header.error_rate, options.error_rate
            )));
        }
        if header.counter_width != options.counter_width {
            return Err(Error::config_mismatch(format!(
                "file counter width {} != requested {}",
                header.counter_width.bits(),
                options.counter_width.bits()
            )));
        }
        Ok(())
    }

    /// Appends a new, empty layer, growing the file first.
    ///
    /// Nothing changes if the file cannot be grown.
    fn push_layer(&mut self) -> Result<()> {
        let index = self.layers.len();
        let error_rate = layer_error_rate(self.options.error_rate, index);
        let geometry = LayerGeometry::new(self.options.capacity, error_rate)?;
        let layer = BloomLayer::new(geometry, self.options.counter_width);

        let offset = self.layers.last().map_or(HEADER_SIZE, |slot| slot.offset + slot.len());
        let len = layer.block_len() as usize;
        self.storage.grow((offset + len) as u64)?;

        let block = self.storage.region_mut(offset, len);
        block.fill(0);
        layer.encode_header(block);

        self.layers.push(LayerSlot { layer, offset });
        self.header.num_layers = self.layers.len() as u64;
        self.write_header();

        log::info!(
            "Allocated layer {} in {:?}: error_rate={:.3e}, nfuncs={}, counters={}",
            index,
            self.storage.path(),
            geometry.error_rate,
            geometry.nfuncs,
            geometry.num_counters()
        );
        Ok(())
    }

    fn write_header(&mut self) {
        self.header.encode(self.storage.header_mut());
    }

    fn record_mutation(&mut self) {
        self.header.mem_seqnum += 1;
        self.write_header();
    }

    /// Adds `key` under identifier `id`.
    ///
    /// The key goes to the newest layer; a new layer is allocated first if
    /// that one is full.
    ///
    /// # Errors
    ///
    /// Returns an error only if a new layer was needed and the file could not
    /// be grown. The filter is unchanged in that case.
    pub fn add(&mut self, key: &[u8], id: u64) -> Result<()> {
        let hash = KeyHash::of(key);

        if self.layers.last().map_or(true, |slot| slot.layer.is_full()) {
            self.push_layer()?;
        }

        let slot = self.layers.last_mut().ok_or_else(|| Error::internal("filter has no layers"))?;
        let block = self.storage.region_mut(slot.offset, slot.len());
        slot.layer.add(block, hash, id).map_err(|full| Error::internal(full.to_string()))?;

        self.header.max_id = self.header.max_id.max(id);
        self.record_mutation();
        Ok(())
    }

    /// Returns true if `key` may be in the filter.
    ///
    /// False positives are possible; false negatives are not, provided keys
    /// are only removed after being added under the same identifier.
    pub fn check(&self, key: &[u8]) -> bool {
        let hash = KeyHash::of(key);
        self.layers
            .iter()
            .rev()
            .any(|slot| slot.layer.check(self.storage.region(slot.offset, slot.len()), hash))
    }

    /// Membership test; same as [`ScalingBloom::check`].
    pub fn contains(&self, key: &[u8]) -> bool {
        self.check(key)
    }

    /// Removes `key` previously added under identifier `id`.
    ///
    /// Removal is attempted on every layer that holds the key and accepted
    /// `id`. Returns false, changing nothing, when no layer held it.
    ///
    /// Removing a key that was never added can still succeed if it collides
    /// with other keys, and then causes false negatives for them.
    pub fn remove(&mut self, key: &[u8], id: u64) -> bool {
        let hash = KeyHash::of(key);
        let mut removed = false;

        for slot in self.layers.iter_mut().rev() {
            if !slot.layer.contains_id(id) {
                continue;
            }
            let block = self.storage.region_mut(slot.offset, slot.len());
            removed |= slot.layer.remove(block, hash);
        }

        if removed {
            self.record_mutation();
        }
        removed
    }

    /// Makes every mutation so far durable.
    ///
    /// Syncs the mapping, then records the memory sequence number as the disk
    /// sequence number and syncs the header. On failure the disk sequence
    /// number keeps its previous value and the filter stays usable.
    pub fn flush(&mut self) -> Result<()> {
        self.storage.sync()?;

        let previous = self.header.disk_seqnum;
        self.header.disk_seqnum = self.header.mem_seqnum;
        self.write_header();

        if let Err(e) = self.storage.sync_header() {
            log::warn!("Failed to sync header of {:?}: {}", self.storage.path(), e);
            self.header.disk_seqnum = previous;
            self.write_header();
            return Err(e);
        }

        log::debug!("Flushed {:?} at seqnum {}", self.storage.path(), self.header.disk_seqnum);
        Ok(())
    }

    /// Mutations applied since creation or load.
    pub fn mem_seqnum(&self) -> u64 {
        self.header.mem_seqnum
    }

    /// Mutations confirmed durable; never exceeds [`ScalingBloom::mem_seqnum`].
    pub fn disk_seqnum(&self) -> u64 {
        self.header.disk_seqnum
    }

    /// Highest identifier ever added.
    pub fn max_id(&self) -> u64 {
        self.header.max_id
    }

    /// Number of allocated layers.
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// The layers, oldest first.
    pub fn layers(&self) -> impl Iterator<Item = &BloomLayer> {
        self.layers.iter().map(|slot| &slot.layer)
    }

    /// Keys added and not removed, across all layers.
    pub fn live_keys(&self) -> u64 {
        self.layers.iter().map(|slot| slot.layer.live_keys()).sum()
    }

    /// Options the filter was created or loaded with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Counter width of every layer.
    pub fn counter_width(&self) -> CounterWidth {
        self.options.counter_width
    }

    /// Path to the backing file.
    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    /// Estimated false positive rate of the whole filter: the probability
    /// that at least one layer reports a false positive.
    pub fn estimated_false_positive_rate(&self) -> f64 {
        let miss: f64 = self
            .layers
            .iter()
            .map(|slot| 1.0 - slot.layer.estimated_false_positive_rate())
            .product();
        1.0 - miss
    }

    /// Snapshot of filter and per-layer statistics.
    pub fn stats(&self) -> FilterStats {
        let layers = self
            .layers
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let block = self.storage.region(slot.offset, slot.len());
                LayerStats::collect(index, &slot.layer, block)
            })
            .collect();

        FilterStats {
            capacity: self.options.capacity,
            error_rate: self.options.error_rate,
            counter_width: self.options.counter_width.bits(),
            num_layers: self.layers.len(),
            live_keys: self.live_keys(),
            max_id: self.header.max_id,
            mem_seqnum: self.header.mem_seqnum,
            disk_seqnum: self.header.disk_seqnum,
            file_size: self.storage.len() as u64,
            estimated_false_positive_rate: self.estimated_false_positive_rate(),
            layers,
        }
    }
}
