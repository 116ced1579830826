//! Memory-mapped backing file.
//!
//! The whole filter lives in one file: a [`FileHeader`] followed by one block
//! per layer. [`BloomFile`] maps the file read-write so layers update their
//! counters directly in the mapping; the mapping is the only copy of counter
//! state in the process.
//!
//! Durability is explicit. Nothing here syncs implicitly and dropping a
//! `BloomFile` does not flush: callers decide when mutations must reach disk by
//! calling [`BloomFile::sync`] and [`BloomFile::sync_header`].

pub mod header;

pub use header::{FileHeader, HEADER_SIZE};

use crate::error::{Error, Result};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Operations that tests can make fail once.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    /// Extending the file.
    SetLen,
    /// Remapping after the file was extended.
    Remap,
    /// Syncing the whole mapping.
    Sync,
    /// Syncing the header page.
    SyncHeader,
}

/// A filter file mapped into memory.
#[derive(Debug)]
pub struct BloomFile {
    /// Path to the filter file
    path: PathBuf,
    /// Open handle, kept for resizing and metadata syncs
    file: File,
    /// Read-write mapping of the whole file
    mmap: MmapMut,
    /// Failure armed by a test
    #[cfg(test)]
    fault: parking_lot::Mutex<Option<Fault>>,
}

impl BloomFile {
    /// Create (or truncate) the file at `path` and size it to `len` zero bytes.
    pub fn create<P: AsRef<Path>>(path: P, len: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(len)?;

        let mmap = Self::map(&file)?;
        Ok(Self::from_parts(path, file, mmap))
    }

    /// Map an existing file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        if len < HEADER_SIZE as u64 {
            return Err(Error::corruption(format!(
                "Filter file {:?} is {} bytes, smaller than its header",
                path, len
            )));
        }

        let mmap = Self::map(&file)?;
        Ok(Self::from_parts(path, file, mmap))
    }

    fn from_parts(path: PathBuf, file: File, mmap: MmapMut) -> Self {
        Self {
            path,
            file,
            mmap,
            #[cfg(test)]
            fault: parking_lot::Mutex::new(None),
        }
    }

    /// Make the next `point` operation fail with an I/O error.
    #[cfg(test)]
    pub(crate) fn fail_next(&self, point: Fault) {
        *self.fault.lock() = Some(point);
    }

    #[cfg(test)]
    fn trip(&self, point: Fault) -> Result<()> {
        let mut armed = self.fault.lock();
        if *armed == Some(point) {
            *armed = None;
            let message = format!("injected {:?} failure", point);
            return Err(Error::Io(std::io::Error::other(message)));
        }
        Ok(())
    }

    fn map(file: &File) -> Result<MmapMut> {
        // SAFETY: the file is opened read-write by this process only; concurrent
        // writers to the same file are unsupported.
        let mmap = unsafe { MmapOptions::new().map_mut(file)? };
        Ok(mmap)
    }

    /// Extend the file to `new_len` bytes and remap it.
    ///
    /// New bytes read as zero. On failure the file keeps its previous length
    /// and mapping.
    pub fn grow(&mut self, new_len: u64) -> Result<()> {
        let old_len = self.len() as u64;
        if new_len <= old_len {
            return Ok(());
        }

        #[cfg(test)]
        self.trip(Fault::SetLen)?;
        self.file.set_len(new_len)?;
        match self.remap() {
            Ok(mmap) => {
                self.mmap = mmap;
                Ok(())
            }
            Err(e) => {
                if let Err(undo) = self.file.set_len(old_len) {
                    log::warn!(
                        "Failed to shrink {:?} back to {} bytes: {}",
                        self.path,
                        old_len,
                        undo
                    );
                }
                Err(e)
            }
        }
    }

    fn remap(&self) -> Result<MmapMut> {
        #[cfg(test)]
        self.trip(Fault::Remap)?;
        Self::map(&self.file)
    }

    /// Write every dirty page of the mapping and the file metadata to disk.
    pub fn sync(&self) -> Result<()> {
        #[cfg(test)]
        self.trip(Fault::Sync)?;
        self.mmap.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Write the header page to disk.
    pub fn sync_header(&self) -> Result<()> {
        #[cfg(test)]
        self.trip(Fault::SyncHeader)?;
        self.mmap.flush_range(0, HEADER_SIZE)?;
        Ok(())
    }

    /// The mapped header bytes.
    pub fn header(&self) -> &[u8] {
        &self.mmap[..HEADER_SIZE]
    }

    /// The mapped header bytes, writable.
    pub fn header_mut(&mut self) -> &mut [u8] {
        &mut self.mmap[..HEADER_SIZE]
    }

    /// `len` bytes of the mapping starting at `offset`.
    pub fn region(&self, offset: usize, len: usize) -> &[u8] {
        &self.mmap[offset..offset + len]
    }

    /// `len` writable bytes of the mapping starting at `offset`.
    pub fn region_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.mmap[offset..offset + len]
    }

    /// The whole mapping.
    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// Current file length.
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path to the filter file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
