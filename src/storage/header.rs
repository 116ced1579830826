//! File header implementation.
//!
//! The header is a fixed-size (64 bytes) structure at the start of the filter
//! file. The first 28 bytes describe how the filter was configured and never
//! change after creation; they are covered by a CRC32 checksum. The remaining
//! fields are rewritten in place as the filter mutates and scales.
//!
//! Format:
//! ```text
//! [magic: u32][version: u32][capacity: u64][error_rate: f64][counter_width: u32]
//! [checksum: u32]
//! [num_layers: u64][max_id: u64][mem_seqnum: u64][disk_seqnum: u64]
//! ```

use crate::bitfield::CounterWidth;
use crate::error::{Error, Result};
use bytes::{Buf, BufMut};

/// Magic number identifying a filter file ("SBLM").
pub const MAGIC_NUMBER: u32 = 0x5342_4c4d;

/// On-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 64;

/// Bytes covered by the checksum.
const CHECKSUMMED_LEN: usize = 28;

/// Decoded file header.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    /// Per-layer capacity the filter was created with.
    pub capacity: u64,
    /// Global error rate the filter was created with.
    pub error_rate: f64,
    /// Counter width of every layer.
    pub counter_width: CounterWidth,
    /// Number of layer blocks following the header.
    pub num_layers: u64,
    /// Highest identifier ever added.
    pub max_id: u64,
    /// Mutations applied to the mapped region.
    pub mem_seqnum: u64,
    /// Mutations confirmed durable by the last successful flush.
    pub disk_seqnum: u64,
}

impl FileHeader {
    /// Create a header for a fresh filter with no layers.
    pub fn new(capacity: u64, error_rate: f64, counter_width: CounterWidth) -> Self {
        Self {
            capacity,
            error_rate,
            counter_width,
            num_layers: 0,
            max_id: 0,
            mem_seqnum: 0,
            disk_seqnum: 0,
        }
    }

    /// Encode the header into the first [`HEADER_SIZE`] bytes of `out`.
    pub fn encode(&self, out: &mut [u8]) {
        let out = &mut out[..HEADER_SIZE];
        {
            let mut buf = &mut out[..];
            buf.put_u32_le(MAGIC_NUMBER);
            buf.put_u32_le(FORMAT_VERSION);
            buf.put_u64_le(self.capacity);
            buf.put_f64_le(self.error_rate);
            buf.put_u32_le(self.counter_width.bits());
        }

        let checksum = crc32fast::hash(&out[..CHECKSUMMED_LEN]);

        let mut buf = &mut out[CHECKSUMMED_LEN..];
        buf.put_u32_le(checksum);
        buf.put_u64_le(self.num_layers);
        buf.put_u64_le(self.max_id);
        buf.put_u64_le(self.mem_seqnum);
        buf.put_u64_le(self.disk_seqnum);
    }

    /// Decode and validate a header.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::corruption(format!(
                "File too short for header: expected at least {} bytes, got {}",
                HEADER_SIZE,
                data.len()
            )));
        }

        let mut buf = &data[..HEADER_SIZE];

        let magic = buf.get_u32_le();
        if magic != MAGIC_NUMBER {
            return Err(Error::corruption(format!(
                "Invalid filter magic number: expected {:#x}, got {:#x}",
                MAGIC_NUMBER, magic
            )));
        }

        let version = buf.get_u32_le();
        if version != FORMAT_VERSION {
            return Err(Error::corruption(format!("Unsupported format version: {}", version)));
        }

        let capacity = buf.get_u64_le();
        let error_rate = buf.get_f64_le();
        let width_bits = buf.get_u32_le();

        let stored = buf.get_u32_le();
        let actual = crc32fast::hash(&data[..CHECKSUMMED_LEN]);
        if stored != actual {
            return Err(Error::ChecksumMismatch {
                expected: stored,
                actual,
            });
        }

        let counter_width = CounterWidth::from_bits(width_bits)
            .ok_or_else(|| Error::corruption(format!("Invalid counter width: {}", width_bits)))?;

        let num_layers = buf.get_u64_le();
        let max_id = buf.get_u64_le();
        let mem_seqnum = buf.get_u64_le();
        let disk_seqnum = buf.get_u64_le();

        if disk_seqnum > mem_seqnum {
            return Err(Error::corruption(format!(
                "Disk sequence number {} ahead of memory sequence number {}",
                disk_seqnum, mem_seqnum
            )));
        }

        Ok(Self {
            capacity,
            error_rate,
            counter_width,
            num_layers,
            max_id,
            mem_seqnum,
            disk_seqnum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileHeader {
        FileHeader {
            capacity: 1000,
            error_rate: 0.01,
            counter_width: CounterWidth::Four,
            num_layers: 3,
            max_id: 42,
            mem_seqnum: 17,
            disk_seqnum: 12,
        }
    }

    #[test]
    fn test_header_encode_decode() {
        let header = sample();
        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf);

        let decoded = FileHeader::decode(&buf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_invalid_magic() {
        let mut buf = [0u8; HEADER_SIZE];
        sample().encode(&mut buf);
        buf[0] ^= 0xFF;

        let err = FileHeader::decode(&buf).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_checksum_validation() {
        let mut buf = [0u8; HEADER_SIZE];
        sample().encode(&mut buf);

        // Corrupt the capacity
        buf[8] ^= 0x01;

        let result = FileHeader::decode(&buf);
        match result {
            Err(Error::ChecksumMismatch { .. }) => {}
            other => panic!("Expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_mutable_fields_not_checksummed() {
        let mut header = sample();
        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf);

        header.mem_seqnum = 99;
        header.num_layers = 4;
        header.encode(&mut buf);
        assert_eq!(FileHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn test_short_header() {
        let buf = [0u8; 10];
        assert!(FileHeader::decode(&buf).unwrap_err().is_corruption());
    }

    #[test]
    fn test_disk_ahead_of_memory() {
        let mut header = sample();
        header.disk_seqnum = header.mem_seqnum + 1;
        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf);

        assert!(FileHeader::decode(&buf).unwrap_err().is_corruption());
    }
}
