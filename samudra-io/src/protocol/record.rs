//! Data record header, payload and checksum trailer
//!
//! ```text
//! ┌──────┬─────────┬──────┬───────┬─────────┬───────────┬─────────┬────────────┐
//! │ sync │ version │ size │ flags │ type id │ timestamp │ payload │ [checksum] │
//! │ u32  │ u16     │ u32  │ u16   │ u32     │ 10 bytes  │ ...     │ u32        │
//! └──────┴─────────┴──────┴───────┴─────────┴───────────┴─────────┴────────────┘
//! ```
//!
//! `size` covers the whole record including the optional trailer.

use super::time::RecordTime;
use crate::error::FrameFault;

/// Record protocol version
pub const RECORD_VERSION: u16 = 5;

/// Sync pattern at the start of every record
pub const RECORD_SYNC_PATTERN: u32 = 0x0000_FFFF;

/// Encoded header size in bytes
pub const RECORD_HEADER_SIZE: usize = 26;

/// Byte offset of `protocol_version` within the header
pub const RECORD_VERSION_OFFSET: usize = 4;

/// Trailer size when the checksum flag is set
pub const CHECKSUM_SIZE: usize = 4;

/// Default upper bound for a single record
pub const DEFAULT_MAX_FRAME_SIZE: usize = 60_000;

/// Flag bit: record carries a checksum trailer
pub const FLAG_CHECKSUM: u16 = 0x0001;

/// Additive checksum: wrapping sum of every byte
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
}

/// Inner record header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordHeader {
    pub sync_pattern: u32,
    pub protocol_version: u16,
    pub size: u32,
    pub flags: u16,
    pub record_type_id: u32,
    pub timestamp: RecordTime,
}

impl RecordHeader {
    /// Decode the header fields, returns None on short input
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let b = bytes.get(..RECORD_HEADER_SIZE)?;
        let mut ts = [0u8; RecordTime::SIZE];
        ts.copy_from_slice(&b[16..26]);
        Some(Self {
            sync_pattern: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            protocol_version: u16::from_le_bytes([b[4], b[5]]),
            size: u32::from_le_bytes([b[6], b[7], b[8], b[9]]),
            flags: u16::from_le_bytes([b[10], b[11]]),
            record_type_id: u32::from_le_bytes([b[12], b[13], b[14], b[15]]),
            timestamp: RecordTime::read_from(&ts),
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.sync_pattern.to_le_bytes());
        out.extend_from_slice(&self.protocol_version.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.record_type_id.to_le_bytes());
        self.timestamp.write_to(out);
    }

    #[inline]
    pub fn has_checksum(&self) -> bool {
        self.flags & FLAG_CHECKSUM != 0
    }

    /// Smallest `size` this header can legally declare
    pub fn min_size(&self) -> usize {
        if self.has_checksum() {
            RECORD_HEADER_SIZE + CHECKSUM_SIZE
        } else {
            RECORD_HEADER_SIZE
        }
    }

    /// Structural checks: version, sync pattern, size bounds (in that order)
    pub fn validate(&self, max_frame_size: usize) -> Result<(), FrameFault> {
        if self.protocol_version != RECORD_VERSION {
            return Err(FrameFault::RecordVersion);
        }
        if self.sync_pattern != RECORD_SYNC_PATTERN {
            return Err(FrameFault::RecordSync);
        }
        let size = self.size as usize;
        if size < self.min_size() || size > max_frame_size {
            return Err(FrameFault::RecordSize);
        }
        Ok(())
    }

    /// Verify the trailer of a complete record
    ///
    /// Records without the checksum flag always pass.
    pub fn verify_checksum(&self, record: &[u8]) -> Result<(), (u32, u32)> {
        if !self.has_checksum() || record.len() < CHECKSUM_SIZE {
            return Ok(());
        }
        let split = record.len() - CHECKSUM_SIZE;
        let t = &record[split..];
        let carried = u32::from_le_bytes([t[0], t[1], t[2], t[3]]);
        let computed = checksum(&record[..split]);
        if carried == computed {
            Ok(())
        } else {
            Err((carried, computed))
        }
    }
}

/// Borrowed view of a complete, validated record
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    pub header: RecordHeader,
    bytes: &'a [u8],
}

impl<'a> RecordView<'a> {
    /// View over a complete record; None if the bytes are not a whole record
    pub fn new(bytes: &'a [u8]) -> Option<Self> {
        let header = RecordHeader::parse(bytes)?;
        if header.size as usize != bytes.len() || bytes.len() < header.min_size() {
            return None;
        }
        Some(Self { header, bytes })
    }

    /// Bytes between the header and the trailer
    pub fn payload(&self) -> &'a [u8] {
        let end = if self.header.has_checksum() {
            self.bytes.len() - CHECKSUM_SIZE
        } else {
            self.bytes.len()
        };
        &self.bytes[RECORD_HEADER_SIZE..end]
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Build a complete record around `payload`
pub fn build_record(
    record_type_id: u32,
    timestamp: RecordTime,
    payload: &[u8],
    with_checksum: bool,
) -> Vec<u8> {
    let trailer = if with_checksum { CHECKSUM_SIZE } else { 0 };
    let size = RECORD_HEADER_SIZE + payload.len() + trailer;
    let header = RecordHeader {
        sync_pattern: RECORD_SYNC_PATTERN,
        protocol_version: RECORD_VERSION,
        size: size as u32,
        flags: if with_checksum { FLAG_CHECKSUM } else { 0 },
        record_type_id,
        timestamp,
    };

    let mut out = Vec::with_capacity(size);
    header.write_to(&mut out);
    out.extend_from_slice(payload);
    if with_checksum {
        let sum = checksum(&out);
        out.extend_from_slice(&sum.to_le_bytes());
    }
    out
}
