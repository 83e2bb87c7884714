//! Envelope frame header
//!
//! ```text
//! ┌──────────┬─────────┬────────┬─────────────┬───────────────┬─────────┐
//! │ sync tag │ version │ offset │ packet_size │ total_payload │ records │
//! │ 4 bytes  │ u16     │ u16    │ u32         │ u32           │ u16     │
//! └──────────┴─────────┴────────┴─────────────┴───────────────┴─────────┘
//! ```
//!
//! All fields little-endian. The sync tag is carried through untouched.

use crate::error::FrameFault;

/// Envelope protocol version
pub const ENVELOPE_VERSION: u16 = 5;

/// Encoded header size in bytes
pub const ENVELOPE_HEADER_SIZE: usize = 18;

/// Byte offset of `protocol_version` within the header
pub const ENVELOPE_VERSION_OFFSET: usize = 4;

/// Sync tag written on outbound envelopes
pub const ENVELOPE_SYNC_TAG: [u8; 4] = *b"7KNF";

/// Outer frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeFrame {
    pub sync_tag: [u8; 4],
    pub protocol_version: u16,
    pub payload_offset: u16,
    pub packet_size: u32,
    pub total_payload_size: u32,
    pub record_count: u16,
}

type Check = (FrameFault, fn(&EnvelopeFrame) -> bool);

// Evaluated in order, first failure wins
const CHECKS: [Check; 4] = [
    (FrameFault::EnvelopeVersion, |h| {
        h.protocol_version == ENVELOPE_VERSION
    }),
    (FrameFault::EnvelopeOffset, |h| {
        h.payload_offset as usize >= ENVELOPE_HEADER_SIZE
            && u32::from(h.payload_offset) <= h.packet_size
    }),
    (FrameFault::EnvelopePacketSize, |h| {
        u64::from(h.packet_size) == u64::from(h.total_payload_size) + ENVELOPE_HEADER_SIZE as u64
    }),
    (FrameFault::EnvelopeRecordCount, |h| h.record_count == 1),
];

impl EnvelopeFrame {
    /// Envelope wrapping a single record of `record_len` bytes
    pub fn for_record(record_len: usize) -> Self {
        Self {
            sync_tag: ENVELOPE_SYNC_TAG,
            protocol_version: ENVELOPE_VERSION,
            payload_offset: ENVELOPE_HEADER_SIZE as u16,
            packet_size: (record_len + ENVELOPE_HEADER_SIZE) as u32,
            total_payload_size: record_len as u32,
            record_count: 1,
        }
    }

    /// Decode the header fields, returns None on short input
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let b = bytes.get(..ENVELOPE_HEADER_SIZE)?;
        Some(Self {
            sync_tag: [b[0], b[1], b[2], b[3]],
            protocol_version: u16::from_le_bytes([b[4], b[5]]),
            payload_offset: u16::from_le_bytes([b[6], b[7]]),
            packet_size: u32::from_le_bytes([b[8], b[9], b[10], b[11]]),
            total_payload_size: u32::from_le_bytes([b[12], b[13], b[14], b[15]]),
            record_count: u16::from_le_bytes([b[16], b[17]]),
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.sync_tag);
        out.extend_from_slice(&self.protocol_version.to_le_bytes());
        out.extend_from_slice(&self.payload_offset.to_le_bytes());
        out.extend_from_slice(&self.packet_size.to_le_bytes());
        out.extend_from_slice(&self.total_payload_size.to_le_bytes());
        out.extend_from_slice(&self.record_count.to_le_bytes());
    }

    /// Run the header checks, returning the first one that fails
    pub fn validate(&self) -> Result<(), FrameFault> {
        match CHECKS.iter().find(|(_, ok)| !ok(self)) {
            Some((fault, _)) => Err(*fault),
            None => Ok(()),
        }
    }

    /// Bytes between the envelope start and the wrapped record
    pub fn region_len(&self) -> usize {
        self.payload_offset as usize
    }
}
