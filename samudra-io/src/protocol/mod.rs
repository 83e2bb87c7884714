//! Sonar stream wire format
//!
//! Two layers: an [`envelope`] frame carrying routing and size metadata,
//! wrapping one [`record`] with its own header, payload and optional
//! checksum. Either layer can also appear on its own on the wire.

pub mod envelope;
pub mod record;
pub mod time;
pub mod window;

pub use envelope::{EnvelopeFrame, ENVELOPE_HEADER_SIZE, ENVELOPE_VERSION};
pub use record::{
    build_record, checksum, RecordHeader, RecordView, DEFAULT_MAX_FRAME_SIZE, RECORD_HEADER_SIZE,
    RECORD_SYNC_PATTERN, RECORD_VERSION,
};
pub use time::RecordTime;
pub use window::FrameWindow;

/// Wrap a record in an envelope, producing one combined frame
pub fn build_frame(record: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ENVELOPE_HEADER_SIZE + record.len());
    EnvelopeFrame::for_record(record.len()).write_to(&mut out);
    out.extend_from_slice(record);
    out
}
