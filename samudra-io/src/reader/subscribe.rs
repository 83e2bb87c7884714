//! Remote-control subscribe handshake
//!
//! After connecting, the client asks the sonar center to stream a list of
//! record types. The request is a normal framed record; the center answers
//! with an ACK or NACK record.
//!
//! ```text
//! Request body (record type 7500):
//! ┌────────────┬────────┬─────────────────┬───────┬──────────────────┐
//! │ command id │ ticket │ tracking number │ count │ record ids       │
//! │ u32 (1051) │ u32    │ 16 bytes        │ u32   │ count × u32      │
//! └────────────┴────────┴─────────────────┴───────┴──────────────────┘
//! ```

use super::frame::{FrameReader, ReadMode};
use crate::error::{Error, Result};
use crate::protocol::record::{build_record, RecordView, DEFAULT_MAX_FRAME_SIZE};
use crate::protocol::{build_frame, EnvelopeFrame, RecordTime};
use crate::transport::ByteSource;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Remote-control request record type
pub const RECORD_REMOTE_CONTROL: u32 = 7500;
/// Remote-control acknowledgement
pub const RECORD_REMOTE_ACK: u32 = 7501;
/// Remote-control rejection
pub const RECORD_REMOTE_NACK: u32 = 7502;
/// Subscribe command id within a remote-control request
pub const COMMAND_SUBSCRIBE: u32 = 1051;
/// Default wait for the ACK/NACK
pub const SUBSCRIBE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Build the framed subscribe request for `records`
pub fn subscribe_request(records: &[u32], ticket: u32, epoch_seconds: f64) -> Vec<u8> {
    let mut body = Vec::with_capacity(28 + records.len() * 4);
    body.extend_from_slice(&COMMAND_SUBSCRIBE.to_le_bytes());
    body.extend_from_slice(&ticket.to_le_bytes());
    let mut tracking = [0u8; 16];
    tracking[..4].copy_from_slice(&ticket.to_le_bytes());
    body.extend_from_slice(&tracking);
    body.extend_from_slice(&(records.len() as u32).to_le_bytes());
    for id in records {
        body.extend_from_slice(&id.to_le_bytes());
    }

    let record = build_record(
        RECORD_REMOTE_CONTROL,
        RecordTime::from_epoch(epoch_seconds),
        &body,
        true,
    );
    build_frame(&record)
}

/// Send a subscribe request and wait for the reply
///
/// Reads exactly one reply frame, so record data that follows the ACK is
/// left on the source for the main reader.
pub fn subscribe<S: ByteSource + ?Sized>(
    source: &mut S,
    records: &[u32],
    ticket: u32,
    timeout: Duration,
) -> Result<()> {
    if records.is_empty() {
        return Err(Error::InvalidParameter(
            "subscribe needs at least one record type".to_string(),
        ));
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    let request = subscribe_request(records, ticket, now);
    log::debug!(
        "Sending subscribe request (ticket {}, {} record types)",
        ticket,
        records.len()
    );
    source.write_all(&request)?;

    let mut reader = FrameReader::new(DEFAULT_MAX_FRAME_SIZE);
    let mut reply = Vec::new();
    match reader.read_frame(source, &mut reply, ReadMode::Framed, timeout, None) {
        Ok(_) => {}
        Err(Error::Timeout) => {
            return Err(Error::Handshake(format!(
                "no subscribe reply within {:?}",
                timeout
            )))
        }
        Err(e) => return Err(e),
    }

    let region = EnvelopeFrame::parse(&reply)
        .map(|h| h.region_len())
        .unwrap_or(0);
    let Some(record) = RecordView::new(&reply[region..]) else {
        return Err(Error::Handshake("malformed subscribe reply".to_string()));
    };

    match record.header.record_type_id {
        RECORD_REMOTE_ACK => {
            log::info!("Subscribed to record types {:?}", records);
            Ok(())
        }
        RECORD_REMOTE_NACK => {
            log::warn!("Subscribe request rejected (NACK) for {:?}", records);
            Err(Error::SubscribeRejected)
        }
        other => Err(Error::Handshake(format!(
            "unexpected reply record type {}",
            other
        ))),
    }
}

#[cfg(test)]
pub(crate) fn reply_frame(record_type_id: u32) -> Vec<u8> {
    let record = build_record(
        record_type_id,
        RecordTime::from_epoch(1_700_000_000.0),
        &[0u8; 8],
        true,
    );
    build_frame(&record)
}
