//! Envelope, record and combined frame readers
//!
//! # Read Loop
//!
//! ```text
//!  fill header ──► validate ──ok──► fill body ──► checksum / age ──ok──► emit
//!       ▲              │                               │
//!       │           invalid                         rejected
//!       │              ▼                               ▼
//!       └──────── resync (skip ≥ 1 byte)      drop whole frame
//! ```
//!
//! Structural faults mean alignment is lost, so the reader searches forward
//! for the next position whose version field matches. Checksum and age
//! failures happen on a well-aligned frame, which is dropped as a unit.
//!
//! Bytes are only consumed from the window once a frame is complete. A
//! timeout in the middle of a frame leaves the partial frame pending for the
//! next call.

use crate::error::{Error, FrameFault, Result};
use crate::protocol::envelope::{EnvelopeFrame, ENVELOPE_HEADER_SIZE, ENVELOPE_VERSION, ENVELOPE_VERSION_OFFSET};
use crate::protocol::record::{RecordHeader, RECORD_HEADER_SIZE, RECORD_VERSION, RECORD_VERSION_OFFSET};
use crate::protocol::FrameWindow;
use crate::stats::{ByteTally, ReaderEvent, ReaderStats};
use crate::transport::ByteSource;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wire layout of the incoming stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Envelope followed by one record (live sonar center)
    #[default]
    Framed,
    /// Bare records (recorded record files)
    RecordOnly,
    /// Envelope headers only
    EnvelopeOnly,
}

#[derive(Clone, Copy)]
enum Layer {
    Envelope,
    Record,
}

impl Layer {
    fn short_read(self) -> ReaderEvent {
        match self {
            Layer::Envelope => ReaderEvent::EnvelopeShortRead,
            Layer::Record => ReaderEvent::RecordShortRead,
        }
    }

    fn read_error(self) -> ReaderEvent {
        match self {
            Layer::Envelope => ReaderEvent::EnvelopeReadError,
            Layer::Record => ReaderEvent::RecordReadError,
        }
    }
}

enum RecordStep {
    Accepted(usize),
    Dropped(usize),
    Misaligned,
}

/// Stateful reader for the two-layer sonar stream
pub struct FrameReader {
    window: FrameWindow,
    max_frame_size: usize,
    stats: ReaderStats,
}

impl FrameReader {
    /// Create a reader accepting records up to `max_frame_size` bytes
    pub fn new(max_frame_size: usize) -> Self {
        let max_frame_size = max_frame_size.max(RECORD_HEADER_SIZE);
        Self {
            window: FrameWindow::new(max_frame_size + ENVELOPE_HEADER_SIZE),
            max_frame_size,
            stats: ReaderStats::new(),
        }
    }

    pub fn stats(&self) -> &ReaderStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut ReaderStats {
        &mut self.stats
    }

    /// Bytes received but not yet part of an emitted frame
    pub fn buffered(&self) -> usize {
        self.window.len()
    }

    /// Drop buffered bytes, e.g. after the source was replaced
    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// Read one envelope header (plus any gap up to its payload offset)
    ///
    /// Appends the envelope region to `dest` and returns its length.
    pub fn read_envelope<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        dest: &mut Vec<u8>,
        timeout: Duration,
    ) -> Result<usize> {
        let region = self.envelope_at_front(source, timeout)?;
        dest.extend_from_slice(&self.window.as_slice()[..region]);
        self.window.advance(region);
        Ok(region)
    }

    /// Read one data record, resyncing past corrupt input
    ///
    /// Records failing the checksum or older than `reject_older_than`
    /// (epoch seconds) are dropped and the next record is read.
    pub fn read_record<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        dest: &mut Vec<u8>,
        timeout: Duration,
        reject_older_than: Option<f64>,
    ) -> Result<usize> {
        loop {
            match self.record_at(source, 0, timeout, reject_older_than, true)? {
                RecordStep::Accepted(size) => {
                    dest.extend_from_slice(&self.window.as_slice()[..size]);
                    self.window.advance(size);
                    return Ok(size);
                }
                RecordStep::Dropped(size) => self.window.advance(size),
                RecordStep::Misaligned => {}
            }
        }
    }

    /// Read one complete frame in the given wire mode
    ///
    /// On success the frame bytes are appended to `dest`. On error `dest`
    /// is left as it was.
    pub fn read_frame<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        dest: &mut Vec<u8>,
        mode: ReadMode,
        timeout: Duration,
        reject_older_than: Option<f64>,
    ) -> Result<usize> {
        let result = match mode {
            ReadMode::EnvelopeOnly => self.read_envelope(source, dest, timeout),
            ReadMode::RecordOnly => self.read_record(source, dest, timeout, reject_older_than),
            ReadMode::Framed => self.read_combined(source, dest, timeout, reject_older_than),
        };
        if let Ok(n) = result {
            self.stats.record(ReaderEvent::FrameValid);
            self.stats.add_bytes(ByteTally::FrameValid, n);
        }
        result
    }

    fn read_combined<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        dest: &mut Vec<u8>,
        timeout: Duration,
        reject_older_than: Option<f64>,
    ) -> Result<usize> {
        loop {
            let region = self.envelope_at_front(source, timeout)?;
            match self.record_at(source, region, timeout, reject_older_than, false)? {
                RecordStep::Accepted(size) => {
                    let total = region + size;
                    dest.extend_from_slice(&self.window.as_slice()[..total]);
                    self.window.advance(total);
                    return Ok(total);
                }
                RecordStep::Dropped(size) => {
                    self.window.advance(region + size);
                    self.stats.record(ReaderEvent::FrameInvalid);
                }
                RecordStep::Misaligned => {
                    // Envelope looked fine but wraps garbage; search again past it
                    self.stats.record(ReaderEvent::FrameInvalid);
                    self.resync_envelope();
                }
            }
        }
    }

    /// Locate a valid envelope at the window front; returns its region length
    fn envelope_at_front<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        timeout: Duration,
    ) -> Result<usize> {
        let max_region = self.window.capacity() - RECORD_HEADER_SIZE;
        loop {
            self.fill(source, ENVELOPE_HEADER_SIZE, timeout, Layer::Envelope)?;
            let Some(header) = EnvelopeFrame::parse(self.window.as_slice()) else {
                return Err(Error::Other("envelope header not buffered".to_string()));
            };

            let verdict = header.validate().and_then(|()| {
                if header.region_len() > max_region {
                    Err(FrameFault::EnvelopeOffset)
                } else {
                    Ok(())
                }
            });

            match verdict {
                Ok(()) => {
                    let region = header.region_len();
                    self.fill(source, region, timeout, Layer::Envelope)?;
                    self.stats.record(ReaderEvent::EnvelopeValid);
                    self.stats.add_bytes(ByteTally::EnvelopeValid, region);
                    return Ok(region);
                }
                Err(fault) => {
                    log::debug!("Invalid envelope ({:?}), resyncing", fault);
                    self.stats.record(fault.into());
                    self.stats.record(ReaderEvent::EnvelopeInvalid);
                    self.stats
                        .add_bytes(ByteTally::EnvelopeInvalid, ENVELOPE_HEADER_SIZE);
                    self.resync_envelope();
                }
            }
        }
    }

    /// Read and vet the record starting `base` bytes into the window
    ///
    /// Nothing is consumed here; the caller advances past the outcome.
    fn record_at<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        base: usize,
        timeout: Duration,
        reject_older_than: Option<f64>,
        resync: bool,
    ) -> Result<RecordStep> {
        loop {
            self.fill(source, base + RECORD_HEADER_SIZE, timeout, Layer::Record)?;
            let Some(header) = RecordHeader::parse(&self.window.as_slice()[base..]) else {
                return Err(Error::Other("record header not buffered".to_string()));
            };

            let limit = self.max_frame_size.min(self.window.capacity() - base);
            if let Err(fault) = header.validate(limit) {
                log::debug!("Invalid record header ({:?})", fault);
                self.stats.record(fault.into());
                self.stats.record(ReaderEvent::RecordInvalid);
                self.stats.add_bytes(ByteTally::RecordInvalid, RECORD_HEADER_SIZE);
                if !resync {
                    return Ok(RecordStep::Misaligned);
                }
                self.resync_record();
                continue;
            }

            let size = header.size as usize;
            self.fill(source, base + size, timeout, Layer::Record)?;
            let record = &self.window.as_slice()[base..base + size];

            let verdict = header
                .verify_checksum(record)
                .map_err(|(carried, computed)| {
                    log::warn!(
                        "Record type {} checksum mismatch: carried {:#010x}, computed {:#010x}",
                        header.record_type_id,
                        carried,
                        computed
                    );
                    FrameFault::Checksum
                })
                .and_then(|()| match reject_older_than {
                    Some(floor) if is_stale(header.timestamp.epoch_seconds(), floor) => {
                        log::debug!(
                            "Record type {} is stale ({:.3}, floor {:.3})",
                            header.record_type_id,
                            header.timestamp.epoch_seconds(),
                            floor
                        );
                        Err(FrameFault::Stale)
                    }
                    _ => Ok(()),
                });

            return Ok(match verdict {
                Ok(()) => {
                    self.stats.record(ReaderEvent::RecordValid);
                    self.stats.add_bytes(ByteTally::RecordValid, size);
                    self.stats
                        .note_record(header.record_type_id, header.timestamp.epoch_seconds());
                    RecordStep::Accepted(size)
                }
                Err(fault) => {
                    self.stats.record(fault.into());
                    self.stats.record(ReaderEvent::RecordInvalid);
                    self.stats.add_bytes(ByteTally::RecordInvalid, size);
                    RecordStep::Dropped(size)
                }
            });
        }
    }

    fn resync_envelope(&mut self) {
        let pattern = ENVELOPE_VERSION.to_le_bytes();
        let skip = self
            .window
            .find_field(1, ENVELOPE_VERSION_OFFSET, &pattern)
            // No candidate: drop what was scanned, keep the tail that could still start a frame
            .unwrap_or_else(|| unscannable_from(self.window.len(), 1, ENVELOPE_VERSION_OFFSET));
        self.skip(skip, ReaderEvent::EnvelopeResync);
    }

    /// Like the envelope resync, but a candidate whose whole header is
    /// already buffered must also pass the structural checks. A candidate
    /// with its header only partly buffered is taken tentatively and
    /// re-checked once the rest arrives.
    fn resync_record(&mut self) {
        let pattern = RECORD_VERSION.to_le_bytes();
        let mut from = 1;
        let skip = loop {
            let Some(s) = self.window.find_field(from, RECORD_VERSION_OFFSET, &pattern) else {
                break unscannable_from(self.window.len(), from, RECORD_VERSION_OFFSET);
            };
            match RecordHeader::parse(&self.window.as_slice()[s..]) {
                Some(h) if h.validate(self.max_frame_size).is_err() => from = s + 1,
                _ => break s,
            }
        };
        self.skip(skip, ReaderEvent::RecordResync);
    }

    fn skip(&mut self, n: usize, event: ReaderEvent) {
        let n = n.min(self.window.len());
        self.window.advance(n);
        self.stats.record(event);
        self.stats.add_bytes(ByteTally::Lost, n);
        log::trace!("Resync skipped {} bytes", n);
    }

    fn fill<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        want: usize,
        timeout: Duration,
        layer: Layer,
    ) -> Result<()> {
        match self.window.fill(source, want, timeout) {
            Ok(short_reads) => {
                self.stats.record_n(layer.short_read(), u64::from(short_reads));
                Ok(())
            }
            Err(e) => {
                self.stats.record(layer.read_error());
                if e.is_fatal_transport() {
                    self.stats.record(ReaderEvent::SocketError);
                }
                Err(e)
            }
        }
    }
}

/// At or before the floor; a NaN time cannot be shown to be newer
fn is_stale(epoch_seconds: f64, floor: f64) -> bool {
    epoch_seconds.is_nan() || epoch_seconds <= floor
}

/// First offset that could still start a frame once more bytes arrive
///
/// Positions whose version field runs past the pending bytes cannot be
/// ruled out yet, so they are kept.
fn unscannable_from(pending: usize, from: usize, version_at: usize) -> usize {
    pending.saturating_sub(version_at + 1).max(from)
}
