//! Reader counters
//!
//! Every update lands in two independent tallies: a `period` window that
//! the owner resets on its reporting cadence, and a `lifetime` aggregate
//! that only grows.

use crate::error::FrameFault;
use std::collections::BTreeMap;
use std::time::Instant;

/// Countable reader events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReaderEvent {
    FrameValid,
    FrameInvalid,
    EnvelopeValid,
    EnvelopeInvalid,
    RecordValid,
    RecordInvalid,
    EnvelopeResync,
    RecordResync,
    EnvelopeShortRead,
    RecordShortRead,
    EnvelopeVersion,
    EnvelopeOffset,
    EnvelopePacketSize,
    EnvelopeRecordCount,
    RecordVersion,
    RecordSync,
    RecordSize,
    RecordChecksum,
    RecordStale,
    EnvelopeReadError,
    RecordReadError,
    SocketError,
    BufferWriteError,
    BufferRead,
    BufferRefill,
}

impl ReaderEvent {
    pub const ALL: [ReaderEvent; 25] = [
        ReaderEvent::FrameValid,
        ReaderEvent::FrameInvalid,
        ReaderEvent::EnvelopeValid,
        ReaderEvent::EnvelopeInvalid,
        ReaderEvent::RecordValid,
        ReaderEvent::RecordInvalid,
        ReaderEvent::EnvelopeResync,
        ReaderEvent::RecordResync,
        ReaderEvent::EnvelopeShortRead,
        ReaderEvent::RecordShortRead,
        ReaderEvent::EnvelopeVersion,
        ReaderEvent::EnvelopeOffset,
        ReaderEvent::EnvelopePacketSize,
        ReaderEvent::EnvelopeRecordCount,
        ReaderEvent::RecordVersion,
        ReaderEvent::RecordSync,
        ReaderEvent::RecordSize,
        ReaderEvent::RecordChecksum,
        ReaderEvent::RecordStale,
        ReaderEvent::EnvelopeReadError,
        ReaderEvent::RecordReadError,
        ReaderEvent::SocketError,
        ReaderEvent::BufferWriteError,
        ReaderEvent::BufferRead,
        ReaderEvent::BufferRefill,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Stable counter name for log output
    pub fn label(self) -> &'static str {
        match self {
            ReaderEvent::FrameValid => "frame_valid",
            ReaderEvent::FrameInvalid => "frame_invalid",
            ReaderEvent::EnvelopeValid => "nf_valid",
            ReaderEvent::EnvelopeInvalid => "nf_invalid",
            ReaderEvent::RecordValid => "drf_valid",
            ReaderEvent::RecordInvalid => "drf_invalid",
            ReaderEvent::EnvelopeResync => "nf_resync",
            ReaderEvent::RecordResync => "drf_resync",
            ReaderEvent::EnvelopeShortRead => "nf_short_read",
            ReaderEvent::RecordShortRead => "drf_short_read",
            ReaderEvent::EnvelopeVersion => "e_nf_ver",
            ReaderEvent::EnvelopeOffset => "e_nf_offset",
            ReaderEvent::EnvelopePacketSize => "e_nf_packetsz",
            ReaderEvent::EnvelopeRecordCount => "e_nf_totalrec",
            ReaderEvent::RecordVersion => "e_drf_proto",
            ReaderEvent::RecordSync => "e_drf_sync",
            ReaderEvent::RecordSize => "e_drf_size",
            ReaderEvent::RecordChecksum => "e_drf_chk",
            ReaderEvent::RecordStale => "e_drf_time",
            ReaderEvent::EnvelopeReadError => "e_nf_read",
            ReaderEvent::RecordReadError => "e_drf_read",
            ReaderEvent::SocketError => "e_sock",
            ReaderEvent::BufferWriteError => "e_fc_write",
            ReaderEvent::BufferRead => "fc_read",
            ReaderEvent::BufferRefill => "fc_refill",
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

impl From<FrameFault> for ReaderEvent {
    fn from(fault: FrameFault) -> Self {
        match fault {
            FrameFault::EnvelopeVersion => ReaderEvent::EnvelopeVersion,
            FrameFault::EnvelopeOffset => ReaderEvent::EnvelopeOffset,
            FrameFault::EnvelopePacketSize => ReaderEvent::EnvelopePacketSize,
            FrameFault::EnvelopeRecordCount => ReaderEvent::EnvelopeRecordCount,
            FrameFault::RecordVersion => ReaderEvent::RecordVersion,
            FrameFault::RecordSync => ReaderEvent::RecordSync,
            FrameFault::RecordSize => ReaderEvent::RecordSize,
            FrameFault::Checksum => ReaderEvent::RecordChecksum,
            FrameFault::Stale => ReaderEvent::RecordStale,
        }
    }
}

/// Byte volume categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteTally {
    FrameValid,
    EnvelopeValid,
    EnvelopeInvalid,
    RecordValid,
    RecordInvalid,
    /// Skipped while searching for alignment
    Lost,
}

impl ByteTally {
    pub const COUNT: usize = 6;
}

/// One accumulation of events and bytes
#[derive(Debug, Clone)]
pub struct Tally {
    events: [u64; ReaderEvent::COUNT],
    bytes: [u64; ByteTally::COUNT],
}

impl Default for Tally {
    fn default() -> Self {
        Self {
            events: [0; ReaderEvent::COUNT],
            bytes: [0; ByteTally::COUNT],
        }
    }
}

impl Tally {
    pub fn count(&self, event: ReaderEvent) -> u64 {
        self.events[event.index()]
    }

    pub fn bytes(&self, kind: ByteTally) -> u64 {
        self.bytes[kind as usize]
    }

    /// Nonzero event counters as (label, count)
    pub fn nonzero(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        ReaderEvent::ALL
            .iter()
            .map(|e| (e.label(), self.count(*e)))
            .filter(|(_, n)| *n > 0)
    }
}

/// Per-reader statistics
///
/// Owned by a single reader instance; nothing here is shared between readers.
#[derive(Debug, Clone)]
pub struct ReaderStats {
    period: Tally,
    lifetime: Tally,
    period_started: Instant,
    record_types: BTreeMap<u32, u64>,
    first_reference: Option<f64>,
}

impl Default for ReaderStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderStats {
    pub fn new() -> Self {
        Self {
            period: Tally::default(),
            lifetime: Tally::default(),
            period_started: Instant::now(),
            record_types: BTreeMap::new(),
            first_reference: None,
        }
    }

    #[inline]
    pub fn record(&mut self, event: ReaderEvent) {
        self.period.events[event.index()] += 1;
        self.lifetime.events[event.index()] += 1;
    }

    #[inline]
    pub fn record_n(&mut self, event: ReaderEvent, n: u64) {
        self.period.events[event.index()] += n;
        self.lifetime.events[event.index()] += n;
    }

    #[inline]
    pub fn add_bytes(&mut self, kind: ByteTally, n: usize) {
        self.period.bytes[kind as usize] += n as u64;
        self.lifetime.bytes[kind as usize] += n as u64;
    }

    /// Count an accepted record by type; the first one fixes the reference time
    pub fn note_record(&mut self, record_type_id: u32, epoch_seconds: f64) {
        *self.record_types.entry(record_type_id).or_insert(0) += 1;
        if epoch_seconds.is_finite() {
            self.first_reference.get_or_insert(epoch_seconds);
        }
    }

    pub fn period(&self) -> &Tally {
        &self.period
    }

    pub fn lifetime(&self) -> &Tally {
        &self.lifetime
    }

    /// Total bytes skipped during resync over the reader's life
    pub fn lost_bytes(&self) -> u64 {
        self.lifetime.bytes(ByteTally::Lost)
    }

    pub fn record_type_count(&self, record_type_id: u32) -> u64 {
        self.record_types.get(&record_type_id).copied().unwrap_or(0)
    }

    /// Epoch time of the first accepted record
    pub fn first_reference(&self) -> Option<f64> {
        self.first_reference
    }

    /// Start a new reporting window
    pub fn reset_period(&mut self) {
        self.period = Tally::default();
        self.period_started = Instant::now();
    }

    /// Log the current period at info level
    pub fn log_period(&self, name: &str) {
        let elapsed = self.period_started.elapsed().as_secs_f64();
        let counters: Vec<String> = self
            .period
            .nonzero()
            .map(|(label, n)| format!("{}={}", label, n))
            .collect();
        log::info!(
            "[{}] {:.1}s: valid={}B lost={}B {}",
            name,
            elapsed,
            self.period.bytes(ByteTally::FrameValid),
            self.period.bytes(ByteTally::Lost),
            counters.join(" ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_unique() {
        let mut labels: Vec<_> = ReaderEvent::ALL.iter().map(|e| e.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), ReaderEvent::COUNT);
    }

    #[test]
    fn test_index_matches_table() {
        for (i, event) in ReaderEvent::ALL.iter().enumerate() {
            assert_eq!(event.index(), i);
        }
    }

    #[test]
    fn test_period_and_lifetime() {
        let mut stats = ReaderStats::new();
        stats.record(ReaderEvent::FrameValid);
        stats.add_bytes(ByteTally::Lost, 3);
        stats.reset_period();
        stats.record(ReaderEvent::FrameValid);

        assert_eq!(stats.period().count(ReaderEvent::FrameValid), 1);
        assert_eq!(stats.lifetime().count(ReaderEvent::FrameValid), 2);
        assert_eq!(stats.period().bytes(ByteTally::Lost), 0);
        assert_eq!(stats.lost_bytes(), 3);
    }

    #[test]
    fn test_record_types_and_reference() {
        let mut stats = ReaderStats::new();
        stats.note_record(7027, 100.0);
        stats.note_record(7027, 101.0);
        stats.note_record(1003, 102.0);

        assert_eq!(stats.record_type_count(7027), 2);
        assert_eq!(stats.record_type_count(1003), 1);
        assert_eq!(stats.record_type_count(9999), 0);
        assert_eq!(stats.first_reference(), Some(100.0));
    }

    #[test]
    fn test_fault_mapping() {
        assert_eq!(
            ReaderEvent::from(FrameFault::Checksum),
            ReaderEvent::RecordChecksum
        );
        assert_eq!(
            ReaderEvent::from(FrameFault::EnvelopeOffset),
            ReaderEvent::EnvelopeOffset
        );
    }
}
