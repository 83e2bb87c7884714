//! Arena window over incoming stream bytes
//!
//! Tracks `(start, end)` over a fixed arena. Consuming bytes advances
//! `start` in O(1); bytes are only moved when a fill would run past the end
//! of the arena, and then only the pending tail is slid to the front.
//! Unconsumed bytes always survive into the next frame attempt.

use crate::error::{Error, Result};
use crate::transport::ByteSource;
use std::time::Duration;

/// Fixed-capacity sliding window for frame parsing
pub struct FrameWindow {
    data: Box<[u8]>,
    start: usize, // First pending byte
    end: usize,   // One past the last pending byte
}

impl FrameWindow {
    /// Create an empty window holding at most `capacity` pending bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    /// Pending byte count
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Pending bytes, oldest first
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// Consume `n` bytes from the front
    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.start += n.min(self.len());
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Drop everything pending
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// Ensure at least `want` bytes are pending, reading from `source`
    ///
    /// Partial reads are retried for the remainder. Only the missing bytes
    /// are requested, so the source is never read past the frame being
    /// assembled. Returns the number of partial reads seen along the way.
    ///
    /// Errors from the source propagate unchanged; bytes already read stay
    /// pending for the next call.
    pub fn fill<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        want: usize,
        timeout: Duration,
    ) -> Result<u32> {
        if want > self.capacity() {
            return Err(Error::BufferOverflow {
                requested: want,
                capacity: self.capacity(),
            });
        }
        if self.len() >= want {
            return Ok(0);
        }
        if self.start + want > self.capacity() {
            self.compact();
        }

        let target = self.start + want;
        let mut short_reads = 0;
        while self.end < target {
            let n = source.read_with_timeout(&mut self.data[self.end..target], timeout)?;
            if n == 0 {
                return Err(Error::Timeout);
            }
            self.end += n;
            if self.end < target {
                short_reads += 1;
            }
        }
        Ok(short_reads)
    }

    /// First offset `s >= from` whose bytes at `s + at` equal `pattern`
    pub fn find_field(&self, from: usize, at: usize, pattern: &[u8]) -> Option<usize> {
        let pending = self.as_slice();
        if from + at >= pending.len() {
            return None;
        }
        pending[from + at..]
            .windows(pattern.len())
            .position(|w| w == pattern)
            .map(|p| p + from)
    }

    fn compact(&mut self) {
        if self.start > 0 {
            self.data.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
    }
}
