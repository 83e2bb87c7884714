//! Bounded store for validated frames awaiting consumption
//!
//! Frames are appended whole and can be consumed either as a byte stream
//! (`read`) or frame by frame (`enumerate` / `next`). `flush` empties
//! everything at once; there is no partial compaction.

use crate::error::{Error, Result};

/// Fixed-capacity frame container
pub struct FrameBuffer {
    data: Vec<u8>,
    capacity: usize,
    read_cursor: usize,
    offsets: Vec<usize>, // Start of each stored frame
    next_frame: usize,   // Enumeration position in `offsets`
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            read_cursor: 0,
            offsets: Vec::new(),
            next_frame: 0,
        }
    }

    /// Store one frame
    pub fn append(&mut self, frame: &[u8]) -> Result<usize> {
        if frame.len() > self.space() {
            return Err(Error::NoSpace {
                requested: frame.len(),
                available: self.space(),
            });
        }
        self.offsets.push(self.data.len());
        self.data.extend_from_slice(frame);
        Ok(frame.len())
    }

    /// Bytes written but not yet read
    #[inline]
    pub fn pending(&self) -> usize {
        self.data.len() - self.read_cursor
    }

    /// Copy up to `buf.len()` pending bytes out, never more than `pending()`
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.pending());
        buf[..n].copy_from_slice(&self.data[self.read_cursor..self.read_cursor + n]);
        self.read_cursor += n;
        n
    }

    /// Borrow every pending byte and mark it read
    pub fn take_pending(&mut self) -> &[u8] {
        let start = self.read_cursor;
        self.read_cursor = self.data.len();
        &self.data[start..]
    }

    /// Reset cursors and forget all frames
    pub fn flush(&mut self) {
        self.data.clear();
        self.read_cursor = 0;
        self.offsets.clear();
        self.next_frame = 0;
    }

    /// Restart frame enumeration and return the first frame
    pub fn enumerate(&mut self) -> Option<&[u8]> {
        self.next_frame = 0;
        self.next()
    }

    /// Next frame in enumeration order
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&[u8]> {
        let start = *self.offsets.get(self.next_frame)?;
        let end = self
            .offsets
            .get(self.next_frame + 1)
            .copied()
            .unwrap_or(self.data.len());
        self.next_frame += 1;
        Some(&self.data[start..end])
    }

    /// Move the read cursor to an absolute position
    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            return Err(Error::InvalidParameter(format!(
                "seek to {} past end {}",
                position,
                self.data.len()
            )));
        }
        self.read_cursor = position;
        Ok(())
    }

    /// Current read cursor
    pub fn tell(&self) -> usize {
        self.read_cursor
    }

    /// Stored frame count
    pub fn frames(&self) -> usize {
        self.offsets.len()
    }

    /// Free bytes left for appends
    pub fn space(&self) -> usize {
        self.capacity - self.data.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
