//! Frame assembly into the frame buffer

use super::frame::{FrameReader, ReadMode};
use crate::capture::BinaryLog;
use crate::error::Result;
use crate::frame_buffer::FrameBuffer;
use crate::protocol::EnvelopeFrame;
use crate::stats::{ReaderEvent, ReaderStats};
use crate::transport::ByteSource;
use std::time::Duration;

/// How frames are read and what gets stored
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblerOptions {
    pub mode: ReadMode,
    /// Store only the inner record in framed mode
    pub strip_envelope: bool,
    /// Drop records at or before this epoch time
    pub reject_older_than: Option<f64>,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            mode: ReadMode::Framed,
            strip_envelope: true,
            reject_older_than: None,
        }
    }
}

/// Reads frames and forwards them to the frame buffer (and optional capture)
pub struct FrameAssembler {
    reader: FrameReader,
    buffer: FrameBuffer,
    capture: Option<BinaryLog>,
    options: AssemblerOptions,
    scratch: Vec<u8>,
}

impl FrameAssembler {
    pub fn new(reader: FrameReader, buffer: FrameBuffer, options: AssemblerOptions) -> Self {
        Self {
            reader,
            buffer,
            capture: None,
            options,
            scratch: Vec::new(),
        }
    }

    /// Copy every assembled frame, unmodified, into `capture`
    pub fn with_capture(mut self, capture: BinaryLog) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Read one frame and append it to the buffer
    ///
    /// Returns the number of bytes appended.
    pub fn assemble<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        timeout: Duration,
    ) -> Result<usize> {
        self.scratch.clear();
        self.reader.read_frame(
            source,
            &mut self.scratch,
            self.options.mode,
            timeout,
            self.options.reject_older_than,
        )?;

        if let Some(capture) = self.capture.as_mut() {
            capture.write(&self.scratch);
        }

        let start = match self.options.mode {
            ReadMode::Framed if self.options.strip_envelope => EnvelopeFrame::parse(&self.scratch)
                .map(|h| h.region_len())
                .unwrap_or(0),
            _ => 0,
        };

        match self.buffer.append(&self.scratch[start..]) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.reader
                    .stats_mut()
                    .record(ReaderEvent::BufferWriteError);
                log::warn!("Frame buffer append failed: {}", e);
                Err(e)
            }
        }
    }

    pub fn set_reject_older_than(&mut self, floor: Option<f64>) {
        self.options.reject_older_than = floor;
    }

    pub fn options(&self) -> &AssemblerOptions {
        &self.options
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut FrameBuffer {
        &mut self.buffer
    }

    pub fn stats(&self) -> &ReaderStats {
        self.reader.stats()
    }

    pub fn stats_mut(&mut self) -> &mut ReaderStats {
        self.reader.stats_mut()
    }

    /// Drop buffered frames and any partially received bytes
    pub fn purge(&mut self) {
        self.buffer.flush();
        self.reader.reset();
    }
}
