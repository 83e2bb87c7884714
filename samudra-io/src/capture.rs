//! Binary capture sinks
//!
//! Used for the raw frame capture on the reader side and the MB1 packet log
//! on the relay side. Write failures are logged and never stop processing.

use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Append-only binary log file
pub struct BinaryLog {
    writer: BufWriter<File>,
    path: PathBuf,
    bytes_written: u64,
    write_errors: u64,
}

impl BinaryLog {
    /// Open (or create) `path` for appending
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::info!("Binary log opened: {}", path.display());
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            bytes_written: 0,
            write_errors: 0,
        })
    }

    /// Append one unit; failures are counted, not returned
    pub fn write(&mut self, bytes: &[u8]) {
        match self.writer.write_all(bytes) {
            Ok(()) => self.bytes_written += bytes.len() as u64,
            Err(e) => {
                self.write_errors += 1;
                log::warn!("Binary log {} write failed: {}", self.path.display(), e);
            }
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }
}

impl Drop for BinaryLog {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            log::warn!("Binary log {} flush failed: {}", self.path.display(), e);
        }
    }
}
