//! Byte sources feeding the frame reader
//!
//! Every read is bounded by a timeout and ends in one of three ways:
//!
//! | Outcome | Meaning |
//! |---------|---------|
//! | `Ok(n)` with `n == buffer.len()` | full read |
//! | `Ok(n)` with `0 < n < buffer.len()` | partial read, caller retries for the rest |
//! | `Err(..)` | `Timeout` (nothing arrived), `TransportClosed`, `EndOfStream`, or I/O |
//!
//! A source never returns `Ok(0)` for a non-empty buffer.

use crate::error::{Error, Result};
use std::time::Duration;

mod file;
mod mock;
mod tcp;

pub use file::FileSource;
pub use mock::MockSource;
pub use tcp::TcpSource;

/// Timeout-bounded byte source (socket, recorded file, test double)
pub trait ByteSource: Send {
    /// Read up to `buffer.len()` bytes, waiting at most `timeout`
    fn read_with_timeout(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Write a complete message to the peer
    ///
    /// Only sources that talk to a live sonar center can write.
    fn write_all(&mut self, _data: &[u8]) -> Result<()> {
        Err(Error::NotSupported("write on read-only source".to_string()))
    }

    /// Short label for log lines
    fn describe(&self) -> String;
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_with_timeout(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read_with_timeout(buffer, timeout)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_all(data)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
