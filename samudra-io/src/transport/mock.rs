//! Mock byte source for testing

use super::ByteSource;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// In-memory byte source with a shared handle
///
/// Clones share the same buffers, so a test can keep one handle while the
/// reader owns another.
#[derive(Clone, Default)]
pub struct MockSource {
    inner: Arc<Mutex<MockSourceInner>>,
}

#[derive(Default)]
struct MockSourceInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    /// Largest count a single read hands out (0 = unlimited)
    max_chunk: usize,
    /// Report `TransportClosed` instead of `Timeout` once drained
    closed: bool,
    reads: usize,
}

impl MockSource {
    /// Create an empty mock source
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock source preloaded with `data`
    pub fn with_data(data: &[u8]) -> Self {
        let source = Self::new();
        source.inject_read(data);
        source
    }

    /// Queue bytes to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Limit every read to at most `n` bytes to exercise partial reads
    pub fn set_max_chunk(&self, n: usize) {
        self.inner.lock().max_chunk = n;
    }

    /// Drained reads report a closed peer from now on
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    /// Everything written through `write_all`
    pub fn get_written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Bytes still queued
    pub fn remaining(&self) -> usize {
        self.inner.lock().read_buffer.len()
    }

    /// Number of successful read calls so far
    pub fn read_calls(&self) -> usize {
        self.inner.lock().reads
    }
}

impl ByteSource for MockSource {
    fn read_with_timeout(&mut self, buffer: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.read_buffer.is_empty() {
            return Err(if inner.closed {
                Error::TransportClosed
            } else {
                Error::Timeout
            });
        }

        let mut available = inner.read_buffer.len().min(buffer.len());
        if inner.max_chunk > 0 {
            available = available.min(inner.max_chunk);
        }
        for (slot, byte) in buffer
            .iter_mut()
            .zip(inner.read_buffer.drain(..available))
        {
            *slot = byte;
        }
        inner.reads += 1;
        Ok(available)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Error::TransportClosed);
        }
        inner.write_buffer.extend_from_slice(data);
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunked_reads() {
        let mut source = MockSource::with_data(&[1, 2, 3, 4, 5]);
        source.set_max_chunk(2);

        let mut buf = [0u8; 5];
        let n = source.read_with_timeout(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf[..2], &[1, 2]);
        assert_eq!(source.remaining(), 3);
    }

    #[test]
    fn test_drained_behaviour() {
        let mut source = MockSource::new();
        let mut buf = [0u8; 1];
        assert!(matches!(
            source.read_with_timeout(&mut buf, Duration::ZERO),
            Err(Error::Timeout)
        ));
        source.close();
        assert!(matches!(
            source.read_with_timeout(&mut buf, Duration::ZERO),
            Err(Error::TransportClosed)
        ));
    }

    #[test]
    fn test_shared_handle() {
        let handle = MockSource::new();
        let mut owned = handle.clone();
        owned.write_all(b"sub").unwrap();
        handle.inject_read(&[7]);

        assert_eq!(handle.get_written(), b"sub");
        let mut buf = [0u8; 1];
        assert_eq!(owned.read_with_timeout(&mut buf, Duration::ZERO).unwrap(), 1);
        assert_eq!(buf[0], 7);
    }
}
