//! Sonar stream reader
//!
//! [`SonarReader`] ties the pieces together: a [`ConnectionManager`] owning
//! the byte source, and a [`FrameAssembler`] decoding frames into a
//! [`FrameBuffer`](crate::frame_buffer::FrameBuffer). The buffer is only
//! refilled when it runs empty, so consumers pace the decoder.

mod assembler;
pub(crate) mod connection;
mod frame;
mod subscribe;

pub use assembler::{AssemblerOptions, FrameAssembler};
pub use connection::{
    ConnectionManager, ConnectionState, Connector, FileConnector, SourceConnector, TcpConnector,
};
pub use frame::{FrameReader, ReadMode};
pub use subscribe::{
    subscribe, subscribe_request, COMMAND_SUBSCRIBE, RECORD_REMOTE_ACK, RECORD_REMOTE_CONTROL,
    RECORD_REMOTE_NACK, SUBSCRIBE_TIMEOUT,
};

use crate::error::{Error, Result};
use crate::stats::{ReaderEvent, ReaderStats};
use std::time::Duration;

/// Connection-managed frame reader
pub struct SonarReader<C: Connector> {
    connection: ConnectionManager<C>,
    assembler: FrameAssembler,
    timeout: Duration,
}

impl<C: Connector> SonarReader<C> {
    pub fn new(connector: C, assembler: FrameAssembler, timeout: Duration) -> Self {
        Self {
            connection: ConnectionManager::new(connector),
            assembler,
            timeout,
        }
    }

    /// One connect + subscribe attempt; buffered data from the old source is dropped
    pub fn connect(&mut self) -> Result<()> {
        self.assembler.purge();
        self.connection.reconnect()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_subscribed(&self) -> bool {
        self.connection.is_subscribed()
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }

    /// Flush the frame buffer and read one fresh frame into it
    pub fn refill(&mut self) -> Result<usize> {
        let Some(source) = self.connection.source_mut() else {
            return Err(Error::NotConnected);
        };
        self.assembler.buffer_mut().flush();
        self.assembler.stats_mut().record(ReaderEvent::BufferRefill);

        match self.assembler.assemble(source, self.timeout) {
            Ok(n) => Ok(n),
            Err(e) => {
                if e.is_fatal_transport() {
                    self.purge(&e);
                }
                Err(e)
            }
        }
    }

    /// Return the next unread frame, marking it consumed
    ///
    /// Refills only once the buffer is drained. Bytes an earlier `read`
    /// left behind come back first, as the tail of their frame.
    pub fn next_frame(&mut self) -> Result<&[u8]> {
        if self.assembler.buffer().pending() == 0 {
            self.refill()?;
        }
        Ok(self.assembler.buffer_mut().take_pending())
    }

    /// Fill `buf` completely from the frame stream
    ///
    /// Refills whenever the buffer runs dry and keeps waiting through
    /// timeouts. Returns early only on a fatal error.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut got = 0;
        while got < buf.len() {
            if self.assembler.buffer().pending() == 0 {
                match self.refill() {
                    Ok(_) => {}
                    Err(Error::Timeout) => continue,
                    Err(e) => return Err(e),
                }
            }
            got += self.assembler.buffer_mut().read(&mut buf[got..]);
            self.assembler.stats_mut().record(ReaderEvent::BufferRead);
        }
        Ok(got)
    }

    /// Fatal transport error: drop the source and everything buffered
    pub fn purge(&mut self, reason: &Error) {
        self.connection.disconnect(reason);
        self.assembler.purge();
    }

    pub fn set_reject_older_than(&mut self, floor: Option<f64>) {
        self.assembler.set_reject_older_than(floor);
    }

    pub fn stats(&self) -> &ReaderStats {
        self.assembler.stats()
    }

    pub fn stats_mut(&mut self) -> &mut ReaderStats {
        self.assembler.stats_mut()
    }

    pub fn pending(&self) -> usize {
        self.assembler.buffer().pending()
    }
}

#[cfg(test)]
mod tests {
    use super::connection::tests::ScriptedConnector;
    use super::*;
    use crate::frame_buffer::FrameBuffer;
    use crate::protocol::{build_frame, build_record, RecordTime};

    const T: Duration = Duration::from_millis(10);

    fn record(type_id: u32, fill: u8) -> Vec<u8> {
        build_record(type_id, RecordTime::from_epoch(1_700_000_000.0), &[fill; 20], true)
    }

    fn reader(connector: ScriptedConnector) -> SonarReader<ScriptedConnector> {
        let assembler = FrameAssembler::new(
            FrameReader::new(1024),
            FrameBuffer::new(4096),
            AssemblerOptions::default(),
        );
        SonarReader::new(connector, assembler, T)
    }

    #[test]
    fn test_not_connected() {
        let mut r = reader(ScriptedConnector::new(&[]));
        assert!(matches!(r.refill(), Err(Error::NotConnected)));
    }

    #[test]
    fn test_next_frame() {
        let rec = record(7027, 1);
        let mut connector = ScriptedConnector::new(&[(true, true)]);
        connector.preload = build_frame(&rec);
        let mut r = reader(connector);

        r.connect().unwrap();
        assert_eq!(r.next_frame().unwrap(), &rec[..]);
    }

    #[test]
    fn test_read_spans_frames() {
        let a = record(7027, 0xAA);
        let b = record(7027, 0xBB);
        let mut connector = ScriptedConnector::new(&[(true, true)]);
        connector.preload = build_frame(&a);
        connector.preload.extend_from_slice(&build_frame(&b));
        let mut r = reader(connector);
        r.connect().unwrap();

        let mut buf = vec![0u8; a.len() + 10];
        assert_eq!(r.read(&mut buf).unwrap(), buf.len());
        assert_eq!(&buf[..a.len()], &a[..]);
        assert_eq!(&buf[a.len()..], &b[..10]);
        assert_eq!(r.pending(), b.len() - 10);
        assert_eq!(r.stats().lifetime().count(ReaderEvent::BufferRefill), 2);
    }

    #[test]
    fn test_next_frame_after_partial_read() {
        let a = record(7027, 0xAA);
        let b = record(7028, 0xBB);
        let mut connector = ScriptedConnector::new(&[(true, true)]);
        connector.preload = build_frame(&a);
        connector.preload.extend_from_slice(&build_frame(&b));
        let mut r = reader(connector);
        r.connect().unwrap();

        let mut head = [0u8; 10];
        r.read(&mut head).unwrap();
        assert_eq!(&head[..], &a[..10]);

        // Unread tail first, then the following frame
        assert_eq!(r.next_frame().unwrap(), &a[10..]);
        assert_eq!(r.next_frame().unwrap(), &b[..]);
        assert_eq!(r.pending(), 0);
        assert_eq!(r.stats().lifetime().count(ReaderEvent::BufferRefill), 2);
    }

    #[test]
    fn test_transport_closed_resets_state() {
        let rec = record(7027, 2);
        let mut connector = ScriptedConnector::new(&[(true, true), (false, false), (true, true)]);
        connector.preload = build_frame(&rec);
        let mut r = reader(connector);

        r.connect().unwrap();
        assert_eq!(r.state(), ConnectionState::Subscribed);
        r.next_frame().unwrap();

        // Peer goes away
        r.connection().connector().last.as_ref().unwrap().close();
        assert!(matches!(r.next_frame(), Err(Error::TransportClosed)));
        assert_eq!(r.state(), ConnectionState::Initialized);
        assert_eq!(r.pending(), 0);

        assert!(r.connect().is_err());
        assert_eq!(r.state(), ConnectionState::Initialized);

        r.connect().unwrap();
        assert_eq!(r.state(), ConnectionState::Subscribed);
        assert_eq!(r.next_frame().unwrap(), &rec[..]);
    }

    #[test]
    fn test_timeout_keeps_connection() {
        let mut r = reader(ScriptedConnector::new(&[(true, true)]));
        r.connect().unwrap();
        assert!(matches!(r.next_frame(), Err(Error::Timeout)));
        assert!(r.is_subscribed());
    }
}
