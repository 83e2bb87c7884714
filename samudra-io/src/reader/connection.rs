//! Byte source lifecycle
//!
//! ```text
//! New ──► Initialized ──connect ok──► Connected ──subscribe ok──► Subscribed
//!              ▲                          │                           │
//!              └───────── failure ────────┴──── transport closed ─────┘
//! ```
//!
//! `reconnect` always builds a fresh source; a half-open one is never
//! reused. Retry pacing belongs to the caller.

use super::subscribe::{subscribe, SUBSCRIBE_TIMEOUT};
use crate::error::{Error, Result};
use crate::transport::{ByteSource, FileSource, TcpSource};
use std::path::PathBuf;
use std::time::Duration;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Initialized,
    Connected,
    Subscribed,
}

/// Creates and prepares byte sources
pub trait Connector {
    type Source: ByteSource;

    /// Open a new source
    fn connect(&mut self) -> Result<Self::Source>;

    /// Post-connect handshake
    fn subscribe(&mut self, source: &mut Self::Source) -> Result<()>;

    fn describe(&self) -> String;
}

/// Owns the current source and its state
pub struct ConnectionManager<C: Connector> {
    connector: C,
    source: Option<C::Source>,
    state: ConnectionState,
    attempts: u64,
    failures: u64,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            source: None,
            state: ConnectionState::New,
            attempts: 0,
            failures: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_subscribed(&self) -> bool {
        self.state == ConnectionState::Subscribed
    }

    /// Live source, only present while subscribed
    pub fn source_mut(&mut self) -> Option<&mut C::Source> {
        self.source.as_mut()
    }

    /// Tear down any current source, connect a new one, then subscribe
    ///
    /// One attempt only. On failure the state is `Initialized` and no
    /// source is held.
    pub fn reconnect(&mut self) -> Result<()> {
        if self.source.take().is_some() {
            log::info!("Closing source {}", self.connector.describe());
        }
        self.state = ConnectionState::Initialized;
        self.attempts += 1;

        let mut source = match self.connector.connect() {
            Ok(source) => source,
            Err(e) => {
                self.failures += 1;
                log::warn!("Connect to {} failed: {}", self.connector.describe(), e);
                return Err(e);
            }
        };
        self.state = ConnectionState::Connected;

        if let Err(e) = self.connector.subscribe(&mut source) {
            self.failures += 1;
            self.state = ConnectionState::Initialized;
            log::warn!("Subscribe on {} failed: {}", source.describe(), e);
            return Err(e);
        }

        log::info!("Source ready: {}", source.describe());
        self.source = Some(source);
        self.state = ConnectionState::Subscribed;
        Ok(())
    }

    /// Drop the source after a fatal transport error
    pub fn disconnect(&mut self, reason: &Error) {
        if self.source.take().is_some() {
            log::warn!("Source {} lost: {}", self.connector.describe(), reason);
        }
        if self.state != ConnectionState::New {
            self.state = ConnectionState::Initialized;
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Connect attempts so far
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Failed connect or subscribe attempts so far
    pub fn failures(&self) -> u64 {
        self.failures
    }
}

/// Live sonar center over TCP
pub struct TcpConnector {
    pub address: String,
    pub connect_timeout: Duration,
    pub subscribe_timeout: Duration,
    pub records: Vec<u32>,
    ticket: u32,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>, records: Vec<u32>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: Duration::from_secs(5),
            subscribe_timeout: SUBSCRIBE_TIMEOUT,
            records,
            ticket: 0,
        }
    }
}

impl Connector for TcpConnector {
    type Source = TcpSource;

    fn connect(&mut self) -> Result<TcpSource> {
        TcpSource::connect(&self.address, self.connect_timeout)
    }

    fn subscribe(&mut self, source: &mut TcpSource) -> Result<()> {
        self.handshake(source)
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }
}

/// Recorded capture file
pub struct FileConnector {
    pub path: PathBuf,
}

impl Connector for FileConnector {
    type Source = FileSource;

    fn connect(&mut self) -> Result<FileSource> {
        FileSource::open(&self.path)
    }

    fn subscribe(&mut self, _source: &mut FileSource) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// Either connector, chosen at runtime from configuration
pub enum SourceConnector {
    Tcp(TcpConnector),
    File(FileConnector),
}

impl Connector for SourceConnector {
    type Source = Box<dyn ByteSource>;

    fn connect(&mut self) -> Result<Self::Source> {
        let source: Self::Source = match self {
            SourceConnector::Tcp(c) => Box::new(c.connect()?),
            SourceConnector::File(c) => Box::new(c.connect()?),
        };
        Ok(source)
    }

    fn subscribe(&mut self, source: &mut Self::Source) -> Result<()> {
        match self {
            SourceConnector::Tcp(c) => c.handshake(source),
            SourceConnector::File(_) => Ok(()),
        }
    }

    fn describe(&self) -> String {
        match self {
            SourceConnector::Tcp(c) => c.describe(),
            SourceConnector::File(c) => c.describe(),
        }
    }
}

impl TcpConnector {
    fn handshake<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Result<()> {
        self.ticket = self.ticket.wrapping_add(1);
        subscribe(source, &self.records, self.ticket, self.subscribe_timeout)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::reader::subscribe::{reply_frame, RECORD_REMOTE_ACK};
    use crate::transport::MockSource;
    use std::collections::VecDeque;

    /// Scripted connector: each attempt pops the next (connect ok, subscribe ok)
    pub(crate) struct ScriptedConnector {
        pub script: VecDeque<(bool, bool)>,
        pub last: Option<MockSource>,
        pub preload: Vec<u8>,
    }

    impl ScriptedConnector {
        pub fn new(script: &[(bool, bool)]) -> Self {
            Self {
                script: script.iter().copied().collect(),
                last: None,
                preload: Vec::new(),
            }
        }
    }

    impl Connector for ScriptedConnector {
        type Source = MockSource;

        fn connect(&mut self) -> Result<MockSource> {
            let (connect_ok, _) = self.script.front().copied().unwrap_or((false, false));
            if !connect_ok {
                self.script.pop_front();
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                )));
            }
            let source = MockSource::with_data(&self.preload);
            self.last = Some(source.clone());
            Ok(source)
        }

        fn subscribe(&mut self, _source: &mut MockSource) -> Result<()> {
            match self.script.pop_front() {
                Some((_, true)) => Ok(()),
                _ => Err(Error::SubscribeRejected),
            }
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    #[test]
    fn test_starts_new() {
        let manager = ConnectionManager::new(ScriptedConnector::new(&[]));
        assert_eq!(manager.state(), ConnectionState::New);
    }

    #[test]
    fn test_reconnect_sequence() {
        let mut manager =
            ConnectionManager::new(ScriptedConnector::new(&[(true, true), (false, false), (true, true)]));

        manager.reconnect().unwrap();
        assert_eq!(manager.state(), ConnectionState::Subscribed);

        manager.disconnect(&Error::TransportClosed);
        assert_eq!(manager.state(), ConnectionState::Initialized);
        assert!(manager.source_mut().is_none());

        assert!(manager.reconnect().is_err());
        assert_eq!(manager.state(), ConnectionState::Initialized);

        manager.reconnect().unwrap();
        assert_eq!(manager.state(), ConnectionState::Subscribed);
        assert_eq!(manager.attempts(), 3);
        assert_eq!(manager.failures(), 1);
    }

    #[test]
    fn test_subscribe_failure_drops_source() {
        let mut manager = ConnectionManager::new(ScriptedConnector::new(&[(true, false)]));
        assert!(matches!(manager.reconnect(), Err(Error::SubscribeRejected)));
        assert_eq!(manager.state(), ConnectionState::Initialized);
        assert!(manager.source_mut().is_none());
    }

    #[test]
    fn test_reconnect_replaces_source() {
        let mut manager =
            ConnectionManager::new(ScriptedConnector::new(&[(true, true), (true, true)]));
        manager.reconnect().unwrap();
        manager
            .source_mut()
            .unwrap()
            .inject_read(&[1, 2, 3]);
        manager.reconnect().unwrap();
        // Fresh source, old bytes gone
        let fresh = manager.connector.last.clone().unwrap();
        assert_eq!(fresh.remaining(), 0);
    }

    /// Mock-backed connector exercising the real subscribe handshake
    struct HandshakeConnector {
        reply: Vec<u8>,
    }

    impl Connector for HandshakeConnector {
        type Source = MockSource;

        fn connect(&mut self) -> Result<MockSource> {
            Ok(MockSource::with_data(&self.reply))
        }

        fn subscribe(&mut self, source: &mut MockSource) -> Result<()> {
            subscribe(source, &[7027], 1, Duration::from_millis(10))
        }

        fn describe(&self) -> String {
            "handshake".to_string()
        }
    }

    #[test]
    fn test_real_handshake() {
        let mut manager = ConnectionManager::new(HandshakeConnector {
            reply: reply_frame(RECORD_REMOTE_ACK),
        });
        manager.reconnect().unwrap();
        assert!(manager.is_subscribed());
        assert!(!manager.source_mut().unwrap().get_written().is_empty());
    }

    #[test]
    fn test_file_connector() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut manager = ConnectionManager::new(SourceConnector::File(FileConnector {
            path: tmp.path().to_path_buf(),
        }));
        manager.reconnect().unwrap();
        assert!(manager.is_subscribed());

        let mut missing = ConnectionManager::new(SourceConnector::File(FileConnector {
            path: PathBuf::from("/nonexistent/capture.bin"),
        }));
        assert!(missing.reconnect().is_err());
        assert_eq!(missing.state(), ConnectionState::Initialized);
    }
}
