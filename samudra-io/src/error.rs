//! Error types for SamudraIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// SamudraIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parse error
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration serialization error
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Read wait expired with nothing read
    #[error("Communication timeout")]
    Timeout,

    /// Peer closed the connection
    #[error("Transport closed by peer")]
    TransportClosed,

    /// Recorded source exhausted
    #[error("End of stream")]
    EndOfStream,

    /// Request exceeds the working window
    #[error("Buffer overflow: need {requested} bytes, capacity {capacity}")]
    BufferOverflow {
        /// Bytes the caller asked to hold
        requested: usize,
        /// Window capacity
        capacity: usize,
    },

    /// Frame buffer has no room for an append
    #[error("No space: need {requested} bytes, {available} available")]
    NoSpace {
        /// Bytes offered for append
        requested: usize,
        /// Free bytes left
        available: usize,
    },

    /// No live byte source
    #[error("Not connected")]
    NotConnected,

    /// Sonar center refused the subscription
    #[error("Subscription rejected (NACK)")]
    SubscribeRejected,

    /// Subscribe handshake failed for another reason
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Invalid packet or record
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Checksum mismatch
    #[error("Checksum error: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumError {
        /// Checksum carried in the trailer
        expected: u32,
        /// Checksum computed over the bytes
        actual: u32,
    },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation not supported
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True when the current connection is unusable and must be rebuilt
    pub fn is_fatal_transport(&self) -> bool {
        matches!(
            self,
            Error::TransportClosed | Error::EndOfStream | Error::Io(_) | Error::NotConnected
        )
    }
}

/// Recoverable frame faults
///
/// These never leave the reader as errors; each one bumps its counter and
/// the reader either resyncs (structural) or drops the frame (checksum, stale).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFault {
    EnvelopeVersion,
    EnvelopeOffset,
    EnvelopePacketSize,
    EnvelopeRecordCount,
    RecordVersion,
    RecordSync,
    RecordSize,
    Checksum,
    Stale,
}

impl FrameFault {
    /// Structural faults mean the stream lost alignment
    pub fn is_structural(self) -> bool {
        !matches!(self, FrameFault::Checksum | FrameFault::Stale)
    }
}
