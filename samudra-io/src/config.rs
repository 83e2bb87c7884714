//! Configuration for SamudraIO relay
//!
//! Loads configuration from a TOML file with four sections: the sonar
//! source, the frame reader, the UDP relay and logging.

use crate::error::{Error, Result};
use crate::reader::{
    AssemblerOptions, FileConnector, ReadMode, SourceConnector, TcpConnector,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub reader: ReaderConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

/// Where sonar bytes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Live sonar center, subscribed over TCP
    Tcp,
    /// Recorded raw capture replayed from disk
    File,
}

/// Sonar source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub kind: SourceKind,

    /// Sonar center address for `kind = "tcp"`
    ///
    /// Examples:
    /// - `192.168.1.100:7000` - Sonar processor on the vessel LAN
    /// - `127.0.0.1:7000` - Local simulator
    pub address: String,

    /// Capture file for `kind = "file"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Record type ids requested in the subscribe handshake
    pub records: Vec<u32>,

    pub connect_timeout_ms: u64,
    pub subscribe_timeout_ms: u64,

    /// Wait for each read before reporting a timeout
    pub read_timeout_ms: u64,

    /// Pause between failed connect attempts
    pub retry_delay_ms: u64,

    /// Give up after this many consecutive failed attempts (unbounded when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reconnect_attempts: Option<u32>,
}

/// Frame reader configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReaderConfig {
    pub mode: ReadMode,

    /// Store only the record region of framed input
    pub strip_envelope: bool,

    /// Largest record accepted, in bytes
    pub max_frame_size: usize,

    /// Frame buffer capacity, must hold one frame including its envelope
    pub buffer_capacity: usize,

    /// Drop records stamped at or before this epoch time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_older_than: Option<f64>,

    /// Record type whose payload carries an MB1 packet
    pub ping_record_type: u32,

    /// Append every accepted frame to this raw capture file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_path: Option<String>,

    /// Seconds between period statistic reports
    pub stats_interval_s: u64,
}

/// UDP relay configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    /// UDP bind address peers send heartbeats to
    pub bind_address: String,

    /// Packets a peer may miss before it expires
    pub token_count: i32,

    /// Pause after each broadcast, 0 to disable
    pub publish_delay_ms: u64,

    /// Append every published MB1 packet to this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mb1_log_path: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use samudra_io::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("samudra.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Defaults for a sonar center on the local host
    ///
    /// Suitable for testing against a simulator. Vessel deployments
    /// should use a proper TOML configuration file.
    pub fn local_defaults() -> Self {
        Self {
            source: SourceConfig {
                kind: SourceKind::Tcp,
                address: "127.0.0.1:7000".to_string(),
                path: None,
                records: vec![7027],
                connect_timeout_ms: 5000,
                subscribe_timeout_ms: 3000,
                read_timeout_ms: 1000,
                retry_delay_ms: 5000,
                max_reconnect_attempts: None,
            },
            reader: ReaderConfig {
                mode: ReadMode::Framed,
                strip_envelope: true,
                max_frame_size: 60_000,
                buffer_capacity: 65_536,
                reject_older_than: None,
                ping_record_type: 7027,
                capture_path: None,
                stats_interval_s: 60,
            },
            relay: RelayConfig {
                bind_address: "0.0.0.0:27000".to_string(),
                token_count: 50,
                publish_delay_ms: 0,
                mb1_log_path: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::local_defaults()
    }
}

impl SourceConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Build the connector this section describes
    pub fn connector(&self) -> Result<SourceConnector> {
        match self.kind {
            SourceKind::Tcp => {
                let mut tcp = TcpConnector::new(self.address.clone(), self.records.clone());
                tcp.connect_timeout = Duration::from_millis(self.connect_timeout_ms);
                tcp.subscribe_timeout = Duration::from_millis(self.subscribe_timeout_ms);
                Ok(SourceConnector::Tcp(tcp))
            }
            SourceKind::File => {
                let path = self.path.as_ref().ok_or_else(|| {
                    Error::InvalidParameter("source.path is required for kind = \"file\"".into())
                })?;
                Ok(SourceConnector::File(FileConnector {
                    path: PathBuf::from(path),
                }))
            }
        }
    }
}

impl ReaderConfig {
    pub fn assembler_options(&self) -> AssemblerOptions {
        AssemblerOptions {
            mode: self.mode,
            strip_envelope: self.strip_envelope,
            reject_older_than: self.reject_older_than,
        }
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::local_defaults();
        assert_eq!(config.source.kind, SourceKind::Tcp);
        assert_eq!(config.source.address, "127.0.0.1:7000");
        assert_eq!(config.source.max_reconnect_attempts, None);
        assert_eq!(config.reader.mode, ReadMode::Framed);
        assert_eq!(config.reader.max_frame_size, 60_000);
        assert_eq!(config.relay.token_count, 50);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::local_defaults();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        // Should contain all sections
        assert!(toml_string.contains("[source]"));
        assert!(toml_string.contains("[reader]"));
        assert!(toml_string.contains("[relay]"));
        assert!(toml_string.contains("[logging]"));

        // Should contain key values
        assert!(toml_string.contains("kind = \"tcp\""));
        assert!(toml_string.contains("mode = \"framed\""));
        assert!(toml_string.contains("token_count = 50"));
        // Absent options are left out
        assert!(!toml_string.contains("capture_path"));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[source]
kind = "file"
address = ""
path = "/data/survey.s7k"
records = [7027, 7030]
connect_timeout_ms = 1000
subscribe_timeout_ms = 3000
read_timeout_ms = 50
retry_delay_ms = 10
max_reconnect_attempts = 3

[reader]
mode = "record_only"
strip_envelope = false
max_frame_size = 30000
buffer_capacity = 40000
reject_older_than = 1551443415.5
ping_record_type = 7027
stats_interval_s = 10

[relay]
bind_address = "127.0.0.1:27000"
token_count = 5
publish_delay_ms = 2
mb1_log_path = "/data/pings.mb1"

[logging]
level = "debug"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.source.kind, SourceKind::File);
        assert_eq!(config.source.path.as_deref(), Some("/data/survey.s7k"));
        assert_eq!(config.source.records, vec![7027, 7030]);
        assert_eq!(config.source.max_reconnect_attempts, Some(3));
        assert_eq!(config.reader.mode, ReadMode::RecordOnly);
        assert_eq!(config.reader.reject_older_than, Some(1551443415.5));
        assert_eq!(config.reader.capture_path, None);
        assert_eq!(config.relay.mb1_log_path.as_deref(), Some("/data/pings.mb1"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samudra.toml");

        let mut config = AppConfig::local_defaults();
        config.relay.token_count = 7;
        config.to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.relay.token_count, 7);
        assert_eq!(loaded.source.records, config.source.records);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AppConfig::from_file("/nonexistent/samudra.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_connector_selection() {
        let mut source = AppConfig::local_defaults().source;
        assert!(matches!(source.connector().unwrap(), SourceConnector::Tcp(_)));

        source.kind = SourceKind::File;
        assert!(matches!(
            source.connector(),
            Err(Error::InvalidParameter(_))
        ));

        source.path = Some("/tmp/capture.s7k".to_string());
        assert!(matches!(source.connector().unwrap(), SourceConnector::File(_)));
    }
}
