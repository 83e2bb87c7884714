//! Main application orchestration
//!
//! One thread does everything: keep the sonar source subscribed, answer
//! relay heartbeats, turn incoming records into MB1 pings and fan them out
//! to the live peers.

use crate::capture::BinaryLog;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::frame_buffer::FrameBuffer;
use crate::protocol::envelope::ENVELOPE_HEADER_SIZE;
use crate::protocol::{EnvelopeFrame, RecordView};
use crate::reader::{Connector, FrameAssembler, FrameReader, SonarReader, SourceConnector};
use crate::streaming::mb1::{self, Ping};
use crate::streaming::{DatagramTransport, RelaySession};
use log::{debug, error, info, warn};
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Turns a sonar record into a ping for the relay
pub trait PingExtractor {
    /// Ok(None) when the record carries no ping
    fn extract(&mut self, record: &RecordView<'_>) -> Result<Option<Ping>>;
}

/// Records of one type whose payload is a complete MB1 packet
pub struct Mb1RecordExtractor {
    pub record_type_id: u32,
}

impl PingExtractor for Mb1RecordExtractor {
    fn extract(&mut self, record: &RecordView<'_>) -> Result<Option<Ping>> {
        if record.header.record_type_id != self.record_type_id {
            return Ok(None);
        }
        mb1::decode(record.payload()).map(Some)
    }
}

/// Find the record inside a stored frame, with or without its envelope
fn record_in(frame: &[u8]) -> Option<RecordView<'_>> {
    if let Some(view) = RecordView::new(frame) {
        return Some(view);
    }
    let envelope = EnvelopeFrame::parse(frame)?;
    envelope.validate().ok()?;
    RecordView::new(frame.get(envelope.region_len()..)?)
}

/// Reconnect pacing
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// Consecutive failures tolerated, unbounded when None
    pub max_attempts: Option<u32>,
}

/// Sonar-to-relay daemon
pub struct RelayApp<C: Connector, T: DatagramTransport, E: PingExtractor> {
    reader: SonarReader<C>,
    relay: RelaySession<T>,
    extractor: E,
    running: Arc<AtomicBool>,
    retry: RetryPolicy,
    stats_interval: Duration,
    failed_attempts: u32,
    packet: Vec<u8>,
    pings_relayed: u64,
}

impl<C: Connector, T: DatagramTransport, E: PingExtractor> RelayApp<C, T, E> {
    pub fn new(
        reader: SonarReader<C>,
        relay: RelaySession<T>,
        extractor: E,
        running: Arc<AtomicBool>,
        retry: RetryPolicy,
        stats_interval: Duration,
    ) -> Self {
        Self {
            reader,
            relay,
            extractor,
            running,
            retry,
            stats_interval,
            failed_attempts: 0,
            packet: Vec::new(),
            pings_relayed: 0,
        }
    }

    /// Run until the running flag clears or reconnects are exhausted
    pub fn run(&mut self) -> Result<()> {
        info!(
            "Relaying from {}",
            self.reader.connection().connector().describe()
        );

        let mut last_stats = Instant::now();
        while self.running.load(Ordering::Relaxed) {
            self.run_once()?;

            if last_stats.elapsed() >= self.stats_interval {
                self.log_statistics();
                last_stats = Instant::now();
            }
        }

        info!("Shutdown signal received, stopping relay");
        self.log_statistics();
        Ok(())
    }

    /// One cycle: serve peers, make sure the source is up, relay one frame
    pub fn run_once(&mut self) -> Result<()> {
        self.relay.poll_inbound();

        if !self.reader.is_subscribed() {
            if let Err(e) = self.reader.connect() {
                self.failed_attempts += 1;
                if let Some(max) = self.retry.max_attempts
                    && self.failed_attempts >= max
                {
                    error!("Giving up after {} failed connect attempts", max);
                    return Err(e);
                }
                warn!(
                    "Connect attempt {} failed: {}, retrying in {:?}",
                    self.failed_attempts, e, self.retry.delay
                );
                std::thread::sleep(self.retry.delay);
                return Ok(());
            }
            self.failed_attempts = 0;
        }

        self.relay_next_frame();
        Ok(())
    }

    fn relay_next_frame(&mut self) {
        let frame = match self.reader.next_frame() {
            Ok(frame) => frame,
            Err(Error::Timeout) => return,
            Err(e) if e.is_fatal_transport() => {
                // Reader already dropped the source
                warn!("Source lost: {}", e);
                return;
            }
            Err(e) => {
                error!("Frame read failed: {}", e);
                self.reader.purge(&e);
                return;
            }
        };

        let Some(record) = record_in(frame) else {
            return;
        };
        match self.extractor.extract(&record) {
            Ok(Some(ping)) => {
                if let Err(e) = mb1::encode_into(&ping, &mut self.packet) {
                    warn!("Ping {} not relayed: {}", ping.ping_number, e);
                    return;
                }
                let sent = self.relay.broadcast(&self.packet);
                self.pings_relayed += 1;
                debug!("Ping {} sent to {} peers", ping.ping_number, sent);
            }
            Ok(None) => {}
            Err(e) => warn!(
                "Record type {} skipped: {}",
                record.header.record_type_id, e
            ),
        }
    }

    fn log_statistics(&mut self) {
        self.reader.stats().log_period("reader");
        self.reader.stats_mut().reset_period();

        let relay = self.relay.stats();
        info!(
            "[relay] peers={} pings={} sent={} send_err={} acks={} expired={}",
            self.relay.peer_count(),
            self.pings_relayed,
            relay.packets_sent,
            relay.send_errors,
            relay.acks_sent,
            relay.peers_expired
        );
    }

    pub fn pings_relayed(&self) -> u64 {
        self.pings_relayed
    }

    pub fn reader(&self) -> &SonarReader<C> {
        &self.reader
    }

    pub fn relay(&self) -> &RelaySession<T> {
        &self.relay
    }
}

/// Daemon built from configuration
pub type ConfiguredApp = RelayApp<SourceConnector, UdpSocket, Mb1RecordExtractor>;

/// Wire up reader, relay socket and extractor from `config`
pub fn build_relay_app(config: &AppConfig, running: Arc<AtomicBool>) -> Result<ConfiguredApp> {
    let reader_config = &config.reader;
    let needed = reader_config.max_frame_size + ENVELOPE_HEADER_SIZE;
    if reader_config.buffer_capacity < needed {
        return Err(Error::InvalidParameter(format!(
            "reader.buffer_capacity {} cannot hold a {} byte frame",
            reader_config.buffer_capacity, needed
        )));
    }

    let mut assembler = FrameAssembler::new(
        FrameReader::new(reader_config.max_frame_size),
        FrameBuffer::new(reader_config.buffer_capacity),
        reader_config.assembler_options(),
    );
    if let Some(path) = &reader_config.capture_path {
        info!("Capturing raw frames to {}", path);
        assembler = assembler.with_capture(BinaryLog::open(path)?);
    }
    let reader = SonarReader::new(
        config.source.connector()?,
        assembler,
        config.source.read_timeout(),
    );

    let socket = UdpSocket::bind(&config.relay.bind_address).map_err(|e| {
        Error::Other(format!(
            "Failed to bind relay socket {}: {}",
            config.relay.bind_address, e
        ))
    })?;
    socket.set_nonblocking(true)?;
    info!("Relay listening on {}", socket.local_addr()?);

    let mut relay = RelaySession::new(socket, config.relay.token_count)?
        .with_publish_delay(Duration::from_millis(config.relay.publish_delay_ms));
    if let Some(path) = &config.relay.mb1_log_path {
        info!("Logging MB1 packets to {}", path);
        relay = relay.with_packet_log(BinaryLog::open(path)?);
    }

    Ok(RelayApp::new(
        reader,
        relay,
        Mb1RecordExtractor {
            record_type_id: reader_config.ping_record_type,
        },
        running,
        RetryPolicy {
            delay: config.source.retry_delay(),
            max_attempts: config.source.max_reconnect_attempts,
        },
        reader_config.stats_interval(),
    ))
}
