//! Datagram relay for MB1 subscribers
//!
//! # Session Protocol
//!
//! Subscribers are plain datagram peers. There is no handshake beyond:
//!
//! ```text
//! 1. Peer sends any non-empty datagram
//! 2. Relay registers (or refreshes) the peer, keyed by source port
//! 3. Relay replies "ACK\0"
//! 4. Every broadcast costs the peer one heartbeat token
//! 5. A peer whose tokens reach 0 after a broadcast pass is dropped
//! ```
//!
//! Tokens are per-broadcast credits, not wall-clock time: a peer stays
//! registered as long as it sends something at least once every
//! `token_count` broadcasts.
//!
//! # Failure Handling
//!
//! | Failure | Effect |
//! |---------|--------|
//! | ACK send fails | counted, peer still registered |
//! | Packet send fails | counted, peer kept until its tokens run out |
//! | Inbound socket error | counted, polling stops for this cycle |

use crate::capture::BinaryLog;
use crate::error::{Error, Result};
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Reply sent for every inbound datagram
pub const ACK_PAYLOAD: [u8; 4] = *b"ACK\0";

/// Largest control datagram read from a peer
const MAX_INBOUND_SIZE: usize = 512;

/// Datagram endpoint the relay talks through
pub trait DatagramTransport {
    /// Receive one datagram; `Ok(None)` when nothing is waiting
    fn try_recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;

    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;
}

impl DatagramTransport for UdpSocket {
    fn try_recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, addr)
    }
}

/// Registered subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPeer {
    pub port: u16,
    pub addr: SocketAddr,
    /// Broadcasts left before expiry
    pub heartbeats: i32,
}

/// Outcome of acknowledging a datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Sent,
    Failed,
    /// Empty datagram, nothing registered
    Ignored,
}

/// Relay counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub peers_connected: u64,
    pub peers_expired: u64,
    pub datagrams_received: u64,
    pub acks_sent: u64,
    pub ack_errors: u64,
    pub packets_sent: u64,
    pub send_errors: u64,
    pub bytes_sent: u64,
    pub recv_errors: u64,
}

/// Subscriber tracking and fan-out
pub struct RelaySession<T: DatagramTransport> {
    transport: T,
    peers: Vec<RelayPeer>,
    token_count: i32,
    publish_delay: Option<Duration>,
    packet_log: Option<BinaryLog>,
    stats: RelayStats,
}

impl<T: DatagramTransport> RelaySession<T> {
    /// Create a session granting `token_count` broadcasts per keepalive
    pub fn new(transport: T, token_count: i32) -> Result<Self> {
        if token_count < 1 {
            return Err(Error::InvalidParameter(format!(
                "token count must be at least 1, got {}",
                token_count
            )));
        }
        Ok(Self {
            transport,
            peers: Vec::new(),
            token_count,
            publish_delay: None,
            packet_log: None,
            stats: RelayStats::default(),
        })
    }

    /// Sleep this long after every broadcast
    pub fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = Some(delay).filter(|d| !d.is_zero());
        self
    }

    /// Also append every broadcast packet to `log`
    pub fn with_packet_log(mut self, log: BinaryLog) -> Self {
        self.packet_log = Some(log);
        self
    }

    /// Register or refresh the sender and acknowledge
    pub fn on_datagram(&mut self, src: SocketAddr, payload: &[u8]) -> Ack {
        if payload.is_empty() {
            return Ack::Ignored;
        }
        self.stats.datagrams_received += 1;

        match self.peers.iter_mut().find(|p| p.port == src.port()) {
            Some(peer) => {
                peer.heartbeats = self.token_count;
                peer.addr = src;
                log::trace!("Heartbeat from {}", src);
            }
            None => {
                self.peers.push(RelayPeer {
                    port: src.port(),
                    addr: src,
                    heartbeats: self.token_count,
                });
                self.stats.peers_connected += 1;
                log::info!("Relay peer connected: {} ({} total)", src, self.peers.len());
            }
        }

        match self.transport.send_to(&ACK_PAYLOAD, src) {
            Ok(_) => {
                self.stats.acks_sent += 1;
                Ack::Sent
            }
            Err(e) => {
                self.stats.ack_errors += 1;
                log::warn!("ACK to {} failed: {}", src, e);
                Ack::Failed
            }
        }
    }

    /// Drain every waiting inbound datagram; returns how many were handled
    pub fn poll_inbound(&mut self) -> usize {
        let mut buf = [0u8; MAX_INBOUND_SIZE];
        let mut handled = 0;
        loop {
            match self.transport.try_recv_from(&mut buf) {
                Ok(Some((n, src))) => {
                    self.on_datagram(src, &buf[..n]);
                    handled += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    self.stats.recv_errors += 1;
                    log::warn!("Relay receive failed: {}", e);
                    break;
                }
            }
        }
        handled
    }

    /// Send `packet` to every peer, then expire peers out of tokens
    ///
    /// Returns the number of successful sends.
    pub fn broadcast(&mut self, packet: &[u8]) -> usize {
        let mut sent = 0;
        for peer in self.peers.iter_mut() {
            peer.heartbeats -= 1;
            match self.transport.send_to(packet, peer.addr) {
                Ok(n) => {
                    sent += 1;
                    self.stats.packets_sent += 1;
                    self.stats.bytes_sent += n as u64;
                }
                Err(e) => {
                    self.stats.send_errors += 1;
                    log::warn!("Send to relay peer {} failed: {}", peer.addr, e);
                }
            }
        }

        let before = self.peers.len();
        self.peers.retain(|p| {
            if p.heartbeats == 0 {
                log::info!("Relay peer expired: {}", p.addr);
                false
            } else {
                true
            }
        });
        self.stats.peers_expired += (before - self.peers.len()) as u64;

        if let Some(log) = self.packet_log.as_mut() {
            log.write(packet);
        }
        if let Some(delay) = self.publish_delay {
            std::thread::sleep(delay);
        }
        sent
    }

    pub fn peers(&self) -> &[RelayPeer] {
        &self.peers
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

/// Scripted datagram transport for tests
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MockDatagram {
    pub inbound: std::collections::VecDeque<(Vec<u8>, SocketAddr)>,
    pub sent: Vec<(Vec<u8>, SocketAddr)>,
    /// Sends to these ports fail
    pub unreachable: Vec<u16>,
}

#[cfg(test)]
impl DatagramTransport for MockDatagram {
    fn try_recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        Ok(self.inbound.pop_front().map(|(data, src)| {
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            (n, src)
        }))
    }

    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        if self.unreachable.contains(&addr.port()) {
            return Err(io::Error::new(ErrorKind::ConnectionRefused, "unreachable"));
        }
        self.sent.push((buf.to_vec(), addr));
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn session(tokens: i32) -> RelaySession<MockDatagram> {
        RelaySession::new(MockDatagram::default(), tokens).unwrap()
    }

    #[test]
    fn test_register_and_ack() {
        let mut relay = session(3);
        assert_eq!(relay.on_datagram(addr(9000), b"REQ"), Ack::Sent);

        assert_eq!(relay.peer_count(), 1);
        assert_eq!(relay.peers()[0].heartbeats, 3);
        assert_eq!(relay.transport().sent[0], (b"ACK\0".to_vec(), addr(9000)));
        assert_eq!(relay.stats().peers_connected, 1);
    }

    #[test]
    fn test_expiry_after_token_count() {
        let mut relay = session(3);
        relay.on_datagram(addr(9000), b"hi");

        let mut lengths = vec![relay.peer_count()];
        for _ in 0..3 {
            relay.broadcast(b"ping");
            lengths.push(relay.peer_count());
        }
        assert_eq!(lengths, vec![1, 1, 1, 0]);
        assert_eq!(relay.stats().peers_expired, 1);
    }

    #[test]
    fn test_heartbeat_resets_tokens() {
        let mut relay = session(2);
        relay.on_datagram(addr(9000), b"hi");
        relay.broadcast(b"p1");
        relay.on_datagram(addr(9000), b"hb");
        relay.broadcast(b"p2");
        assert_eq!(relay.peer_count(), 1);
        assert_eq!(relay.peers()[0].heartbeats, 1);
        relay.broadcast(b"p3");
        assert_eq!(relay.peer_count(), 0);
        assert_eq!(relay.stats().peers_connected, 1);
    }

    #[test]
    fn test_insertion_order() {
        let mut relay = session(5);
        for port in [9003, 9001, 9002] {
            relay.on_datagram(addr(port), b"x");
        }
        relay.on_datagram(addr(9001), b"again");
        let ports: Vec<u16> = relay.peers().iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![9003, 9001, 9002]);

        relay.broadcast(b"data");
        let targets: Vec<u16> = relay
            .transport()
            .sent
            .iter()
            .filter(|(d, _)| d == b"data")
            .map(|(_, a)| a.port())
            .collect();
        assert_eq!(targets, vec![9003, 9001, 9002]);
    }

    #[test]
    fn test_send_failure_keeps_peer() {
        let mut relay = session(3);
        relay.on_datagram(addr(9000), b"x");
        relay.on_datagram(addr(9001), b"x");
        relay.transport.unreachable.push(9001);

        assert_eq!(relay.broadcast(b"data"), 1);
        assert_eq!(relay.peer_count(), 2);
        assert_eq!(relay.stats().send_errors, 1);
        assert_eq!(relay.stats().packets_sent, 1);
    }

    #[test]
    fn test_ack_failure_still_registers() {
        let mut transport = MockDatagram::default();
        transport.unreachable.push(9000);
        let mut relay = RelaySession::new(transport, 3).unwrap();

        assert_eq!(relay.on_datagram(addr(9000), b"x"), Ack::Failed);
        assert_eq!(relay.peer_count(), 1);
        assert_eq!(relay.stats().ack_errors, 1);
    }

    #[test]
    fn test_empty_datagram_ignored() {
        let mut relay = session(3);
        assert_eq!(relay.on_datagram(addr(9000), b""), Ack::Ignored);
        assert_eq!(relay.peer_count(), 0);
        assert!(relay.transport().sent.is_empty());
    }

    #[test]
    fn test_poll_inbound_drains() {
        let mut transport = MockDatagram::default();
        transport.inbound.push_back((b"a".to_vec(), addr(9000)));
        transport.inbound.push_back((b"b".to_vec(), addr(9001)));
        let mut relay = RelaySession::new(transport, 3).unwrap();

        assert_eq!(relay.poll_inbound(), 2);
        assert_eq!(relay.peer_count(), 2);
        assert_eq!(relay.poll_inbound(), 0);
    }

    #[test]
    fn test_zero_tokens_rejected() {
        assert!(RelaySession::new(MockDatagram::default(), 0).is_err());
    }

    #[test]
    fn test_packet_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mb1.bin");
        {
            let mut relay = session(3).with_packet_log(BinaryLog::open(&path).unwrap());
            relay.broadcast(b"one");
            relay.broadcast(b"two");
        }
        assert_eq!(std::fs::read(&path).unwrap(), b"onetwo");
    }

    #[test]
    fn test_udp_socket_transport() {
        let mut server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server.set_nonblocking(true).unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();

        let mut buf = [0u8; 16];
        assert!(server.try_recv_from(&mut buf).unwrap().is_none());

        client.send_to(b"REQ", server.local_addr().unwrap()).unwrap();
        let mut relay = RelaySession::new(server, 2).unwrap();
        let mut handled = 0;
        for _ in 0..100 {
            handled += relay.poll_inbound();
            if handled > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handled, 1);

        let (n, _) = client.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ACK\0");
    }
}
