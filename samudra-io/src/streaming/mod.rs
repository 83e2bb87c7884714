//! Outbound streaming: MB1 packets and the datagram relay

pub mod mb1;
pub mod relay;

pub use mb1::{Beam, Ping};
pub use relay::{Ack, DatagramTransport, RelayPeer, RelaySession, RelayStats, ACK_PAYLOAD};
