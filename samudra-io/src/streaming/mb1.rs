//! MB1 sounding packet
//!
//! Fixed binary format sent to relay subscribers, one packet per ping.
//!
//! ```text
//! Header (56 bytes)
//! ┌─────────┬──────┬──────┬─────┬─────┬───────┬─────────┬──────┬────────┐
//! │ "MB1\0" │ size │ time │ lat │ lon │ depth │ heading │ ping │ nbeams │
//! │ 4       │ u32  │ f64  │ f64 │ f64 │ f64   │ f64     │ u32  │ u32    │
//! └─────────┴──────┴──────┴─────┴─────┴───────┴─────────┴──────┴────────┘
//! Beam (28 bytes) × nbeams
//! ┌───────┬─────────────┬──────────────┬───────┐
//! │ index │ along-track │ across-track │ depth │
//! │ u32   │ f64         │ f64          │ f64   │
//! └───────┴─────────────┴──────────────┴───────┘
//! Trailer: u32 additive checksum over every preceding byte
//! ```
//!
//! Little-endian throughout. `size` is the whole packet including trailer.

use crate::error::{Error, Result};
use crate::protocol::record::checksum;

/// Type tag at the start of every packet
pub const MB1_TAG: [u8; 4] = *b"MB1\0";

pub const MB1_HEADER_SIZE: usize = 56;
pub const MB1_BEAM_SIZE: usize = 28;
pub const MB1_CHECKSUM_SIZE: usize = 4;

/// Most beams a packet may carry
pub const MB1_MAX_BEAMS: usize = 512;

/// One retained beam
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Beam {
    pub index: u32,
    /// Meters, positive forward
    pub along_track: f64,
    /// Meters, positive starboard
    pub across_track: f64,
    /// Meters below the sonar
    pub depth: f64,
}

/// One processed sounding
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ping {
    /// Epoch seconds
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub sonar_depth: f64,
    /// Radians
    pub heading: f64,
    pub ping_number: u32,
    pub beams: Vec<Beam>,
}

/// Packet length for `nbeams` beams
#[inline]
pub const fn packet_len(nbeams: usize) -> usize {
    MB1_HEADER_SIZE + nbeams * MB1_BEAM_SIZE + MB1_CHECKSUM_SIZE
}

/// Serialize a ping into a new packet
pub fn encode(ping: &Ping) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(packet_len(ping.beams.len()));
    encode_into(ping, &mut out)?;
    Ok(out)
}

/// Serialize a ping into `out`, replacing its contents
///
/// Lets a caller reuse one allocation across pings. Pings with more than
/// [`MB1_MAX_BEAMS`] beams are rejected and `out` is left untouched.
pub fn encode_into(ping: &Ping, out: &mut Vec<u8>) -> Result<()> {
    if ping.beams.len() > MB1_MAX_BEAMS {
        return Err(Error::InvalidParameter(format!(
            "MB1 ping {} has {} beams, limit is {}",
            ping.ping_number,
            ping.beams.len(),
            MB1_MAX_BEAMS
        )));
    }
    out.clear();
    out.reserve(packet_len(ping.beams.len()));

    out.extend_from_slice(&MB1_TAG);
    out.extend_from_slice(&(packet_len(ping.beams.len()) as u32).to_le_bytes());
    for v in [
        ping.timestamp,
        ping.latitude,
        ping.longitude,
        ping.sonar_depth,
        ping.heading,
    ] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&ping.ping_number.to_le_bytes());
    out.extend_from_slice(&(ping.beams.len() as u32).to_le_bytes());

    for beam in &ping.beams {
        out.extend_from_slice(&beam.index.to_le_bytes());
        out.extend_from_slice(&beam.along_track.to_le_bytes());
        out.extend_from_slice(&beam.across_track.to_le_bytes());
        out.extend_from_slice(&beam.depth.to_le_bytes());
    }

    let sum = checksum(out);
    out.extend_from_slice(&sum.to_le_bytes());
    Ok(())
}

/// Checksum carried in a packet's trailer
pub fn trailer_checksum(packet: &[u8]) -> Option<u32> {
    let start = packet.len().checked_sub(MB1_CHECKSUM_SIZE)?;
    let t = &packet[start..];
    Some(u32::from_le_bytes([t[0], t[1], t[2], t[3]]))
}

/// Parse and validate a complete packet
///
/// Checks, in order: type tag, beam count limit, declared and actual size,
/// checksum.
pub fn decode(packet: &[u8]) -> Result<Ping> {
    if packet.len() < packet_len(0) {
        return Err(Error::InvalidPacket(format!(
            "MB1 packet too short: {} bytes",
            packet.len()
        )));
    }
    if packet[..4] != MB1_TAG {
        return Err(Error::InvalidPacket("MB1 type tag mismatch".to_string()));
    }

    let mut cursor = Cursor::new(&packet[4..]);
    let size = cursor.u32() as usize;
    let timestamp = cursor.f64();
    let latitude = cursor.f64();
    let longitude = cursor.f64();
    let sonar_depth = cursor.f64();
    let heading = cursor.f64();
    let ping_number = cursor.u32();
    let nbeams = cursor.u32() as usize;

    if nbeams > MB1_MAX_BEAMS {
        return Err(Error::InvalidPacket(format!(
            "MB1 beam count {} exceeds {}",
            nbeams, MB1_MAX_BEAMS
        )));
    }
    if size != packet_len(nbeams) || packet.len() != size {
        return Err(Error::InvalidPacket(format!(
            "MB1 size mismatch: declared {}, {} beams need {}, got {}",
            size,
            nbeams,
            packet_len(nbeams),
            packet.len()
        )));
    }

    let split = size - MB1_CHECKSUM_SIZE;
    let computed = checksum(&packet[..split]);
    let carried = trailer_checksum(packet).unwrap_or(0);
    if computed != carried {
        return Err(Error::ChecksumError {
            expected: carried,
            actual: computed,
        });
    }

    let beams = (0..nbeams)
        .map(|_| Beam {
            index: cursor.u32(),
            along_track: cursor.f64(),
            across_track: cursor.f64(),
            depth: cursor.f64(),
        })
        .collect();

    Ok(Ping {
        timestamp,
        latitude,
        longitude,
        sonar_depth,
        heading,
        ping_number,
        beams,
    })
}

/// Little-endian reader over a slice already checked for length
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn f64(&mut self) -> f64 {
        f64::from_le_bytes(self.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ping(nbeams: u32) -> Ping {
        Ping {
            timestamp: 1_700_000_000.25,
            latitude: 36.8024,
            longitude: -121.7881,
            sonar_depth: 12.5,
            heading: 1.5708,
            ping_number: 4242,
            beams: (0..nbeams)
                .map(|i| Beam {
                    index: i * 2,
                    along_track: f64::from(i) * 0.1,
                    across_track: -10.0 + f64::from(i),
                    depth: 100.0 + f64::from(i) * 0.5,
                })
                .collect(),
        }
    }

    #[test]
    fn test_layout() {
        let packet = encode(&sample_ping(3)).unwrap();
        assert_eq!(packet.len(), 56 + 3 * 28 + 4);
        assert_eq!(&packet[..4], b"MB1\0");
        assert_eq!(&packet[4..8], &(packet.len() as u32).to_le_bytes());
        assert_eq!(&packet[48..52], &4242u32.to_le_bytes());
        assert_eq!(&packet[52..56], &3u32.to_le_bytes());
        // First beam index
        assert_eq!(&packet[56..60], &0u32.to_le_bytes());
    }

    #[test]
    fn test_round_trip() {
        for n in [0, 1, 64] {
            let ping = sample_ping(n);
            let packet = encode(&ping).unwrap();
            assert_eq!(decode(&packet).unwrap(), ping);
        }
    }

    #[test]
    fn test_checksum_trailer() {
        let packet = encode(&sample_ping(5)).unwrap();
        let body = &packet[..packet.len() - MB1_CHECKSUM_SIZE];
        assert_eq!(trailer_checksum(&packet), Some(checksum(body)));
    }

    #[test]
    fn test_encode_into_reuses_buffer() {
        let mut buf = Vec::new();
        encode_into(&sample_ping(10), &mut buf).unwrap();
        let cap = buf.capacity();
        encode_into(&sample_ping(2), &mut buf).unwrap();
        assert_eq!(buf.len(), packet_len(2));
        assert_eq!(buf.capacity(), cap);
        assert_eq!(buf, encode(&sample_ping(2)).unwrap());
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let mut packet = encode(&sample_ping(2)).unwrap();
        packet[20] ^= 0x40;
        assert!(matches!(
            decode(&packet),
            Err(Error::ChecksumError { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_tag() {
        let mut packet = encode(&sample_ping(1)).unwrap();
        packet[0] = b'X';
        assert!(matches!(decode(&packet), Err(Error::InvalidPacket(_))));
    }

    #[test]
    fn test_decode_rejects_size_mismatch() {
        let packet = encode(&sample_ping(2)).unwrap();
        assert!(decode(&packet[..packet.len() - 1]).is_err());

        let mut longer = packet.clone();
        longer.push(0);
        assert!(decode(&longer).is_err());
    }

    #[test]
    fn test_decode_rejects_too_many_beams() {
        let mut packet = encode(&sample_ping(0)).unwrap();
        packet[52..56].copy_from_slice(&((MB1_MAX_BEAMS + 1) as u32).to_le_bytes());
        assert!(matches!(decode(&packet), Err(Error::InvalidPacket(_))));
    }

    #[test]
    fn test_beam_limit() {
        let full = sample_ping(MB1_MAX_BEAMS as u32);
        let packet = encode(&full).unwrap();
        assert_eq!(packet.len(), packet_len(MB1_MAX_BEAMS));
        assert_eq!(decode(&packet).unwrap(), full);

        let over = sample_ping(MB1_MAX_BEAMS as u32 + 1);
        assert!(matches!(encode(&over), Err(Error::InvalidParameter(_))));

        // Buffer keeps the previous packet on rejection
        let mut buf = packet.clone();
        assert!(encode_into(&over, &mut buf).is_err());
        assert_eq!(buf, packet);
    }
}
