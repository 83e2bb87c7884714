//! TCP byte source for a live sonar center

use super::ByteSource;
use crate::error::{Error, Result};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Sockets reject a zero read timeout, so clamp to this
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Connected TCP stream to the sonar center
pub struct TcpSource {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpSource {
    /// Connect to `address` ("host:port"), trying each resolved address
    ///
    /// # Arguments
    /// * `address` - Sonar center address (e.g., "192.168.1.10:7000")
    /// * `timeout` - Per-attempt connect timeout
    pub fn connect(address: &str, timeout: Duration) -> Result<Self> {
        let mut last_err = None;
        for addr in address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    log::info!("Connected to sonar center at {}", addr);
                    return Ok(Self { stream, peer: addr });
                }
                Err(e) => {
                    log::debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(match last_err {
            Some(e) => e.into(),
            None => Error::InvalidParameter(format!("address {} did not resolve", address)),
        })
    }

    /// Remote address of the stream
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl ByteSource for TcpSource {
    fn read_with_timeout(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }
        self.stream
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;
        match self.stream.read(buffer) {
            Ok(0) => Err(Error::TransportClosed),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(Error::Timeout)
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => Err(Error::Timeout),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::BrokenPipe
                        | ErrorKind::UnexpectedEof
                ) =>
            {
                Err(Error::TransportClosed)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self.stream.write_all(data) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(Error::TransportClosed),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_read_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(&[1, 2, 3]).unwrap();
        });

        let mut source = TcpSource::connect(&addr.to_string(), Duration::from_secs(1)).unwrap();
        server.join().unwrap();

        let mut buf = [0u8; 3];
        let mut got = 0;
        while got < 3 {
            got += source
                .read_with_timeout(&mut buf[got..], Duration::from_millis(500))
                .unwrap();
        }
        assert_eq!(buf, [1, 2, 3]);

        let result = source.read_with_timeout(&mut buf, Duration::from_millis(500));
        assert!(matches!(result, Err(Error::TransportClosed)));
    }

    #[test]
    fn test_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut source = TcpSource::connect(&addr.to_string(), Duration::from_secs(1)).unwrap();
        let _conn = listener.accept().unwrap();

        let mut buf = [0u8; 4];
        let result = source.read_with_timeout(&mut buf, Duration::from_millis(20));
        assert!(matches!(result, Err(Error::Timeout)));
    }
}
