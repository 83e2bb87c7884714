//! Recorded capture playback

use super::ByteSource;
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Byte source over a raw capture file
///
/// The timeout is ignored: file reads never wait on a peer.
pub struct FileSource {
    reader: BufReader<File>,
    path: PathBuf,
}

impl FileSource {
    /// Open a capture file for playback
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        log::info!("Playing back capture {}", path.display());
        Ok(Self {
            reader: BufReader::new(file),
            path,
        })
    }
}

impl ByteSource for FileSource {
    fn read_with_timeout(&mut self, buffer: &mut [u8], _timeout: Duration) -> Result<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }
        loop {
            match self.reader.read(buffer) {
                Ok(0) => return Err(Error::EndOfStream),
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_playback_to_end() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[9, 8, 7]).unwrap();
        tmp.flush().unwrap();

        let mut source = FileSource::open(tmp.path()).unwrap();
        let mut buf = [0u8; 8];
        let n = source.read_with_timeout(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(&buf[..n], &[9, 8, 7]);

        let end = source.read_with_timeout(&mut buf, Duration::ZERO);
        assert!(matches!(end, Err(Error::EndOfStream)));
    }

    #[test]
    fn test_write_not_supported() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut source = FileSource::open(tmp.path()).unwrap();
        assert!(matches!(
            source.write_all(&[1]),
            Err(Error::NotSupported(_))
        ));
    }
}
