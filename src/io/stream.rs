//! Sequential byte source.
//!
//! Unlike [`Reader`](crate::io::reader::Reader), a `StreamReader` is
//! one-pass and stateful: bytes already consumed cannot be re-read. Cluster
//! decoding wraps either a plain sub-reader (uncompressed clusters) or a
//! [`crate::compress::DecoderStreamReader`] (compressed clusters) behind
//! this same contract so the blob-splitting logic in `cluster.rs` does not
//! need to know which.

use crate::endian::LittleEndianPod;
use crate::error::{Error, Result};
use crate::io::buffer::Buffer;
use crate::io::reader::{BufferReader, Reader};
use std::sync::Arc;

pub trait StreamReader {
    /// Fills `dest` completely, advancing the stream by `dest.len()` bytes.
    fn read_exact(&mut self, dest: &mut [u8]) -> Result<()>;

    /// Reads a little-endian fixed-width value and advances the stream.
    fn read_typed<T: LittleEndianPod>(&mut self) -> Result<T> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf[..T::SIZE])?;
        let mut cursor = &buf[..T::SIZE];
        Ok(T::read_le(&mut cursor)?)
    }

    /// Consumes the next `size` bytes and materializes them as a
    /// random-access [`Reader`], advancing the stream past them.
    fn sub_reader(&mut self, size: usize) -> Result<Arc<dyn Reader>> {
        let mut data = vec![0u8; size];
        self.read_exact(&mut data)?;
        Ok(Arc::new(BufferReader::new(Buffer::from_vec(data))))
    }
}

/// A [`StreamReader`] over an uncompressed sub-range of a random-access
/// [`Reader`] — used for clusters whose info byte declares "no compression".
pub struct RawStreamReader {
    reader: Arc<dyn Reader>,
    pos: usize,
}

impl RawStreamReader {
    pub fn new(reader: Arc<dyn Reader>) -> RawStreamReader {
        RawStreamReader { reader, pos: 0 }
    }
}

impl StreamReader for RawStreamReader {
    fn read_exact(&mut self, dest: &mut [u8]) -> Result<()> {
        let len = dest.len();
        if self.pos + len > self.reader.size() {
            return Err(Error::bounds(format!(
                "stream read of {len} bytes at {} exceeds reader of size {}",
                self.pos,
                self.reader.size()
            )));
        }
        self.reader.read(dest, self.pos, len)?;
        self.pos += len;
        Ok(())
    }

    fn sub_reader(&mut self, size: usize) -> Result<Arc<dyn Reader>> {
        let r = self.reader.sub_reader(self.pos, size)?;
        self.pos += size;
        Ok(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_stream_reads_sequentially() {
        let r: Arc<dyn Reader> = Arc::new(BufferReader::new(Buffer::from_vec(
            b"0123456789".to_vec(),
        )));
        let mut s = RawStreamReader::new(r);
        let mut buf = [0u8; 3];
        s.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"012");
        s.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"345");
    }

    #[test]
    fn raw_stream_sub_reader_advances() {
        let r: Arc<dyn Reader> = Arc::new(BufferReader::new(Buffer::from_vec(
            b"0123456789".to_vec(),
        )));
        let mut s = RawStreamReader::new(r);
        let blob = s.sub_reader(4).unwrap();
        let mut dest = [0u8; 4];
        blob.read(&mut dest, 0, 4).unwrap();
        assert_eq!(&dest, b"0123");

        let rest = s.sub_reader(6).unwrap();
        assert_eq!(rest.size(), 6);
    }

    #[test]
    fn raw_stream_overrun_errors() {
        let r: Arc<dyn Reader> = Arc::new(BufferReader::new(Buffer::from_vec(b"abc".to_vec())));
        let mut s = RawStreamReader::new(r);
        let mut buf = [0u8; 10];
        assert!(s.read_exact(&mut buf).is_err());
    }
}
