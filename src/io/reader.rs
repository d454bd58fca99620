//! Uniform random-access reader abstraction.

use crate::endian::LittleEndianPod;
use crate::error::{Error, Result};
use crate::io::buffer::Buffer;
use std::sync::Arc;

/// A random-access byte source: an in-memory buffer, a (possibly
/// multi-part) file, or a sub-range of either.
///
/// Trait methods are deliberately non-generic so `Reader` stays object-safe
/// (`Arc<dyn Reader>`); the typed `read_at::<T>` helper below is a free
/// function instead of a trait method for that reason.
pub trait Reader: Send + Sync {
    fn size(&self) -> usize;

    /// Reads exactly `len` bytes at `offset` into `dest`. All-or-fail: a
    /// read that would run past the end of the reader returns
    /// [`Error::Bounds`] without partially filling `dest`.
    fn read(&self, dest: &mut [u8], offset: usize, len: usize) -> Result<()>;

    /// A zero-copy view when backed by a buffer; otherwise falls back to a
    /// materialized copy.
    fn get_buffer(&self, offset: usize, len: usize) -> Result<Buffer>;

    /// Carves out a sub-reader over `[offset, offset+len)`.
    fn sub_reader(&self, offset: usize, len: usize) -> Result<Arc<dyn Reader>>;
}

fn check_bounds(size: usize, offset: usize, len: usize) -> Result<()> {
    if offset.checked_add(len).map(|end| end > size).unwrap_or(true) {
        return Err(Error::bounds(format!(
            "read [{offset}, {offset}+{len}) beyond reader of size {size}"
        )));
    }
    Ok(())
}

/// Reads a little-endian fixed-width integer at `offset`.
pub fn read_at<T: LittleEndianPod>(reader: &dyn Reader, offset: usize) -> Result<T> {
    check_bounds(reader.size(), offset, T::SIZE)?;
    let mut buf = [0u8; 8];
    reader.read(&mut buf[..T::SIZE], offset, T::SIZE)?;
    let mut cursor = &buf[..T::SIZE];
    Ok(T::read_le(&mut cursor)?)
}

/// Reads a NUL-terminated string starting at `offset`, returning the string
/// and the offset just past the terminator.
pub fn read_cstring(reader: &dyn Reader, offset: usize) -> Result<(String, usize)> {
    let remaining = reader.size().saturating_sub(offset);
    let chunk = reader.get_buffer(offset, remaining)?;
    let bytes = chunk.data();
    let nul = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::format("unterminated string in archive"))?;
    let s = String::from_utf8(bytes[..nul].to_vec())?;
    Ok((s, offset + nul + 1))
}

/// A [`Reader`] over an in-memory (or memory-mapped) [`Buffer`].
///
/// Plays the role of both a plain buffer reader and an mmap reader:
/// `Buffer` already abstracts over owned vs. mmap-backed storage, so a
/// buffer-backed reader is zero-copy whenever the underlying buffer is.
pub struct BufferReader {
    buffer: Buffer,
}

impl BufferReader {
    pub fn new(buffer: Buffer) -> BufferReader {
        BufferReader { buffer }
    }
}

impl Reader for BufferReader {
    fn size(&self) -> usize {
        self.buffer.size()
    }

    fn read(&self, dest: &mut [u8], offset: usize, len: usize) -> Result<()> {
        check_bounds(self.size(), offset, len)?;
        dest[..len].copy_from_slice(&self.buffer.data()[offset..offset + len]);
        Ok(())
    }

    fn get_buffer(&self, offset: usize, len: usize) -> Result<Buffer> {
        self.buffer.sub_buffer(offset, len)
    }

    fn sub_reader(&self, offset: usize, len: usize) -> Result<Arc<dyn Reader>> {
        let sub = self.buffer.sub_buffer(offset, len)?;
        Ok(Arc::new(BufferReader::new(sub)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(data: &[u8]) -> BufferReader {
        BufferReader::new(Buffer::from_vec(data.to_vec()))
    }

    #[test]
    fn reads_typed_values() {
        let r = reader(&[0x01, 0x00, 0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(read_at::<u16>(&r, 0).unwrap(), 1u16);
        assert_eq!(read_at::<u32>(&r, 2).unwrap(), 0xdead_beefu32);
    }

    #[test]
    fn read_beyond_end_errors() {
        let r = reader(&[1, 2, 3]);
        assert!(read_at::<u32>(&r, 0).is_err());
        let mut dest = [0u8; 10];
        assert!(r.read(&mut dest, 0, 10).is_err());
    }

    #[test]
    fn cstring_reads_up_to_nul() {
        let r = reader(b"hello\0world\0");
        let (s, next) = read_cstring(&r, 0).unwrap();
        assert_eq!(s, "hello");
        assert_eq!(next, 6);
        let (s2, _) = read_cstring(&r, next).unwrap();
        assert_eq!(s2, "world");
    }

    #[test]
    fn sub_reader_is_scoped() {
        let r = reader(b"0123456789");
        let sub = r.sub_reader(3, 4).unwrap();
        assert_eq!(sub.size(), 4);
        let mut dest = [0u8; 4];
        sub.read(&mut dest, 0, 4).unwrap();
        assert_eq!(&dest, b"3456");
    }
}
