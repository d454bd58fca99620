//! Zero-copy-capable byte buffer.
//!
//! A [`Buffer`] is a view into contiguous bytes that may be backed by an
//! owned `Vec<u8>`, a memory-mapped file, or another `Buffer`. Cloning a
//! `Buffer` is cheap (it clones an `Arc` and a range); `sub_buffer` never
//! copies.

use crate::error::{Error, Result};
use std::ops::Range;
use std::sync::Arc;

/// Backing storage for a [`Buffer`]. Anything that can hand out a stable
/// `&[u8]` qualifies — an owned `Vec<u8>` or a `memmap2::Mmap`.
pub trait Storage: Send + Sync {
    fn bytes(&self) -> &[u8];
}

impl Storage for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }
}

impl Storage for memmap2::Mmap {
    fn bytes(&self) -> &[u8] {
        self
    }
}

#[derive(Clone)]
pub struct Buffer {
    storage: Arc<dyn Storage>,
    range: Range<usize>,
}

impl Buffer {
    pub fn from_storage(storage: Arc<dyn Storage>) -> Buffer {
        let len = storage.bytes().len();
        Buffer {
            storage,
            range: 0..len,
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Buffer {
        Buffer::from_storage(Arc::new(data))
    }

    /// The bytes this buffer covers.
    pub fn data(&self) -> &[u8] {
        &self.storage.bytes()[self.range.clone()]
    }

    pub fn size(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// A zero-copy view into this buffer.
    pub fn sub_buffer(&self, offset: usize, size: usize) -> Result<Buffer> {
        if offset + size > self.size() {
            return Err(Error::bounds(format!(
                "sub_buffer({offset}, {size}) exceeds buffer of size {}",
                self.size()
            )));
        }
        Ok(Buffer {
            storage: Arc::clone(&self.storage),
            range: (self.range.start + offset)..(self.range.start + offset + size),
        })
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer").field("size", &self.size()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_buffer_is_zero_copy_view() {
        let buf = Buffer::from_vec(b"hello world".to_vec());
        let sub = buf.sub_buffer(6, 5).unwrap();
        assert_eq!(sub.data(), b"world");
    }

    #[test]
    fn sub_buffer_out_of_range_errors() {
        let buf = Buffer::from_vec(b"short".to_vec());
        assert!(buf.sub_buffer(3, 10).is_err());
    }
}
