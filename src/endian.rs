//! Fixed-width little-endian primitive reads and writes.
//!
//! The ZIM format is little-endian throughout. Every on-disk integer field
//! is read and written through these helpers so the byte order is never
//! left to the platform.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// A fixed-width integer that can be read from and written to a
/// little-endian byte stream.
pub trait LittleEndianPod: Sized + Copy {
    fn read_le<R: Read>(r: &mut R) -> io::Result<Self>;
    fn write_le<W: Write>(&self, w: &mut W) -> io::Result<()>;
    const SIZE: usize;
}

macro_rules! impl_pod {
    ($t:ty, $read:ident, $write:ident, $size:expr) => {
        impl LittleEndianPod for $t {
            fn read_le<R: Read>(r: &mut R) -> io::Result<Self> {
                r.$read::<LittleEndian>()
            }
            fn write_le<W: Write>(&self, w: &mut W) -> io::Result<()> {
                w.$write::<LittleEndian>(*self)
            }
            const SIZE: usize = $size;
        }
    };
}

impl_pod!(u16, read_u16, write_u16, 2);
impl_pod!(u32, read_u32, write_u32, 4);
impl_pod!(u64, read_u64, write_u64, 8);

impl LittleEndianPod for u8 {
    fn read_le<R: Read>(r: &mut R) -> io::Result<Self> {
        r.read_u8()
    }
    fn write_le<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(*self)
    }
    const SIZE: usize = 1;
}

/// Read a `T` out of a byte slice at `offset`, little-endian.
///
/// Panics (via slicing) if the slice is too short; callers are expected to
/// have already bounds-checked via [`crate::io::reader::Reader`].
pub fn read_at<T: LittleEndianPod>(bytes: &[u8], offset: usize) -> io::Result<T> {
    let mut cursor = &bytes[offset..offset + T::SIZE];
    T::read_le(&mut cursor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_u16_u32_u64() {
        let mut buf = Vec::new();
        42u16.write_le(&mut buf).unwrap();
        0xdead_beefu32.write_le(&mut buf).unwrap();
        0x0102_0304_0506_0708u64.write_le(&mut buf).unwrap();

        assert_eq!(read_at::<u16>(&buf, 0).unwrap(), 42u16);
        assert_eq!(read_at::<u32>(&buf, 2).unwrap(), 0xdead_beefu32);
        assert_eq!(read_at::<u64>(&buf, 6).unwrap(), 0x0102_0304_0506_0708u64);
    }

    #[test]
    fn little_endian_byte_order() {
        let mut buf = Vec::new();
        0x0102_0304u32.write_le(&mut buf).unwrap();
        assert_eq!(buf, vec![0x04, 0x03, 0x02, 0x01]);
    }
}
