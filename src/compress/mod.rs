//! Compression codecs.
//!
//! Both backends are driven through the same three-state contract the
//! on-disk format implies: a chunk of upstream bytes is fed in, and the
//! decoder either wants [`DriverStatus::NeedMore`] input, has produced all
//! requested output ([`DriverStatus::Ok`]), or has reached the end of the
//! compressed stream ([`DriverStatus::StreamEnd`]). `xz2` and `zstd` expose
//! this as ordinary `std::io::Read`/`Write` adapters, so the driver below is
//! a thin bookkeeping layer over them rather than a hand-rolled inflate
//! loop.

mod lzma;
mod zstd_codec;

use crate::error::{Error, Result};
use crate::io::reader::Reader;
use crate::io::stream::StreamReader;
use std::io::Read;
use std::sync::Arc;

/// The compression code stored in a cluster's info byte (low nibble).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionCode {
    /// Codes 0 and 1 are both "no compression" on read for backward
    /// compatibility with older archives; 0 is a distinct "default" sentinel
    /// the writer never emits, so `to_nibble` maps this variant to 1.
    None,
    Lzma,
    Zstd,
}

impl CompressionCode {
    pub fn from_nibble(nibble: u8) -> Result<CompressionCode> {
        match nibble {
            0 | 1 => Ok(CompressionCode::None),
            4 => Ok(CompressionCode::Lzma),
            5 => Ok(CompressionCode::Zstd),
            2 | 3 => Err(Error::format(format!(
                "cluster uses legacy compression code {nibble} (zlib/bzip2), not supported"
            ))),
            other => Err(Error::format(format!("unknown compression code {other}"))),
        }
    }

    pub fn to_nibble(self) -> u8 {
        match self {
            CompressionCode::None => 1,
            CompressionCode::Lzma => 4,
            CompressionCode::Zstd => 5,
        }
    }
}

/// Result of one step of the push/pull driver: mirrors the
/// NEED_MORE/OK/STREAM_END contract without exposing it directly, since
/// Rust's `Read` adapters fold "need more input" into their own buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    NeedMore,
    Ok,
    StreamEnd,
}

/// Adapts a random-access [`Reader`]'s tail into a [`Read`] stream, pulling
/// fixed 1 KiB chunks on demand. Bytes past the end of the compressed
/// stream (the next cluster, or archive trailer) are simply never read.
pub(crate) struct ChunkedUpstream {
    reader: Arc<dyn Reader>,
    pos: usize,
}

const CHUNK_SIZE: usize = 1024;

impl ChunkedUpstream {
    fn new(reader: Arc<dyn Reader>) -> ChunkedUpstream {
        ChunkedUpstream { reader, pos: 0 }
    }
}

impl Read for ChunkedUpstream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.reader.size().saturating_sub(self.pos);
        if remaining == 0 {
            return Ok(0);
        }
        let len = buf.len().min(CHUNK_SIZE).min(remaining);
        self.reader
            .read(&mut buf[..len], self.pos, len)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        self.pos += len;
        Ok(len)
    }
}

/// A [`StreamReader`] fed by a decompression backend, used for cluster
/// tails whose info byte declares LZMA or Zstd.
pub struct DecoderStreamReader {
    inner: Box<dyn Read + Send>,
}

impl DecoderStreamReader {
    pub fn new(code: CompressionCode, upstream: Arc<dyn Reader>) -> Result<DecoderStreamReader> {
        let chunked = ChunkedUpstream::new(upstream);
        let inner: Box<dyn Read + Send> = match code {
            CompressionCode::None => {
                return Err(Error::invalid_state(
                    "DecoderStreamReader requires a compressed code",
                ))
            }
            CompressionCode::Lzma => Box::new(lzma::decoder(chunked)),
            CompressionCode::Zstd => Box::new(zstd_codec::decoder(chunked)?),
        };
        Ok(DecoderStreamReader { inner })
    }
}

impl StreamReader for DecoderStreamReader {
    fn read_exact(&mut self, dest: &mut [u8]) -> Result<()> {
        self.inner.read_exact(dest).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::decode("compressed stream ended before expected bytes were produced")
            } else {
                Error::decode(format!("decompression failed: {e}"))
            }
        })
    }
}

/// Compression level, applied only on the write path. `0`
/// selects the backend's fastest preset, `9` its strongest; `5` is a
/// balanced default.
#[derive(Debug, Clone, Copy)]
pub enum Level {
    Fast,
    Balanced,
    Best,
}

impl Level {
    fn lzma_preset(self) -> u32 {
        match self {
            Level::Fast => 0,
            Level::Balanced => 5,
            Level::Best => 9,
        }
    }

    fn zstd_level(self) -> i32 {
        match self {
            Level::Fast => 3,
            Level::Balanced => 12,
            Level::Best => 19,
        }
    }
}

/// Wraps `writer` so every byte written through it is compressed with
/// `code` before hitting the sink. `code` must not be `None`.
pub fn encoder<W: std::io::Write + 'static>(
    code: CompressionCode,
    writer: W,
    level: Level,
) -> Result<Box<dyn std::io::Write>> {
    match code {
        CompressionCode::None => Err(Error::invalid_state("cannot build an encoder for code None")),
        CompressionCode::Lzma => Ok(Box::new(lzma::encoder(writer, level.lzma_preset()))),
        CompressionCode::Zstd => Ok(Box::new(zstd_codec::encoder(writer, level.zstd_level())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_code_mapping() {
        assert_eq!(CompressionCode::from_nibble(0).unwrap(), CompressionCode::None);
        assert_eq!(CompressionCode::from_nibble(1).unwrap(), CompressionCode::None);
        assert_eq!(CompressionCode::from_nibble(4).unwrap(), CompressionCode::Lzma);
        assert_eq!(CompressionCode::from_nibble(5).unwrap(), CompressionCode::Zstd);
        assert!(CompressionCode::from_nibble(2).is_err());
        assert!(CompressionCode::from_nibble(3).is_err());
        assert!(CompressionCode::from_nibble(9).is_err());
        assert_eq!(CompressionCode::None.to_nibble(), 1);
    }
}
