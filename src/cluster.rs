//! Cluster read/write: variable-size compressed groupings of blobs.
//!
//! A cluster bundles several blobs (article bodies) behind one shared
//! compressor. On the read side blobs are sub-readered out lazily and
//! cached per cluster since the decompression stream is one-pass; on the
//! write side blobs accumulate until the cluster is closed, at which point
//! the offset table width (32- vs 64-bit) is decided from the total
//! payload size.

use crate::compress::{CompressionCode, DecoderStreamReader, Level};
use crate::error::{Error, Result};
use crate::io::reader::{read_at, BufferReader, Reader};
use crate::io::stream::{RawStreamReader, StreamReader};
use bitreader::BitReader;
use std::sync::{Arc, Mutex};

/// Decodes a cluster's leading info byte: low nibble is the compression
/// code, bit 4 is the "extended" (64-bit offsets) flag.
fn parse_info_byte(byte: u8) -> Result<(bool, CompressionCode)> {
    let mut reader = BitReader::new(std::slice::from_ref(&byte));
    reader.skip(3)?;
    let extended = reader.read_bool()?;
    let code = reader.read_u8(4)?;
    Ok((extended, CompressionCode::from_nibble(code)?))
}

fn offset_size(extended: bool) -> usize {
    if extended {
        8
    } else {
        4
    }
}

/// A cluster opened for reading. Blobs are materialized lazily: the first
/// call to [`Cluster::blob`] for index *n* drives the decoder stream
/// through every blob before it, then every subsequent call for a smaller
/// or equal index is served from the cache.
pub struct Cluster {
    extended: bool,
    code: CompressionCode,
    offsets: Vec<u64>,
    state: Mutex<ClusterState>,
}

enum ClusterState {
    /// Not yet touched: holds the stream used to pull blobs in order.
    Fresh(Box<dyn StreamReader + Send>),
    /// Blobs `< cached.len()` have been pulled and cached; `stream` is
    /// `None` once every blob has been read (stream exhausted).
    Streaming {
        stream: Box<dyn StreamReader + Send>,
        cached: Vec<Arc<dyn Reader>>,
    },
    Done { cached: Vec<Arc<dyn Reader>> },
}

impl Cluster {
    /// Opens the cluster whose bytes start at absolute offset `start` and
    /// (if known) end at `end` within `archive`.
    pub fn open(archive: &dyn Reader, start: usize, end: usize) -> Result<Cluster> {
        let info_byte: u8 = read_at(archive, start)?;
        let (extended, code) = parse_info_byte(info_byte)?;
        let body = archive.sub_reader(start + 1, end - start - 1)?;

        let mut stream: Box<dyn StreamReader + Send> = match code {
            CompressionCode::None => Box::new(RawStreamReader::new(body)),
            compressed => Box::new(DecoderStreamReader::new(compressed, body)?),
        };

        let osize = offset_size(extended);
        let first_offset = read_offset(stream.as_mut(), extended)?;
        let blob_count = (first_offset as usize) / osize - 1;

        let mut offsets = Vec::with_capacity(blob_count + 1);
        offsets.push(first_offset);
        let mut prev = first_offset;
        for _ in 0..blob_count {
            let off = read_offset(stream.as_mut(), extended)?;
            if off < prev {
                return Err(Error::format("cluster offsets table is not non-decreasing"));
            }
            prev = off;
            offsets.push(off);
        }

        Ok(Cluster {
            extended,
            code,
            offsets,
            state: Mutex::new(ClusterState::Fresh(stream)),
        })
    }

    pub fn blob_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Returns a reader over blob `idx`'s decompressed bytes, advancing the
    /// shared decoder stream through any unread earlier blobs first.
    pub fn blob(&self, idx: usize) -> Result<Arc<dyn Reader>> {
        if idx >= self.blob_count() {
            return Err(Error::bounds(format!(
                "blob {idx} out of range for cluster with {} blobs",
                self.blob_count()
            )));
        }

        let mut guard = self.state.lock().unwrap();
        loop {
            match &*guard {
                ClusterState::Done { cached } => return Ok(Arc::clone(&cached[idx])),
                ClusterState::Streaming { cached, .. } if idx < cached.len() => {
                    return Ok(Arc::clone(&cached[idx]));
                }
                _ => {}
            }

            let state = std::mem::replace(&mut *guard, ClusterState::Done { cached: Vec::new() });
            let (mut stream, mut cached) = match state {
                ClusterState::Fresh(stream) => (stream, Vec::new()),
                ClusterState::Streaming { stream, cached } => (stream, cached),
                ClusterState::Done { cached } => {
                    *guard = ClusterState::Done { cached };
                    continue;
                }
            };

            let next = cached.len();
            let size = (self.offsets[next + 1] - self.offsets[next]) as usize;
            let blob = stream.sub_reader(size)?;
            cached.push(blob);

            *guard = if cached.len() == self.blob_count() {
                ClusterState::Done { cached }
            } else {
                ClusterState::Streaming { stream, cached }
            };
        }
    }

    /// Offsets-table bytes plus, for compressed clusters, half the
    /// uncompressed payload size — stable for the cluster's lifetime once
    /// computed.
    pub fn memory_cost(&self) -> usize {
        let table = self.offsets.len() * offset_size(self.extended);
        if self.code == CompressionCode::None {
            return table;
        }
        let payload = *self.offsets.last().unwrap_or(&0) as usize;
        table + payload / 2
    }
}

fn read_offset(stream: &mut dyn StreamReader, extended: bool) -> Result<u64> {
    if extended {
        stream.read_typed::<u64>()
    } else {
        stream.read_typed::<u32>().map(u64::from)
    }
}

/// A single blob awaiting compression/emission on the write side.
pub trait BlobProvider: Send {
    /// Total size this provider will produce; must match the sum of bytes
    /// returned from [`BlobProvider::feed`] exactly, or cluster closing
    /// fails with [`Error::IncoherentImplementation`].
    fn size(&self) -> u64;

    /// Returns the next chunk of bytes, or an empty vec once exhausted.
    fn feed(&mut self) -> Result<Vec<u8>>;
}

impl BlobProvider for Vec<u8> {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn feed(&mut self) -> Result<Vec<u8>> {
        Ok(std::mem::take(self))
    }
}

/// Accumulates blob providers and emits a complete cluster image on close.
pub struct ClusterWriter {
    blobs: Vec<Box<dyn BlobProvider>>,
    code: CompressionCode,
    level: Level,
}

impl ClusterWriter {
    /// Builds a writer at the codec's default level: `Level::Best` (Zstd
    /// 19, matching the on-disk format's conventional default; LZMA 9 if
    /// `code` is switched to Lzma).
    pub fn new(code: CompressionCode) -> ClusterWriter {
        ClusterWriter::with_level(code, Level::Best)
    }

    pub fn with_level(code: CompressionCode, level: Level) -> ClusterWriter {
        ClusterWriter { blobs: Vec::new(), code, level }
    }

    pub fn push(&mut self, provider: Box<dyn BlobProvider>) {
        self.blobs.push(provider);
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    pub fn payload_size(&self) -> u64 {
        self.blobs.iter().map(|b| b.size()).sum()
    }

    /// Serializes the info byte, offset table, and payload into one
    /// contiguous buffer, compressing the payload if `code` is not `None`.
    pub fn close(mut self) -> Result<Vec<u8>> {
        let total: u64 = self.payload_size();
        let extended = total > u32::MAX as u64;
        let osize = offset_size(extended) as u64;

        let mut payload = Vec::with_capacity(total as usize);
        let mut offsets = Vec::with_capacity(self.blobs.len() + 1);
        let mut running = (self.blobs.len() as u64 + 1) * osize;
        offsets.push(running);
        for provider in &mut self.blobs {
            let declared = provider.size();
            let mut produced = 0u64;
            loop {
                let chunk = provider.feed()?;
                if chunk.is_empty() {
                    break;
                }
                produced += chunk.len() as u64;
                payload.extend_from_slice(&chunk);
            }
            if produced != declared {
                return Err(Error::IncoherentImplementation { declared, actual: produced });
            }
            running += declared;
            offsets.push(running);
        }

        let mut out = Vec::with_capacity(1 + offsets.len() as usize * 8 + payload.len());
        let info_byte = (if extended { 0x10 } else { 0 }) | self.code.to_nibble();
        out.push(info_byte);
        for off in &offsets {
            if extended {
                out.extend_from_slice(&off.to_le_bytes());
            } else {
                out.extend_from_slice(&(*off as u32).to_le_bytes());
            }
        }

        if self.code == CompressionCode::None {
            out.extend_from_slice(&payload);
        } else {
            let mut compressed = Vec::new();
            {
                let mut encoder = crate::compress::encoder(self.code, &mut compressed, self.level)?;
                std::io::Write::write_all(&mut encoder, &payload)?;
            }
            out.truncate(1);
            out.extend_from_slice(&compressed);
        }

        Ok(out)
    }
}

/// Wraps an owned `Vec<u8>` of already-concatenated cluster bytes (as
/// produced by [`ClusterWriter::close`]) so it can be reopened with
/// [`Cluster::open`] in tests without going through a file.
pub fn reader_over(bytes: Vec<u8>) -> Arc<dyn Reader> {
    Arc::new(BufferReader::new(crate::io::buffer::Buffer::from_vec(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(code: CompressionCode, blobs: &[&[u8]]) -> Vec<u8> {
        let mut writer = ClusterWriter::new(code);
        for b in blobs {
            writer.push(Box::new(b.to_vec()));
        }
        writer.close().unwrap()
    }

    #[test]
    fn uncompressed_round_trip_preserves_blobs() {
        let bytes = build(CompressionCode::None, &[b"hello", b"world!", b""]);
        let archive = reader_over(bytes);
        let cluster = Cluster::open(archive.as_ref(), 0, archive.size()).unwrap();
        assert_eq!(cluster.blob_count(), 3);

        let mut dest = vec![0u8; 5];
        cluster.blob(0).unwrap().read(&mut dest, 0, 5).unwrap();
        assert_eq!(&dest, b"hello");

        let mut dest = vec![0u8; 6];
        cluster.blob(1).unwrap().read(&mut dest, 0, 6).unwrap();
        assert_eq!(&dest, b"world!");

        assert_eq!(cluster.blob(2).unwrap().size(), 0);
    }

    #[test]
    fn out_of_order_blob_access_still_works() {
        let bytes = build(CompressionCode::None, &[b"aaa", b"bb", b"c"]);
        let archive = reader_over(bytes);
        let cluster = Cluster::open(archive.as_ref(), 0, archive.size()).unwrap();

        let mut dest = vec![0u8; 1];
        cluster.blob(2).unwrap().read(&mut dest, 0, 1).unwrap();
        assert_eq!(&dest, b"c");

        let mut dest = vec![0u8; 3];
        cluster.blob(0).unwrap().read(&mut dest, 0, 3).unwrap();
        assert_eq!(&dest, b"aaa");
    }

    #[test]
    fn lzma_round_trip() {
        let bytes = build(CompressionCode::Lzma, &[b"the quick brown fox", b"jumps over"]);
        let archive = reader_over(bytes);
        let cluster = Cluster::open(archive.as_ref(), 0, archive.size()).unwrap();
        let mut dest = vec![0u8; 10];
        cluster.blob(1).unwrap().read(&mut dest, 0, 10).unwrap();
        assert_eq!(&dest, b"jumps over");
    }

    #[test]
    fn zstd_round_trip() {
        let bytes = build(CompressionCode::Zstd, &[b"alpha", b"beta"]);
        let archive = reader_over(bytes);
        let cluster = Cluster::open(archive.as_ref(), 0, archive.size()).unwrap();
        let mut dest = vec![0u8; 5];
        cluster.blob(0).unwrap().read(&mut dest, 0, 5).unwrap();
        assert_eq!(&dest, b"alpha");
    }

    #[test]
    fn uncompressed_cluster_memory_cost_excludes_payload() {
        let bytes = build(CompressionCode::None, &[b"hello", b"world!"]);
        let archive = reader_over(bytes);
        let cluster = Cluster::open(archive.as_ref(), 0, archive.size()).unwrap();
        let table_bytes = cluster.offsets.len() * offset_size(cluster.extended);
        assert_eq!(cluster.memory_cost(), table_bytes);
    }

    #[test]
    fn compressed_cluster_memory_cost_includes_half_payload() {
        let bytes = build(CompressionCode::Zstd, &[b"hello", b"world!"]);
        let archive = reader_over(bytes);
        let cluster = Cluster::open(archive.as_ref(), 0, archive.size()).unwrap();
        let table_bytes = cluster.offsets.len() * offset_size(cluster.extended);
        assert!(cluster.memory_cost() > table_bytes);
    }

    #[test]
    fn blob_index_out_of_range_errors() {
        let bytes = build(CompressionCode::None, &[b"x"]);
        let archive = reader_over(bytes);
        let cluster = Cluster::open(archive.as_ref(), 0, archive.size()).unwrap();
        assert!(cluster.blob(5).is_err());
    }

    struct OneShot(bool);
    impl BlobProvider for OneShot {
        fn size(&self) -> u64 {
            10
        }
        fn feed(&mut self) -> Result<Vec<u8>> {
            if self.0 {
                self.0 = false;
                Ok(b"short".to_vec())
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[test]
    fn incoherent_provider_size_errors() {
        let mut writer = ClusterWriter::new(CompressionCode::None);
        writer.push(Box::new(OneShot(true)));
        assert!(writer.close().is_err());
    }
}
