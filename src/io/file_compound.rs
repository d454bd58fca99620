//! Multi-part file handling.
//!
//! Very large ZIM archives are sometimes split on disk into numbered parts
//! (`foo.zimaa`, `foo.zimab`, ...). `FileCompound` stitches those parts back
//! into one logical address space so the rest of the crate never has to
//! know whether it is looking at one file or several.

use crate::error::{Error, Result};
use crate::io::buffer::{Buffer, Storage};
use crate::io::reader::Reader;
use memmap2::Mmap;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct Part {
    range: Range<u64>,
    mmap: Arc<Mmap>,
}

/// The concatenation of one or more on-disk file parts, addressed as a
/// single contiguous byte range `[0, fsize)`.
pub struct FileCompound {
    parts: Vec<Part>,
    fsize: u64,
}

impl FileCompound {
    /// Opens `path` as a single part, or `path` followed by `.zimaa`,
    /// `.zimab`, ... if `path` itself does not exist (or is a directory
    /// layout the caller has already resolved to that pattern).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<FileCompound> {
        let path = path.as_ref();
        let mut part_paths = Vec::new();
        if path.is_file() {
            part_paths.push(path.to_path_buf());
        } else {
            let mut suffix = 0u32;
            loop {
                let candidate = split_part_path(path, suffix)?;
                if !candidate.is_file() {
                    break;
                }
                part_paths.push(candidate);
                suffix += 1;
            }
            if part_paths.is_empty() {
                return Err(Error::MissingPart(path.to_path_buf()));
            }
        }

        let mut parts = Vec::with_capacity(part_paths.len());
        let mut offset = 0u64;
        for p in &part_paths {
            let file = File::open(p).map_err(|_| Error::MissingPart(p.clone()))?;
            let mmap = unsafe { Mmap::map(&file)? };
            let len = mmap.len() as u64;
            parts.push(Part {
                range: offset..(offset + len),
                mmap: Arc::new(mmap),
            });
            offset += len;
        }

        Ok(FileCompound {
            parts,
            fsize: offset,
        })
    }

    pub fn fsize(&self) -> u64 {
        self.fsize
    }

    pub fn is_multi_part(&self) -> bool {
        self.parts.len() > 1
    }

    fn part_index_for(&self, offset: u64) -> Option<usize> {
        self.parts
            .binary_search_by(|part| {
                if offset < part.range.start {
                    std::cmp::Ordering::Greater
                } else if offset >= part.range.end {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()
    }

    /// Reads `len` bytes starting at `offset`, transparently crossing part
    /// boundaries by copying into `dest`.
    fn read_into(&self, dest: &mut [u8], offset: u64, len: u64) -> Result<()> {
        if offset + len > self.fsize {
            return Err(Error::bounds(format!(
                "read [{offset}, {offset}+{len}) beyond file compound of size {}",
                self.fsize
            )));
        }
        let mut remaining = len;
        let mut pos = offset;
        let mut written = 0usize;
        while remaining > 0 {
            let idx = self
                .part_index_for(pos)
                .ok_or_else(|| Error::bounds(format!("no part covers offset {pos}")))?;
            let part = &self.parts[idx];
            let local_start = (pos - part.range.start) as usize;
            let available = part.range.end - pos;
            let chunk = remaining.min(available) as usize;
            dest[written..written + chunk]
                .copy_from_slice(&part.mmap[local_start..local_start + chunk]);
            written += chunk;
            pos += chunk as u64;
            remaining -= chunk as u64;
        }
        Ok(())
    }

    /// A zero-copy buffer when `[offset, offset+len)` lies entirely within
    /// one part; otherwise materializes a fresh owned copy.
    fn buffer_at(&self, offset: u64, len: u64) -> Result<Buffer> {
        if offset + len > self.fsize {
            return Err(Error::bounds(format!(
                "get_buffer [{offset}, {offset}+{len}) beyond file compound of size {}",
                self.fsize
            )));
        }
        if len == 0 {
            return Ok(Buffer::from_vec(Vec::new()));
        }
        let idx = self
            .part_index_for(offset)
            .ok_or_else(|| Error::bounds(format!("no part covers offset {offset}")))?;
        let part = &self.parts[idx];
        if offset + len <= part.range.end {
            let local_start = (offset - part.range.start) as usize;
            let storage: Arc<dyn Storage> = Arc::clone(&part.mmap) as Arc<dyn Storage>;
            let buf = Buffer::from_storage(storage);
            return buf.sub_buffer(local_start, len as usize);
        }
        let mut data = vec![0u8; len as usize];
        self.read_into(&mut data, offset, len)?;
        Ok(Buffer::from_vec(data))
    }
}

fn split_part_path(path: &Path, suffix: u32) -> Result<PathBuf> {
    if suffix >= 26 * 26 {
        return Err(Error::format("too many split-file parts"));
    }
    let a = (b'a' + (suffix / 26) as u8) as char;
    let b = (b'a' + (suffix % 26) as u8) as char;
    let mut name = path
        .file_name()
        .ok_or_else(|| Error::format("empty file path"))?
        .to_os_string();
    name.push(format!(".zim{a}{b}"));
    Ok(path.with_file_name(name))
}

/// A [`Reader`] over a (possibly multi-part) on-disk archive, or a
/// sub-range of one.
pub struct FileReader {
    source: Arc<FileCompound>,
    offset: u64,
    size: u64,
}

impl FileReader {
    pub fn new(source: Arc<FileCompound>) -> FileReader {
        let size = source.fsize();
        FileReader {
            source,
            offset: 0,
            size,
        }
    }
}

impl Reader for FileReader {
    fn size(&self) -> usize {
        self.size as usize
    }

    fn read(&self, dest: &mut [u8], offset: usize, len: usize) -> Result<()> {
        if offset + len > self.size() {
            return Err(Error::bounds(format!(
                "read [{offset}, {offset}+{len}) beyond reader of size {}",
                self.size()
            )));
        }
        self.source
            .read_into(dest, self.offset + offset as u64, len as u64)
    }

    fn get_buffer(&self, offset: usize, len: usize) -> Result<Buffer> {
        if offset + len > self.size() {
            return Err(Error::bounds(format!(
                "get_buffer [{offset}, {offset}+{len}) beyond reader of size {}",
                self.size()
            )));
        }
        self.source.buffer_at(self.offset + offset as u64, len as u64)
    }

    fn sub_reader(&self, offset: usize, len: usize) -> Result<Arc<dyn Reader>> {
        if offset + len > self.size() {
            return Err(Error::bounds(format!(
                "sub_reader [{offset}, {offset}+{len}) beyond reader of size {}",
                self.size()
            )));
        }
        Ok(Arc::new(FileReader {
            source: Arc::clone(&self.source),
            offset: self.offset + offset as u64,
            size: len as u64,
        }))
    }
}
