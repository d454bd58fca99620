//! Caller-visible `Entry`/`Blob` API.

use crate::dirent::{Dirent, Target};
use crate::error::{Error, Result};
use crate::io::reader::Reader;
use crate::namespace::Namespace;
use std::sync::Arc;

/// A view into a cluster's decompressed bytes for one blob. Borrows from
/// the cluster cache entry that produced it, which the cache keeps alive
/// for as long as any `Blob` built from it is reachable.
#[derive(Clone)]
pub struct Blob {
    reader: Arc<dyn Reader>,
}

impl Blob {
    pub(crate) fn new(reader: Arc<dyn Reader>) -> Blob {
        Blob { reader }
    }

    pub fn size(&self) -> usize {
        self.reader.size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// The blob's full contents, copied out of the underlying cluster
    /// buffer.
    pub fn data(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.size()];
        self.reader.read(&mut buf, 0, self.size())?;
        Ok(buf)
    }

    /// Reads `len` bytes starting at `offset` within the blob. `offset ==
    /// size()` yields an empty slice; `offset > size()` is a bounds error.
    pub fn read_at(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        if offset > self.size() {
            return Err(Error::bounds(format!(
                "blob read offset {offset} beyond blob size {}",
                self.size()
            )));
        }
        if offset == self.size() {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; len];
        self.reader.read(&mut buf, offset, len)?;
        Ok(buf)
    }
}

/// A handle to one dirent, identified by its position in URL order.
#[derive(Debug, Clone)]
pub struct Entry {
    pub index: u32,
    pub dirent: Dirent,
}

impl Entry {
    pub fn path(&self) -> &str {
        &self.dirent.path
    }

    pub fn title(&self) -> &str {
        self.dirent.title()
    }

    pub fn namespace(&self) -> Namespace {
        self.dirent.namespace
    }

    pub fn is_redirect(&self) -> bool {
        self.dirent.is_redirect()
    }

    /// The dirent index this entry redirects to, if it is a redirect.
    pub fn redirect_target(&self) -> Option<u32> {
        match self.dirent.target {
            Target::Redirect { target_index } => Some(target_index),
            _ => None,
        }
    }

    /// The `(cluster, blob)` this entry's content lives at, if it is a
    /// content dirent.
    pub fn cluster_and_blob(&self) -> Option<(u32, u32)> {
        match self.dirent.target {
            Target::Content { cluster_number, blob_number, .. } => {
                Some((cluster_number, blob_number))
            }
            _ => None,
        }
    }

    pub fn mime_type_index(&self) -> Option<u16> {
        match self.dirent.target {
            Target::Content { mime_type, .. } => Some(mime_type),
            _ => None,
        }
    }
}
