//! File image / archive reader.

pub mod entry;
pub mod header;
pub mod pointer_table;

pub use entry::{Blob, Entry};
pub use header::FileHeader;
pub use pointer_table::{OffsetTable, TitleTable};

use crate::cache::{CostEstimator, ConcurrentCache};
use crate::cluster::Cluster;
use crate::dirent::Dirent;
use crate::error::{Error, Result};
use crate::io::buffer::Buffer;
use crate::io::file_compound::{FileCompound, FileReader};
use crate::io::reader::{BufferReader, Reader};
use crate::mime::MimeTypeList;
use crate::namespace::Namespace;
use md5::{Digest, Md5};
use std::path::Path;
use std::sync::Arc;

const DEFAULT_DIRENT_CACHE_COST: usize = 4 * 1024 * 1024;
const DEFAULT_CLUSTER_CACHE_COST: usize = 64 * 1024 * 1024;
/// Caller asking to follow a redirect chain longer than this is almost
/// certainly caught in a cycle the on-disk format's own invariants prevent.
const MAX_REDIRECT_DEPTH: u32 = 32;

struct DirentCost;
impl CostEstimator<Dirent> for DirentCost {
    fn cost(value: &Dirent) -> usize {
        value.encoded_size()
    }
}

struct ClusterCost;
impl CostEstimator<Cluster> for ClusterCost {
    fn cost(value: &Cluster) -> usize {
        value.memory_cost()
    }
}

/// A read-only handle onto one ZIM archive.
pub struct Archive {
    file: Arc<dyn Reader>,
    header: FileHeader,
    mime_list: MimeTypeList,
    url_table: OffsetTable,
    title_table: TitleTable,
    cluster_table: OffsetTable,
    dirent_cache: ConcurrentCache<u32, Dirent, DirentCost>,
    cluster_cache: ConcurrentCache<u32, Cluster, ClusterCost>,
}

impl Archive {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Archive> {
        let compound = Arc::new(FileCompound::open(path)?);
        let file: Arc<dyn Reader> = Arc::new(FileReader::new(compound));
        Self::from_reader(file)
    }

    /// Opens an archive already materialized in memory (used by tests and
    /// by callers that have their own storage, e.g. an embedded resource).
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Archive> {
        let file: Arc<dyn Reader> = Arc::new(BufferReader::new(Buffer::from_vec(bytes)));
        Self::from_reader(file)
    }

    fn from_reader(file: Arc<dyn Reader>) -> Result<Archive> {
        let header = FileHeader::parse(file.as_ref())?;
        let (mime_list, _) = MimeTypeList::parse(file.as_ref(), header.mime_list_pos as usize)?;
        let url_table =
            OffsetTable::parse(file.as_ref(), header.url_ptr_pos as usize, header.article_count)?;
        let title_table =
            TitleTable::parse(file.as_ref(), header.title_ptr_pos as usize, header.article_count)?;
        let cluster_table = OffsetTable::parse(
            file.as_ref(),
            header.cluster_ptr_pos as usize,
            header.cluster_count + 1,
        )?;

        Ok(Archive {
            file,
            header,
            mime_list,
            url_table,
            title_table,
            cluster_table,
            dirent_cache: ConcurrentCache::new(DEFAULT_DIRENT_CACHE_COST),
            cluster_cache: ConcurrentCache::new(DEFAULT_CLUSTER_CACHE_COST),
        })
    }

    pub fn article_count(&self) -> u32 {
        self.header.article_count
    }

    pub fn cluster_count(&self) -> u32 {
        self.header.cluster_count
    }

    pub fn uuid(&self) -> uuid::Uuid {
        self.header.uuid
    }

    pub fn mime_type(&self, index: u16) -> Result<&str> {
        self.mime_list.get(index)
    }

    /// Shrinks or grows the cluster cache's cost budget, evicting
    /// least-recently-used clusters immediately if shrinking below the
    /// current resident cost.
    pub fn set_cluster_cache_max_cost(&mut self, max_cost: usize) {
        self.cluster_cache.set_max_cost(max_cost);
    }

    /// Shrinks or grows the dirent cache's cost budget, evicting
    /// least-recently-used dirents immediately if shrinking below the
    /// current resident cost.
    pub fn set_dirent_cache_max_cost(&mut self, max_cost: usize) {
        self.dirent_cache.set_max_cost(max_cost);
    }

    pub fn main_entry(&self) -> Result<Option<Entry>> {
        match self.header.main_page {
            Some(idx) => self.get_entry(idx).map(Some),
            None => Ok(None),
        }
    }

    fn get_dirent(&self, url_index: u32) -> Result<Arc<Dirent>> {
        let offset = self
            .url_table
            .get(url_index)
            .ok_or_else(|| Error::bounds(format!("dirent index {url_index} out of range")))?;
        let file = Arc::clone(&self.file);
        self.dirent_cache.get_or_put(url_index, move || {
            Dirent::parse(file.as_ref(), offset as usize)
        })
    }

    pub fn get_entry(&self, url_index: u32) -> Result<Entry> {
        let dirent = self.get_dirent(url_index)?;
        Ok(Entry { index: url_index, dirent: (*dirent).clone() })
    }

    fn get_cluster(&self, cluster_number: u32) -> Result<Arc<Cluster>> {
        let start = self
            .cluster_table
            .get(cluster_number)
            .ok_or_else(|| Error::format(format!("cluster {cluster_number} out of range")))?;
        let end = self
            .cluster_table
            .get(cluster_number + 1)
            .ok_or_else(|| Error::format(format!("cluster {cluster_number} has no end offset")))?;
        if end <= start || end as usize > self.file.size() {
            return Err(Error::format(format!(
                "cluster {cluster_number} offsets [{start}, {end}) invalid for file of size {}",
                self.file.size()
            )));
        }
        let file = Arc::clone(&self.file);
        self.cluster_cache.get_or_put(cluster_number, move || {
            Cluster::open(file.as_ref(), start as usize, end as usize)
        })
    }

    /// Follows a redirect chain (if `entry` is a redirect) up to
    /// [`MAX_REDIRECT_DEPTH`] hops, refusing cycles.
    pub fn resolve(&self, entry: &Entry) -> Result<Entry> {
        let mut current = entry.clone();
        let mut seen = vec![current.index];
        for _ in 0..MAX_REDIRECT_DEPTH {
            let Some(target) = current.redirect_target() else {
                return Ok(current);
            };
            if seen.contains(&target) {
                return Err(Error::format("redirect cycle detected"));
            }
            seen.push(target);
            current = self.get_entry(target)?;
        }
        Err(Error::format("redirect chain exceeds maximum depth"))
    }

    /// Fetches the content blob for `entry`, resolving redirects first.
    pub fn blob(&self, entry: &Entry) -> Result<Blob> {
        let resolved = self.resolve(entry)?;
        let (cluster_number, blob_number) = resolved
            .cluster_and_blob()
            .ok_or_else(|| Error::invalid_state("entry has no content blob"))?;
        let cluster = self.get_cluster(cluster_number)?;
        let reader = cluster.blob(blob_number as usize)?;
        Ok(Blob::new(reader))
    }

    fn url_key_at(&self, i: u32) -> Result<(u8, String)> {
        let d = self.get_dirent(i)?;
        Ok((d.namespace.0, d.path.clone()))
    }

    fn title_key_at(&self, i: u32) -> Result<(u8, String)> {
        let url_idx = self
            .title_table
            .get(i)
            .ok_or_else(|| Error::bounds(format!("title index {i} out of range")))?;
        let d = self.get_dirent(url_idx)?;
        Ok((d.namespace.0, d.title().to_string()))
    }

    fn namespace_bounds(
        &self,
        ns: Namespace,
        key_at: impl Fn(&Archive, u32) -> Result<(u8, String)> + Copy,
    ) -> Result<(u32, u32)> {
        let count = self.header.article_count;
        let lo = match pointer_table::binary_search_range(0, count, &(ns.0, String::new()), |i| {
            key_at(self, i)
        })? {
            Ok(exact) => exact,
            Err(insertion) => insertion,
        };
        let next = ns.0.checked_add(1);
        let hi = match next {
            None => count,
            Some(next_ns) => {
                match pointer_table::binary_search_range(lo, count, &(next_ns, String::new()), |i| {
                    key_at(self, i)
                })? {
                    Ok(exact) => exact,
                    Err(insertion) => insertion,
                }
            }
        };
        Ok((lo, hi))
    }

    /// The half-open range of URL-order indices belonging to `ns`.
    pub fn namespace_range(&self, ns: Namespace) -> Result<(u32, u32)> {
        self.namespace_bounds(ns, Archive::url_key_at)
    }

    /// Looks up an entry by `(namespace, path)`, returning `None` if absent.
    pub fn find_by_path(&self, ns: Namespace, path: &str) -> Result<Option<Entry>> {
        let (lo, hi) = self.namespace_bounds(ns, Archive::url_key_at)?;
        let needle = (ns.0, path.to_string());
        match pointer_table::binary_search_range(lo, hi, &needle, |i| self.url_key_at(i))? {
            Ok(idx) => Ok(Some(self.get_entry(idx)?)),
            Err(_) => Ok(None),
        }
    }

    /// Looks up an entry by `(namespace, title)`, returning `None` if
    /// absent. The title table stores URL-order indices, so a hit is
    /// mapped back through it to the dirent's own index.
    pub fn find_by_title(&self, ns: Namespace, title: &str) -> Result<Option<Entry>> {
        let (lo, hi) = self.namespace_bounds(ns, Archive::title_key_at)?;
        let needle = (ns.0, title.to_string());
        match pointer_table::binary_search_range(lo, hi, &needle, |i| self.title_key_at(i))? {
            Ok(title_idx) => {
                let url_idx = self.title_table.get(title_idx).unwrap();
                Ok(Some(self.get_entry(url_idx)?))
            }
            Err(_) => Ok(None),
        }
    }

    /// Iterates entries in URL order (the order dirents are stored
    /// lexicographically by `(namespace, path)`).
    pub fn iter_by_url(&self) -> impl Iterator<Item = Result<Entry>> + '_ {
        (0..self.header.article_count).map(move |i| self.get_entry(i))
    }

    /// Iterates entries in title order.
    pub fn iter_by_title(&self) -> impl Iterator<Item = Result<Entry>> + '_ {
        (0..self.header.article_count).map(move |i| {
            let url_idx = self
                .title_table
                .get(i)
                .ok_or_else(|| Error::bounds(format!("title index {i} out of range")))?;
            self.get_entry(url_idx)
        })
    }

    /// Iterates cluster numbers in storage order (useful for read-locality
    /// benchmarks).
    pub fn iter_clusters(&self) -> impl Iterator<Item = u32> {
        0..self.header.cluster_count
    }

    /// Recomputes the MD5 checksum over `[0, checksum_pos)` and compares it
    /// with the 16-byte trailer. Returns `Ok(false)` rather than an error
    /// when the archive was written without a checksum (`checksum_pos ==
    /// 0`).
    pub fn verify_checksum(&self) -> Result<bool> {
        if self.header.checksum_pos == 0 {
            log::debug!("archive carries no checksum trailer");
            return Ok(false);
        }
        log::debug!("verifying checksum over {} bytes", self.header.checksum_pos);
        let body = self.file.get_buffer(0, self.header.checksum_pos as usize)?;
        let mut hasher = Md5::new();
        hasher.update(body.data());
        let computed = hasher.finalize();

        let mut stored = [0u8; 16];
        self.file.read(&mut stored, self.header.checksum_pos as usize, 16)?;
        let ok = computed.as_slice() == stored;
        if !ok {
            log::warn!("checksum mismatch");
        }
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{Config, Creator};

    #[test]
    fn open_rejects_truncated_header() {
        let err = Archive::from_bytes(vec![0u8; 4]);
        assert!(err.is_err());
    }

    #[test]
    fn round_trip_find_by_path_and_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.zim");
        let mut creator = Creator::new(Config::default()).unwrap();
        creator
            .add_item_with_title(Namespace::ARTICLES, "a", "Alpha Article", "text/html", b"alpha".to_vec())
            .unwrap();
        creator
            .add_item_with_title(Namespace::ARTICLES, "b", "Bravo Article", "text/html", b"bravo".to_vec())
            .unwrap();
        creator.finish(&path).unwrap();

        let archive = Archive::open(&path).unwrap();
        assert_eq!(archive.article_count(), 2);

        let entry = archive.find_by_path(Namespace::ARTICLES, "a").unwrap().unwrap();
        let blob = archive.blob(&entry).unwrap();
        assert_eq!(blob.data().unwrap(), b"alpha");

        let by_title = archive
            .find_by_title(Namespace::ARTICLES, "Bravo Article")
            .unwrap()
            .unwrap();
        assert_eq!(by_title.path(), "b");

        assert!(archive.find_by_path(Namespace::ARTICLES, "missing").unwrap().is_none());
    }

    #[test]
    fn redirect_resolves_to_target_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redirect.zim");
        let mut creator = Creator::new(Config::default()).unwrap();
        creator
            .add_item(Namespace::ARTICLES, "a", "text/html", b"alpha".to_vec())
            .unwrap();
        creator.add_redirect(Namespace::ARTICLES, "home", "A/a").unwrap();
        creator.finish(&path).unwrap();

        let archive = Archive::open(&path).unwrap();
        let home = archive.find_by_path(Namespace::ARTICLES, "home").unwrap().unwrap();
        assert!(home.is_redirect());
        let resolved = archive.resolve(&home).unwrap();
        assert_eq!(resolved.path(), "a");
    }

    #[test]
    fn cache_cost_budget_is_reconfigurable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.zim");
        let mut creator = Creator::new(Config::default()).unwrap();
        creator.add_item(Namespace::ARTICLES, "a", "text/plain", b"hello".to_vec()).unwrap();
        creator.finish(&path).unwrap();

        let mut archive = Archive::open(&path).unwrap();
        let entry = archive.find_by_path(Namespace::ARTICLES, "a").unwrap().unwrap();
        archive.blob(&entry).unwrap();
        assert!(archive.cluster_cache.current_cost() > 0);

        archive.set_cluster_cache_max_cost(0);
        assert_eq!(archive.cluster_cache.current_cost(), 0);
    }

    #[test]
    fn checksum_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checksum.zim");
        let mut config = Config::default();
        config.checksum = true;
        let mut creator = Creator::new(config).unwrap();
        creator
            .add_item(Namespace::ARTICLES, "a", "text/plain", b"hello".to_vec())
            .unwrap();
        creator.finish(&path).unwrap();

        let archive = Archive::open(&path).unwrap();
        assert!(archive.verify_checksum().unwrap());
    }
}
