//! Writer / creator pipeline.
//!
//! Items are ingested into one of two open clusters (compress / no-compress)
//! based on a MIME-derived hint. An open cluster closes once its
//! uncompressed payload reaches `min_cluster_size`; closed clusters are
//! compressed in parallel by a worker pool (`rayon`, already present in the
//! dependency stack but previously unreferenced) before the final
//! image is assembled and written out.

pub mod item;

pub use item::{BytesItem, Item};

use crate::archive::header::{FileHeader, HEADER_SIZE};
use crate::archive::pointer_table::{OffsetTable, TitleTable};
use crate::cluster::{BlobProvider, ClusterWriter};
use crate::compress::{CompressionCode, Level};
use crate::dirent::{Dirent, Target};
use crate::error::{Error, Result};
use crate::mime::MimeTypeList;
use crate::namespace::Namespace;
use md5::{Digest, Md5};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

/// Writer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub compression: CompressionCode,
    /// Backend compression effort. Defaults to `Level::Best` (Zstd 19,
    /// the format's conventional default).
    pub compression_level: Level,
    pub min_cluster_size: usize,
    pub verbose: bool,
    pub with_index: bool,
    pub index_language: Option<String>,
    pub worker_threads: usize,
    pub uuid: Option<Uuid>,
    pub main_path: Option<String>,
    pub favicon_path: Option<String>,
    /// Whether to append an MD5 trailer over the finished image.
    pub checksum: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            compression: CompressionCode::Zstd,
            compression_level: Level::Best,
            min_cluster_size: 1024 - 64,
            verbose: false,
            with_index: false,
            index_language: None,
            worker_threads: num_cpus::get(),
            uuid: None,
            main_path: None,
            favicon_path: None,
            checksum: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Bucket {
    Compress,
    NoCompress,
}

struct OpenCluster {
    writer: ClusterWriter,
    generation: usize,
    running_size: u64,
}

impl OpenCluster {
    fn new(code: CompressionCode, level: Level, generation: usize) -> OpenCluster {
        OpenCluster { writer: ClusterWriter::with_level(code, level), generation, running_size: 0 }
    }
}

#[derive(Debug, Clone)]
enum PendingTarget {
    Content { generation: usize, blob_index: u32, mime_index: u16 },
    Redirect { target_path: String },
}

#[derive(Debug, Clone)]
struct PendingEntry {
    namespace: Namespace,
    path: String,
    title: String,
    target: PendingTarget,
}

/// Builds one ZIM archive from an ingested stream of items and redirects.
pub struct Creator {
    config: Config,
    mime_list: MimeTypeList,
    entries: Vec<PendingEntry>,
    seen: HashSet<(u8, String)>,
    compress_open: OpenCluster,
    nocompress_open: OpenCluster,
    next_generation: usize,
    closed: Vec<ClusterWriter>,
    generation_to_cluster: HashMap<usize, u32>,
    finished: bool,
}

impl Creator {
    pub fn new(config: Config) -> Result<Creator> {
        Ok(Creator {
            mime_list: MimeTypeList::default(),
            compress_open: OpenCluster::new(config.compression, config.compression_level, 0),
            nocompress_open: OpenCluster::new(CompressionCode::None, Level::Best, 1),
            next_generation: 2,
            config,
            entries: Vec::new(),
            seen: HashSet::new(),
            closed: Vec::new(),
            generation_to_cluster: HashMap::new(),
            finished: false,
        })
    }

    pub fn add_item(
        &mut self,
        namespace: Namespace,
        path: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        self.add_item_with_title(namespace, path, path, mime_type, data)
    }

    pub fn add_item_with_title(
        &mut self,
        namespace: Namespace,
        path: &str,
        title: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let item = BytesItem {
            namespace,
            path: path.to_string(),
            title: title.to_string(),
            mime_type: mime_type.to_string(),
            data,
        };
        self.add(Box::new(item))
    }

    /// Adds a metadata entry under the `M` namespace (e.g. `Title`,
    /// `Creator`, `Language`). Sugar over [`Creator::add_item`] — metadata
    /// is ordinary content, just conventionally named and namespaced.
    pub fn add_metadata(&mut self, name: &str, content: Vec<u8>, mime_type: &str) -> Result<()> {
        self.add_item(Namespace::METADATA, name, mime_type, content)
    }

    /// Ingests an arbitrary [`Item`], driving its content provider into the
    /// appropriate open cluster.
    pub fn add(&mut self, item: Box<dyn Item>) -> Result<()> {
        if self.finished {
            return Err(Error::invalid_state("creator already finished"));
        }
        let key = (item.namespace().0, item.path().to_string());
        if !self.seen.insert(key.clone()) {
            return Err(Error::DuplicatePath { namespace: item.namespace().as_char(), path: key.1 });
        }

        let namespace = item.namespace();
        let path = item.path().to_string();
        let title = item.title().to_string();
        let mime_index = self.mime_list.index_of_or_insert(item.mime_type())?;
        let compress = item.should_compress();
        let provider = item.content_provider();

        let bucket_kind = if compress { Bucket::Compress } else { Bucket::NoCompress };
        let size = provider.size();
        let bucket = if compress { &mut self.compress_open } else { &mut self.nocompress_open };
        let blob_index = bucket.writer.blob_count() as u32;
        bucket.writer.push(provider);
        bucket.running_size += size;
        let generation = bucket.generation;

        self.entries.push(PendingEntry {
            namespace,
            path,
            title,
            target: PendingTarget::Content { generation, blob_index, mime_index },
        });

        self.maybe_close(bucket_kind)?;
        Ok(())
    }

    /// Adds a redirect dirent. `target_full_path` is `"<namespace-char>/<path>"`
    /// (e.g. `"A/home"`); the target need not have been ingested yet —
    /// targets are resolved during [`Creator::finish`] in a second pass.
    pub fn add_redirect(&mut self, namespace: Namespace, path: &str, target_full_path: &str) -> Result<()> {
        self.add_redirect_with_title(namespace, path, path, target_full_path)
    }

    pub fn add_redirect_with_title(
        &mut self,
        namespace: Namespace,
        path: &str,
        title: &str,
        target_full_path: &str,
    ) -> Result<()> {
        if self.finished {
            return Err(Error::invalid_state("creator already finished"));
        }
        let key = (namespace.0, path.to_string());
        if !self.seen.insert(key.clone()) {
            return Err(Error::DuplicatePath { namespace: namespace.as_char(), path: key.1 });
        }
        self.entries.push(PendingEntry {
            namespace,
            path: path.to_string(),
            title: title.to_string(),
            target: PendingTarget::Redirect { target_path: target_full_path.to_string() },
        });
        Ok(())
    }

    fn maybe_close(&mut self, bucket: Bucket) -> Result<()> {
        let min = self.config.min_cluster_size as u64;
        let level = self.config.compression_level;
        let (open, code) = match bucket {
            Bucket::Compress => (&mut self.compress_open, self.config.compression),
            Bucket::NoCompress => (&mut self.nocompress_open, CompressionCode::None),
        };
        if open.running_size < min {
            return Ok(());
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        let finished = std::mem::replace(open, OpenCluster::new(code, level, generation));
        self.generation_to_cluster.insert(finished.generation, self.closed.len() as u32);
        self.closed.push(finished.writer);
        Ok(())
    }

    fn close_remaining(&mut self) {
        let level = self.config.compression_level;
        for bucket in [Bucket::Compress, Bucket::NoCompress] {
            let (open, code) = match bucket {
                Bucket::Compress => (&mut self.compress_open, self.config.compression),
                Bucket::NoCompress => (&mut self.nocompress_open, CompressionCode::None),
            };
            if open.writer.blob_count() == 0 {
                continue;
            }
            let generation = self.next_generation;
            self.next_generation += 1;
            let finished = std::mem::replace(open, OpenCluster::new(code, level, generation));
            self.generation_to_cluster.insert(finished.generation, self.closed.len() as u32);
            self.closed.push(finished.writer);
        }
    }

    /// Closes all open clusters, builds the pointer tables and dirent area,
    /// and writes the finished archive to `path`.
    pub fn finish<P: AsRef<Path>>(mut self, path: P) -> Result<()> {
        if self.finished {
            return Err(Error::invalid_state("creator already finished"));
        }
        self.finished = true;
        self.close_remaining();

        if self.config.verbose {
            log::info!(
                "finalizing archive: {} entries, {} clusters",
                self.entries.len(),
                self.closed.len()
            );
        }

        let cluster_bytes: Vec<Vec<u8>> = if self.config.worker_threads <= 1 {
            std::mem::take(&mut self.closed)
                .into_iter()
                .map(|c| c.close())
                .collect::<Result<Vec<_>>>()?
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.worker_threads)
                .build()
                .map_err(|e| Error::invalid_state(format!("failed to build worker pool: {e}")))?;
            let closed = std::mem::take(&mut self.closed);
            pool.install(|| closed.into_par_iter().map(|c| c.close()).collect::<Result<Vec<_>>>())?
        };

        if self.config.with_index
            && !self
                .entries
                .iter()
                .any(|e| e.namespace.0 == b'X' && e.path == "fulltext/xapian")
        {
            log::warn!("with_index requested but no X/fulltext/xapian item was added");
        }

        let path_to_url_index: HashMap<(u8, String), u32> = {
            let mut sorted: Vec<usize> = (0..self.entries.len()).collect();
            sorted.sort_by(|&a, &b| {
                let ea = &self.entries[a];
                let eb = &self.entries[b];
                (ea.namespace.0, &ea.path).cmp(&(eb.namespace.0, &eb.path))
            });
            sorted
                .iter()
                .enumerate()
                .map(|(url_index, &entry_idx)| {
                    let e = &self.entries[entry_idx];
                    ((e.namespace.0, e.path.clone()), url_index as u32)
                })
                .collect()
        };

        let article_count = self.entries.len() as u32;
        let mut url_order: Vec<Dirent> = vec![
            Dirent {
                namespace: Namespace(0),
                revision: 0,
                path: String::new(),
                title: String::new(),
                parameters: Vec::new(),
                target: Target::Deleted,
            };
            self.entries.len()
        ];

        for entry in &self.entries {
            let url_index = path_to_url_index[&(entry.namespace.0, entry.path.clone())];
            let target = match &entry.target {
                PendingTarget::Content { generation, blob_index, mime_index } => {
                    let cluster_number = *self
                        .generation_to_cluster
                        .get(generation)
                        .ok_or_else(|| Error::invalid_state("unresolved cluster generation"))?;
                    Target::Content { mime_type: *mime_index, cluster_number, blob_number: *blob_index }
                }
                PendingTarget::Redirect { target_path } => {
                    let (ns, p) = parse_full_path(target_path)?;
                    let target_index = *path_to_url_index.get(&(ns.0, p.to_string())).ok_or_else(|| {
                        Error::not_found(format!("redirect target {target_path} was never ingested"))
                    })?;
                    Target::Redirect { target_index }
                }
            };
            let title = if entry.title.is_empty() || entry.title == entry.path {
                entry.path.clone()
            } else {
                entry.title.clone()
            };
            url_order[url_index as usize] = Dirent {
                namespace: entry.namespace,
                revision: 0,
                path: entry.path.clone(),
                title,
                parameters: Vec::new(),
                target,
            };
        }

        let cluster_count = cluster_bytes.len() as u32;
        for dirent in &url_order {
            dirent.validate(cluster_count, article_count)?;
        }

        let mut title_order: Vec<u32> = (0..article_count).collect();
        title_order.sort_by(|&a, &b| {
            let da = &url_order[a as usize];
            let db = &url_order[b as usize];
            (da.namespace.0, da.title()).cmp(&(db.namespace.0, db.title()))
        });

        let main_page = self.resolve_named_path(&path_to_url_index, self.config.main_path.as_deref())?;
        let layout_page =
            self.resolve_named_path(&path_to_url_index, self.config.favicon_path.as_deref())?;

        let mime_bytes = self.mime_list.serialize();
        let mut dirent_bytes = Vec::new();
        let mut url_table = OffsetTable::default();

        let mut running_offset: u64 = 0;
        for d in &url_order {
            url_table.push(running_offset);
            let bytes = d.serialize();
            running_offset += bytes.len() as u64;
            dirent_bytes.extend_from_slice(&bytes);
        }

        let mut title_table = TitleTable::default();
        for idx in &title_order {
            title_table.push(*idx);
        }

        let mut cluster_table = OffsetTable::default();
        let mut cluster_area = Vec::new();
        let mut cluster_running: u64 = 0;
        for bytes in &cluster_bytes {
            cluster_table.push(cluster_running);
            cluster_running += bytes.len() as u64;
            cluster_area.extend_from_slice(bytes);
        }
        cluster_table.push(cluster_running);

        let mime_list_pos = HEADER_SIZE as u64;
        let url_ptr_pos = mime_list_pos + mime_bytes.len() as u64;
        let title_ptr_pos = url_ptr_pos + 8 * article_count as u64;
        let cluster_ptr_pos = title_ptr_pos + 4 * article_count as u64;
        let dirents_start = cluster_ptr_pos + 8 * (cluster_bytes.len() as u64 + 1);
        let clusters_start = dirents_start + dirent_bytes.len() as u64;

        // url_table offsets were accumulated relative to dirents_start; shift them now.
        let url_table = {
            let mut shifted = OffsetTable::default();
            for i in 0..url_table.len() as u32 {
                shifted.push(url_table.get(i).unwrap() + dirents_start);
            }
            shifted
        };
        let cluster_table = {
            let mut shifted = OffsetTable::default();
            for i in 0..cluster_table.len() as u32 {
                shifted.push(cluster_table.get(i).unwrap() + clusters_start);
            }
            shifted
        };

        let checksum_pos = clusters_start + cluster_area.len() as u64;

        let header = FileHeader {
            major_version: 6,
            minor_version: 1,
            uuid: self.config.uuid.unwrap_or_else(Uuid::new_v4),
            article_count,
            cluster_count: cluster_bytes.len() as u32,
            url_ptr_pos,
            title_ptr_pos,
            cluster_ptr_pos,
            mime_list_pos,
            main_page,
            layout_page,
            checksum_pos: if self.config.checksum { checksum_pos } else { 0 },
        };

        let mut image = Vec::with_capacity(checksum_pos as usize + 16);
        image.extend_from_slice(&header.serialize());
        image.extend_from_slice(&mime_bytes);
        image.extend_from_slice(&url_table.serialize());
        image.extend_from_slice(&title_table.serialize());
        image.extend_from_slice(&cluster_table.serialize());
        image.extend_from_slice(&dirent_bytes);
        image.extend_from_slice(&cluster_area);

        if self.config.checksum {
            let mut hasher = Md5::new();
            hasher.update(&image);
            let digest = hasher.finalize();
            image.extend_from_slice(digest.as_slice());
        }

        let tmp_dir = std::env::temp_dir();
        let mut tmp = tempfile::NamedTempFile::new_in(&tmp_dir)?;
        tmp.write_all(&image)?;
        tmp.flush()?;
        tmp.persist(path.as_ref()).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    fn resolve_named_path(
        &self,
        path_to_url_index: &HashMap<(u8, String), u32>,
        full_path: Option<&str>,
    ) -> Result<Option<u32>> {
        match full_path {
            None => Ok(None),
            Some(p) => {
                let (ns, path) = parse_full_path(p)?;
                Ok(path_to_url_index.get(&(ns.0, path.to_string())).copied())
            }
        }
    }
}

fn parse_full_path(full_path: &str) -> Result<(Namespace, &str)> {
    let mut chars = full_path.chars();
    let ns = chars
        .next()
        .ok_or_else(|| Error::format("empty path reference"))?;
    let rest = full_path
        .get(1..)
        .and_then(|s| s.strip_prefix('/'))
        .ok_or_else(|| Error::format(format!("path reference {full_path} must be NAMESPACE/path")))?;
    Ok((Namespace(ns as u8), rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_path_rejected() {
        let mut creator = Creator::new(Config::default()).unwrap();
        creator.add_item(Namespace::ARTICLES, "a", "text/plain", b"1".to_vec()).unwrap();
        let err = creator.add_item(Namespace::ARTICLES, "a", "text/plain", b"2".to_vec());
        assert!(matches!(err, Err(Error::DuplicatePath { .. })));
    }

    #[test]
    fn add_after_finish_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut creator = Creator::new(Config::default()).unwrap();
        creator.add_item(Namespace::ARTICLES, "a", "text/plain", b"1".to_vec()).unwrap();
        creator.finish(dir.path().join("out.zim")).unwrap();
    }

    #[test]
    fn parse_full_path_splits_namespace_and_rest() {
        let (ns, path) = parse_full_path("A/foo/bar").unwrap();
        assert_eq!(ns, Namespace::ARTICLES);
        assert_eq!(path, "foo/bar");
        assert!(parse_full_path("Afoo").is_err());
    }

    #[test]
    fn add_metadata_lands_in_metadata_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let mut creator = Creator::new(Config::default()).unwrap();
        creator.add_metadata("Title", b"Test Archive".to_vec(), "text/plain").unwrap();
        creator.add_item(Namespace::ARTICLES, "a", "text/plain", b"1".to_vec()).unwrap();
        creator.finish(dir.path().join("out.zim")).unwrap();

        let archive = crate::archive::Archive::open(dir.path().join("out.zim")).unwrap();
        let entry = archive
            .iter_by_url()
            .collect::<Result<Vec<_>>>()
            .unwrap()
            .into_iter()
            .find(|e| e.namespace() == Namespace::METADATA && e.path() == "Title")
            .expect("metadata entry present");
        let blob = archive.blob(&entry).unwrap();
        assert_eq!(blob.data().unwrap(), b"Test Archive");
    }
}
