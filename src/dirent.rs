//! Dirent parsing and serialization.

use crate::error::{Error, Result};
use crate::io::reader::{read_at, read_cstring, Reader};
use crate::mime::{MIME_DELETED, MIME_LINK_TARGET, MIME_REDIRECT};
use crate::namespace::Namespace;

/// What a dirent points at, keyed off its MIME-index sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// An ordinary item: lives in cluster `cluster_number`, blob `blob_number`.
    Content { mime_type: u16, cluster_number: u32, blob_number: u32 },
    /// Redirects to the dirent at `target_index` in URL order.
    Redirect { target_index: u32 },
    /// A link-target placeholder: header and path only, no payload.
    LinkTarget,
    /// A tombstone for a removed entry: header and path only.
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    pub namespace: Namespace,
    pub revision: u32,
    pub path: String,
    /// Empty means "defaults to `path`"; call [`Dirent::title`]
    /// rather than reading this field directly.
    pub title: String,
    pub parameters: Vec<u8>,
    pub target: Target,
}

impl Dirent {
    pub fn is_redirect(&self) -> bool {
        matches!(self.target, Target::Redirect { .. })
    }

    /// Title to sort and display, defaulting to `path` when absent. The
    /// default is applied once at parse time ([`Dirent::parse`]), not on
    /// every lookup, so this simply returns the stored field.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn parse(reader: &dyn Reader, offset: usize) -> Result<Dirent> {
        let mime_id: u16 = read_at(reader, offset)?;
        let param_len: u8 = read_at(reader, offset + 2)?;
        let namespace: u8 = read_at(reader, offset + 3)?;
        let revision: u32 = read_at(reader, offset + 4)?;

        let (target, mut pos) = match mime_id {
            MIME_REDIRECT => {
                let target_index: u32 = read_at(reader, offset + 8)?;
                (Target::Redirect { target_index }, offset + 12)
            }
            MIME_LINK_TARGET => (Target::LinkTarget, offset + 8),
            MIME_DELETED => (Target::Deleted, offset + 8),
            _ => {
                let cluster_number: u32 = read_at(reader, offset + 8)?;
                let blob_number: u32 = read_at(reader, offset + 12)?;
                (
                    Target::Content { mime_type: mime_id, cluster_number, blob_number },
                    offset + 16,
                )
            }
        };

        let (path, next) = read_cstring(reader, pos)?;
        pos = next;

        let has_title = !matches!(target, Target::LinkTarget | Target::Deleted);
        let title = if has_title {
            let (t, next) = read_cstring(reader, pos)?;
            pos = next;
            t
        } else {
            String::new()
        };

        let parameters = if param_len > 0 {
            let buf = reader.get_buffer(pos, param_len as usize)?;
            pos += param_len as usize;
            buf.data().to_vec()
        } else {
            Vec::new()
        };
        let _ = pos;

        let title = if title.is_empty() { path.clone() } else { title };

        Ok(Dirent {
            namespace: Namespace::from(namespace),
            revision,
            path,
            title,
            parameters,
            target,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_size());
        let mime_id = match &self.target {
            Target::Content { mime_type, .. } => *mime_type,
            Target::Redirect { .. } => MIME_REDIRECT,
            Target::LinkTarget => MIME_LINK_TARGET,
            Target::Deleted => MIME_DELETED,
        };
        out.extend_from_slice(&mime_id.to_le_bytes());
        out.push(self.parameters.len() as u8);
        out.push(self.namespace.0);
        out.extend_from_slice(&self.revision.to_le_bytes());

        match &self.target {
            Target::Content { cluster_number, blob_number, .. } => {
                out.extend_from_slice(&cluster_number.to_le_bytes());
                out.extend_from_slice(&blob_number.to_le_bytes());
            }
            Target::Redirect { target_index } => {
                out.extend_from_slice(&target_index.to_le_bytes());
            }
            Target::LinkTarget | Target::Deleted => {}
        }

        out.extend_from_slice(self.path.as_bytes());
        out.push(0);

        if !matches!(self.target, Target::LinkTarget | Target::Deleted) {
            let stored_title = if self.title == self.path { "" } else { &self.title };
            out.extend_from_slice(stored_title.as_bytes());
            out.push(0);
        }

        out.extend_from_slice(&self.parameters);
        out
    }

    /// Byte length `serialize()` produces; kept in sync with it explicitly
    /// rather than derived, matching the on-disk contract exactly.
    pub fn encoded_size(&self) -> usize {
        let head = match self.target {
            Target::Content { .. } | Target::Redirect { .. } => 16,
            Target::LinkTarget | Target::Deleted => 8,
        };
        let title_len = if matches!(self.target, Target::LinkTarget | Target::Deleted) {
            0
        } else {
            let stored_title = if self.title == self.path { "" } else { self.title.as_str() };
            stored_title.len() + 1
        };
        head + self.path.len() + 1 + title_len + self.parameters.len()
    }

    pub fn validate(&self, cluster_count: u32, dirent_count: u32) -> Result<()> {
        match &self.target {
            Target::Content { cluster_number, .. } if *cluster_number >= cluster_count => {
                Err(Error::format(format!(
                    "dirent cluster {cluster_number} >= cluster count {cluster_count}"
                )))
            }
            Target::Redirect { target_index } if *target_index >= dirent_count => Err(
                Error::format(format!("redirect index {target_index} >= dirent count {dirent_count}")),
            ),
            _ => Ok(()),
        }
    }
}

/// Lexicographic key for URL-pointer-table ordering: `(namespace, path)`.
pub fn url_key(d: &Dirent) -> (u8, &str) {
    (d.namespace.0, d.path.as_str())
}

/// Lexicographic key for title-pointer-table ordering: `(namespace, title)`.
pub fn title_key(d: &Dirent) -> (u8, &str) {
    (d.namespace.0, d.title())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::buffer::Buffer;
    use crate::io::reader::BufferReader;

    fn content(namespace: u8, path: &str, title: &str) -> Dirent {
        Dirent {
            namespace: Namespace(namespace),
            revision: 0,
            path: path.to_string(),
            title: if title.is_empty() { path.to_string() } else { title.to_string() },
            parameters: Vec::new(),
            target: Target::Content { mime_type: 0, cluster_number: 2, blob_number: 5 },
        }
    }

    #[test]
    fn content_dirent_round_trips() {
        let d = content(b'A', "hello.html", "Hello World");
        let bytes = d.serialize();
        assert_eq!(bytes.len(), d.encoded_size());
        let reader = BufferReader::new(Buffer::from_vec(bytes));
        let parsed = Dirent::parse(&reader, 0).unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn empty_title_defaults_to_path() {
        let d = content(b'A', "hello.html", "");
        let bytes = d.serialize();
        let reader = BufferReader::new(Buffer::from_vec(bytes));
        let parsed = Dirent::parse(&reader, 0).unwrap();
        assert_eq!(parsed.title(), "hello.html");
    }

    #[test]
    fn redirect_dirent_round_trips() {
        let d = Dirent {
            namespace: Namespace::ARTICLES,
            revision: 7,
            path: "old.html".to_string(),
            title: "old.html".to_string(),
            parameters: Vec::new(),
            target: Target::Redirect { target_index: 42 },
        };
        let bytes = d.serialize();
        let reader = BufferReader::new(Buffer::from_vec(bytes));
        let parsed = Dirent::parse(&reader, 0).unwrap();
        assert!(parsed.is_redirect());
        assert_eq!(parsed, d);
    }

    #[test]
    fn deleted_dirent_has_no_title_field() {
        let d = Dirent {
            namespace: Namespace::ARTICLES,
            revision: 0,
            path: "gone.html".to_string(),
            title: "gone.html".to_string(),
            parameters: Vec::new(),
            target: Target::Deleted,
        };
        let bytes = d.serialize();
        assert_eq!(bytes.len(), 8 + "gone.html".len() + 1);
        let reader = BufferReader::new(Buffer::from_vec(bytes));
        let parsed = Dirent::parse(&reader, 0).unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn validate_catches_bad_cluster_reference() {
        let d = content(b'A', "x", "x");
        assert!(d.validate(1, 10).is_err());
        assert!(d.validate(3, 10).is_ok());
    }

    #[test]
    fn ordering_keys_sort_by_namespace_then_string() {
        let a = content(b'A', "a.html", "");
        let b = content(b'A', "b.html", "");
        let x = content(b'X', "a.html", "");
        assert!(url_key(&a) < url_key(&b));
        assert!(url_key(&b) < url_key(&x));
    }
}
