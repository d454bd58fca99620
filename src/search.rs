//! Search glue.
//!
//! Building or querying a real full-text/suggestion index is an external
//! collaborator's job (a xapian binding, typically): this module only
//! locates the index blob an external engine would consume, and provides
//! the always-available linear-scan fallback used when no such engine is
//! wired in.

use crate::archive::{Archive, Entry};
use crate::error::Result;
use crate::namespace::Namespace;

const FULLTEXT_PATH: &str = "fulltext/xapian";
const LEGACY_FULLTEXT_NAMESPACE: Namespace = Namespace(b'Z');
const LEGACY_FULLTEXT_PATH: &str = "fulltextIndex/xapian";

/// Locates the archive's full-text index item, if one was embedded at
/// creation time. Checks the modern `X/fulltext/xapian` path first, then
/// falls back to the legacy `Z/fulltextIndex/xapian` path older archives
/// use. The returned [`Entry`]'s raw bytes are whatever an external xapian
/// reader would load; this crate does not parse them.
pub fn find_fulltext_index(archive: &Archive) -> Result<Option<Entry>> {
    if let Some(entry) = archive.find_by_path(Namespace::FULLTEXT_INDEX, FULLTEXT_PATH)? {
        log::debug!("found modern fulltext index at X/{FULLTEXT_PATH}");
        return Ok(Some(entry));
    }
    let legacy = archive.find_by_path(LEGACY_FULLTEXT_NAMESPACE, LEGACY_FULLTEXT_PATH)?;
    if legacy.is_some() {
        log::debug!("found legacy fulltext index at Z/{LEGACY_FULLTEXT_PATH}");
    }
    Ok(legacy)
}

/// A single suggestion result: the matched entry and how it matched.
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub entry: Entry,
    pub matched_title: String,
}

/// The always-available suggestion fallback: a linear scan of `ns`'s
/// entries in title order, matching on a case-insensitive title prefix.
/// Used when no external search engine is attached, or as a baseline to
/// compare a real engine's results against. `limit` caps the number of
/// results returned; a value of `0` means unlimited.
pub fn suggest_by_title_prefix(
    archive: &Archive,
    ns: Namespace,
    query: &str,
    limit: usize,
) -> Result<Vec<Suggestion>> {
    let query_lower = query.to_lowercase();
    let mut results = Vec::new();
    for entry in archive.iter_by_title() {
        let entry = entry?;
        if entry.namespace() != ns {
            continue;
        }
        if entry.title().to_lowercase().starts_with(&query_lower) {
            results.push(Suggestion { matched_title: entry.title().to_string(), entry });
            if limit != 0 && results.len() >= limit {
                break;
            }
        }
    }
    Ok(results)
}

/// Resolves a document identified by `(namespace, path)` to the [`Entry`]
/// that carries its content, following redirects. This is the seam an
/// external indexer's doc-id-to-path mapping would call back through: it
/// resolves the doc-id to a path on its own, then hands the path to this
/// function to get the actual archive entry.
pub fn resolve_document(archive: &Archive, namespace: Namespace, path: &str) -> Result<Option<Entry>> {
    match archive.find_by_path(namespace, path)? {
        Some(entry) => Ok(Some(archive.resolve(&entry)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{Config, Creator};

    fn build_archive() -> Archive {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.zim");
        let mut creator = Creator::new(Config::default()).unwrap();
        creator
            .add_item_with_title(Namespace::ARTICLES, "a", "Rust Programming", "text/html", b"x".to_vec())
            .unwrap();
        creator
            .add_item_with_title(Namespace::ARTICLES, "b", "Rusty Nails", "text/html", b"y".to_vec())
            .unwrap();
        creator
            .add_item_with_title(Namespace::ARTICLES, "c", "Cooking", "text/html", b"z".to_vec())
            .unwrap();
        creator.finish(&path).unwrap();
        Archive::open(&path).unwrap()
    }

    #[test]
    fn no_fulltext_index_present() {
        let archive = build_archive();
        assert!(find_fulltext_index(&archive).unwrap().is_none());
    }

    #[test]
    fn title_prefix_suggestions_are_case_insensitive() {
        let archive = build_archive();
        let results = suggest_by_title_prefix(&archive, Namespace::ARTICLES, "rust", 0).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.matched_title == "Rust Programming"));
        assert!(results.iter().any(|r| r.matched_title == "Rusty Nails"));
    }

    #[test]
    fn suggestion_limit_is_honored() {
        let archive = build_archive();
        let results = suggest_by_title_prefix(&archive, Namespace::ARTICLES, "rust", 1).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn resolve_document_follows_redirects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resolve.zim");
        let mut creator = Creator::new(Config::default()).unwrap();
        creator.add_item(Namespace::ARTICLES, "a", "text/html", b"alpha".to_vec()).unwrap();
        creator.add_redirect(Namespace::ARTICLES, "home", "A/a").unwrap();
        creator.finish(&path).unwrap();
        let archive = Archive::open(&path).unwrap();

        let resolved = resolve_document(&archive, Namespace::ARTICLES, "home").unwrap().unwrap();
        assert_eq!(resolved.path(), "a");
        assert!(resolve_document(&archive, Namespace::ARTICLES, "missing").unwrap().is_none());
    }
}
