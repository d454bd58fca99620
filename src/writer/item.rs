//! Writer-side content source.

use crate::cluster::BlobProvider;
use crate::namespace::Namespace;

/// One item a caller hands the [`super::Creator`]. The default
/// implementation of [`Item::should_compress`] derives a hint from the MIME
/// type, matching the "derive hints ... from MIME unless overridden" ingest
/// rule; a caller with better information can override it.
pub trait Item: Send {
    fn namespace(&self) -> Namespace;
    fn path(&self) -> &str;
    fn title(&self) -> &str;
    fn mime_type(&self) -> &str;
    fn content_provider(self: Box<Self>) -> Box<dyn BlobProvider>;

    fn should_compress(&self) -> bool {
        default_should_compress(self.mime_type())
    }
}

pub(super) fn default_should_compress(mime_type: &str) -> bool {
    !(mime_type.starts_with("image/") && mime_type != "image/svg+xml")
}

/// A minimal [`Item`] backed by an in-memory byte vector, used for simple
/// callers and by the test suite.
pub struct BytesItem {
    pub namespace: Namespace,
    pub path: String,
    pub title: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Item for BytesItem {
    fn namespace(&self) -> Namespace {
        self.namespace
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn content_provider(self: Box<Self>) -> Box<dyn BlobProvider> {
        Box::new(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_default_to_uncompressed_except_svg() {
        assert!(!default_should_compress("image/png"));
        assert!(default_should_compress("image/svg+xml"));
        assert!(default_should_compress("text/html"));
    }
}
