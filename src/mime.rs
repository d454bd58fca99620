//! MIME type list referenced by 16-bit index from dirents.

use crate::error::{Error, Result};
use crate::io::reader::{read_cstring, Reader};

/// Dirent MIME-index sentinels; never resolved against the MIME list.
pub const MIME_REDIRECT: u16 = 0xFFFF;
pub const MIME_LINK_TARGET: u16 = 0xFFFE;
pub const MIME_DELETED: u16 = 0xFFFD;

/// The list of MIME type strings referenced by 16-bit index from dirents.
///
/// On disk this is a run of NUL-terminated ASCII strings ending in an extra
/// NUL (an empty string terminates the list).
#[derive(Debug, Clone, Default)]
pub struct MimeTypeList {
    entries: Vec<String>,
}

impl MimeTypeList {
    pub fn parse(reader: &dyn Reader, offset: usize) -> Result<(MimeTypeList, usize)> {
        let mut entries = Vec::new();
        let mut pos = offset;
        loop {
            let (s, next) = read_cstring(reader, pos)?;
            pos = next;
            if s.is_empty() {
                break;
            }
            entries.push(s);
        }
        Ok((MimeTypeList { entries }, pos))
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(entry.as_bytes());
            out.push(0);
        }
        out.push(0);
        out
    }

    pub fn get(&self, index: u16) -> Result<&str> {
        self.entries
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| Error::format(format!("mime index {index} out of range")))
    }

    /// Returns the index of `mime_type`, inserting it at the end if it is
    /// not already present (used by the writer).
    pub fn index_of_or_insert(&mut self, mime_type: &str) -> Result<u16> {
        if let Some(pos) = self.entries.iter().position(|e| e == mime_type) {
            return u16::try_from(pos).map_err(|_| Error::format("too many mime types"));
        }
        let idx = self.entries.len();
        if idx as u32 >= MIME_DELETED as u32 {
            return Err(Error::format("too many distinct mime types"));
        }
        self.entries.push(mime_type.to_string());
        Ok(idx as u16)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::buffer::Buffer;
    use crate::io::reader::BufferReader;

    #[test]
    fn parse_round_trips_through_serialize() {
        let mut list = MimeTypeList::default();
        list.index_of_or_insert("text/html").unwrap();
        list.index_of_or_insert("image/png").unwrap();
        let bytes = list.serialize();

        let reader = BufferReader::new(Buffer::from_vec(bytes));
        let (parsed, end) = MimeTypeList::parse(&reader, 0).unwrap();
        assert_eq!(end, reader.size());
        assert_eq!(parsed.get(0).unwrap(), "text/html");
        assert_eq!(parsed.get(1).unwrap(), "image/png");
        assert!(parsed.get(2).is_err());
    }

    #[test]
    fn index_of_or_insert_is_idempotent() {
        let mut list = MimeTypeList::default();
        let a = list.index_of_or_insert("text/plain").unwrap();
        let b = list.index_of_or_insert("text/plain").unwrap();
        assert_eq!(a, b);
        assert_eq!(list.len(), 1);
    }
}
