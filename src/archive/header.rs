//! Fixed file header.

use crate::error::{Error, Result};
use crate::io::reader::{read_at, Reader};
use uuid::Uuid;

pub const MAGIC_NUMBER: u32 = 72173914;
pub const HEADER_SIZE: usize = 80;

/// Sentinel index meaning "no main page" / "no layout page".
const NO_PAGE: u32 = 0xffff_ffff;

#[derive(Debug, Clone)]
pub struct FileHeader {
    pub major_version: u16,
    pub minor_version: u16,
    pub uuid: Uuid,
    pub article_count: u32,
    pub cluster_count: u32,
    pub url_ptr_pos: u64,
    pub title_ptr_pos: u64,
    pub cluster_ptr_pos: u64,
    pub mime_list_pos: u64,
    pub main_page: Option<u32>,
    pub layout_page: Option<u32>,
    pub checksum_pos: u64,
}

impl FileHeader {
    pub fn parse(reader: &dyn Reader) -> Result<FileHeader> {
        let magic: u32 = read_at(reader, 0)?;
        if magic != MAGIC_NUMBER {
            return Err(Error::format(format!(
                "bad magic number: expected {MAGIC_NUMBER}, found {magic}"
            )));
        }
        let major_version: u16 = read_at(reader, 4)?;
        let minor_version: u16 = read_at(reader, 6)?;

        let mut uuid_bytes = [0u8; 16];
        reader.read(&mut uuid_bytes, 8, 16)?;
        let uuid = Uuid::from_bytes(uuid_bytes);

        let article_count: u32 = read_at(reader, 24)?;
        let cluster_count: u32 = read_at(reader, 28)?;
        let url_ptr_pos: u64 = read_at(reader, 32)?;
        let title_ptr_pos: u64 = read_at(reader, 40)?;
        let cluster_ptr_pos: u64 = read_at(reader, 48)?;
        let mime_list_pos: u64 = read_at(reader, 56)?;
        let main_page: u32 = read_at(reader, 64)?;
        let layout_page: u32 = read_at(reader, 68)?;
        let checksum_pos: u64 = read_at(reader, 72)?;

        Ok(FileHeader {
            major_version,
            minor_version,
            uuid,
            article_count,
            cluster_count,
            url_ptr_pos,
            title_ptr_pos,
            cluster_ptr_pos,
            mime_list_pos,
            main_page: none_if_sentinel(main_page),
            layout_page: none_if_sentinel(layout_page),
            checksum_pos,
        })
    }

    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
        out[4..6].copy_from_slice(&self.major_version.to_le_bytes());
        out[6..8].copy_from_slice(&self.minor_version.to_le_bytes());
        out[8..24].copy_from_slice(self.uuid.as_bytes());
        out[24..28].copy_from_slice(&self.article_count.to_le_bytes());
        out[28..32].copy_from_slice(&self.cluster_count.to_le_bytes());
        out[32..40].copy_from_slice(&self.url_ptr_pos.to_le_bytes());
        out[40..48].copy_from_slice(&self.title_ptr_pos.to_le_bytes());
        out[48..56].copy_from_slice(&self.cluster_ptr_pos.to_le_bytes());
        out[56..64].copy_from_slice(&self.mime_list_pos.to_le_bytes());
        out[64..68].copy_from_slice(&self.main_page.unwrap_or(NO_PAGE).to_le_bytes());
        out[68..72].copy_from_slice(&self.layout_page.unwrap_or(NO_PAGE).to_le_bytes());
        out[72..80].copy_from_slice(&self.checksum_pos.to_le_bytes());
        out
    }
}

fn none_if_sentinel(value: u32) -> Option<u32> {
    if value == NO_PAGE {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::buffer::Buffer;
    use crate::io::reader::BufferReader;

    #[test]
    fn header_round_trips() {
        let header = FileHeader {
            major_version: 6,
            minor_version: 1,
            uuid: Uuid::from_bytes([7; 16]),
            article_count: 100,
            cluster_count: 10,
            url_ptr_pos: 1000,
            title_ptr_pos: 2000,
            cluster_ptr_pos: 3000,
            mime_list_pos: 80,
            main_page: Some(5),
            layout_page: None,
            checksum_pos: 9000,
        };
        let bytes = header.serialize();
        let reader = BufferReader::new(Buffer::from_vec(bytes.to_vec()));
        let parsed = FileHeader::parse(&reader).unwrap();
        assert_eq!(parsed.major_version, 6);
        assert_eq!(parsed.main_page, Some(5));
        assert_eq!(parsed.layout_page, None);
        assert_eq!(parsed.uuid, header.uuid);
    }

    #[test]
    fn bad_magic_rejected() {
        let bytes = [0u8; HEADER_SIZE];
        let reader = BufferReader::new(Buffer::from_vec(bytes.to_vec()));
        assert!(FileHeader::parse(&reader).is_err());
    }
}
