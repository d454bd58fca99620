//! URL/title/cluster pointer tables.

use crate::error::Result;
use crate::io::reader::{read_at, Reader};

/// A flat list of `u64` offsets (the URL and cluster pointer tables).
#[derive(Debug, Clone, Default)]
pub struct OffsetTable {
    offsets: Vec<u64>,
}

impl OffsetTable {
    pub fn parse(reader: &dyn Reader, offset: usize, count: u32) -> Result<OffsetTable> {
        let mut offsets = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            offsets.push(read_at::<u64>(reader, offset + i * 8)?);
        }
        Ok(OffsetTable { offsets })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.offsets.len() * 8);
        for off in &self.offsets {
            out.extend_from_slice(&off.to_le_bytes());
        }
        out
    }

    pub fn get(&self, index: u32) -> Option<u64> {
        self.offsets.get(index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn push(&mut self, offset: u64) {
        self.offsets.push(offset);
    }
}

/// The title pointer table: a permutation of dirent indices stored as
/// `u32`s, ordered by `(namespace, title)` rather than `(namespace, path)`.
#[derive(Debug, Clone, Default)]
pub struct TitleTable {
    indices: Vec<u32>,
}

impl TitleTable {
    pub fn parse(reader: &dyn Reader, offset: usize, count: u32) -> Result<TitleTable> {
        let mut indices = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            indices.push(read_at::<u32>(reader, offset + i * 4)?);
        }
        Ok(TitleTable { indices })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.indices.len() * 4);
        for idx in &self.indices {
            out.extend_from_slice(&idx.to_le_bytes());
        }
        out
    }

    pub fn get(&self, index: u32) -> Option<u32> {
        self.indices.get(index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn push(&mut self, dirent_index: u32) {
        self.indices.push(dirent_index);
    }
}

/// Binary searches `[0, len)` for `needle`, where `key_at(i)` returns the
/// sort key at position `i`. Used for both the URL table (keyed by path)
/// and the title table (keyed by title), since both are simple sorted
/// index permutations over the same comparator shape.
pub fn binary_search_by_key<T: Ord>(
    len: u32,
    needle: &T,
    key_at: impl FnMut(u32) -> Result<T>,
) -> Result<std::result::Result<u32, u32>> {
    binary_search_range(0, len, needle, key_at)
}

/// Binary searches `[lo, hi)` for `needle`. On a miss, `Err` carries the
/// insertion point — equivalently, the lower bound of `needle` within the
/// range, which namespace bounding in `archive::Archive` relies on.
pub fn binary_search_range<T: Ord>(
    lo: u32,
    hi: u32,
    needle: &T,
    mut key_at: impl FnMut(u32) -> Result<T>,
) -> Result<std::result::Result<u32, u32>> {
    let mut lo = lo as i64;
    let mut hi = hi as i64 - 1;
    while lo <= hi {
        let mid = lo + (hi - lo) / 2;
        let key = key_at(mid as u32)?;
        match key.cmp(needle) {
            std::cmp::Ordering::Equal => return Ok(Ok(mid as u32)),
            std::cmp::Ordering::Less => lo = mid + 1,
            std::cmp::Ordering::Greater => hi = mid - 1,
        }
    }
    Ok(Err(lo as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::buffer::Buffer;
    use crate::io::reader::BufferReader;

    #[test]
    fn offset_table_round_trips() {
        let mut table = OffsetTable::default();
        table.push(100);
        table.push(250);
        table.push(9999);
        let bytes = table.serialize();
        let reader = BufferReader::new(Buffer::from_vec(bytes));
        let parsed = OffsetTable::parse(&reader, 0, 3).unwrap();
        assert_eq!(parsed.get(1), Some(250));
        assert_eq!(parsed.get(5), None);
    }

    #[test]
    fn title_table_round_trips() {
        let mut table = TitleTable::default();
        table.push(3);
        table.push(0);
        table.push(1);
        let bytes = table.serialize();
        let reader = BufferReader::new(Buffer::from_vec(bytes));
        let parsed = TitleTable::parse(&reader, 0, 3).unwrap();
        assert_eq!(parsed.get(0), Some(3));
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn binary_search_finds_present_and_absent_keys() {
        let keys = vec!["apple", "banana", "cherry", "date"];
        let found = binary_search_by_key(keys.len() as u32, &"cherry", |i| {
            Ok(keys[i as usize].to_string())
        })
        .unwrap();
        assert_eq!(found, Ok(2));

        let missing = binary_search_by_key(keys.len() as u32, &"blueberry", |i| {
            Ok(keys[i as usize].to_string())
        })
        .unwrap();
        assert_eq!(missing, Err(2));
    }
}
