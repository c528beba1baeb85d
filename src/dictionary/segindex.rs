//! On-disk segment-index file format shared by all three dictionaries: an
//! append-only sequence of `(dictionary_id, segment_id)` pairs, one pair per id
//! that occurred in a segment, written once per segment close.
//!
//! Fixed-size `#[repr(C)]` entry, its size asserted with `mem::size_of` in a
//! test so the on-disk layout can't silently drift.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};

use crate::error::{ArchiveError, Result};

/// Single (dictionary id, segment id) occurrence record -- exactly 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SegIndexEntry {
    pub dict_id: u64,
    pub segment_id: u64,
}

impl SegIndexEntry {
    pub fn new(dict_id: u64, segment_id: u64) -> Self {
        Self { dict_id, segment_id }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.dict_id.to_le_bytes())?;
        w.write_all(&self.segment_id.to_le_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; 16];
        r.read_exact(&mut buf)
            .map_err(|e| ArchiveError::Corrupt(format!("truncated segment-index entry: {e}")))?;
        Ok(Self {
            dict_id: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            segment_id: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
        })
    }

    pub fn write_batch<W: Write>(entries: &[SegIndexEntry], w: &mut W) -> Result<()> {
        for e in entries {
            e.write_to(w)?;
        }
        Ok(())
    }

    /// Read every `(dict_id, segment_id)` pair in `bytes` and fold them into a
    /// `dict_id -> {segment_id}` map.
    pub fn read_all_into_map(bytes: &[u8]) -> Result<HashMap<u64, HashSet<u64>>> {
        if bytes.len() % 16 != 0 {
            return Err(ArchiveError::Corrupt(
                "segment-index file length is not a multiple of entry size".into(),
            ));
        }
        let mut map: HashMap<u64, HashSet<u64>> = HashMap::new();
        let mut cursor = bytes;
        while !cursor.is_empty() {
            let entry = SegIndexEntry::read_from(&mut cursor)?;
            map.entry(entry.dict_id).or_default().insert(entry.segment_id);
        }
        Ok(map)
    }
}
