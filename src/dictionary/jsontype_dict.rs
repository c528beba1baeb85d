//! Jsontype dictionary (C4): deduplicates rewritten JSON documents.
//!
//! Keyed by the serialized document bytes with each leaf value replaced by
//! its delimiter byte (and, for `Double`, one trailing packed digit-count
//! byte; for `LogType`, the decimal id of a nested logtype entry).
//! Structurally this entry carries only `num_vars` beyond the value bytes --
//! unlike a logtype entry, decode walks the *parsed* document tree rather
//! than re-scanning flat bytes, so no `var_info` array is needed here.
//! `value` is raw bytes rather than a `String`: a packed `Double` marker byte
//! is not guaranteed to be valid UTF-8 on its own, so the document is
//! serialized with a custom byte-level writer (see `json_codec`) instead of
//! `serde_json::to_string`.

use std::io::Write;

use crate::dictionary::arena::DictionaryArena;
use crate::dictionary::segindex::SegIndexEntry;
use crate::error::{ArchiveError, Result};

#[derive(Debug, Clone)]
pub struct JsontypeEntry {
    pub value: Vec<u8>,
    pub num_vars: usize,
}

pub struct JsontypeDictionary {
    arena: DictionaryArena<Vec<u8>, JsontypeEntry>,
}

impl JsontypeDictionary {
    pub fn new() -> Self {
        Self { arena: DictionaryArena::new() }
    }

    pub fn insert_or_get(&mut self, value: Vec<u8>, num_vars: usize) -> (u64, bool) {
        let key = value.clone();
        self.arena.insert_or_get(key, move || JsontypeEntry { value, num_vars })
    }

    pub fn get_entry(&self, id: u64) -> Option<&JsontypeEntry> {
        self.arena.get(id)
    }

    pub fn index_segment(&mut self, segment_id: u64, ids: &std::collections::HashSet<u64>) {
        self.arena.index_segment(segment_id, ids);
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn flush_pending(&mut self) -> Vec<(u64, JsontypeEntry)> {
        self.arena
            .take_pending_flush()
            .into_iter()
            .map(|id| (id, self.arena.get(id).cloned().unwrap()))
            .collect()
    }

    pub fn segindex_entries_for_segment(&self, segment_id: u64, ids: &std::collections::HashSet<u64>) -> Vec<SegIndexEntry> {
        ids.iter().map(|&id| SegIndexEntry::new(id, segment_id)).collect()
    }

    /// Reload an entry recovered from `jsontype.dict` when reopening an
    /// archive. Caller must replay entries in dense-id order.
    pub fn load_existing(&mut self, entry: JsontypeEntry) -> u64 {
        let key = entry.value.clone();
        self.arena.load_existing(key, entry)
    }

    pub fn set_segments_containing(&mut self, id: u64, segments: std::collections::HashSet<u64>) {
        self.arena.set_segments_containing(id, segments);
    }
}

impl Default for JsontypeDictionary {
    fn default() -> Self {
        Self::new()
    }
}

/// Same fixed-metadata-then-value layout as the logtype dictionary's value
/// file, minus the verbosity byte: `[num_vars: u32][value_len: u32][value bytes]`.
pub fn write_value_file<W: Write>(entries: &[(u64, JsontypeEntry)], writer: &mut W) -> Result<()> {
    writer.write_all(&(entries.len() as u32).to_le_bytes())?;
    for (_id, entry) in entries {
        writer.write_all(&(entry.num_vars as u32).to_le_bytes())?;
        writer.write_all(&(entry.value.len() as u32).to_le_bytes())?;
        writer.write_all(&entry.value)?;
    }
    Ok(())
}

pub fn read_value_file(bytes: &[u8]) -> Result<Vec<JsontypeEntry>> {
    let (entries, _consumed) = read_value_file_chunk(bytes)?;
    Ok(entries)
}

/// Parse a single append-only flush chunk, reporting how many bytes it
/// occupied (see `variable_dict::read_all_value_file_chunks`).
pub fn read_value_file_chunk(bytes: &[u8]) -> Result<(Vec<JsontypeEntry>, usize)> {
    if bytes.len() < 4 {
        return Err(ArchiveError::Corrupt("jsontype value file too small".into()));
    }
    let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let mut pos = 4;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        if pos + 8 > bytes.len() {
            return Err(ArchiveError::Corrupt("jsontype entry header truncated".into()));
        }
        let num_vars = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        let value_len = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
        pos += 8;
        if pos + value_len > bytes.len() {
            return Err(ArchiveError::Corrupt("jsontype entry value truncated".into()));
        }
        let value = bytes[pos..pos + value_len].to_vec();
        pos += value_len;
        out.push(JsontypeEntry { value, num_vars });
    }
    Ok((out, pos))
}

pub fn read_all_value_file_chunks(bytes: &[u8]) -> Result<Vec<JsontypeEntry>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let (mut entries, consumed) = read_value_file_chunk(&bytes[pos..])?;
        out.append(&mut entries);
        pos += consumed;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_or_get_dedupes_by_document_text() {
        let mut dict = JsontypeDictionary::new();
        let (id1, new1) = dict.insert_or_get(br#"{"a":1}"#.to_vec(), 1);
        let (id2, new2) = dict.insert_or_get(br#"{"a":1}"#.to_vec(), 1);
        assert_eq!(id1, id2);
        assert!(new1);
        assert!(!new2);
    }

    #[test]
    fn distinct_documents_get_distinct_ids() {
        let mut dict = JsontypeDictionary::new();
        let (id1, _) = dict.insert_or_get(br#"{"a":1}"#.to_vec(), 1);
        let (id2, _) = dict.insert_or_get(br#"{"a":2}"#.to_vec(), 1);
        assert_ne!(id1, id2);
    }

    #[test]
    fn value_file_roundtrip() {
        let entries = vec![
            (0, JsontypeEntry { value: br#"{"a":1}"#.to_vec(), num_vars: 1 }),
            (1, JsontypeEntry { value: b"{}".to_vec(), num_vars: 0 }),
        ];
        let mut buf = Vec::new();
        write_value_file(&entries, &mut buf).unwrap();
        let parsed = read_value_file(&buf).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].value, br#"{"a":1}"#);
        assert_eq!(parsed[0].num_vars, 1);
        assert_eq!(parsed[1].value, b"{}");
    }

    #[test]
    fn value_file_rejects_truncated_data() {
        let buf = vec![1, 0, 0, 0, 5, 0, 0, 0, 200, 0, 0, 0]; // claims value_len 200 but no data
        assert!(read_value_file(&buf).is_err());
    }
}
