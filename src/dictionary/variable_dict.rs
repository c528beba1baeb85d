//! Variable dictionary (C2): deduplicates string variables.
//!
//! Value-file binary format: `[count: u32 LE][total_data_len: u32 LE]
//! [(offset,length): u32 x count][utf8 bytes]`, in dense-id order.

use std::io::Write;

use crate::dictionary::arena::DictionaryArena;
use crate::dictionary::segindex::SegIndexEntry;
use crate::error::{ArchiveError, Result};

/// Writer + in-memory reader role for the variable dictionary.
pub struct VariableDictionary {
    arena: DictionaryArena<String, String>,
}

impl VariableDictionary {
    pub fn new() -> Self {
        Self {
            arena: DictionaryArena::new(),
        }
    }

    /// Insert `value` if new, else return its existing id. `(id, is_new)`.
    pub fn add_occurrence(&mut self, value: &str) -> (u64, bool) {
        self.arena.insert_or_get(value.to_string(), || value.to_string())
    }

    pub fn get_value(&self, id: u64) -> Option<&str> {
        self.arena.get(id).map(|s| s.as_str())
    }

    pub fn get_entry_matching_value(&self, s: &str, ignore_case: bool) -> Option<(u64, &str)> {
        self.arena.iter().find(|(_, v)| {
            if ignore_case {
                v.eq_ignore_ascii_case(s)
            } else {
                v.as_str() == s
            }
        })
    }

    pub fn get_entries_matching_wildcard(&self, pattern: &str, ignore_case: bool) -> Vec<(u64, &str)> {
        self.arena
            .iter()
            .filter(|(_, v)| wildcard_match(pattern, v, ignore_case))
            .collect()
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

    /// Serialize the ids pending their first flush into the value-file
    /// format, and the segment-index entries for them. Called once per
    /// segment close; each id is flushed exactly once regardless of how many
    /// later segments also reference it.
    pub fn flush_pending(&mut self) -> (Vec<u64>, Vec<String>) {
        let ids = self.arena.take_pending_flush();
        let values = ids
            .iter()
            .map(|&id| self.arena.get(id).cloned().unwrap_or_default())
            .collect();
        (ids, values)
    }

    pub fn segindex_entries_for_segment(&self, segment_id: u64, ids: &std::collections::HashSet<u64>) -> Vec<SegIndexEntry> {
        ids.iter().map(|&id| SegIndexEntry::new(id, segment_id)).collect()
    }

    /// Reload a value recovered from `var.dict` when reopening an archive.
    /// Caller must replay values in dense-id order (the order
    /// `read_all_value_file_chunks` returns them in).
    pub fn load_existing(&mut self, value: String) -> u64 {
        self.arena.load_existing(value.clone(), value)
    }

    pub fn set_segments_containing(&mut self, id: u64, segments: std::collections::HashSet<u64>) {
        self.arena.set_segments_containing(id, segments);
    }
}

impl Default for VariableDictionary {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only reader built from a value file's bytes: bounds/UTF-8 validated,
/// no dedup index rebuilt since the reader never inserts.
pub struct VariableDictionaryReader {
    values: Vec<String>,
}

impl VariableDictionaryReader {
    pub fn into_values(self) -> Vec<String> {
        self.values
    }

    pub fn get_value(&self, id: u64) -> Option<&str> {
        self.values.get(id as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get_entries_matching_wildcard(&self, pattern: &str, ignore_case: bool) -> Vec<(u64, &str)> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| wildcard_match(pattern, v, ignore_case))
            .map(|(i, v)| (i as u64, v.as_str()))
            .collect()
    }
}

/// Write all entries in `values` (dense id order) to the value-file format.
pub fn write_value_file<W: Write>(values: &[String], writer: &mut W) -> Result<()> {
    let mut entries: Vec<(u32, u32)> = Vec::with_capacity(values.len());
    let mut data = Vec::new();
    for v in values {
        let offset = data.len() as u32;
        data.extend_from_slice(v.as_bytes());
        entries.push((offset, v.len() as u32));
    }
    writer.write_all(&(values.len() as u32).to_le_bytes())?;
    writer.write_all(&(data.len() as u32).to_le_bytes())?;
    for (offset, length) in &entries {
        writer.write_all(&offset.to_le_bytes())?;
        writer.write_all(&length.to_le_bytes())?;
    }
    writer.write_all(&data)?;
    Ok(())
}

pub fn read_value_file(bytes: &[u8]) -> Result<VariableDictionaryReader> {
    if bytes.len() < 8 {
        return Err(ArchiveError::Corrupt("value file too small".into()));
    }
    let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let data_len = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;

    let entries_start = 8;
    let entries_len = count * 8;
    if bytes.len() < entries_start + entries_len {
        return Err(ArchiveError::Corrupt("value file entry table truncated".into()));
    }
    let data_start = entries_start + entries_len;
    if bytes.len() < data_start + data_len {
        return Err(ArchiveError::Corrupt("value file data truncated".into()));
    }
    let data = &bytes[data_start..data_start + data_len];

    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        let base = entries_start + i * 8;
        let offset = u32::from_le_bytes(bytes[base..base + 4].try_into().unwrap()) as usize;
        let length = u32::from_le_bytes(bytes[base + 4..base + 8].try_into().unwrap()) as usize;
        if offset + length > data.len() {
            return Err(ArchiveError::Corrupt("value file entry out of bounds".into()));
        }
        let s = std::str::from_utf8(&data[offset..offset + length])
            .map_err(|_| ArchiveError::Corrupt("value file contains invalid UTF-8".into()))?;
        values.push(s.to_string());
    }
    Ok(VariableDictionaryReader { values })
}

/// Parse a single append-only flush chunk (one `write_value_file` call's
/// worth of bytes) and report how many bytes it occupied, so a value file
/// made of many flush chunks concatenated back to back can be parsed
/// sequentially without a global offset table.
pub fn read_value_file_chunk(bytes: &[u8]) -> Result<(Vec<String>, usize)> {
    if bytes.len() < 8 {
        return Err(ArchiveError::Corrupt("value file chunk too small".into()));
    }
    let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let data_len = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let consumed = 8 + count * 8 + data_len;
    if bytes.len() < consumed {
        return Err(ArchiveError::Corrupt("value file chunk truncated".into()));
    }
    let reader = read_value_file(&bytes[..consumed])?;
    Ok((reader.into_values(), consumed))
}

/// Parse every flush chunk in `bytes`, in dense-id order (each chunk's ids
/// immediately follow the previous chunk's, since ids are assigned densely
/// and each id is flushed exactly once).
pub fn read_all_value_file_chunks(bytes: &[u8]) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let (mut values, consumed) = read_value_file_chunk(&bytes[pos..])?;
        out.append(&mut values);
        pos += consumed;
    }
    Ok(out)
}

/// Minimal `*`/`?` glob matcher (no dependency needed for this small grammar).
pub fn wildcard_match(pattern: &str, text: &str, ignore_case: bool) -> bool {
    let (pattern, text) = if ignore_case {
        (pattern.to_ascii_lowercase(), text.to_ascii_lowercase())
    } else {
        (pattern.to_string(), text.to_string())
    };
    wildcard_match_bytes(pattern.as_bytes(), text.as_bytes())
}

fn wildcard_match_bytes(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            wildcard_match_bytes(&pattern[1..], text)
                || (!text.is_empty() && wildcard_match_bytes(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => wildcard_match_bytes(&pattern[1..], &text[1..]),
        (Some(&p), Some(&t)) if p == t => wildcard_match_bytes(&pattern[1..], &text[1..]),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn add_occurrence_dedupes() {
        let mut dict = VariableDictionary::new();
        let (id1, new1) = dict.add_occurrence("server-9");
        let (id2, new2) = dict.add_occurrence("server-9");
        assert_eq!(id1, id2);
        assert!(new1);
        assert!(!new2);
        assert_eq!(dict.get_value(id1), Some("server-9"));
    }

    #[test]
    fn index_segment_tracks_membership() {
        let mut dict = VariableDictionary::new();
        let (id, _) = dict.add_occurrence("x");
        let mut ids = HashSet::new();
        ids.insert(id);
        dict.index_segment(3, &ids);
        assert!(dict.arena.segments_containing(id).unwrap().contains(&3));
    }

    #[test]
    fn value_file_roundtrip() {
        let values = vec!["hello".to_string(), "world".to_string(), "".to_string()];
        let mut buf = Vec::new();
        write_value_file(&values, &mut buf).unwrap();
        let reader = read_value_file(&buf).unwrap();
        assert_eq!(reader.len(), 3);
        assert_eq!(reader.get_value(0), Some("hello"));
        assert_eq!(reader.get_value(1), Some("world"));
        assert_eq!(reader.get_value(2), Some(""));
    }

    #[test]
    fn value_file_rejects_truncated_data() {
        let buf = vec![1, 0, 0, 0, 100, 0, 0, 0]; // claims 1 entry, 100 bytes data
        assert!(read_value_file(&buf).is_err());
    }

    #[test]
    fn chunked_reader_parses_two_flush_batches_back_to_back() {
        let mut buf = Vec::new();
        write_value_file(&["a".to_string(), "b".to_string()], &mut buf).unwrap();
        write_value_file(&["c".to_string()], &mut buf).unwrap();
        let values = read_all_value_file_chunks(&buf).unwrap();
        assert_eq!(values, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn wildcard_matches_star_and_question() {
        assert!(wildcard_match("server-*", "server-9", false));
        assert!(wildcard_match("serv?r-9", "server-9", false));
        assert!(!wildcard_match("server-*", "client-9", false));
        assert!(wildcard_match("SERVER*", "server-9", true));
        assert!(!wildcard_match("SERVER*", "server-9", false));
    }

    #[test]
    fn get_entries_matching_wildcard_returns_all_hits() {
        let mut dict = VariableDictionary::new();
        dict.add_occurrence("server-1");
        dict.add_occurrence("server-2");
        dict.add_occurrence("client-1");
        let hits = dict.get_entries_matching_wildcard("server-*", false);
        assert_eq!(hits.len(), 2);
    }
}
