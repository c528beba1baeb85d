//! Logtype dictionary (C3): deduplicates text-message templates.
//!
//! Keyed by the template bytes (original message with each variable token
//! replaced by a delimiter byte, per `src/delim.rs`). The reconstruction array
//! (`var_info`) is not persisted separately -- it is always re-derivable by
//! scanning the template bytes for delimiter markers, so the on-disk entry
//! only needs `verbosity`, `num_vars`, and `value` (mirroring the reference
//! `JsonTypeDictionaryEntry::write_to_file`'s id/num_vars/value-length/value
//! layout, adapted to this dictionary). `value` is raw bytes rather than a
//! `String`: a `Delim::Double` marker's digit-count suffix is a single packed
//! byte (high nibble `num_integer_digits`, low nibble `num_fractional_digits`)
//! and is not guaranteed to be valid UTF-8 on its own.

use std::io::Write;

use crate::delim::{Delim, LogVerbosity};
use crate::dictionary::arena::DictionaryArena;
use crate::dictionary::segindex::SegIndexEntry;
use crate::error::{ArchiveError, Result};

/// One reconstructable variable position inside a logtype template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInfo {
    /// Byte offset of the delimiter in `value`.
    pub position: usize,
    pub delim: Delim,
    /// Present only for `Delim::Double`: (num_integer_digits, num_fractional_digits).
    pub digit_counts: Option<(u8, u8)>,
}

/// Number of template bytes a `Delim::Double` marker occupies: the delimiter
/// byte itself plus one packed digit-count byte.
pub const DOUBLE_MARKER_LEN: usize = 2;

#[derive(Debug, Clone)]
pub struct LogtypeEntry {
    pub verbosity: LogVerbosity,
    pub value: Vec<u8>,
    pub num_vars: usize,
}

impl LogtypeEntry {
    /// Re-derive the variable-position array by scanning `value` for
    /// delimiter bytes. Always agrees with `num_vars` for well-formed entries
    /// (an invariant checked by `Archive` on read, per §7 Corrupt errors).
    pub fn scan_var_positions(&self) -> Result<Vec<VarInfo>> {
        scan_var_positions(&self.value)
    }
}

/// Walk a delimiter-substituted template and recover each variable's position
/// and kind. A `Double` delimiter consumes one trailing packed byte (high
/// nibble integer-digit count, low nibble fractional-digit count); a
/// `LogType` delimiter consumes the following run of ASCII digits (a decimal
/// logtype id) -- present for generality, though the text encoder (C7) itself
/// never emits `LogType`/`BooleanVar` (those appear only via the JSON encoder,
/// C6).
pub fn scan_var_positions(value: &[u8]) -> Result<Vec<VarInfo>> {
    let bytes = value;
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if let Some(delim) = Delim::from_byte(bytes[i]) {
            let position = i;
            match delim {
                Delim::Double => {
                    if i + DOUBLE_MARKER_LEN > bytes.len() {
                        return Err(ArchiveError::Corrupt(
                            "Double delimiter missing trailing digit-count byte".into(),
                        ));
                    }
                    let packed = bytes[i + 1];
                    let int_digits = packed >> 4;
                    let frac_digits = packed & 0x0F;
                    out.push(VarInfo { position, delim, digit_counts: Some((int_digits, frac_digits)) });
                    i += DOUBLE_MARKER_LEN;
                }
                Delim::LogType => {
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                    out.push(VarInfo { position, delim, digit_counts: None });
                }
                Delim::NonDouble | Delim::StringVar | Delim::BooleanVar => {
                    out.push(VarInfo { position, delim, digit_counts: None });
                    i += 1;
                }
            }
        } else {
            i += 1;
        }
    }
    Ok(out)
}

pub struct LogtypeDictionary {
    arena: DictionaryArena<Vec<u8>, LogtypeEntry>,
}

impl LogtypeDictionary {
    pub fn new() -> Self {
        Self { arena: DictionaryArena::new() }
    }

    /// Insert the template `value` if new; `num_vars` is the count of
    /// variables this template's encoder pass emitted.
    pub fn insert_or_get(&mut self, value: Vec<u8>, verbosity: LogVerbosity, num_vars: usize) -> (u64, bool) {
        let key = value.clone();
        self.arena.insert_or_get(key, move || LogtypeEntry { verbosity, value, num_vars })
    }

    pub fn get_entry(&self, id: u64) -> Option<&LogtypeEntry> {
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

    pub fn flush_pending(&mut self) -> Vec<(u64, LogtypeEntry)> {
        self.arena
            .take_pending_flush()
            .into_iter()
            .map(|id| (id, self.arena.get(id).cloned().unwrap()))
            .collect()
    }

    pub fn segindex_entries_for_segment(&self, segment_id: u64, ids: &std::collections::HashSet<u64>) -> Vec<SegIndexEntry> {
        ids.iter().map(|&id| SegIndexEntry::new(id, segment_id)).collect()
    }

    /// Reload an entry recovered from `logtype.dict` when reopening an
    /// archive. Caller must replay entries in dense-id order.
    pub fn load_existing(&mut self, entry: LogtypeEntry) -> u64 {
        let key = entry.value.clone();
        self.arena.load_existing(key, entry)
    }

    pub fn set_segments_containing(&mut self, id: u64, segments: std::collections::HashSet<u64>) {
        self.arena.set_segments_containing(id, segments);
    }
}

impl Default for LogtypeDictionary {
    fn default() -> Self {
        Self::new()
    }
}

/// Value-file entry record, fixed-size metadata followed by the variable-length
/// template bytes: `[verbosity: u8][_pad: u8x3][num_vars: u32][value_len: u32]`
/// then `value` bytes, all length-prefixed so entries can be scanned
/// sequentially without a separate offset table.
pub fn write_value_file<W: Write>(entries: &[(u64, LogtypeEntry)], writer: &mut W) -> Result<()> {
    writer.write_all(&(entries.len() as u32).to_le_bytes())?;
    for (_id, entry) in entries {
        writer.write_all(&[entry.verbosity as u8, 0, 0, 0])?;
        writer.write_all(&(entry.num_vars as u32).to_le_bytes())?;
        writer.write_all(&(entry.value.len() as u32).to_le_bytes())?;
        writer.write_all(&entry.value)?;
    }
    Ok(())
}

pub fn read_value_file(bytes: &[u8]) -> Result<Vec<LogtypeEntry>> {
    let (entries, _consumed) = read_value_file_chunk(bytes)?;
    Ok(entries)
}

/// Parse a single append-only flush chunk, reporting how many bytes it
/// occupied so callers can parse several chunks concatenated back to back
/// (see `variable_dict::read_all_value_file_chunks`).
pub fn read_value_file_chunk(bytes: &[u8]) -> Result<(Vec<LogtypeEntry>, usize)> {
    if bytes.len() < 4 {
        return Err(ArchiveError::Corrupt("logtype value file too small".into()));
    }
    let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let mut pos = 4;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        if pos + 12 > bytes.len() {
            return Err(ArchiveError::Corrupt("logtype entry header truncated".into()));
        }
        let verbosity_byte = bytes[pos];
        let verbosity = byte_to_verbosity(verbosity_byte);
        let num_vars = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
        let value_len = u32::from_le_bytes(bytes[pos + 8..pos + 12].try_into().unwrap()) as usize;
        pos += 12;
        if pos + value_len > bytes.len() {
            return Err(ArchiveError::Corrupt("logtype entry value truncated".into()));
        }
        let value = bytes[pos..pos + value_len].to_vec();
        pos += value_len;
        out.push(LogtypeEntry { verbosity, value, num_vars });
    }
    Ok((out, pos))
}

pub fn read_all_value_file_chunks(bytes: &[u8]) -> Result<Vec<LogtypeEntry>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let (mut entries, consumed) = read_value_file_chunk(&bytes[pos..])?;
        out.append(&mut entries);
        pos += consumed;
    }
    Ok(out)
}

fn byte_to_verbosity(b: u8) -> LogVerbosity {
    match b {
        0 => LogVerbosity::Fatal,
        1 => LogVerbosity::Error,
        2 => LogVerbosity::Warn,
        3 => LogVerbosity::Info,
        4 => LogVerbosity::Debug,
        5 => LogVerbosity::Trace,
        _ => LogVerbosity::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_or_get_dedupes_by_template() {
        let mut dict = LogtypeDictionary::new();
        let (id1, new1) = dict.insert_or_get(b"User <ND> logged in".to_vec(), LogVerbosity::Info, 1);
        let (id2, new2) = dict.insert_or_get(b"User <ND> logged in".to_vec(), LogVerbosity::Info, 1);
        assert_eq!(id1, id2);
        assert!(new1);
        assert!(!new2);
    }

    #[test]
    fn scan_var_positions_handles_nondouble_and_double() {
        let mut value = b"User ".to_vec();
        value.push(Delim::NonDouble.as_byte());
        value.extend_from_slice(b" logged in at ");
        value.push(Delim::Double.as_byte());
        value.push((2u8 << 4) | 1u8); // 2 int digits, 1 frac digit
        value.push(b's');

        let positions = scan_var_positions(&value).unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].delim, Delim::NonDouble);
        assert_eq!(positions[0].digit_counts, None);
        assert_eq!(positions[1].delim, Delim::Double);
        assert_eq!(positions[1].digit_counts, Some((2, 1)));
    }

    #[test]
    fn scan_var_positions_rejects_truncated_double() {
        let mut value = b"x".to_vec();
        value.push(Delim::Double.as_byte());
        assert!(scan_var_positions(&value).is_err());
    }

    #[test]
    fn value_file_roundtrip() {
        let entries = vec![
            (0, LogtypeEntry { verbosity: LogVerbosity::Info, value: b"a <ND>".to_vec(), num_vars: 1 }),
            (1, LogtypeEntry { verbosity: LogVerbosity::Error, value: b"b".to_vec(), num_vars: 0 }),
        ];
        let mut buf = Vec::new();
        write_value_file(&entries, &mut buf).unwrap();
        let parsed = read_value_file(&buf).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].value, b"a <ND>");
        assert_eq!(parsed[0].num_vars, 1);
        assert_eq!(parsed[1].verbosity, LogVerbosity::Error);
    }

    #[test]
    fn chunked_reader_parses_two_flush_batches_back_to_back() {
        let mut buf = Vec::new();
        write_value_file(&[(0, LogtypeEntry { verbosity: LogVerbosity::Info, value: b"a".to_vec(), num_vars: 0 })], &mut buf).unwrap();
        write_value_file(&[(1, LogtypeEntry { verbosity: LogVerbosity::Warn, value: b"b".to_vec(), num_vars: 0 })], &mut buf).unwrap();
        let entries = read_all_value_file_chunks(&buf).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].value, b"a");
        assert_eq!(entries[1].verbosity, LogVerbosity::Warn);
    }
}
