//! Column writer (C8): per-column buffering for the columnar side-channel
//! extracted from JSON records, parallel to the logtype/jsontype template
//! encoding.
//!
//! Three closed variants (`Int64`/`Float`/`StringId`) sharing the capability
//! `{add_value, bytes, size}` -- a compile-time-dispatched enum rather than a
//! trait object, the same choice made for `DictKind` in `dictionary/mod.rs`.
//! Binary layout is a fixed-width-vector-then-footer style, reusing the
//! variable dictionary's offset/length entry table for the string variant.

use crate::error::{ArchiveError, Result};

/// One value extracted from a JSON leaf for columnar storage, keyed
/// separately by dotted path (see `json_codec::EncodedJson::extracted_leaves`).
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnLeaf {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

/// A single column's accumulated values, one of three fixed-width/dictionary
/// encodings chosen by the first value ever written to that column key.
#[derive(Debug, Clone)]
pub enum ColumnWriter {
    Int64(Vec<i64>),
    Float(Vec<f64>),
    StringId {
        index: std::collections::HashMap<String, u32>,
        dict: Vec<String>,
        ids: Vec<u32>,
    },
}

impl ColumnWriter {
    pub fn new_int64() -> Self {
        ColumnWriter::Int64(Vec::new())
    }

    pub fn new_float() -> Self {
        ColumnWriter::Float(Vec::new())
    }

    pub fn new_string_id() -> Self {
        ColumnWriter::StringId {
            index: std::collections::HashMap::new(),
            dict: Vec::new(),
            ids: Vec::new(),
        }
    }

    /// A writer kind compatible with `leaf`'s type, used when a column key is
    /// seen for the first time.
    pub fn for_leaf(leaf: &ColumnLeaf) -> Self {
        match leaf {
            ColumnLeaf::Int(_) | ColumnLeaf::Bool(_) => ColumnWriter::new_int64(),
            ColumnLeaf::Float(_) => ColumnWriter::new_float(),
            ColumnLeaf::Str(_) => ColumnWriter::new_string_id(),
        }
    }

    /// Append one value. Errors if `leaf`'s type doesn't match the column's
    /// established kind -- a JSON field that changes type across records
    /// within one staged file is a `BadParam`, not silently coerced.
    pub fn add_value(&mut self, leaf: &ColumnLeaf) -> Result<()> {
        match (self, leaf) {
            (ColumnWriter::Int64(v), ColumnLeaf::Int(i)) => v.push(*i),
            (ColumnWriter::Int64(v), ColumnLeaf::Bool(b)) => v.push(if *b { 1 } else { 0 }),
            (ColumnWriter::Float(v), ColumnLeaf::Float(f)) => v.push(*f),
            (ColumnWriter::StringId { index, dict, ids }, ColumnLeaf::Str(s)) => {
                let id = if let Some(&id) = index.get(s) {
                    id
                } else {
                    let id = dict.len() as u32;
                    dict.push(s.clone());
                    index.insert(s.clone(), id);
                    id
                };
                ids.push(id);
            }
            _ => {
                return Err(ArchiveError::BadParam(
                    "column value type does not match the column's established kind".into(),
                ))
            }
        }
        Ok(())
    }

    /// Number of values appended so far.
    pub fn len(&self) -> usize {
        match self {
            ColumnWriter::Int64(v) => v.len(),
            ColumnWriter::Float(v) => v.len(),
            ColumnWriter::StringId { ids, .. } => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize to the per-column segment's byte layout:
    /// - `Int64`/`Float`: `[count: u32 LE][values: T x count, LE]`.
    /// - `StringId`: `[dict_count: u32][dict_data_len: u32]
    ///   [(offset,length): u32 x dict_count][dict bytes][ids_count: u32][ids: u32 x ids_count]`,
    ///   reusing the variable dictionary's value-file layout for the string
    ///   table portion (`dictionary::variable_dict::write_value_file`).
    pub fn bytes(&self) -> Vec<u8> {
        match self {
            ColumnWriter::Int64(v) => {
                let mut out = Vec::with_capacity(4 + v.len() * 8);
                out.extend_from_slice(&(v.len() as u32).to_le_bytes());
                for &x in v {
                    out.extend_from_slice(&x.to_le_bytes());
                }
                out
            }
            ColumnWriter::Float(v) => {
                let mut out = Vec::with_capacity(4 + v.len() * 8);
                out.extend_from_slice(&(v.len() as u32).to_le_bytes());
                for &x in v {
                    out.extend_from_slice(&x.to_le_bytes());
                }
                out
            }
            ColumnWriter::StringId { dict, ids, .. } => {
                let mut out = Vec::new();
                crate::dictionary::variable_dict::write_value_file(dict, &mut out)
                    .expect("writing to an in-memory Vec cannot fail");
                out.extend_from_slice(&(ids.len() as u32).to_le_bytes());
                for &id in ids {
                    out.extend_from_slice(&id.to_le_bytes());
                }
                out
            }
        }
    }

    pub fn size(&self) -> usize {
        match self {
            ColumnWriter::Int64(v) => 4 + v.len() * 8,
            ColumnWriter::Float(v) => 4 + v.len() * 8,
            ColumnWriter::StringId { dict, ids, .. } => {
                dict.iter().map(|s| s.len() + 8).sum::<usize>() + 8 + 4 + ids.len() * 4
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int64_column_accumulates_and_serializes() {
        let mut col = ColumnWriter::new_int64();
        col.add_value(&ColumnLeaf::Int(1)).unwrap();
        col.add_value(&ColumnLeaf::Int(-2)).unwrap();
        assert_eq!(col.len(), 2);
        let bytes = col.bytes();
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), 2);
    }

    #[test]
    fn float_column_rejects_int_value() {
        let mut col = ColumnWriter::new_float();
        assert!(col.add_value(&ColumnLeaf::Int(1)).is_err());
    }

    #[test]
    fn string_id_column_dedupes_values() {
        let mut col = ColumnWriter::new_string_id();
        col.add_value(&ColumnLeaf::Str("a".into())).unwrap();
        col.add_value(&ColumnLeaf::Str("b".into())).unwrap();
        col.add_value(&ColumnLeaf::Str("a".into())).unwrap();
        match &col {
            ColumnWriter::StringId { dict, ids, .. } => {
                assert_eq!(dict.len(), 2);
                assert_eq!(ids, &[0, 1, 0]);
            }
            _ => panic!("expected StringId"),
        }
    }

    #[test]
    fn for_leaf_picks_matching_kind() {
        assert!(matches!(ColumnWriter::for_leaf(&ColumnLeaf::Int(1)), ColumnWriter::Int64(_)));
        assert!(matches!(ColumnWriter::for_leaf(&ColumnLeaf::Float(1.0)), ColumnWriter::Float(_)));
        assert!(matches!(ColumnWriter::for_leaf(&ColumnLeaf::Str("x".into())), ColumnWriter::StringId { .. }));
    }
}
