//! The three dictionaries (C2-C4): variable, logtype, jsontype.
//!
//! All three share the same arena-of-entries shape (a `Vec` arena plus a
//! `HashMap` for write-time dedup) and the same per-segment-index file format
//! (fixed-size `#[repr(C)]` records). `DictKind` below is a
//! compile-time-resolved "polymorphic dictionary" rather than a trait object.

pub mod arena;
pub mod jsontype_dict;
pub mod logtype_dict;
pub mod segindex;
pub mod variable_dict;

pub use arena::DictionaryArena;
pub use jsontype_dict::{JsontypeDictionary, JsontypeEntry};
pub use logtype_dict::{LogtypeDictionary, LogtypeEntry, VarInfo};
pub use variable_dict::VariableDictionary;

/// Which of the three dictionaries a segment-id set belongs to, used only for
/// log messages and directory-layout file naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictKind {
    Variable,
    Logtype,
    Jsontype,
}

impl DictKind {
    pub fn file_stem(self) -> &'static str {
        match self {
            DictKind::Variable => "var",
            DictKind::Logtype => "logtype",
            DictKind::Jsontype => "jsontype",
        }
    }
}
