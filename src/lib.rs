//! Columnar log-archive encoder/decoder: turns raw text and JSON logs into a
//! deduplicated, zstd-compressed archive, and back.
//!
//! Module map mirrors the design components: [`variable`] is the
//! encoded-variable codec (C1), [`dictionary`] the three dictionaries
//! (C2-C4), [`text_codec`]/[`json_codec`] the text and JSON encoders (C6-C7),
//! [`parser`] timestamp/line parsing (C5), [`column`] the columnar
//! side-channel (C8), [`stager`] the per-file accumulator (C9), and
//! [`archive`] the segment lifecycle and directory layout (C10).

pub mod archive;
pub mod column;
pub mod config;
pub mod delim;
pub mod dictionary;
pub mod error;
pub mod json_codec;
pub mod parser;
pub mod stager;
pub mod text_codec;
pub mod variable;

pub use archive::{Archive, DecodedRecord};
pub use config::{ArchiveConfig, EncoderConfig, VariableDictIdRange};
pub use error::{ArchiveError, Result};
pub use stager::{FileKind, StagedFile};
