//! Explicit configuration passed to the codec at construction, rather than
//! process-wide globals.

use serde::{Deserialize, Serialize};

/// Reserved half-open interval of `i64` slot values that denote variable-dictionary
/// ids rather than raw encoded integers. A slot `v` is a dictionary id iff
/// `begin <= v < end`, and the id is `v - begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDictIdRange {
    pub begin: i64,
    pub end: i64,
}

impl VariableDictIdRange {
    /// The top half of the `i64` space, leaving every realistic negative or
    /// small positive integer outside the range and representable as a raw
    /// `NonDouble` slot.
    pub const fn default_range() -> Self {
        Self {
            begin: i64::MAX / 2,
            end: i64::MAX,
        }
    }

    pub fn contains(&self, slot: i64) -> bool {
        slot >= self.begin && slot < self.end
    }

    pub fn capacity(&self) -> u64 {
        (self.end - self.begin) as u64
    }
}

impl Default for VariableDictIdRange {
    fn default() -> Self {
        Self::default_range()
    }
}

/// Per-call-site configuration for the variable/text/JSON encoders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub dict_id_range: VariableDictIdRange,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            dict_id_range: VariableDictIdRange::default_range(),
        }
    }
}

/// Per-archive-writer-session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub encoder: EncoderConfig,
    /// Close the active segment once its uncompressed byte count reaches this.
    pub target_segment_uncompressed_size: u64,
    /// zstd compression level applied to segment and dictionary framing.
    pub compression_level: i32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            target_segment_uncompressed_size: 256 * 1024 * 1024,
            compression_level: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_range_excludes_small_integers() {
        let r = VariableDictIdRange::default_range();
        assert!(!r.contains(42));
        assert!(!r.contains(-1));
        assert!(r.contains(r.begin));
        assert!(!r.contains(r.end));
    }

    #[test]
    fn config_roundtrips_through_json() {
        let cfg = ArchiveConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ArchiveConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.target_segment_uncompressed_size, cfg.target_segment_uncompressed_size);
        assert_eq!(back.encoder.dict_id_range.begin, cfg.encoder.dict_id_range.begin);
    }
}
