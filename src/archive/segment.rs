//! Append-only, zstd-framed segment stream.
//!
//! A segment concatenates the `(timestamps, template_ids, variables)` byte
//! regions of every file attached to it, in attachment order, tracking the
//! *uncompressed* byte count against `target_segment_uncompressed_size`
//! (zstd is an opaque compressor here, this module never looks inside its
//! frames). Consume-self `close()` finishes the stream, the same shape as a
//! builder's consume-self `finish()`, adapted to a streaming zstd encoder
//! instead of an in-memory footer-indexed blob.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use zstd::stream::write::Encoder;

use crate::error::Result;

/// One of a file's three byte regions, recorded as it lands at a known
/// uncompressed offset inside the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionOffsets {
    pub timestamps_offset: u64,
    pub template_ids_offset: u64,
    pub variables_offset: u64,
}

/// An open, writable segment. `append` feeds the encoder directly; nothing
/// is buffered beyond what the zstd encoder itself buffers.
pub struct Segment {
    id: u64,
    encoder: Encoder<'static, File>,
    uncompressed_size: u64,
}

impl Segment {
    pub fn create(path: &Path, id: u64, compression_level: i32) -> Result<Self> {
        let file = File::create(path)?;
        let encoder = Encoder::new(file, compression_level)?;
        Ok(Self { id, encoder, uncompressed_size: 0 })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Append one file's three regions in order, returning their
    /// uncompressed offsets inside this segment.
    pub fn append_file_regions(&mut self, timestamps: &[u8], template_ids: &[u8], variables: &[u8]) -> Result<RegionOffsets> {
        let timestamps_offset = self.uncompressed_size;
        self.write_region(timestamps)?;
        let template_ids_offset = self.uncompressed_size;
        self.write_region(template_ids)?;
        let variables_offset = self.uncompressed_size;
        self.write_region(variables)?;
        Ok(RegionOffsets { timestamps_offset, template_ids_offset, variables_offset })
    }

    fn write_region(&mut self, bytes: &[u8]) -> Result<()> {
        self.encoder.write_all(bytes)?;
        self.uncompressed_size += bytes.len() as u64;
        Ok(())
    }

    /// Whether this segment has reached its target uncompressed size and
    /// should be closed.
    pub fn should_close(&self, target_uncompressed_size: u64) -> bool {
        self.uncompressed_size >= target_uncompressed_size
    }

    /// Flush the zstd frame and close the underlying file. Consumes self --
    /// a closed segment cannot be appended to again.
    pub fn close(self) -> Result<u64> {
        let uncompressed_size = self.uncompressed_size;
        let mut file = self.encoder.finish()?;
        file.flush()?;
        Ok(uncompressed_size)
    }
}

/// Decompress a closed segment's full contents for reading. Segments are
/// small enough (bounded by `target_segment_uncompressed_size`) that reading
/// one whole is simpler than a streaming decoder, and matches how a file's
/// region offsets are used: three `memcpy`-style slices out of one buffer.
pub fn read_segment_bytes(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    // SAFETY: the segment file is append-only and only ever read after its
    // writer has closed it; no other process mutates it concurrently.
    let mmap = unsafe { memmap2::Mmap::map(&file)? };
    let bytes = zstd::stream::decode_all(&mmap[..])?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_close_roundtrips_through_zstd() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0");
        let mut segment = Segment::create(&path, 0, 3).unwrap();
        let offsets = segment.append_file_regions(&[1, 2, 3, 4, 5, 6, 7, 8], &[9, 10], &[11]).unwrap();
        assert_eq!(offsets.timestamps_offset, 0);
        assert_eq!(offsets.template_ids_offset, 8);
        assert_eq!(offsets.variables_offset, 10);
        assert_eq!(segment.uncompressed_size(), 11);
        segment.close().unwrap();

        let decompressed = read_segment_bytes(&path).unwrap();
        assert_eq!(decompressed, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn should_close_triggers_at_target() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0");
        let mut segment = Segment::create(&path, 0, 3).unwrap();
        segment.append_file_regions(&[0u8; 10], &[], &[]).unwrap();
        assert!(!segment.should_close(20));
        assert!(segment.should_close(10));
    }

    #[test]
    fn two_files_concatenate_in_attachment_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0");
        let mut segment = Segment::create(&path, 0, 3).unwrap();
        segment.append_file_regions(&[1, 2], &[3], &[4]).unwrap();
        let second = segment.append_file_regions(&[5, 6], &[7], &[8]).unwrap();
        assert_eq!(second.timestamps_offset, 4);
        segment.close().unwrap();
        let bytes = read_segment_bytes(&path).unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
