//! Archive metadata header and per-file metadata persistence.
//!
//! The header is a fixed 18-byte record (`format_version: u16`,
//! `stable_uncompressed_size: u64`, `stable_size: u64`) rewritten in place at
//! every segment close -- a placeholder written first, body appended, then
//! `seek(SeekFrom::Start(..))` to patch the two size fields.
//!
//! Per-file metadata is a flat, append-only record file (`files.metadata`)
//! rather than a SQLite-style embedded database: the out-of-scope query-side
//! persistence (MongoDB/Parquet caching) is the only consumer that would need
//! random access or indexing.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{ArchiveError, Result};

pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_SIZE: u64 = 2 + 8 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveMetadataHeader {
    pub format_version: u16,
    pub stable_uncompressed_size: u64,
    pub stable_size: u64,
}

impl ArchiveMetadataHeader {
    pub fn new() -> Self {
        Self { format_version: FORMAT_VERSION, stable_uncompressed_size: 0, stable_size: 0 }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.format_version.to_le_bytes())?;
        w.write_all(&self.stable_uncompressed_size.to_le_bytes())?;
        w.write_all(&self.stable_size.to_le_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE as usize];
        r.read_exact(&mut buf)
            .map_err(|e| ArchiveError::Corrupt(format!("truncated archive metadata header: {e}")))?;
        Ok(Self {
            format_version: u16::from_le_bytes(buf[0..2].try_into().unwrap()),
            stable_uncompressed_size: u64::from_le_bytes(buf[2..10].try_into().unwrap()),
            stable_size: u64::from_le_bytes(buf[10..18].try_into().unwrap()),
        })
    }

    /// Seek-back-and-overwrite the two size fields, leaving `format_version`
    /// untouched. Called at every segment close.
    pub fn rewrite_sizes<F: Write + Seek>(f: &mut F, stable_uncompressed_size: u64, stable_size: u64) -> Result<()> {
        f.seek(SeekFrom::Start(2))?;
        f.write_all(&stable_uncompressed_size.to_le_bytes())?;
        f.write_all(&stable_size.to_le_bytes())?;
        f.flush()?;
        Ok(())
    }
}

impl Default for ArchiveMetadataHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// One staged file's final metadata, persisted once the file's segment
/// closes).
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadataRecord {
    pub file_id: u64,
    pub segment_id: u64,
    pub group_id: u64,
    pub split_index: u64,
    pub begin_ts: i64,
    pub end_ts: i64,
    pub num_messages: u64,
    pub timestamps_offset: u64,
    pub template_ids_offset: u64,
    pub variables_offset: u64,
    /// `0` = text file (template ids resolve against the logtype dictionary),
    /// `1` = JSON file (jsontype dictionary). Needed on read since a
    /// segment's byte regions carry no self-describing type tag.
    pub kind: u64,
    pub original_path: String,
}

impl FileMetadataRecord {
    /// `[file_id][segment_id][group_id][split_index][begin_ts][end_ts]
    /// [num_messages][timestamps_offset][template_ids_offset]
    /// [variables_offset][kind]` (11 x u64/i64 LE) then `[path_len: u32][path bytes]`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        for field in [
            self.file_id,
            self.segment_id,
            self.group_id,
            self.split_index,
        ] {
            w.write_all(&field.to_le_bytes())?;
        }
        w.write_all(&self.begin_ts.to_le_bytes())?;
        w.write_all(&self.end_ts.to_le_bytes())?;
        for field in [
            self.num_messages,
            self.timestamps_offset,
            self.template_ids_offset,
            self.variables_offset,
            self.kind,
        ] {
            w.write_all(&field.to_le_bytes())?;
        }
        let path_bytes = self.original_path.as_bytes();
        w.write_all(&(path_bytes.len() as u32).to_le_bytes())?;
        w.write_all(path_bytes)?;
        Ok(())
    }

    pub const FIXED_LEN: usize = 8 * 11;

    pub fn read_from(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < Self::FIXED_LEN + 4 {
            return Err(ArchiveError::Corrupt("file metadata record truncated".into()));
        }
        let mut u64s = [0u64; 11];
        for (i, chunk) in bytes[..Self::FIXED_LEN].chunks_exact(8).enumerate() {
            u64s[i] = u64::from_le_bytes(chunk.try_into().unwrap());
        }
        let path_len_pos = Self::FIXED_LEN;
        let path_len = u32::from_le_bytes(bytes[path_len_pos..path_len_pos + 4].try_into().unwrap()) as usize;
        let path_start = path_len_pos + 4;
        if bytes.len() < path_start + path_len {
            return Err(ArchiveError::Corrupt("file metadata record path truncated".into()));
        }
        let original_path = std::str::from_utf8(&bytes[path_start..path_start + path_len])
            .map_err(|_| ArchiveError::Corrupt("file metadata path is not valid UTF-8".into()))?
            .to_string();
        let record = FileMetadataRecord {
            file_id: u64s[0],
            segment_id: u64s[1],
            group_id: u64s[2],
            split_index: u64s[3],
            begin_ts: u64s[4] as i64,
            end_ts: u64s[5] as i64,
            num_messages: u64s[6],
            timestamps_offset: u64s[7],
            template_ids_offset: u64s[8],
            variables_offset: u64s[9],
            kind: u64s[10],
            original_path,
        };
        Ok((record, path_start + path_len))
    }

    pub fn read_all(bytes: &[u8]) -> Result<Vec<Self>> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let (record, consumed) = Self::read_from(&bytes[pos..])?;
            pos += consumed;
            out.push(record);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrips() {
        let header = ArchiveMetadataHeader { format_version: 1, stable_uncompressed_size: 100, stable_size: 40 };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE as usize);
        let mut cursor: &[u8] = &buf;
        let back = ArchiveMetadataHeader::read_from(&mut cursor).unwrap();
        assert_eq!(back, header);
    }

    #[test]
    fn header_rewrite_sizes_preserves_format_version() {
        let mut buf = std::io::Cursor::new(Vec::new());
        ArchiveMetadataHeader::new().write_to(&mut buf).unwrap();
        ArchiveMetadataHeader::rewrite_sizes(&mut buf, 500, 200).unwrap();
        buf.set_position(0);
        let header = ArchiveMetadataHeader::read_from(&mut buf).unwrap();
        assert_eq!(header.format_version, FORMAT_VERSION);
        assert_eq!(header.stable_uncompressed_size, 500);
        assert_eq!(header.stable_size, 200);
    }

    #[test]
    fn file_metadata_record_roundtrips() {
        let record = FileMetadataRecord {
            file_id: 1,
            segment_id: 0,
            group_id: 0,
            split_index: 0,
            begin_ts: 100,
            end_ts: 200,
            num_messages: 5,
            timestamps_offset: 0,
            template_ids_offset: 40,
            variables_offset: 80,
            kind: 0,
            original_path: "service.log".into(),
        };
        let mut buf = Vec::new();
        record.write_to(&mut buf).unwrap();
        let (back, consumed) = FileMetadataRecord::read_from(&buf).unwrap();
        assert_eq!(back, record);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn read_all_parses_concatenated_records() {
        let records = vec![
            FileMetadataRecord {
                file_id: 0, segment_id: 0, group_id: 0, split_index: 0,
                begin_ts: 1, end_ts: 2, num_messages: 1,
                timestamps_offset: 0, template_ids_offset: 8, variables_offset: 16,
                kind: 0,
                original_path: "a.log".into(),
            },
            FileMetadataRecord {
                file_id: 1, segment_id: 0, group_id: 0, split_index: 0,
                begin_ts: 3, end_ts: 4, num_messages: 1,
                timestamps_offset: 8, template_ids_offset: 16, variables_offset: 24,
                kind: 1,
                original_path: "b.json".into(),
            },
        ];
        let mut buf = Vec::new();
        for r in &records {
            r.write_to(&mut buf).unwrap();
        }
        let parsed = FileMetadataRecord::read_all(&buf).unwrap();
        assert_eq!(parsed, records);
    }
}
