//! Archive writer/reader (C10): directory layout, segment lifecycle,
//! dictionary wiring, and per-file attachment.
//!
//! Thin module-composition style: a consume-self `finish()`/`close()` pattern
//! for segment writers, and a single function owning the clear of each
//! segment's id accumulators so they're never reset from two places.

pub mod metadata;
pub mod segment;

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::archive::metadata::{ArchiveMetadataHeader, FileMetadataRecord};
use crate::archive::segment::{read_segment_bytes, Segment};
use crate::column::ColumnWriter;
use crate::config::{ArchiveConfig, VariableDictIdRange};
use crate::dictionary::jsontype_dict::{self, JsontypeDictionary};
use crate::dictionary::logtype_dict::{self, LogtypeDictionary};
use crate::dictionary::segindex::SegIndexEntry;
use crate::dictionary::variable_dict::{self, VariableDictionary};
use crate::error::{ArchiveError, Result};
use crate::stager::{FileKind, FileState, SegmentAttachment, StagedFile};
use crate::variable::{decode_dict_id, is_dict_id};

/// Derive a stable archive UUID from the creator UUID and a monotonic
/// creation number: `blake3::hash` of both, truncated to its low 16 bytes.
pub fn derive_archive_uuid(creator_uuid: u128, creation_num: u64) -> u128 {
    let mut bytes = Vec::with_capacity(24);
    bytes.extend_from_slice(&creator_uuid.to_le_bytes());
    bytes.extend_from_slice(&creation_num.to_le_bytes());
    let hash = blake3::hash(&bytes);
    u128::from_le_bytes(hash.as_bytes()[0..16].try_into().unwrap())
}

/// One of the archive's two live segments -- files with a recognized
/// timestamp pattern and files without one are never concatenated into the
/// same segment. The three ID sets are the per-segment accumulators that
/// must be cleared exactly once, at close.
struct OpenSegment {
    segment: Segment,
    var_ids: HashSet<u64>,
    logtype_ids: HashSet<u64>,
    jsontype_ids: HashSet<u64>,
}

impl OpenSegment {
    fn open(dir: &Path, id: u64, compression_level: i32) -> Result<Self> {
        let path = dir.join(id.to_string());
        Ok(Self {
            segment: Segment::create(&path, id, compression_level)?,
            var_ids: HashSet::new(),
            logtype_ids: HashSet::new(),
            jsontype_ids: HashSet::new(),
        })
    }
}

/// A single archive-writer session. Owns both dictionaries, the two live
/// segments, and every file attached but not yet committed. Single-writer,
/// not `Send`/`Sync` by design -- one archive has exactly one
/// owner.
pub struct Archive {
    pub uuid: u128,
    path: PathBuf,
    #[allow(dead_code)]
    logs_dir: PathBuf,
    segments_dir: PathBuf,
    column_segments_dir: PathBuf,

    config: ArchiveConfig,

    var_dict: VariableDictionary,
    logtype_dict: LogtypeDictionary,
    jsontype_dict: JsontypeDictionary,

    next_segment_id: u64,
    next_file_id: u64,

    segment_with_ts: Option<OpenSegment>,
    segment_without_ts: Option<OpenSegment>,

    /// Files attached to a live segment, awaiting that segment's close.
    uncommitted_files: Vec<StagedFile>,

    file_metadata: Vec<FileMetadataRecord>,
    persisted_file_count: usize,

    stable_uncompressed_size: u64,
    stable_size: u64,
}

impl Archive {
    /// Open (or create) the archive at `path`: directory layout, metadata
    /// header, and the three dictionaries rebuilt from their on-disk value
    /// and segment-index files, in dense-id order, without re-marking
    /// already-flushed entries pending.
    pub fn open(path: impl Into<PathBuf>, config: ArchiveConfig, creator_uuid: u128, creation_num: u64) -> Result<Self> {
        let path = path.into();
        let uuid = derive_archive_uuid(creator_uuid, creation_num);

        let logs_dir = path.join("logs");
        let segments_dir = path.join("segments");
        let column_segments_dir = path.join("column_segments");
        fs::create_dir_all(&logs_dir)?;
        fs::create_dir_all(&segments_dir)?;
        fs::create_dir_all(&column_segments_dir)?;

        let metadata_path = path.join("metadata");
        let metadata_header = if metadata_path.exists() {
            let mut f = File::open(&metadata_path)?;
            ArchiveMetadataHeader::read_from(&mut f)?
        } else {
            let header = ArchiveMetadataHeader::new();
            let mut f = File::create(&metadata_path)?;
            header.write_to(&mut f)?;
            header
        };

        let mut var_dict = VariableDictionary::new();
        for value in variable_dict::read_all_value_file_chunks(&read_zstd_frames(&path.join("var.dict"))?)? {
            var_dict.load_existing(value);
        }
        for (id, segs) in SegIndexEntry::read_all_into_map(&read_zstd_frames(&path.join("var.segindex"))?)? {
            var_dict.set_segments_containing(id, segs);
        }

        let mut logtype_dict = LogtypeDictionary::new();
        for entry in logtype_dict::read_all_value_file_chunks(&read_zstd_frames(&path.join("logtype.dict"))?)? {
            logtype_dict.load_existing(entry);
        }
        for (id, segs) in SegIndexEntry::read_all_into_map(&read_zstd_frames(&path.join("logtype.segindex"))?)? {
            logtype_dict.set_segments_containing(id, segs);
        }

        let mut jsontype_dict = JsontypeDictionary::new();
        for entry in jsontype_dict::read_all_value_file_chunks(&read_zstd_frames(&path.join("jsontype.dict"))?)? {
            jsontype_dict.load_existing(entry);
        }
        for (id, segs) in SegIndexEntry::read_all_into_map(&read_zstd_frames(&path.join("jsontype.segindex"))?)? {
            jsontype_dict.set_segments_containing(id, segs);
        }

        let files_metadata_path = path.join("files.metadata");
        let file_metadata = if files_metadata_path.exists() {
            FileMetadataRecord::read_all(&fs::read(&files_metadata_path)?)?
        } else {
            Vec::new()
        };
        let next_file_id = file_metadata.iter().map(|r| r.file_id + 1).max().unwrap_or(0);
        let next_segment_id = file_metadata.iter().map(|r| r.segment_id + 1).max().unwrap_or(0);
        let persisted_file_count = file_metadata.len();

        Ok(Self {
            uuid,
            path,
            logs_dir,
            segments_dir,
            column_segments_dir,
            config,
            var_dict,
            logtype_dict,
            jsontype_dict,
            next_segment_id,
            next_file_id,
            segment_with_ts: None,
            segment_without_ts: None,
            uncommitted_files: Vec::new(),
            file_metadata,
            persisted_file_count,
            stable_uncompressed_size: metadata_header.stable_uncompressed_size,
            stable_size: metadata_header.stable_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn dict_id_range(&self) -> VariableDictIdRange {
        self.config.encoder.dict_id_range
    }

    pub fn var_dict(&self) -> &VariableDictionary {
        &self.var_dict
    }

    pub fn var_dict_mut(&mut self) -> &mut VariableDictionary {
        &mut self.var_dict
    }

    pub fn logtype_dict(&self) -> &LogtypeDictionary {
        &self.logtype_dict
    }

    pub fn logtype_dict_mut(&mut self) -> &mut LogtypeDictionary {
        &mut self.logtype_dict
    }

    pub fn jsontype_dict(&self) -> &JsontypeDictionary {
        &self.jsontype_dict
    }

    pub fn jsontype_dict_mut(&mut self) -> &mut JsontypeDictionary {
        &mut self.jsontype_dict
    }

    pub fn file_metadata(&self) -> &[FileMetadataRecord] {
        &self.file_metadata
    }

    /// The id a newly staged file should use; advances the counter.
    pub fn next_file_id(&mut self) -> u64 {
        let id = self.next_file_id;
        self.next_file_id += 1;
        id
    }

    /// Attach `file`'s byte regions to the appropriate live segment: release
    /// and mark it pending, pick the live segment by whether it carries a
    /// timestamp, open a new one lazily if needed, append its byte regions
    /// and column segments, then close the segment if it has reached its
    /// target size. Consumes `file`: once attached it is owned by the
    /// archive until its segment closes.
    pub fn mark_file_ready_for_segment(&mut self, mut file: StagedFile) -> Result<()> {
        if file.state() == FileState::Open {
            file.release()?;
        }
        file.mark_pending_segment()?;

        // Step 1: select the target segment by timestamp pattern.
        let has_ts = file.has_timestamp();
        let dict_id_range = self.config.encoder.dict_id_range;

        // Precompute every plain value this method needs before taking the
        // `&mut self` borrow of the live segment, so the segment borrow and
        // reads of `self.config` never have to coexist.
        let template_ids: Vec<u64> = file.template_ids().iter().map(|&t| t as u64).collect();
        let dict_var_ids: Vec<u64> = file
            .variables()
            .iter()
            .copied()
            .filter(|&v| is_dict_id(v, &dict_id_range))
            .map(|v| decode_dict_id(v, &dict_id_range))
            .collect();
        let timestamps_bytes = file.timestamps_bytes();
        let template_ids_bytes = file.template_ids_bytes();
        let variables_bytes = file.variables_bytes();
        let kind = file.kind;

        // Step 2: open the target segment if it isn't already.
        if has_ts && self.segment_with_ts.is_none() {
            let id = self.next_segment_id;
            self.next_segment_id += 1;
            self.segment_with_ts = Some(OpenSegment::open(&self.segments_dir, id, self.config.compression_level)?);
        }
        if !has_ts && self.segment_without_ts.is_none() {
            let id = self.next_segment_id;
            self.next_segment_id += 1;
            self.segment_without_ts = Some(OpenSegment::open(&self.segments_dir, id, self.config.compression_level)?);
        }

        let (offsets, segment_id, should_close) = {
            let open = if has_ts {
                self.segment_with_ts.as_mut().expect("just ensured open")
            } else {
                self.segment_without_ts.as_mut().expect("just ensured open")
            };

            // Step 3: union this file's ids into the segment's accumulators.
            match kind {
                FileKind::Text => open.logtype_ids.extend(template_ids.iter().copied()),
                FileKind::Json => open.jsontype_ids.extend(template_ids.iter().copied()),
            }
            open.var_ids.extend(dict_var_ids.iter().copied());

            // Step 4: append the three byte regions, recording their offsets.
            let offsets = open.segment.append_file_regions(&timestamps_bytes, &template_ids_bytes, &variables_bytes)?;
            let segment_id = open.segment.id();
            let should_close = open.segment.should_close(self.config.target_segment_uncompressed_size);
            (offsets, segment_id, should_close)
        };

        file.attach(SegmentAttachment {
            segment_id,
            timestamps_offset: offsets.timestamps_offset,
            template_ids_offset: offsets.template_ids_offset,
            variables_offset: offsets.variables_offset,
        })?;

        // Step 5: per-column segments.
        self.append_column_segments(file.columns(), segment_id)?;

        self.uncommitted_files.push(file);

        // Step 6: close the segment once it reaches its target size.
        if should_close {
            self.close_segment(has_ts)?;
        }
        Ok(())
    }

    fn append_column_segments(&self, columns: &BTreeMap<String, ColumnWriter>, segment_id: u64) -> Result<()> {
        for (key, writer) in columns {
            let dir = self.column_segments_dir.join(key);
            fs::create_dir_all(&dir)?;
            let path = dir.join(segment_id.to_string());
            let compressed = zstd::stream::encode_all(&writer.bytes()[..], self.config.compression_level)
                .map_err(|e| ArchiveError::Compression(e.to_string()))?;
            fs::write(&path, compressed)?;
        }
        Ok(())
    }

    /// Close the live segment for `has_ts`: index the dictionaries, flush
    /// their pending entries and segment-index rows, close the zstd frame,
    /// persist the now-committed files' metadata rows, and update the
    /// archive's stable totals. Clears the
    /// three accumulator sets exactly once, here.
    fn close_segment(&mut self, has_ts: bool) -> Result<()> {
        let open = if has_ts { self.segment_with_ts.take() } else { self.segment_without_ts.take() };
        let Some(OpenSegment { segment, var_ids, logtype_ids, jsontype_ids }) = open else {
            return Ok(());
        };
        let segment_id = segment.id();

        self.var_dict.index_segment(segment_id, &var_ids);
        self.logtype_dict.index_segment(segment_id, &logtype_ids);
        self.jsontype_dict.index_segment(segment_id, &jsontype_ids);

        self.flush_var_dict()?;
        self.flush_logtype_dict()?;
        self.flush_jsontype_dict()?;

        self.append_var_segindex(segment_id, &var_ids)?;
        self.append_logtype_segindex(segment_id, &logtype_ids)?;
        self.append_jsontype_segindex(segment_id, &jsontype_ids)?;

        let uncompressed_size = segment.uncompressed_size();
        segment.close()?;

        let mut remaining = Vec::with_capacity(self.uncommitted_files.len());
        for mut file in self.uncommitted_files.drain(..) {
            let matches = file.segment_attachment().map(|a| a.segment_id) == Some(segment_id);
            if !matches {
                remaining.push(file);
                continue;
            }
            let attachment = file.segment_attachment().expect("checked above");
            let (begin_ts, end_ts) = file.begin_end_ts();
            let record = FileMetadataRecord {
                file_id: file.id,
                segment_id: attachment.segment_id,
                group_id: file.group_id,
                split_index: file.split_index,
                begin_ts,
                end_ts,
                num_messages: file.num_messages() as u64,
                timestamps_offset: attachment.timestamps_offset,
                template_ids_offset: attachment.template_ids_offset,
                variables_offset: attachment.variables_offset,
                kind: match file.kind {
                    FileKind::Text => 0,
                    FileKind::Json => 1,
                },
                original_path: file.original_path.to_string_lossy().into_owned(),
            };
            file.commit()?;
            self.file_metadata.push(record);
        }
        self.uncommitted_files = remaining;
        self.persist_file_metadata()?;

        self.stable_uncompressed_size += uncompressed_size;
        let segment_path = self.segments_dir.join(segment_id.to_string());
        self.stable_size += fs::metadata(&segment_path)?.len();
        self.rewrite_metadata_header()?;

        info!(segment_id, uncompressed_size, "closed segment");
        Ok(())
    }

    fn flush_var_dict(&mut self) -> Result<()> {
        let (ids, values) = self.var_dict.flush_pending();
        if ids.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        variable_dict::write_value_file(&values, &mut buf)?;
        append_zstd_frame(&self.path.join("var.dict"), &buf, self.config.compression_level)
    }

    fn flush_logtype_dict(&mut self) -> Result<()> {
        let pending = self.logtype_dict.flush_pending();
        if pending.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        logtype_dict::write_value_file(&pending, &mut buf)?;
        append_zstd_frame(&self.path.join("logtype.dict"), &buf, self.config.compression_level)
    }

    fn flush_jsontype_dict(&mut self) -> Result<()> {
        let pending = self.jsontype_dict.flush_pending();
        if pending.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        jsontype_dict::write_value_file(&pending, &mut buf)?;
        append_zstd_frame(&self.path.join("jsontype.dict"), &buf, self.config.compression_level)
    }

    fn append_var_segindex(&self, segment_id: u64, ids: &HashSet<u64>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let entries = self.var_dict.segindex_entries_for_segment(segment_id, ids);
        append_segindex(&self.path.join("var.segindex"), &entries, self.config.compression_level)
    }

    fn append_logtype_segindex(&self, segment_id: u64, ids: &HashSet<u64>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let entries = self.logtype_dict.segindex_entries_for_segment(segment_id, ids);
        append_segindex(&self.path.join("logtype.segindex"), &entries, self.config.compression_level)
    }

    fn append_jsontype_segindex(&self, segment_id: u64, ids: &HashSet<u64>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let entries = self.jsontype_dict.segindex_entries_for_segment(segment_id, ids);
        append_segindex(&self.path.join("jsontype.segindex"), &entries, self.config.compression_level)
    }

    fn persist_file_metadata(&mut self) -> Result<()> {
        if self.persisted_file_count >= self.file_metadata.len() {
            return Ok(());
        }
        let mut buf = Vec::new();
        for record in &self.file_metadata[self.persisted_file_count..] {
            record.write_to(&mut buf)?;
        }
        let mut f = fs::OpenOptions::new().create(true).append(true).open(self.path.join("files.metadata"))?;
        f.write_all(&buf)?;
        self.persisted_file_count = self.file_metadata.len();
        Ok(())
    }

    fn rewrite_metadata_header(&mut self) -> Result<()> {
        let mut f = fs::OpenOptions::new().write(true).open(self.path.join("metadata"))?;
        ArchiveMetadataHeader::rewrite_sizes(&mut f, self.stable_uncompressed_size, self.stable_size)?;
        Ok(())
    }

    /// Close both live segments, flush
    /// whatever dictionary tails remain, and persist final totals.
    pub fn close(mut self) -> Result<()> {
        if self.segment_with_ts.is_some() {
            self.close_segment(true)?;
        }
        if self.segment_without_ts.is_some() {
            self.close_segment(false)?;
        }
        self.flush_var_dict()?;
        self.flush_logtype_dict()?;
        self.flush_jsontype_dict()?;
        self.persist_file_metadata()?;
        self.rewrite_metadata_header()?;
        Ok(())
    }

    /// Decompress `record`'s segment and decode every message it attached,
    /// in arrival order.
    pub fn decode_records(&self, record: &FileMetadataRecord) -> Result<Vec<DecodedRecord>> {
        let segment_bytes = read_segment_bytes(&self.segments_dir.join(record.segment_id.to_string()))?;
        decode_file(record, &segment_bytes, &self.var_dict, &self.logtype_dict, &self.jsontype_dict, &self.dict_id_range())
    }
}

fn append_zstd_frame(path: &Path, plaintext: &[u8], level: i32) -> Result<()> {
    let compressed = zstd::stream::encode_all(plaintext, level).map_err(|e| ArchiveError::Compression(e.to_string()))?;
    let mut f = fs::OpenOptions::new().create(true).append(true).open(path)?;
    f.write_all(&compressed)?;
    Ok(())
}

fn append_segindex(path: &Path, entries: &[SegIndexEntry], level: i32) -> Result<()> {
    let mut buf = Vec::new();
    SegIndexEntry::write_batch(entries, &mut buf)?;
    append_zstd_frame(path, &buf, level)
}

/// Read and decompress every zstd frame concatenated in `path`, returning
/// their plaintext concatenated in frame order. Dictionary value and
/// segment-index files are a sequence of independently-compressed flush
/// batches rather than one frame, since each flush appends
/// without re-reading what's already on disk.
fn read_zstd_frames(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(path)?;
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    zstd::stream::decode_all(&bytes[..]).map_err(|e| ArchiveError::Compression(e.to_string()))
}

/// One decoded record, reconstructed from a file's template id and the
/// variable slots it consumed.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRecord {
    Text { ts: i64, message: String },
    Json { ts: i64, value: serde_json::Value },
}

/// Reverse a file's three byte regions back into its original messages,
/// re-driving the logtype/jsontype entry's reconstruction (C1/C6/C7 in
/// reverse).
pub fn decode_file(
    record: &FileMetadataRecord,
    segment_bytes: &[u8],
    var_dict: &VariableDictionary,
    logtype_dict: &LogtypeDictionary,
    jsontype_dict: &JsontypeDictionary,
    dict_id_range: &VariableDictIdRange,
) -> Result<Vec<DecodedRecord>> {
    let num_messages = record.num_messages as usize;
    let ts_start = record.timestamps_offset as usize;
    let template_start = record.template_ids_offset as usize;
    let ts_region = segment_bytes
        .get(ts_start..ts_start + num_messages * 8)
        .ok_or_else(|| ArchiveError::Corrupt("segment truncated while reading timestamps region".into()))?;
    let template_region = segment_bytes
        .get(template_start..template_start + num_messages * 8)
        .ok_or_else(|| ArchiveError::Corrupt("segment truncated while reading template-ids region".into()))?;
    let timestamps: Vec<i64> = ts_region.chunks_exact(8).map(|c| i64::from_le_bytes(c.try_into().unwrap())).collect();
    let template_ids: Vec<i64> = template_region.chunks_exact(8).map(|c| i64::from_le_bytes(c.try_into().unwrap())).collect();

    let lookup = |id: u64| var_dict.get_value(id).map(str::to_string);
    let mut out = Vec::with_capacity(num_messages);
    let mut var_cursor = record.variables_offset as usize;

    for i in 0..num_messages {
        let ts = timestamps[i];
        let template_id = template_ids[i] as u64;
        match record.kind {
            0 => {
                let entry = logtype_dict
                    .get_entry(template_id)
                    .ok_or_else(|| ArchiveError::Corrupt(format!("segment references unknown logtype id {template_id}")))?;
                let var_infos = entry.scan_var_positions()?;
                let slots = read_i64_slots(segment_bytes, &mut var_cursor, entry.num_vars)?;
                let text = crate::text_codec::decode_text(&entry.value, &var_infos, &slots, &lookup, dict_id_range)?;
                out.push(DecodedRecord::Text { ts, message: text });
            }
            1 => {
                let entry = jsontype_dict
                    .get_entry(template_id)
                    .ok_or_else(|| ArchiveError::Corrupt(format!("segment references unknown jsontype id {template_id}")))?;
                let slots = read_i64_slots(segment_bytes, &mut var_cursor, entry.num_vars)?;
                let value = crate::json_codec::decode_json(&entry.value, &slots, dict_id_range, &lookup, logtype_dict)?;
                out.push(DecodedRecord::Json { ts, value });
            }
            other => return Err(ArchiveError::Corrupt(format!("file metadata record has unknown kind tag {other}"))),
        }
    }
    Ok(out)
}

fn read_i64_slots(bytes: &[u8], cursor: &mut usize, count: usize) -> Result<Vec<i64>> {
    let end = *cursor + count * 8;
    let region = bytes
        .get(*cursor..end)
        .ok_or_else(|| ArchiveError::Corrupt("segment truncated while reading variable slots".into()))?;
    let slots = region.chunks_exact(8).map(|c| i64::from_le_bytes(c.try_into().unwrap())).collect();
    *cursor = end;
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnLeaf;
    use crate::config::EncoderConfig;
    use crate::json_codec::encode_json;
    use crate::stager::StagedFile;
    use crate::text_codec::encode_text;
    use tempfile::tempdir;

    fn small_config() -> ArchiveConfig {
        ArchiveConfig {
            encoder: EncoderConfig::default(),
            target_segment_uncompressed_size: 1, // close after every attachment
            compression_level: 3,
        }
    }

    #[test]
    fn single_text_message_roundtrips_through_close_and_decode() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::open(dir.path(), small_config(), 1, 0).unwrap();

        let config = archive.config().encoder.clone();
        let encoded = encode_text("user bob-42 logged in", &config, archive.var_dict_mut());
        let num_vars = encoded.vars.len();
        let (template_id, _) = archive.logtype_dict_mut().insert_or_get(encoded.template, encoded.verbosity, num_vars);

        let mut file = StagedFile::new(archive.next_file_id(), "a.log".into(), 0, 0, FileKind::Text);
        file.write_encoded_msg(1000, template_id as i64, &encoded.vars, 32).unwrap();
        file.release().unwrap();
        archive.mark_file_ready_for_segment(file).unwrap();
        archive.close().unwrap();

        let reopened = Archive::open(dir.path(), small_config(), 1, 0).unwrap();
        assert_eq!(reopened.file_metadata().len(), 1);
        let record = &reopened.file_metadata()[0];
        assert_eq!(record.kind, 0);
        let decoded = reopened.decode_records(record).unwrap();
        assert_eq!(decoded.len(), 1);
        match &decoded[0] {
            DecodedRecord::Text { ts, message } => {
                assert_eq!(*ts, 1000);
                assert_eq!(message, "user bob-42 logged in");
            }
            _ => panic!("expected a text record"),
        }
    }

    #[test]
    fn json_message_roundtrips_and_writes_a_column_segment() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::open(dir.path(), small_config(), 2, 0).unwrap();

        let value: serde_json::Value = serde_json::from_str(r#"{"n":7,"host":"server-9"}"#).unwrap();
        let config = archive.config().encoder.clone();
        let encoded = {
            let var_dict = archive.var_dict_mut();
            let logtype_dict = archive.logtype_dict_mut();
            encode_json(value, &config, var_dict, logtype_dict)
        };
        let num_vars = encoded.vars.len();
        let (jsontype_id, _) = archive.jsontype_dict_mut().insert_or_get(encoded.value, num_vars);

        let mut file = StagedFile::new(archive.next_file_id(), "a.json".into(), 0, 0, FileKind::Json);
        file.write_encoded_json_msg(500, jsontype_id as i64, &encoded.vars, 24, &encoded.extracted_leaves).unwrap();
        file.release().unwrap();
        archive.mark_file_ready_for_segment(file).unwrap();
        archive.close().unwrap();

        let reopened = Archive::open(dir.path(), small_config(), 2, 0).unwrap();
        let record = &reopened.file_metadata()[0];
        assert_eq!(record.kind, 1);
        let decoded = reopened.decode_records(record).unwrap();
        match &decoded[0] {
            DecodedRecord::Json { ts, value } => {
                assert_eq!(*ts, 500);
                assert_eq!(value["n"], serde_json::Value::from(7));
                assert_eq!(value["host"], serde_json::Value::from("server-9"));
            }
            _ => panic!("expected a json record"),
        }

        let column_path = dir.path().join("column_segments").join("n").join(record.segment_id.to_string());
        assert!(column_path.exists());
    }

    #[test]
    fn repeated_message_shares_one_logtype_entry_across_two_files() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::open(dir.path(), small_config(), 3, 0).unwrap();
        let config = archive.config().encoder.clone();

        for i in 0..2 {
            let encoded = encode_text("server ready", &config, archive.var_dict_mut());
            let num_vars = encoded.vars.len();
            let (template_id, _) = archive.logtype_dict_mut().insert_or_get(encoded.template, encoded.verbosity, num_vars);
            let mut file = StagedFile::new(archive.next_file_id(), format!("f{i}.log").into(), 0, 0, FileKind::Text);
            file.write_encoded_msg(i, template_id as i64, &encoded.vars, 12).unwrap();
            file.release().unwrap();
            archive.mark_file_ready_for_segment(file).unwrap();
        }
        assert_eq!(archive.logtype_dict().len(), 1);
        archive.close().unwrap();

        let reopened = Archive::open(dir.path(), small_config(), 3, 0).unwrap();
        assert_eq!(reopened.logtype_dict().len(), 1);
        assert_eq!(reopened.file_metadata().len(), 2);
    }

    #[test]
    fn segment_index_names_every_segment_a_template_occurred_in() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::open(dir.path(), small_config(), 4, 0).unwrap();
        let config = archive.config().encoder.clone();

        let mut first_template_id = 0u64;
        for i in 0..2 {
            let encoded = encode_text(&format!("distinct message {i}"), &config, archive.var_dict_mut());
            let num_vars = encoded.vars.len();
            let (template_id, _) = archive.logtype_dict_mut().insert_or_get(encoded.template, encoded.verbosity, num_vars);
            if i == 0 {
                first_template_id = template_id;
            }
            let mut file = StagedFile::new(archive.next_file_id(), format!("f{i}.log").into(), 0, 0, FileKind::Text);
            file.write_encoded_msg(i, template_id as i64, &encoded.vars, 12).unwrap();
            file.release().unwrap();
            // Each attachment closes its own segment (target size = 1 byte).
            archive.mark_file_ready_for_segment(file).unwrap();
        }
        archive.close().unwrap();

        let reopened = Archive::open(dir.path(), small_config(), 4, 0).unwrap();
        let segs = reopened.logtype_dict().segindex_entries_for_segment(0, &{
            let mut s = HashSet::new();
            s.insert(first_template_id);
            s
        });
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn closing_with_no_attached_files_is_a_noop() {
        let dir = tempdir().unwrap();
        let archive = Archive::open(dir.path(), small_config(), 5, 0).unwrap();
        archive.close().unwrap();
        let reopened = Archive::open(dir.path(), small_config(), 5, 0).unwrap();
        assert!(reopened.file_metadata().is_empty());
    }

    #[test]
    fn derive_archive_uuid_is_deterministic_and_distinguishes_creation_num() {
        let a = derive_archive_uuid(1, 0);
        let b = derive_archive_uuid(1, 0);
        let c = derive_archive_uuid(1, 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn boolean_leaf_roundtrips_through_columns() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::open(dir.path(), small_config(), 6, 0).unwrap();
        let mut file = StagedFile::new(archive.next_file_id(), "a.json".into(), 0, 0, FileKind::Json);
        file.write_encoded_json_msg(0, 0, &[1], 4, &[("ok".to_string(), ColumnLeaf::Bool(true))]).unwrap();
        assert_eq!(file.columns().get("ok").unwrap().len(), 1);
        file.release().unwrap();
        archive.mark_file_ready_for_segment(file).unwrap();
        archive.close().unwrap();
    }
}
