//! File stager (C9): in-memory per-source-file accumulator of timestamps,
//! template ids, and encoded variables, plus the file state machine:
//! `Open -> Closed -> PendingSegment -> InUncommittedSegment ->
//! InCommittedSegment`.
//!
//! Memtable-like: single-writer, not `Send+Sync`, accumulates in memory and
//! drains on flush.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::column::{ColumnLeaf, ColumnWriter};
use crate::error::{ArchiveError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Open,
    Closed,
    PendingSegment,
    InUncommittedSegment,
    InCommittedSegment,
}

/// Which dictionary a file's `template_ids` column resolves against -- text
/// files use the logtype dictionary (C3), JSON files the jsontype dictionary
/// (C4). Fixed for a file's whole lifetime: one file is either a text log or
/// a JSON log, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Json,
}

/// Uncompressed byte offsets of this file's three regions inside the segment
/// it was attached to, recorded by `Archive::mark_file_ready_for_segment`.
#[derive(Debug, Clone, Copy)]
pub struct SegmentAttachment {
    pub segment_id: u64,
    pub timestamps_offset: u64,
    pub template_ids_offset: u64,
    pub variables_offset: u64,
}

/// In-memory accumulator for one source file's encoded records.
///
/// Invariants: `timestamps.len() == template_ids.len()`; for the template at
/// message index `i`, the next `template.num_vars` slots of `variables`
/// belong to that message; `begin_ts <= end_ts` once at least one timestamped
/// message has been written.
pub struct StagedFile {
    pub id: u64,
    pub original_path: PathBuf,
    pub group_id: u64,
    pub split_index: u64,
    pub kind: FileKind,

    timestamps: Vec<i64>,
    template_ids: Vec<i64>,
    variables: Vec<i64>,
    columns: BTreeMap<String, ColumnWriter>,

    num_uncompressed_bytes: u64,
    begin_ts: i64,
    end_ts: i64,
    has_ts: bool,
    ts_patterns: Vec<(usize, &'static str)>,

    state: FileState,
    segment_attachment: Option<SegmentAttachment>,
}

impl StagedFile {
    pub fn new(id: u64, original_path: PathBuf, group_id: u64, split_index: u64, kind: FileKind) -> Self {
        Self {
            id,
            original_path,
            group_id,
            split_index,
            kind,
            timestamps: Vec::new(),
            template_ids: Vec::new(),
            variables: Vec::new(),
            columns: BTreeMap::new(),
            num_uncompressed_bytes: 0,
            begin_ts: i64::MAX,
            end_ts: i64::MIN,
            has_ts: false,
            ts_patterns: Vec::new(),
            state: FileState::Open,
            segment_attachment: None,
        }
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    fn require_open(&self) -> Result<()> {
        if self.state != FileState::Open {
            return Err(ArchiveError::Unsupported(format!(
                "write to staged file {} in state {:?}, expected Open",
                self.id, self.state
            )));
        }
        Ok(())
    }

    fn note_timestamp(&mut self, ts: i64) {
        self.begin_ts = self.begin_ts.min(ts);
        self.end_ts = self.end_ts.max(ts);
        self.has_ts = true;
    }

    /// Append one text-message record. `ts` is the message's own timestamp if
    /// it carried one; absorbed continuation lines never reach this call with
    /// a fresh timestamp of their own, so every record here has a definite
    /// `i64` (the parser resolves a leading untimestamped message to `0`).
    pub fn write_encoded_msg(&mut self, ts: i64, template_id: i64, vars: &[i64], nbytes: u64) -> Result<()> {
        self.require_open()?;
        if self.kind != FileKind::Text {
            return Err(ArchiveError::BadParam(format!(
                "write_encoded_msg called on a {:?} staged file {}, expected Text",
                self.kind, self.id
            )));
        }
        self.note_timestamp(ts);
        self.timestamps.push(ts);
        self.template_ids.push(template_id);
        self.variables.extend_from_slice(vars);
        self.num_uncompressed_bytes += nbytes;
        Ok(())
    }

    /// Append one JSON-record. Beyond the template/variable bookkeeping
    /// shared with `write_encoded_msg`, each extracted leaf is routed into
    /// its column writer, keyed by dotted JSON path, creating one on first
    /// occurrence of that path.
    pub fn write_encoded_json_msg(
        &mut self,
        ts: i64,
        jsontype_id: i64,
        vars: &[i64],
        nbytes: u64,
        extracted_leaves: &[(String, ColumnLeaf)],
    ) -> Result<()> {
        self.require_open()?;
        if self.kind != FileKind::Json {
            return Err(ArchiveError::BadParam(format!(
                "write_encoded_json_msg called on a {:?} staged file {}, expected Json",
                self.kind, self.id
            )));
        }
        self.note_timestamp(ts);
        self.timestamps.push(ts);
        self.template_ids.push(jsontype_id);
        self.variables.extend_from_slice(vars);
        self.num_uncompressed_bytes += nbytes;
        for (path, leaf) in extracted_leaves {
            let column = self
                .columns
                .entry(path.clone())
                .or_insert_with(|| ColumnWriter::for_leaf(leaf));
            column.add_value(leaf)?;
        }
        Ok(())
    }

    pub fn record_pattern_switch(&mut self, message_index: usize, pattern: &'static str) {
        self.ts_patterns.push((message_index, pattern));
    }

    /// `Open -> Closed`. No further writes are accepted.
    pub fn release(&mut self) -> Result<()> {
        self.require_open()?;
        self.state = FileState::Closed;
        Ok(())
    }

    /// `Closed -> PendingSegment`, called by the archive immediately before
    /// attaching this file's byte regions to a segment.
    pub fn mark_pending_segment(&mut self) -> Result<()> {
        if self.state != FileState::Closed {
            return Err(ArchiveError::Unsupported(format!(
                "cannot mark staged file {} ready for segment from state {:?}, expected Closed",
                self.id, self.state
            )));
        }
        self.state = FileState::PendingSegment;
        Ok(())
    }

    /// `PendingSegment -> InUncommittedSegment`, recording where this file's
    /// three byte regions landed inside the segment.
    pub fn attach(&mut self, attachment: SegmentAttachment) -> Result<()> {
        if self.state != FileState::PendingSegment {
            return Err(ArchiveError::Unsupported(format!(
                "cannot attach staged file {} from state {:?}, expected PendingSegment",
                self.id, self.state
            )));
        }
        self.segment_attachment = Some(attachment);
        self.state = FileState::InUncommittedSegment;
        Ok(())
    }

    /// `InUncommittedSegment -> InCommittedSegment`, called once per file when
    /// the segment it was attached to closes.
    pub fn commit(&mut self) -> Result<()> {
        if self.state != FileState::InUncommittedSegment {
            return Err(ArchiveError::Unsupported(format!(
                "cannot commit staged file {} from state {:?}, expected InUncommittedSegment",
                self.id, self.state
            )));
        }
        self.state = FileState::InCommittedSegment;
        Ok(())
    }

    pub fn segment_attachment(&self) -> Option<SegmentAttachment> {
        self.segment_attachment
    }

    pub fn num_uncompressed_bytes(&self) -> u64 {
        self.num_uncompressed_bytes
    }

    pub fn num_messages(&self) -> usize {
        self.timestamps.len()
    }

    pub fn has_timestamp(&self) -> bool {
        self.has_ts
    }

    pub fn begin_end_ts(&self) -> (i64, i64) {
        (self.begin_ts, self.end_ts)
    }

    pub fn template_ids(&self) -> &[i64] {
        &self.template_ids
    }

    pub fn variables(&self) -> &[i64] {
        &self.variables
    }

    pub fn ts_patterns(&self) -> &[(usize, &'static str)] {
        &self.ts_patterns
    }

    pub fn columns(&self) -> &BTreeMap<String, ColumnWriter> {
        &self.columns
    }

    pub fn timestamps_bytes(&self) -> Vec<u8> {
        le_i64_bytes(&self.timestamps)
    }

    pub fn template_ids_bytes(&self) -> Vec<u8> {
        le_i64_bytes(&self.template_ids)
    }

    pub fn variables_bytes(&self) -> Vec<u8> {
        le_i64_bytes(&self.variables)
    }
}

fn le_i64_bytes(values: &[i64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 8);
    for &v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_require_open_state() {
        let mut file = StagedFile::new(0, "a.log".into(), 0, 0, FileKind::Text);
        file.release().unwrap();
        assert!(file.write_encoded_msg(1, 0, &[], 0).is_err());
    }

    #[test]
    fn state_machine_transitions_in_order() {
        let mut file = StagedFile::new(0, "a.log".into(), 0, 0, FileKind::Text);
        assert_eq!(file.state(), FileState::Open);
        file.write_encoded_msg(100, 0, &[42], 10).unwrap();
        file.release().unwrap();
        assert_eq!(file.state(), FileState::Closed);
        file.mark_pending_segment().unwrap();
        assert_eq!(file.state(), FileState::PendingSegment);
        file.attach(SegmentAttachment { segment_id: 0, timestamps_offset: 0, template_ids_offset: 8, variables_offset: 16 })
            .unwrap();
        assert_eq!(file.state(), FileState::InUncommittedSegment);
        file.commit().unwrap();
        assert_eq!(file.state(), FileState::InCommittedSegment);
    }

    #[test]
    fn out_of_order_transition_is_rejected() {
        let mut file = StagedFile::new(0, "a.log".into(), 0, 0, FileKind::Text);
        assert!(file.mark_pending_segment().is_err());
        file.release().unwrap();
        assert!(file.commit().is_err());
    }

    #[test]
    fn begin_end_ts_track_min_max() {
        let mut file = StagedFile::new(0, "a.log".into(), 0, 0, FileKind::Text);
        file.write_encoded_msg(500, 0, &[], 1).unwrap();
        file.write_encoded_msg(100, 1, &[], 1).unwrap();
        file.write_encoded_msg(900, 2, &[], 1).unwrap();
        assert_eq!(file.begin_end_ts(), (100, 900));
    }

    #[test]
    fn json_message_routes_leaves_into_columns() {
        let mut file = StagedFile::new(0, "a.json".into(), 0, 0, FileKind::Json);
        file.write_encoded_json_msg(0, 0, &[1], 8, &[("n".to_string(), ColumnLeaf::Int(7))]).unwrap();
        file.write_encoded_json_msg(1, 0, &[1], 8, &[("n".to_string(), ColumnLeaf::Int(9))]).unwrap();
        let col = file.columns().get("n").unwrap();
        assert_eq!(col.len(), 2);
    }

    #[test]
    fn byte_regions_are_little_endian_i64() {
        let mut file = StagedFile::new(0, "a.log".into(), 0, 0, FileKind::Text);
        file.write_encoded_msg(7, 3, &[11, -5], 4).unwrap();
        assert_eq!(file.timestamps_bytes(), 7i64.to_le_bytes());
        assert_eq!(file.template_ids_bytes(), 3i64.to_le_bytes());
        let mut expected = 11i64.to_le_bytes().to_vec();
        expected.extend_from_slice(&(-5i64).to_le_bytes());
        assert_eq!(file.variables_bytes(), expected);
    }
}
