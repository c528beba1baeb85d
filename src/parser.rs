//! Message parser (C5): line buffering and timestamp extraction for text,
//! plus the JSON parsing gate.
//!
//! Lines accumulate into a pending message until a boundary is reached, the
//! same accumulate-then-flush-on-boundary shape as a byte-count buffer, but
//! bounded by a timestamp instead of a size.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use crate::delim::LogVerbosity;

/// One line/string format tried against the start of a line, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampPattern {
    pub name: &'static str,
    format: &'static str,
    has_offset: bool,
}

/// Ordered so the most common formats are tried first once a file's "current
/// pattern" memo misses.
pub const PATTERN_LIBRARY: &[TimestampPattern] = &[
    TimestampPattern { name: "rfc3339", format: "%+", has_offset: true },
    TimestampPattern { name: "ymd_hms_frac", format: "%Y-%m-%d %H:%M:%S%.f", has_offset: false },
    TimestampPattern { name: "ymd_hms", format: "%Y-%m-%d %H:%M:%S", has_offset: false },
    TimestampPattern { name: "ymd_slash_hms", format: "%Y/%m/%d %H:%M:%S", has_offset: false },
];

/// Try every pattern in `PATTERN_LIBRARY`, `preferred` first if given, against
/// the start of `line`. Returns the epoch-millisecond timestamp and the
/// pattern that matched.
pub fn try_parse_timestamp(line: &str, preferred: Option<&'static str>) -> Option<(i64, &'static str)> {
    let ordered = PATTERN_LIBRARY.iter().copied();
    let preferred_first = preferred
        .and_then(|name| PATTERN_LIBRARY.iter().find(|p| p.name == name).copied())
        .into_iter()
        .chain(ordered.filter(|p| Some(p.name) != preferred));
    for pattern in preferred_first {
        if let Some(ms) = try_one_pattern(line, pattern) {
            return Some((ms, pattern.name));
        }
    }
    None
}

fn try_one_pattern(line: &str, pattern: TimestampPattern) -> Option<i64> {
    if pattern.has_offset {
        let (dt, _) = DateTime::parse_and_remainder(line, pattern.format).ok()?;
        Some(dt.with_timezone(&Utc).timestamp_millis())
    } else {
        let (naive, _) = NaiveDateTime::parse_and_remainder(line, pattern.format).ok()?;
        Some(naive.and_utc().timestamp_millis())
    }
}

/// A complete message recovered from the input stream, ready for the text or
/// JSON encoder.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub text: String,
    /// `None` for a line that never carried a timestamp of its own (it was
    /// absorbed into the previous message's buffer).
    pub timestamp: Option<i64>,
}

/// Accumulates lines for one source file, flushing a `ParsedMessage` whenever
/// a new timestamp-bearing line starts, or immediately for a single
/// non-timestamp line with nothing buffered.
pub struct TextLineParser {
    buffer: Option<ParsedMessage>,
    current_pattern: Option<&'static str>,
    /// `(message_index, pattern_name)` pairs recording every pattern switch,
    /// mirrored into the staged file's `ts_patterns`.
    pattern_switches: Vec<(usize, &'static str)>,
    messages_emitted: usize,
}

impl TextLineParser {
    pub fn new() -> Self {
        Self {
            buffer: None,
            current_pattern: None,
            pattern_switches: Vec::new(),
            messages_emitted: 0,
        }
    }

    /// Feed one complete line (the trailing `\n` already stripped). Returns a
    /// message if this line caused the buffered one to flush.
    pub fn push_line(&mut self, line: &str) -> Option<ParsedMessage> {
        match try_parse_timestamp(line, self.current_pattern) {
            Some((ts, pattern)) => {
                if self.current_pattern != Some(pattern) {
                    self.pattern_switches.push((self.messages_emitted, pattern));
                    self.current_pattern = Some(pattern);
                }
                let flushed = self.buffer.take();
                self.buffer = Some(ParsedMessage { text: line.to_string(), timestamp: Some(ts) });
                if flushed.is_some() {
                    self.messages_emitted += 1;
                }
                flushed
            }
            None => match self.buffer.as_mut() {
                Some(buffered) => {
                    buffered.text.push('\n');
                    buffered.text.push_str(line);
                    None
                }
                None => {
                    self.messages_emitted += 1;
                    Some(ParsedMessage { text: line.to_string(), timestamp: None })
                }
            },
        }
    }

    /// Flush whatever is left in the buffer at end of input.
    pub fn drain(&mut self) -> Option<ParsedMessage> {
        self.messages_emitted += self.buffer.is_some() as usize;
        self.buffer.take()
    }

    pub fn pattern_switches(&self) -> &[(usize, &'static str)] {
        &self.pattern_switches
    }
}

impl Default for TextLineParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Field names tried, in order, when looking for a JSON record's timestamp.
pub const JSON_TIMESTAMP_KEYS: &[&str] =
    &["Time", "TIME", "time", "timestamp", "Timestamp", "TimeStamp", "TIMESTAMP"];

/// Parse one line as a JSON object, extracting its timestamp if present.
/// Returns `None` (after logging a warning) on malformed JSON -- a bad record
/// is dropped, not a fatal error.
pub fn parse_json_line(line: &str, preferred_pattern: Option<&'static str>) -> Option<(serde_json::Value, Option<i64>)> {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!("discarding malformed JSON record: {e}");
            return None;
        }
    };
    let obj = value.as_object()?;
    for key in JSON_TIMESTAMP_KEYS {
        let Some(field) = obj.get(*key) else { continue };
        if let Some(ms) = field.as_i64() {
            return Some((value, Some(ms)));
        }
        if let Some(s) = field.as_str() {
            if let Some((ms, _)) = try_parse_timestamp(s, preferred_pattern) {
                return Some((value, Some(ms)));
            }
        }
    }
    Some((value, None))
}

/// Classify a message's verbosity from its first whitespace-delimited token,
/// skipping a leading timestamp if one was already consumed by the caller.
pub fn extract_verbosity(message: &str) -> LogVerbosity {
    let first_token = message.split_whitespace().next().unwrap_or("");
    LogVerbosity::detect(first_token)
}
