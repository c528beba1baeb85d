//! JSON encoder/decoder (C6): walks a parsed JSON object depth-first,
//! rewrites scalar leaves to delimiter-prefixed sentinel bytes, and threads
//! the encoded variables through a shared side vector.
//!
//! Grounded on the reference `EncodedVariableInterpreter::
//! encode_json_object_and_add_to_dictionary` and `JsonTypeDictionaryEntry`'s
//! `add_logtype`/`add_string_var`/`add_double_var`/`add_boolean_var`
//! delimiter conventions. `JsonTypeDictionaryEntry::add_double_var` packs a
//! `Double` leaf's digit counts into one raw byte after the delimiter, which
//! is not guaranteed to be valid UTF-8 in isolation -- so the rewritten
//! document is produced by a small hand-rolled recursive-descent writer
//! instead of `serde_json::Value`/`to_string`: object/array syntax and key
//! text go through ordinary JSON string escaping (`serde_json::to_string`),
//! but a leaf's sentinel bytes are written unquoted, straight into the
//! buffer, with no escaping applied.

use serde_json::{Map, Number, Value};

use crate::column::ColumnLeaf;
use crate::config::EncoderConfig;
use crate::delim::Delim;
use crate::dictionary::logtype_dict::LogtypeDictionary;
use crate::dictionary::variable_dict::VariableDictionary;
use crate::error::{ArchiveError, Result};
use crate::text_codec::{decode_text, encode_text};
use crate::variable::{decimal_digit_counts, decode_decimal, decode_dict_id, encode_dict_id, is_dict_id, try_encode_decimal};

/// Result of encoding one JSON record.
pub struct EncodedJson {
    /// The document with every scalar leaf rewritten to a sentinel byte
    /// sequence, serialized to bytes (object/array syntax and keys are valid
    /// JSON text; leaf sentinels are written raw and unescaped).
    pub value: Vec<u8>,
    /// Encoded-variable slots in document (depth-first, key-order) order,
    /// including the slots emitted by any nested text-message leaves.
    pub vars: Vec<i64>,
    /// Flat `(dotted.path, typed value)` list of every scalar leaf, for the
    /// columnar side-channel (C8). Array indices appear as numeric path
    /// segments (`"items.0.name"`).
    pub extracted_leaves: Vec<(String, ColumnLeaf)>,
}

/// Render a float `%f`-style: six fractional digits, no scientific notation
/// (`0.5` renders as `"0.500000"`).
fn render_float(f: f64) -> String {
    format!("{f:.6}")
}

/// Encode `value` in place, consuming it and returning the rewritten
/// document's bytes, the shared variable-slot vector, and the extracted-leaf
/// list.
pub fn encode_json(
    value: Value,
    config: &EncoderConfig,
    var_dict: &mut VariableDictionary,
    logtype_dict: &mut LogtypeDictionary,
) -> EncodedJson {
    let mut vars = Vec::new();
    let mut leaves = Vec::new();
    let mut path = Vec::new();
    let mut out = Vec::new();
    encode_value(value, config, var_dict, logtype_dict, &mut vars, &mut leaves, &mut path, &mut out);
    EncodedJson { value: out, vars, extracted_leaves: leaves }
}

fn write_key(out: &mut Vec<u8>, key: &str) {
    out.extend_from_slice(serde_json::to_string(key).unwrap_or_default().as_bytes());
}

fn encode_value(
    value: Value,
    config: &EncoderConfig,
    var_dict: &mut VariableDictionary,
    logtype_dict: &mut LogtypeDictionary,
    vars: &mut Vec<i64>,
    leaves: &mut Vec<(String, ColumnLeaf)>,
    path: &mut Vec<String>,
    out: &mut Vec<u8>,
) {
    match value {
        Value::Object(map) => {
            out.push(b'{');
            for (i, (k, v)) in map.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_key(out, &k);
                out.push(b':');
                path.push(k);
                encode_value(v, config, var_dict, logtype_dict, vars, leaves, path, out);
                path.pop();
            }
            out.push(b'}');
        }
        Value::Array(arr) => {
            out.push(b'[');
            for (i, v) in arr.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                path.push(i.to_string());
                encode_value(v, config, var_dict, logtype_dict, vars, leaves, path, out);
                path.pop();
            }
            out.push(b']');
        }
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(b) => {
            vars.push(if b { 1 } else { 0 });
            leaves.push((path.join("."), ColumnLeaf::Bool(b)));
            out.push(Delim::BooleanVar.as_byte());
        }
        Value::Number(n) => encode_number(n, config, var_dict, vars, leaves, path, out),
        Value::String(s) => encode_string(s, config, var_dict, logtype_dict, vars, leaves, path, out),
    }
}

fn encode_number(
    n: Number,
    config: &EncoderConfig,
    var_dict: &mut VariableDictionary,
    vars: &mut Vec<i64>,
    leaves: &mut Vec<(String, ColumnLeaf)>,
    path: &[String],
    out: &mut Vec<u8>,
) {
    if let Some(i) = n.as_i64() {
        vars.push(i);
        leaves.push((path.join("."), ColumnLeaf::Int(i)));
        out.push(Delim::NonDouble.as_byte());
        return;
    }
    if n.is_f64() {
        let f = n.as_f64().unwrap_or(0.0);
        leaves.push((path.join("."), ColumnLeaf::Float(f)));
        let rendered = render_float(f);
        if let Some(slot) = try_encode_decimal(&rendered) {
            vars.push(slot);
            let (int_digits, frac_digits) = decimal_digit_counts(slot);
            out.push(Delim::Double.as_byte());
            out.push((int_digits << 4) | (frac_digits & 0x0F));
            return;
        }
        // Open Question 2: a rendered float exceeding MAX_DECIMAL_DIGITS
        // falls back to the variable dictionary as a string.
        let (id, _) = var_dict.add_occurrence(&rendered);
        vars.push(encode_dict_id(id, &config.dict_id_range));
        out.push(Delim::StringVar.as_byte());
        return;
    }
    // u64 too large for i64: not representable as a raw NonDouble slot.
    let rendered = n.to_string();
    leaves.push((path.join("."), ColumnLeaf::Str(rendered.clone())));
    let (id, _) = var_dict.add_occurrence(&rendered);
    vars.push(encode_dict_id(id, &config.dict_id_range));
    out.push(Delim::StringVar.as_byte());
}

fn encode_string(
    s: String,
    config: &EncoderConfig,
    var_dict: &mut VariableDictionary,
    logtype_dict: &mut LogtypeDictionary,
    vars: &mut Vec<i64>,
    leaves: &mut Vec<(String, ColumnLeaf)>,
    path: &[String],
    out: &mut Vec<u8>,
) {
    leaves.push((path.join("."), ColumnLeaf::Str(s.clone())));
    if s.chars().any(char::is_whitespace) {
        let encoded = encode_text(&s, config, var_dict);
        let num_vars = encoded.vars.len();
        vars.extend(encoded.vars);
        let (logtype_id, _) = logtype_dict.insert_or_get(encoded.template, encoded.verbosity, num_vars);
        out.push(Delim::LogType.as_byte());
        out.extend_from_slice(logtype_id.to_string().as_bytes());
    } else {
        let (id, _) = var_dict.add_occurrence(&s);
        vars.push(encode_dict_id(id, &config.dict_id_range));
        out.push(Delim::StringVar.as_byte());
    }
}

/// Reconstruct the original document from a jsontype entry's rewritten
/// `value` bytes and the slice of slots this record consumed.
pub fn decode_json(
    entry_value: &[u8],
    vars: &[i64],
    dict_id_range: &crate::config::VariableDictIdRange,
    var_dict: &dyn Fn(u64) -> Option<String>,
    logtype_dict: &LogtypeDictionary,
) -> Result<Value> {
    let mut pos = 0usize;
    let mut idx = 0usize;
    let decoded = decode_value(entry_value, &mut pos, vars, &mut idx, dict_id_range, var_dict, logtype_dict)?;
    Ok(decoded)
}

fn decode_value(
    bytes: &[u8],
    pos: &mut usize,
    vars: &[i64],
    idx: &mut usize,
    range: &crate::config::VariableDictIdRange,
    var_dict: &dyn Fn(u64) -> Option<String>,
    logtype_dict: &LogtypeDictionary,
) -> Result<Value> {
    let &byte = bytes
        .get(*pos)
        .ok_or_else(|| ArchiveError::Corrupt("jsontype entry truncated while reading a value".into()))?;
    match byte {
        b'{' => decode_object(bytes, pos, vars, idx, range, var_dict, logtype_dict),
        b'[' => decode_array(bytes, pos, vars, idx, range, var_dict, logtype_dict),
        b'n' => {
            expect_literal(bytes, pos, b"null")?;
            Ok(Value::Null)
        }
        _ => decode_leaf(bytes, pos, vars, idx, range, var_dict, logtype_dict),
    }
}

fn expect_byte(bytes: &[u8], pos: &mut usize, expected: u8) -> Result<()> {
    if bytes.get(*pos) != Some(&expected) {
        return Err(ArchiveError::Corrupt(format!(
            "jsontype entry malformed: expected {:?} at byte {}",
            expected as char, pos
        )));
    }
    *pos += 1;
    Ok(())
}

fn expect_literal(bytes: &[u8], pos: &mut usize, literal: &[u8]) -> Result<()> {
    if bytes.get(*pos..*pos + literal.len()) != Some(literal) {
        return Err(ArchiveError::Corrupt("jsontype entry malformed literal".into()));
    }
    *pos += literal.len();
    Ok(())
}

fn decode_object(
    bytes: &[u8],
    pos: &mut usize,
    vars: &[i64],
    idx: &mut usize,
    range: &crate::config::VariableDictIdRange,
    var_dict: &dyn Fn(u64) -> Option<String>,
    logtype_dict: &LogtypeDictionary,
) -> Result<Value> {
    expect_byte(bytes, pos, b'{')?;
    let mut map = Map::new();
    if bytes.get(*pos) == Some(&b'}') {
        *pos += 1;
        return Ok(Value::Object(map));
    }
    loop {
        let key = decode_key(bytes, pos)?;
        expect_byte(bytes, pos, b':')?;
        let value = decode_value(bytes, pos, vars, idx, range, var_dict, logtype_dict)?;
        map.insert(key, value);
        match bytes.get(*pos) {
            Some(b',') => *pos += 1,
            Some(b'}') => {
                *pos += 1;
                break;
            }
            _ => return Err(ArchiveError::Corrupt("jsontype entry object missing ',' or '}'".into())),
        }
    }
    Ok(Value::Object(map))
}

fn decode_array(
    bytes: &[u8],
    pos: &mut usize,
    vars: &[i64],
    idx: &mut usize,
    range: &crate::config::VariableDictIdRange,
    var_dict: &dyn Fn(u64) -> Option<String>,
    logtype_dict: &LogtypeDictionary,
) -> Result<Value> {
    expect_byte(bytes, pos, b'[')?;
    let mut out = Vec::new();
    if bytes.get(*pos) == Some(&b']') {
        *pos += 1;
        return Ok(Value::Array(out));
    }
    loop {
        out.push(decode_value(bytes, pos, vars, idx, range, var_dict, logtype_dict)?);
        match bytes.get(*pos) {
            Some(b',') => *pos += 1,
            Some(b']') => {
                *pos += 1;
                break;
            }
            _ => return Err(ArchiveError::Corrupt("jsontype entry array missing ',' or ']'".into())),
        }
    }
    Ok(Value::Array(out))
}

/// Parse a JSON string literal (object key), honoring `\"`/`\\` escapes while
/// scanning for the closing quote, then hand the whole quoted literal to
/// `serde_json` to unescape. Keys are always written by `write_key` as
/// ordinary JSON string text, never raw sentinel bytes.
fn decode_key(bytes: &[u8], pos: &mut usize) -> Result<String> {
    let start = *pos;
    expect_byte(bytes, pos, b'"')?;
    loop {
        match bytes.get(*pos) {
            Some(b'\\') => *pos += 2,
            Some(b'"') => {
                *pos += 1;
                break;
            }
            Some(_) => *pos += 1,
            None => return Err(ArchiveError::Corrupt("jsontype entry key truncated".into())),
        }
    }
    let literal = std::str::from_utf8(&bytes[start..*pos])
        .map_err(|_| ArchiveError::Corrupt("jsontype entry key is not valid UTF-8".into()))?;
    serde_json::from_str(literal).map_err(|e| ArchiveError::Corrupt(format!("jsontype entry key is malformed JSON: {e}")))
}

fn next_slot(vars: &[i64], idx: &mut usize) -> Result<i64> {
    let slot = *vars
        .get(*idx)
        .ok_or_else(|| ArchiveError::Corrupt("jsontype entry has fewer variables than delimiters".into()))?;
    *idx += 1;
    Ok(slot)
}

fn decode_leaf(
    bytes: &[u8],
    pos: &mut usize,
    vars: &[i64],
    idx: &mut usize,
    range: &crate::config::VariableDictIdRange,
    var_dict: &dyn Fn(u64) -> Option<String>,
    logtype_dict: &LogtypeDictionary,
) -> Result<Value> {
    let byte = bytes[*pos];
    let delim = Delim::from_byte(byte).ok_or_else(|| ArchiveError::Corrupt(format!("unknown jsontype leaf delimiter byte {byte:#x}")))?;
    *pos += 1;

    match delim {
        Delim::NonDouble => {
            let slot = next_slot(vars, idx)?;
            // A NonDouble leaf whose slot is a dictionary id is treated as a
            // StringVar, not silently skipped.
            if is_dict_id(slot, range) {
                let id = decode_dict_id(slot, range);
                Ok(Value::String(var_dict(id).unwrap_or_default()))
            } else {
                Ok(Value::Number(slot.into()))
            }
        }
        Delim::Double => {
            // The packed digit-count byte after the delimiter isn't needed to
            // reconstruct the value -- `slot` alone carries the magnitude --
            // but still occupies one byte in the stream.
            if *pos >= bytes.len() {
                return Err(ArchiveError::Corrupt("Double leaf missing trailing digit-count byte".into()));
            }
            *pos += 1;
            let slot = next_slot(vars, idx)?;
            let rendered = decode_decimal(slot);
            match rendered.parse::<f64>().ok().and_then(Number::from_f64) {
                Some(n) => Ok(Value::Number(n)),
                None => Ok(Value::String(rendered)),
            }
        }
        Delim::StringVar => {
            let slot = next_slot(vars, idx)?;
            let id = decode_dict_id(slot, range);
            Ok(Value::String(var_dict(id).unwrap_or_default()))
        }
        Delim::BooleanVar => {
            let slot = next_slot(vars, idx)?;
            Ok(Value::Bool(slot != 0))
        }
        Delim::LogType => {
            let digit_start = *pos;
            while *pos < bytes.len() && bytes[*pos].is_ascii_digit() {
                *pos += 1;
            }
            let digits = std::str::from_utf8(&bytes[digit_start..*pos]).unwrap_or("");
            let logtype_id: u64 = digits
                .parse()
                .map_err(|_| ArchiveError::Corrupt("LogType leaf id is not a decimal integer".into()))?;
            let entry = logtype_dict
                .get_entry(logtype_id)
                .ok_or_else(|| ArchiveError::Corrupt("jsontype entry references an unknown logtype id".into()))?;
            let var_infos = entry.scan_var_positions()?;
            if vars.len() < *idx + entry.num_vars {
                return Err(ArchiveError::Corrupt(
                    "not enough variable slots remain for a nested logtype entry".into(),
                ));
            }
            let slice = &vars[*idx..*idx + entry.num_vars];
            let text = decode_text(&entry.value, &var_infos, slice, var_dict, range)?;
            *idx += entry.num_vars;
            Ok(Value::String(text))
        }
    }
}
