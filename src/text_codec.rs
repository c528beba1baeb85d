//! Text encoder/decoder (C7): tokenize a message into a logtype template plus
//! a vector of encoded-variable slots, and the symmetric reverse.
//!
//! Grounded on the reference `LogTypeDictionaryEntry::parse_next_var` tokenizer
//! and `EncodedVariableInterpreter` encode/decode dispatch (integer, then
//! decimal, then dictionary string), replayed here over the C1 codec in
//! `src/variable.rs`. The template is built as raw bytes rather than a
//! `String`: a `Delim::Double` marker's digit-count suffix is a single packed
//! byte (high nibble `num_integer_digits`, low nibble `num_fractional_digits`)
//! and need not be valid UTF-8 in isolation.

use crate::config::EncoderConfig;
use crate::delim::{Delim, LogVerbosity};
use crate::dictionary::logtype_dict::VarInfo;
use crate::dictionary::variable_dict::VariableDictionary;
use crate::error::{ArchiveError, Result};
use crate::variable::{decimal_digit_counts, decode_decimal, try_encode_decimal, try_encode_integer};

/// Result of encoding one message's text.
pub struct EncodedText {
    pub template: Vec<u8>,
    pub verbosity: LogVerbosity,
    pub vars: Vec<i64>,
}

/// A maximal run of non-whitespace characters is a token; it is a variable iff
/// it contains at least one digit or ASCII punctuation character.
fn is_variable_token(token: &str) -> bool {
    token.bytes().any(|b| b.is_ascii_digit() || b.is_ascii_punctuation())
}

/// Encode `message` into a delimiter-substituted template plus its slots.
/// Every new string variable is interned into `var_dict` as it is
/// encountered.
pub fn encode_text(message: &str, config: &EncoderConfig, var_dict: &mut VariableDictionary) -> EncodedText {
    let verbosity = message
        .split_whitespace()
        .next()
        .map(LogVerbosity::detect)
        .unwrap_or(LogVerbosity::Unknown);

    let mut template = Vec::with_capacity(message.len());
    let mut vars = Vec::new();

    for (token, is_whitespace) in split_preserving_whitespace(message) {
        if is_whitespace {
            template.extend_from_slice(token.as_bytes());
            continue;
        }
        if !is_variable_token(token) {
            template.extend_from_slice(token.as_bytes());
            continue;
        }
        if let Some(slot) = try_encode_integer(token, &config.dict_id_range) {
            vars.push(slot);
            template.push(Delim::NonDouble.as_byte());
        } else if let Some(slot) = try_encode_decimal(token) {
            vars.push(slot);
            template.push(Delim::Double.as_byte());
            let (int_digits, frac_digits) = decimal_digit_counts(slot);
            template.push((int_digits << 4) | (frac_digits & 0x0F));
        } else {
            let (id, _) = var_dict.add_occurrence(token);
            vars.push(crate::variable::encode_dict_id(id, &config.dict_id_range));
            template.push(Delim::StringVar.as_byte());
        }
    }

    EncodedText { template, verbosity, vars }
}

/// Split `s` into alternating (non-whitespace, whitespace) runs, tagged by
/// whether each run is whitespace.
fn split_preserving_whitespace(s: &str) -> Vec<(&str, bool)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_whitespace = false;
    let bytes = s.as_bytes();
    let mut in_progress = false;
    for (i, ch) in s.char_indices() {
        let is_ws = ch.is_whitespace();
        if in_progress && is_ws != in_whitespace {
            out.push((&s[start..i], in_whitespace));
            start = i;
        }
        in_whitespace = is_ws;
        in_progress = true;
        let _ = bytes;
    }
    if in_progress {
        out.push((&s[start..], in_whitespace));
    }
    out
}

/// Reconstruct the original text for one logtype entry's template given the
/// slice of slots it consumes starting at `vars[0]`. Returns the decoded text
/// and the number of slots consumed (always `entry's num_vars`, already known
/// to the caller -- returned again here as a cross-check).
pub fn decode_text(
    template: &[u8],
    var_infos: &[VarInfo],
    vars: &[i64],
    var_dict: &dyn Fn(u64) -> Option<String>,
    dict_id_range: &crate::config::VariableDictIdRange,
) -> Result<String> {
    if var_infos.len() > vars.len() {
        return Err(ArchiveError::Corrupt(
            "fewer encoded-variable slots than a logtype entry's var_info expects".into(),
        ));
    }
    let bytes = template;
    let mut out = String::with_capacity(template.len());
    let mut last = 0usize;
    for (info, &slot) in var_infos.iter().zip(vars.iter()) {
        out.push_str(std::str::from_utf8(&bytes[last..info.position]).unwrap_or(""));
        match info.delim {
            Delim::NonDouble => {
                if crate::variable::is_dict_id(slot, dict_id_range) {
                    let id = crate::variable::decode_dict_id(slot, dict_id_range);
                    out.push_str(&var_dict(id).unwrap_or_default());
                } else {
                    out.push_str(&slot.to_string());
                }
            }
            Delim::Double => out.push_str(&decode_decimal(slot)),
            Delim::StringVar => {
                let id = crate::variable::decode_dict_id(slot, dict_id_range);
                out.push_str(&var_dict(id).unwrap_or_default());
            }
            Delim::BooleanVar => out.push_str(if slot != 0 { "true" } else { "false" }),
            Delim::LogType => {
                return Err(ArchiveError::Corrupt(
                    "a text logtype entry cannot contain a nested LogType delimiter".into(),
                ))
            }
        }
        last = match info.delim {
            Delim::Double => info.position + crate::dictionary::logtype_dict::DOUBLE_MARKER_LEN,
            Delim::LogType => {
                let mut i = info.position + 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                i
            }
            _ => info.position + 1,
        };
    }
    out.push_str(std::str::from_utf8(&bytes[last..]).unwrap_or(""));
    Ok(out)
}
