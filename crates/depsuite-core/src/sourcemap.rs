//! Source map (v3) handling for injected code.
//!
//! Injection only ever appends, so the incoming mappings stay valid for the
//! original text and the appended region is simply left unmapped. The map is
//! still checked against the source it claims to describe.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A raw v3 source map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub names: Vec<String>,
    pub mappings: String,
    /// Properties this crate does not interpret (`x_google_ignoreList`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Why a source map cannot be merged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceMapError {
    #[error("invalid source map JSON: {0}")]
    Json(String),

    #[error("unsupported source map version {0}")]
    Version(u32),

    #[error("malformed mappings at line {line}: {reason}")]
    Mappings { line: usize, reason: String },

    #[error("mappings describe line {line} but the source has {lines} lines")]
    LineOutOfRange { line: usize, lines: usize },

    #[error("mapping at line {line} column {column} is past the end of the line ({len})")]
    ColumnOutOfRange {
        line: usize,
        column: i64,
        len: usize,
    },

    #[error("mapping at line {line} refers to source {index} of {count}")]
    SourceOutOfRange {
        line: usize,
        index: i64,
        count: usize,
    },
}

impl SourceMap {
    /// Parse a map from JSON text.
    pub fn from_json(text: &str) -> Result<Self, SourceMapError> {
        serde_json::from_str(text).map_err(|e| SourceMapError::Json(e.to_string()))
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<String, SourceMapError> {
        serde_json::to_string(self).map_err(|e| SourceMapError::Json(e.to_string()))
    }

    /// Check that the map fits `source`.
    pub fn validate(&self, source: &str) -> Result<(), SourceMapError> {
        if self.version != 3 {
            return Err(SourceMapError::Version(self.version));
        }

        let line_lengths: Vec<usize> = source
            .split('\n')
            .map(|line| line.encode_utf16().count())
            .collect();
        let mut source_index: i64 = 0;

        for (line, group) in self.mappings.split(';').enumerate() {
            if group.is_empty() {
                continue;
            }
            let Some(&len) = line_lengths.get(line) else {
                return Err(SourceMapError::LineOutOfRange {
                    line: line + 1,
                    lines: line_lengths.len(),
                });
            };

            let mut column: i64 = 0;
            for segment in group.split(',').filter(|s| !s.is_empty()) {
                let fields = decode_segment(segment).map_err(|reason| SourceMapError::Mappings {
                    line: line + 1,
                    reason,
                })?;
                if !matches!(fields.len(), 1 | 4 | 5) {
                    return Err(SourceMapError::Mappings {
                        line: line + 1,
                        reason: format!("segment has {} fields", fields.len()),
                    });
                }

                column += fields[0];
                if column < 0 || column as usize > len {
                    return Err(SourceMapError::ColumnOutOfRange {
                        line: line + 1,
                        column,
                        len,
                    });
                }

                if fields.len() >= 4 {
                    source_index += fields[1];
                    if source_index < 0 || source_index as usize >= self.sources.len() {
                        return Err(SourceMapError::SourceOutOfRange {
                            line: line + 1,
                            index: source_index,
                            count: self.sources.len(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

fn b64_value(c: u8) -> Option<i64> {
    let v = match c {
        b'A'..=b'Z' => c - b'A',
        b'a'..=b'z' => c - b'a' + 26,
        b'0'..=b'9' => c - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => return None,
    };
    Some(i64::from(v))
}

/// VLQ-decode every field of one mapping segment.
fn decode_segment(segment: &str) -> Result<Vec<i64>, String> {
    let mut fields = Vec::with_capacity(5);
    let mut value: i64 = 0;
    let mut shift = 0;

    for &c in segment.as_bytes() {
        let digit = b64_value(c).ok_or_else(|| format!("invalid base64 character {:?}", c as char))?;
        if shift > 60 {
            return Err("VLQ value overflows".to_string());
        }
        value |= (digit & 0x1f) << shift;

        if digit & 0x20 != 0 {
            // continuation bit
            shift += 5;
            continue;
        }

        let negative = value & 1 == 1;
        let magnitude = value >> 1;
        fields.push(if negative { -magnitude } else { magnitude });
        value = 0;
        shift = 0;
    }

    if shift != 0 {
        return Err("truncated VLQ value".to_string());
    }
    Ok(fields)
}
