// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed events decoded from `rg --json` output, one JSON object per line.

use serde::Deserialize;
use std::path::PathBuf;

use crate::errors::{PipelineError, Result};
use crate::search::types::SubMatch;

/// A `context` or `match` line reported by the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    pub path: PathBuf,
    pub line: u64,
    pub text: String,
    pub submatches: Vec<SubMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    Begin { path: PathBuf },
    Context(LineRecord),
    Match(LineRecord),
    End { path: PathBuf },
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// rg emits `{"text": ..}` for UTF-8 data and `{"bytes": <base64>}` otherwise.
#[derive(Debug, Deserialize)]
struct RawData {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    path: RawData,
}

#[derive(Debug, Deserialize)]
struct RawLine {
    path: RawData,
    lines: RawData,
    line_number: Option<u64>,
    #[serde(default)]
    submatches: Vec<RawSubMatch>,
}

#[derive(Debug, Deserialize)]
struct RawSubMatch {
    #[serde(rename = "match")]
    matched: RawData,
    start: usize,
    end: usize,
}

/// Parse one output line.
///
/// `Ok(None)` covers blank lines, `summary` records and records whose path or
/// text is not valid UTF-8; `Err` is a line that is not a tool record at all.
pub fn parse_event_line(line: &str) -> Result<Option<SearchEvent>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let malformed = |source| PipelineError::ToolOutputMalformed {
        line: truncate_for_log(trimmed),
        source,
    };

    let raw: RawRecord = serde_json::from_str(trimmed).map_err(malformed)?;
    let event = match raw.kind.as_str() {
        "begin" | "end" => {
            let file: RawFile = serde_json::from_value(raw.data).map_err(malformed)?;
            let Some(path) = file.path.text else {
                tracing::warn!("skipping {} record with non-UTF-8 path", raw.kind);
                return Ok(None);
            };
            let path = PathBuf::from(path);
            if raw.kind == "begin" {
                SearchEvent::Begin { path }
            } else {
                SearchEvent::End { path }
            }
        }
        "context" | "match" => {
            let raw_line: RawLine = serde_json::from_value(raw.data).map_err(malformed)?;
            let Some(record) = line_record(raw_line) else {
                tracing::warn!("skipping {} record with non-UTF-8 data", raw.kind);
                return Ok(None);
            };
            if raw.kind == "match" {
                SearchEvent::Match(record)
            } else {
                SearchEvent::Context(record)
            }
        }
        _ => return Ok(None),
    };

    Ok(Some(event))
}

fn line_record(raw: RawLine) -> Option<LineRecord> {
    let path = PathBuf::from(raw.path.text?);
    let text = strip_line_terminator(raw.lines.text?);
    let line = raw.line_number?;
    let submatches = raw
        .submatches
        .into_iter()
        .filter_map(|sub| {
            Some(SubMatch {
                start: sub.start,
                end: sub.end,
                text: sub.matched.text?,
            })
        })
        .collect();

    Some(LineRecord {
        path,
        line,
        text,
        submatches,
    })
}

fn strip_line_terminator(mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    text
}

fn truncate_for_log(line: &str) -> String {
    const MAX: usize = 200;
    if line.chars().count() <= MAX {
        return line.to_string();
    }
    let mut out: String = line.chars().take(MAX).collect();
    out.push_str("...");
    out
}
