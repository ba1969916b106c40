// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal and JSON output helpers

use colored::Colorize;
use serde::Serialize;
use std::io::IsTerminal;

use crate::highlight::{decode_entities, parse_highlighted};
use crate::search::SubMatch;

/// Colors are used only on a terminal and only when `NO_COLOR` is unset.
pub fn use_colors() -> bool {
    std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
}

pub fn colorize_path(path: &str, use_color: bool) -> String {
    if use_color {
        path.magenta().bold().to_string()
    } else {
        path.to_string()
    }
}

pub fn colorize_line_num(line: u64, use_color: bool) -> String {
    if use_color {
        line.to_string().green().to_string()
    } else {
        line.to_string()
    }
}

pub fn colorize_match(text: &str, use_color: bool) -> String {
    if use_color {
        text.red().bold().to_string()
    } else {
        text.to_string()
    }
}

pub fn colorize_context(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> anyhow::Result<()> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", text);
    Ok(())
}

/// Color the sub-match spans of a raw line. Spans that do not fall on
/// character boundaries are left uncolored.
pub fn colorize_submatches(text: &str, submatches: &[SubMatch], use_color: bool) -> String {
    if !use_color || submatches.is_empty() {
        return text.to_string();
    }
    let mut spans: Vec<&SubMatch> = submatches.iter().collect();
    spans.sort_by_key(|s| s.start);

    let mut out = String::with_capacity(text.len() + 16 * spans.len());
    let mut cursor = 0;
    for span in spans {
        if span.start < cursor || span.end <= span.start {
            continue;
        }
        let (Some(plain), Some(hit)) = (text.get(cursor..span.start), text.get(span.start..span.end))
        else {
            continue;
        };
        out.push_str(plain);
        out.push_str(&colorize_match(hit, true));
        cursor = span.end;
    }
    out.push_str(text.get(cursor..).unwrap_or_default());
    out
}

/// Decode HTML entities, including numeric ones written by the store's encoder.
pub fn unescape_html(text: &str) -> String {
    decode_entities(text)
}

/// Turn `<mark>`-highlighted HTML into terminal text.
pub fn render_marked(html: &str, use_color: bool) -> String {
    parse_highlighted(html)
        .into_iter()
        .map(|segment| {
            let text = unescape_html(&segment.text);
            if segment.highlighted {
                colorize_match(&text, use_color)
            } else {
                text
            }
        })
        .collect()
}
