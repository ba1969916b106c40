// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTML-safe highlighting with `<mark>` spans
//!
//! Text is always HTML-escaped before any mark is inserted. Terms are escaped
//! the same way so they match the escaped text, and all terms are marked in a
//! single pass so marks never nest and entities are never split.

pub mod snippets;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

pub use snippets::{apply_store_highlighting, snippets, RenderedDocument};

pub const MARK_OPEN: &str = "<mark>";
pub const MARK_CLOSE: &str = "</mark>";

/// Solr highlighting section: document id -> field -> fragments.
pub type HighlightMap = HashMap<String, HashMap<String, Vec<String>>>;

static PHRASE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]*)""#).expect("valid phrase regex"));
static OPERATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:AND|OR|NOT)\b").expect("valid operator regex"));
static FIELD_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\w+:").expect("valid field prefix regex"));
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:(amp|lt|gt|quot|apos)|#([0-9]{1,7})|#[xX]([0-9a-fA-F]{1,6}));")
        .expect("valid entity regex")
});
static MARKED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<mark>(.*?)</mark>").expect("valid mark regex"));

const ENTITY_PATTERN: &str = "&(?:amp|lt|gt|quot|#39);";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Decode named and numeric character references in one pass.
/// Unknown or invalid references are left as they are.
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| {
            let decoded = if let Some(name) = caps.get(1) {
                match name.as_str() {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    _ => Some('\''),
                }
            } else if let Some(dec) = caps.get(2) {
                dec.as_str().parse::<u32>().ok().and_then(char::from_u32)
            } else {
                caps.get(3)
                    .and_then(|hex| u32::from_str_radix(hex.as_str(), 16).ok())
                    .and_then(char::from_u32)
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Search terms of a query: quoted phrases plus bare words, with boolean
/// operators, field prefixes and `+`/`-` stripped. Longest terms first.
pub fn extract_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = PHRASE_RE
        .captures_iter(query)
        .map(|caps| caps[1].trim().to_string())
        .filter(|phrase| !phrase.is_empty())
        .collect();

    let rest = PHRASE_RE.replace_all(query, " ");
    let rest = OPERATOR_RE.replace_all(&rest, " ");
    let rest = FIELD_PREFIX_RE.replace_all(&rest, " ");

    let words: Vec<String> = rest
        .split_whitespace()
        .map(|word| {
            word.trim_start_matches(['+', '-'])
                .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
                .to_string()
        })
        .filter(|word| !word.is_empty())
        .collect();

    let has_long = !terms.is_empty() || words.iter().any(|w| w.chars().count() >= 2);
    // Single characters only count when the query has nothing longer.
    terms.extend(
        words
            .into_iter()
            .filter(|word| !has_long || word.chars().count() >= 2),
    );

    let mut seen = HashSet::new();
    terms.retain(|term| seen.insert(term.to_lowercase()));
    terms.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));
    terms
}

/// Case-insensitive alternation over raw (unescaped) terms.
pub(crate) fn terms_regex(terms: &[String]) -> Option<Regex> {
    if terms.is_empty() {
        return None;
    }
    let alternation = terms
        .iter()
        .map(|term| regex::escape(term))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&alternation)
        .case_insensitive(true)
        .build()
        .ok()
}

/// Escape `text` and wrap every occurrence of a term in `<mark>`.
pub fn highlight_terms(text: &str, terms: &[String]) -> String {
    let escaped = escape_html(text);
    if terms.is_empty() {
        return escaped;
    }

    let alternation = terms
        .iter()
        .map(|term| regex::escape(&escape_html(term)))
        .collect::<Vec<_>>()
        .join("|");
    let Ok(re) = RegexBuilder::new(&format!("({})|{}", alternation, ENTITY_PATTERN))
        .case_insensitive(true)
        .build()
    else {
        return escaped;
    };

    re.replace_all(&escaped, |caps: &regex::Captures| match caps.get(1) {
        Some(term) => format!("{}{}{}", MARK_OPEN, term.as_str(), MARK_CLOSE),
        None => caps[0].to_string(),
    })
    .into_owned()
}

pub fn highlight(text: &str, query: &str) -> String {
    highlight_terms(text, &extract_terms(query))
}

/// One run of text inside or outside a mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub text: String,
    pub highlighted: bool,
}

pub fn parse_highlighted(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;
    for caps in MARKED_RE.captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            segments.push(Segment {
                text: text[last..whole.start()].to_string(),
                highlighted: false,
            });
        }
        if !inner.as_str().is_empty() {
            segments.push(Segment {
                text: inner.as_str().to_string(),
                highlighted: true,
            });
        }
        last = whole.end();
    }
    if last < text.len() {
        segments.push(Segment {
            text: text[last..].to_string(),
            highlighted: false,
        });
    }
    segments
}

pub fn strip_highlighting(text: &str) -> String {
    text.replace(MARK_OPEN, "").replace(MARK_CLOSE, "")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HighlightStats {
    pub marks: usize,
    pub total_chars: usize,
    pub highlighted_chars: usize,
}

pub fn highlight_stats(text: &str) -> HighlightStats {
    let segments = parse_highlighted(text);
    HighlightStats {
        marks: segments.iter().filter(|s| s.highlighted).count(),
        total_chars: segments.iter().map(|s| s.text.chars().count()).sum(),
        highlighted_chars: segments
            .iter()
            .filter(|s| s.highlighted)
            .map(|s| s.text.chars().count())
            .sum(),
    }
}

/// Keep `<mark>` spans from a store fragment and neutralize any other markup.
///
/// The store's encoder writes entities such as `&#x27;` and `&#x2F;`; each
/// segment is decoded and re-escaped so fragments use the same escaping as
/// client-side highlighting.
pub(crate) fn sanitize_fragment(fragment: &str) -> String {
    parse_highlighted(fragment)
        .into_iter()
        .map(|segment| {
            let text = escape_html(&decode_entities(&segment.text));
            if segment.highlighted {
                format!("{}{}{}", MARK_OPEN, text, MARK_CLOSE)
            } else {
                text
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_in_source_is_escaped_before_marking() {
        let out = highlight("<b>x</b>", "x");
        assert!(!out.contains("<b>"));
        assert!(!out.contains("</b>"));
        assert_eq!(out.matches("<mark>x</mark>").count(), 1);
        assert_eq!(out, "&lt;b&gt;<mark>x</mark>&lt;/b&gt;");
    }

    #[test]
    fn operators_alone_produce_no_marks() {
        assert!(extract_terms("AND OR NOT").is_empty());
        let out = highlight("this AND that OR NOT", "AND OR NOT");
        assert_eq!(highlight_stats(&out).marks, 0);
    }

    #[test]
    fn strip_round_trips_to_escaped_text() {
        let text = r#"if a < b && c > "d" { it's }"#;
        for query in ["a b", "\"it's\"", "amp lt", "content:d +if -zz"] {
            let marked = highlight(text, query);
            assert_eq!(strip_highlighting(&marked), escape_html(text), "query {query}");
        }
    }

    #[test]
    fn entities_are_never_split_by_terms() {
        let out = highlight("a & b", "amp");
        assert_eq!(out, "a &amp; b");
        let out = highlight("x<y", "\"x<y\"");
        assert_eq!(out, "<mark>x&lt;y</mark>");
    }

    #[test]
    fn terms_strip_fields_signs_and_short_words() {
        let terms = extract_terms(r#"file_name:config +token -a "retry loop" OR (backoff)"#);
        assert_eq!(terms, vec!["retry loop", "backoff", "config", "token"]);
    }

    #[test]
    fn single_character_terms_survive_when_alone() {
        assert_eq!(extract_terms("x"), vec!["x"]);
        assert_eq!(extract_terms("x yz"), vec!["yz"]);
    }

    #[test]
    fn longer_terms_win_without_nesting() {
        let out = highlight("parse_args parse", "parse parse_args");
        assert_eq!(out, "<mark>parse_args</mark> <mark>parse</mark>");
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(highlight("Error error", "ERROR"), "<mark>Error</mark> <mark>error</mark>");
    }

    #[test]
    fn parse_and_stats_follow_marks() {
        let text = "a <mark>bc</mark> d<mark>e</mark>";
        let segments = parse_highlighted(text);
        assert_eq!(
            segments,
            vec![
                Segment { text: "a ".into(), highlighted: false },
                Segment { text: "bc".into(), highlighted: true },
                Segment { text: " d".into(), highlighted: false },
                Segment { text: "e".into(), highlighted: true },
            ]
        );
        assert_eq!(
            highlight_stats(text),
            HighlightStats { marks: 2, total_chars: 7, highlighted_chars: 3 }
        );
        assert_eq!(strip_highlighting(text), "a bc de");
    }

    #[test]
    fn store_fragments_keep_only_marks() {
        assert_eq!(
            sanitize_fragment("<mark>ok</mark><script>x</script>"),
            "<mark>ok</mark>&lt;script&gt;x&lt;/script&gt;"
        );
        assert_eq!(sanitize_fragment("a &amp; <mark>b</mark>"), "a &amp; <mark>b</mark>");
    }

    #[test]
    fn store_entities_are_normalized_to_local_escaping() {
        let fragment = "it&#x27;s <mark>a</mark>&#x2F;b &#60;c&#62;";
        let clean = sanitize_fragment(fragment);
        assert_eq!(clean, "it&#39;s <mark>a</mark>/b &lt;c&gt;");
        assert_eq!(strip_highlighting(&clean), escape_html("it's a/b <c>"));
        assert_eq!(clean, highlight("it's a/b <c>", "\"a\""));
    }

    #[test]
    fn entity_decoding_is_single_pass() {
        assert_eq!(
            decode_entities("&amp;lt; &#x2F; &#39; &apos; &bogus; &#xFFFFFFF;"),
            "&lt; / ' ' &bogus; &#xFFFFFFF;"
        );
    }
}
