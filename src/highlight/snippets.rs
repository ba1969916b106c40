// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merge store highlighting into documents and build short snippets.

use serde::Serialize;

use super::{extract_terms, highlight_terms, sanitize_fragment, terms_regex, HighlightMap, MARK_OPEN};
use crate::config::HighlightConfig;
use crate::store::models::StoredDocument;

const ELLIPSIS: &str = "...";

/// A stored document with its text fields rendered as marked-up HTML.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedDocument {
    #[serde(flatten)]
    pub document: StoredDocument,
    pub match_text_html: String,
    pub full_line_html: String,
    pub context_before_html: Vec<String>,
    pub context_after_html: Vec<String>,
    pub snippets: Vec<String>,
}

fn fragments<'a>(hl: &'a HighlightMap, id: &str, field: &str) -> Option<&'a [String]> {
    hl.get(id)
        .and_then(|fields| fields.get(field))
        .map(Vec::as_slice)
        .filter(|values| !values.is_empty())
}

fn render_single(hl: &HighlightMap, id: &str, field: &str, raw: &str, terms: &[String]) -> String {
    match fragments(hl, id, field) {
        Some(values) => values
            .iter()
            .map(|v| sanitize_fragment(v))
            .collect::<Vec<_>>()
            .join(&format!(" {} ", ELLIPSIS)),
        None => highlight_terms(raw, terms),
    }
}

fn render_multi(
    hl: &HighlightMap,
    id: &str,
    field: &str,
    raw: &[String],
    terms: &[String],
) -> Vec<String> {
    match fragments(hl, id, field) {
        // Multi-valued fragments only line up with the stored values when the
        // store returned every value.
        Some(values) if values.len() == raw.len() => {
            values.iter().map(|v| sanitize_fragment(v)).collect()
        }
        _ => raw.iter().map(|line| highlight_terms(line, terms)).collect(),
    }
}

/// Render every text field of each document, preferring the store's
/// fragments per field and falling back to local highlighting.
pub fn apply_store_highlighting(
    documents: Vec<StoredDocument>,
    hl: &HighlightMap,
    query: &str,
) -> Vec<RenderedDocument> {
    apply_with_config(documents, hl, query, &HighlightConfig::default())
}

pub fn apply_with_config(
    documents: Vec<StoredDocument>,
    hl: &HighlightMap,
    query: &str,
    config: &HighlightConfig,
) -> Vec<RenderedDocument> {
    let terms = extract_terms(query);
    documents
        .into_iter()
        .map(|doc| {
            let id = doc.id.as_str();
            let match_text_html = render_single(hl, id, "match_text", &doc.match_text, &terms);
            let full_line_html = render_single(hl, id, "full_line", &doc.full_line, &terms);
            let context_before_html =
                render_multi(hl, id, "context_before", &doc.context_before, &terms);
            let context_after_html =
                render_multi(hl, id, "context_after", &doc.context_after, &terms);
            let snippets = build_snippets(&doc, hl, &terms, config.max_snippets, config.snippet_window);
            RenderedDocument {
                document: doc,
                match_text_html,
                full_line_html,
                context_before_html,
                context_after_html,
                snippets,
            }
        })
        .collect()
}

/// Up to `max` highlighted snippets for one document.
pub fn snippets(doc: &StoredDocument, hl: &HighlightMap, query: &str, max: usize) -> Vec<String> {
    let window = HighlightConfig::default().snippet_window;
    build_snippets(doc, hl, &extract_terms(query), max, window)
}

fn build_snippets(
    doc: &StoredDocument,
    hl: &HighlightMap,
    terms: &[String],
    max: usize,
    window: usize,
) -> Vec<String> {
    if max == 0 {
        return Vec::new();
    }

    let from_store: Vec<String> = ["full_line", "match_text", "context_before", "context_after"]
        .iter()
        .filter_map(|field| fragments(hl, &doc.id, field))
        .flatten()
        .filter(|fragment| fragment.contains(MARK_OPEN))
        .map(|fragment| sanitize_fragment(fragment))
        .take(max)
        .collect();
    if !from_store.is_empty() {
        return from_store;
    }

    let mut out = vec![window_snippet(&doc.full_line, terms, window)];
    let matcher = terms_regex(terms);
    let neighbours = [doc.context_before.last(), doc.context_after.first()];
    for line in neighbours.into_iter().flatten() {
        if out.len() >= max {
            break;
        }
        if matcher.as_ref().is_some_and(|re| re.is_match(line)) {
            out.push(window_snippet(line, terms, window));
        }
    }
    out.truncate(max);
    out
}

/// Highlight a window of about `window` characters centred on the first term,
/// snapped to word boundaries with ellipses where text was cut.
pub fn window_snippet(text: &str, terms: &[String], window: usize) -> String {
    let char_count = text.chars().count();
    if window == 0 || char_count <= window {
        return highlight_terms(text, terms);
    }

    let hit = terms_regex(terms)
        .and_then(|re| re.find(text))
        .map(|m| text[..m.start()].chars().count())
        .unwrap_or(0);

    let mut start = hit.saturating_sub(window / 2);
    let mut end = (start + window).min(char_count);
    if end - start < window {
        start = end.saturating_sub(window);
    }

    let chars: Vec<char> = text.chars().collect();
    if start > 0 {
        if let Some(offset) = chars[start..end].iter().position(|c| c.is_whitespace()) {
            if start + offset + 1 <= hit {
                start += offset + 1;
            }
        }
    }
    if end < char_count {
        if let Some(offset) = chars[start..end].iter().rposition(|c| c.is_whitespace()) {
            if start + offset > hit {
                end = start + offset;
            }
        }
    }

    let body: String = chars[start..end].iter().collect();
    let mut out = String::new();
    if start > 0 {
        out.push_str(ELLIPSIS);
    }
    out.push_str(&highlight_terms(body.trim(), terms));
    if end < char_count {
        out.push_str(ELLIPSIS);
    }
    out
}
