// SPDX-License-Identifier: MIT OR Apache-2.0

//! Translate user queries into Solr (Lucene) query syntax.
//!
//! Queries that already use `field:value` syntax are passed through with only
//! their bare values escaped. Anything else is routed to fields by shape:
//! filenames go to the name/path fields, code goes to the line field with a
//! higher boost, and plain text fans out over the configured default fields.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;

use crate::config::QueryConfig;
use crate::search::scoring::known_extensions;

/// Solr's match-everything query.
pub const MATCH_ALL: &str = "*:*";

pub const FILE_NAME_FIELD: &str = "file_name";
pub const FILE_PATH_FIELD: &str = "file_path";
pub const CODE_FIELD: &str = "full_line";
pub const CONTENT_FIELD: &str = "match_text";

/// `field:value`, where a value starting with `:` means a `::` path, not a field.
static FIELD_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-]?)(\w+):((?:[^:].*)?)$").expect("valid field token regex")
});

static FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    let extensions = known_extensions().collect::<Vec<_>>().join("|");
    RegexBuilder::new(&format!(r"^[\w./\\-]*\.({})$", extensions))
        .case_insensitive(true)
        .build()
        .expect("valid filename regex")
});

static CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[(){}\[\];=<>]|->|::|&&|\|\||\b(function|class|import|export|def|fn|const|let|var|return|struct|impl|interface)\b",
    )
    .expect("valid code regex")
});

fn is_reserved(ch: char) -> bool {
    matches!(
        ch,
        '+' | '-'
            | '&'
            | '|'
            | '!'
            | '('
            | ')'
            | '{'
            | '}'
            | '['
            | ']'
            | '^'
            | '"'
            | '~'
            | '*'
            | '?'
            | ':'
            | '\\'
            | '/'
    )
}

/// Backslash-escape every reserved character. Never returns an empty clause.
pub fn escape_value(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "*".to_string();
    }
    let mut out = String::with_capacity(trimmed.len() + 8);
    for ch in trimmed.chars() {
        if is_reserved(ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Quote a value as a single exact term, e.g. for filter queries.
pub fn quote_term(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Split on whitespace, keeping quoted sections (and the token they sit in) whole.
pub fn tokenize(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in query.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => {
                current.push(ch);
                escaped = true;
            }
            '"' => {
                current.push(ch);
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_quoted_phrase(token: &str) -> bool {
    token.len() >= 2 && token.starts_with('"') && token.ends_with('"') && !token.ends_with("\\\"")
}

/// True when the user wrote `field:value` somewhere outside a quoted phrase.
pub fn has_field_syntax(query: &str) -> bool {
    tokenize(query)
        .iter()
        .any(|token| !token.starts_with('"') && FIELD_TOKEN_RE.is_match(token))
}

/// How a query without field syntax is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    FieldQualified,
    Filename,
    Code,
    Default,
}

pub fn classify(query: &str) -> Route {
    let trimmed = query.trim();
    if has_field_syntax(trimmed) {
        Route::FieldQualified
    } else if FILENAME_RE.is_match(trimmed) {
        Route::Filename
    } else if CODE_RE.is_match(trimmed) {
        Route::Code
    } else {
        Route::Default
    }
}

/// Escape free text while leaving complete quoted phrases as written.
fn sanitize_free_text(query: &str) -> String {
    let parts: Vec<String> = tokenize(query)
        .into_iter()
        .map(|token| {
            if is_quoted_phrase(&token) {
                token
            } else {
                escape_value(&token)
            }
        })
        .collect();
    if parts.is_empty() {
        return "*".to_string();
    }
    parts.join(" ")
}

/// Rewrite a field-qualified query, escaping only bare values.
fn sanitize_field_query(query: &str) -> String {
    tokenize(query)
        .into_iter()
        .map(|token| {
            if token.starts_with('"') {
                return token;
            }
            let Some(caps) = FIELD_TOKEN_RE.captures(&token) else {
                if token.contains("::") {
                    return escape_value(&token);
                }
                return token;
            };
            let value = &caps[3];
            if value.starts_with('"') || value.contains('*') || value.contains('?') {
                return token;
            }
            format!("{}{}:{}", &caps[1], &caps[2], escape_value(value))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn clause(field: &str, query: &str, boost: f32) -> String {
    if (boost - 1.0).abs() < f32::EPSILON {
        format!("{}:({})", field, query)
    } else {
        format!("{}:({})^{}", field, query, boost)
    }
}

/// Query translation with a fixed field configuration. Pure and deterministic.
#[derive(Debug, Clone)]
pub struct QueryTranslator {
    default_fields: Vec<String>,
    boosts: BTreeMap<String, f32>,
    code_boost: f32,
}

impl QueryTranslator {
    pub fn new(default_fields: Vec<String>, boosts: BTreeMap<String, f32>) -> Self {
        Self {
            default_fields,
            boosts,
            code_boost: QueryConfig::default().code_boost,
        }
    }

    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            default_fields: config.default_fields.clone(),
            boosts: config.boosts.clone(),
            code_boost: config.code_boost,
        }
    }

    fn boost(&self, field: &str) -> f32 {
        self.boosts.get(field).copied().unwrap_or(1.0)
    }

    pub fn translate(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return MATCH_ALL.to_string();
        }

        match classify(trimmed) {
            Route::FieldQualified => sanitize_field_query(trimmed),
            Route::Filename => {
                let q = sanitize_free_text(trimmed);
                [FILE_NAME_FIELD, FILE_PATH_FIELD]
                    .iter()
                    .map(|field| clause(field, &q, self.boost(field)))
                    .collect::<Vec<_>>()
                    .join(" OR ")
            }
            Route::Code => {
                let q = sanitize_free_text(trimmed);
                let code_boost = self.code_boost.max(1.0);
                let mut content_boost = self.boost(CONTENT_FIELD);
                if content_boost >= code_boost {
                    content_boost = code_boost / 2.0;
                }
                format!(
                    "{} OR {}",
                    clause(CODE_FIELD, &q, code_boost),
                    clause(CONTENT_FIELD, &q, content_boost)
                )
            }
            Route::Default => {
                let q = sanitize_free_text(trimmed);
                self.default_fields
                    .iter()
                    .map(|field| clause(field, &q, self.boost(field)))
                    .collect::<Vec<_>>()
                    .join(" OR ")
            }
        }
    }
}

/// Translate with an explicit field list and boost table.
pub fn translate(raw: &str, default_fields: &[String], boosts: &BTreeMap<String, f32>) -> String {
    QueryTranslator::new(default_fields.to_vec(), boosts.clone()).translate(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> QueryTranslator {
        QueryTranslator::from_config(&QueryConfig::default())
    }

    #[test]
    fn empty_query_matches_everything() {
        assert_eq!(translator().translate(""), MATCH_ALL);
        assert_eq!(translator().translate("   "), MATCH_ALL);
        assert_eq!(translate("", &[], &BTreeMap::new()), MATCH_ALL);
    }

    #[test]
    fn field_qualified_shape_is_preserved() {
        assert_eq!(translator().translate("a:b"), "a:b");
        assert_eq!(
            translator().translate("file_extension:rs AND match_text:foo-bar"),
            r"file_extension:rs AND match_text:foo\-bar"
        );
    }

    #[test]
    fn field_values_quoted_or_wildcarded_stay_verbatim() {
        assert_eq!(
            translator().translate(r#"full_line:"fn main()" file_name:*.rs -session_id:x/y"#),
            r#"full_line:"fn main()" file_name:*.rs -session_id:x\/y"#
        );
    }

    #[test]
    fn quoted_phrase_is_untouched_in_free_text() {
        let out = translator().translate(r#"a "b c""#);
        assert!(out.contains(r#"(a "b c")"#), "{out}");
        assert!(out.starts_with("match_text:"));
    }

    #[test]
    fn colon_inside_quotes_is_not_field_syntax() {
        assert!(!has_field_syntax(r#""a:b" c"#));
        assert!(has_field_syntax("x +name:foo"));
        assert_eq!(classify(r#""a:b""#), Route::Default);
    }

    #[test]
    fn default_route_uses_configured_fields_and_boosts() {
        let fields = vec!["match_text".to_string(), "full_line".to_string()];
        let boosts = BTreeMap::from([("match_text".to_string(), 2.0)]);
        assert_eq!(
            translate("hello world", &fields, &boosts),
            "match_text:(hello world)^2 OR full_line:(hello world)"
        );
    }

    #[test]
    fn filename_queries_route_to_name_and_path() {
        assert_eq!(classify("main.rs"), Route::Filename);
        assert_eq!(classify("src/config.TOML"), Route::Filename);
        assert_eq!(
            translator().translate("src/main.rs"),
            r"file_name:(src\/main.rs)^3 OR file_path:(src\/main.rs)^1.5"
        );
    }

    #[test]
    fn code_queries_boost_the_line_field() {
        assert_eq!(classify("foo.bar()"), Route::Code);
        assert_eq!(classify("import os"), Route::Code);
        assert_eq!(classify("a -> b"), Route::Code);
        assert_eq!(
            translator().translate("fn main()"),
            r"full_line:(fn main\(\))^3 OR match_text:(fn main\(\))^2"
        );
    }

    #[test]
    fn path_separators_are_code_not_fields() {
        assert!(!has_field_syntax("std::vec"));
        assert_eq!(classify("Foo::bar"), Route::Code);
        assert_eq!(
            translator().translate("Foo::bar"),
            r"full_line:(Foo\:\:bar)^3 OR match_text:(Foo\:\:bar)^2"
        );
        assert_eq!(
            translator().translate("file_extension:rs std::vec"),
            r"file_extension:rs std\:\:vec"
        );
    }

    #[test]
    fn content_boost_never_exceeds_code_boost() {
        let config = QueryConfig {
            boosts: BTreeMap::from([("match_text".to_string(), 5.0)]),
            ..Default::default()
        };
        let out = QueryTranslator::from_config(&config).translate("x = 1");
        assert_eq!(out, "full_line:(x = 1)^3 OR match_text:(x = 1)^1.5");
    }

    #[test]
    fn escaping_never_yields_empty_clause() {
        assert_eq!(escape_value("  "), "*");
        assert_eq!(escape_value("a+b"), r"a\+b");
        assert_eq!(escape_value(r"c:\tmp"), r"c\:\\tmp");
        assert_eq!(translator().translate("tag:"), "tag:*");
    }

    #[test]
    fn quote_term_escapes_quotes_and_backslashes() {
        assert_eq!(quote_term(r#"se"ss\1"#), r#""se\"ss\\1""#);
    }

    #[test]
    fn tokenizer_keeps_quoted_sections_together() {
        assert_eq!(
            tokenize(r#"name:"two words" rest  "x y""#),
            vec![r#"name:"two words""#, "rest", r#""x y""#]
        );
    }
}
