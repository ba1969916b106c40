// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristic relevance scoring for tool matches and the cross-file frequency bonus.

use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::search::types::{Match, SubMatch};

const BASE_SCORE: f32 = 0.5;
const SUBSTRING_BONUS: f32 = 0.3;
const WHOLE_WORD_BONUS: f32 = 0.2;
const SOURCE_BONUS: f32 = 0.2;
const CONFIG_BONUS: f32 = 0.1;
const DOC_BONUS: f32 = 0.05;
const EXTRA_SUBMATCH_BONUS: f32 = 0.05;
const EXTRA_SUBMATCH_CAP: f32 = 0.15;
const EARLY_COLUMN_BONUS: f32 = 0.05;
const EARLY_COLUMN_LIMIT: usize = 20;
const EXACT_CASE_BONUS: f32 = 0.1;

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "go", "java", "c", "cc", "cpp", "h", "hpp",
    "cs", "rb", "php", "swift", "kt", "kts", "scala", "lua", "sh", "sql", "vue", "svelte",
];
const CONFIG_EXTENSIONS: &[&str] = &[
    "json", "yaml", "yml", "toml", "xml", "ini", "cfg", "conf", "env", "properties", "lock",
];
const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "rst", "adoc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Source,
    Config,
    Documentation,
    Other,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        Self::from_extension(&ext)
    }

    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.');
        if SOURCE_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            Self::Source
        } else if CONFIG_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            Self::Config
        } else if DOC_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            Self::Documentation
        } else {
            Self::Other
        }
    }

    fn bonus(self) -> f32 {
        match self {
            Self::Source => SOURCE_BONUS,
            Self::Config => CONFIG_BONUS,
            Self::Documentation => DOC_BONUS,
            Self::Other => 0.0,
        }
    }
}

/// Every extension the scorer classifies, for filename-like query detection.
pub fn known_extensions() -> impl Iterator<Item = &'static str> {
    SOURCE_EXTENSIONS
        .iter()
        .chain(CONFIG_EXTENSIONS)
        .chain(DOC_EXTENSIONS)
        .copied()
}

/// Deterministic breakdown of one match score.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreComponents {
    pub substring: f32,
    pub whole_word: f32,
    pub file_kind: f32,
    pub submatches: f32,
    pub early_column: f32,
    pub exact_case: f32,
}

impl ScoreComponents {
    pub fn total(&self) -> f32 {
        clamp_score(
            BASE_SCORE
                + self.substring
                + self.whole_word
                + self.file_kind
                + self.submatches
                + self.early_column
                + self.exact_case,
        )
    }
}

/// Query-dependent state reused for every line of one search.
#[derive(Debug, Clone)]
pub struct MatchScorer {
    query: String,
    query_lower: String,
    case_sensitive: bool,
    word_re: Option<Regex>,
}

impl MatchScorer {
    pub fn new(query: &str, case_sensitive: bool) -> Self {
        // The tool's own whole-word flag is not trusted; the line is re-checked here.
        let word_re = if query.is_empty() {
            None
        } else {
            RegexBuilder::new(&format!(r"\b{}\b", regex::escape(query)))
                .case_insensitive(!case_sensitive)
                .build()
                .ok()
        };

        Self {
            query: query.to_string(),
            query_lower: query.to_lowercase(),
            case_sensitive,
            word_re,
        }
    }

    pub fn components(&self, path: &Path, text: &str, submatches: &[SubMatch]) -> ScoreComponents {
        let mut components = ScoreComponents {
            file_kind: FileKind::from_path(path).bonus(),
            ..Default::default()
        };

        if !self.query.is_empty() {
            let contains = if self.case_sensitive {
                text.contains(&self.query)
            } else {
                text.to_lowercase().contains(&self.query_lower)
            };
            if contains {
                components.substring = SUBSTRING_BONUS;
                if self.word_re.as_ref().is_some_and(|re| re.is_match(text)) {
                    components.whole_word = WHOLE_WORD_BONUS;
                }
            }
            if self.case_sensitive && text.contains(&self.query) {
                components.exact_case = EXACT_CASE_BONUS;
            }
        }

        let extra = submatches.len().saturating_sub(1) as f32 * EXTRA_SUBMATCH_BONUS;
        components.submatches = extra.min(EXTRA_SUBMATCH_CAP);

        if submatches
            .first()
            .is_some_and(|first| first.start < EARLY_COLUMN_LIMIT)
        {
            components.early_column = EARLY_COLUMN_BONUS;
        }

        components
    }

    pub fn score(&self, path: &Path, text: &str, submatches: &[SubMatch]) -> f32 {
        self.components(path, text, submatches).total()
    }
}

/// Bonus for every match of a file with `count` matches.
pub fn file_frequency_bonus(count: usize) -> f32 {
    if count < 2 {
        return 0.0;
    }
    let mut bonus = (count as f32 / 10.0).min(1.0) * 0.2;
    if count >= 5 {
        bonus += 0.05;
    }
    if count >= 10 {
        bonus += 0.05;
    }
    bonus
}

/// Post-pass over the full result set: reward files matched repeatedly.
pub fn apply_file_frequency_bonus(matches: &mut [Match]) {
    let mut counts: HashMap<PathBuf, usize> = HashMap::new();
    for m in matches.iter() {
        *counts.entry(m.path.clone()).or_default() += 1;
    }
    for m in matches.iter_mut() {
        let count = counts.get(&m.path).copied().unwrap_or(0);
        m.score = clamp_score(m.score + file_frequency_bonus(count));
    }
}

/// Score descending, then path and line so equal scores keep a stable order.
pub fn sort_matches(matches: &mut [Match]) {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.line.cmp(&b.line))
            .then_with(|| a.column.cmp(&b.column))
    });
}

pub fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}
