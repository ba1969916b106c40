// SPDX-License-Identifier: MIT OR Apache-2.0

//! Match and query types shared by the orchestrator, the store bridge and the CLI.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::SearchConfig;

/// A span inside the matched line, in byte offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubMatch {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// One line of a match's context window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLine {
    pub line: u64,
    pub text: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_match: bool,
}

/// One hit produced by the search tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub path: PathBuf,
    /// Workspace root the hit was found under
    pub root: PathBuf,
    /// 1-based
    pub line: u64,
    /// 0-based, of the first sub-match
    pub column: usize,
    pub text: String,
    /// Before-context, the match line, then after-context, in source order.
    pub context: Vec<ContextLine>,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub submatches: Vec<SubMatch>,
}

impl Match {
    pub fn context_before(&self) -> impl Iterator<Item = &ContextLine> {
        self.context.iter().take_while(|line| !line.is_match)
    }

    pub fn context_after(&self) -> impl Iterator<Item = &ContextLine> {
        self.context.iter().skip_while(|line| !line.is_match).skip(1)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

/// Per-call search options. Context counts resolve as before/after, then the
/// legacy single `context`, then the configured default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub use_regex: bool,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub max_results: Option<usize>,
    pub context_before: Option<usize>,
    pub context_after: Option<usize>,
    pub context: Option<usize>,
}

impl SearchOptions {
    pub fn before_lines(&self, config: &SearchConfig) -> usize {
        self.context_before
            .or(self.context)
            .unwrap_or(config.context_before)
    }

    pub fn after_lines(&self, config: &SearchConfig) -> usize {
        self.context_after
            .or(self.context)
            .unwrap_or(config.context_after)
    }

    pub fn max_results_or(&self, config: &SearchConfig) -> usize {
        self.max_results.unwrap_or(config.max_results)
    }
}

/// The raw query plus its options. Built per call and never persisted as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub query: String,
    #[serde(default)]
    pub options: SearchOptions,
}

impl QuerySpec {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            options: SearchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }
}

/// A root whose search did not complete.
#[derive(Debug, Clone, Serialize)]
pub struct RootFailure {
    pub root: PathBuf,
    pub reason: String,
}

/// Result of one orchestrated search across all roots.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchOutcome {
    pub matches: Vec<Match>,
    /// Matches found before truncation to `max_results`
    pub total_matches: usize,
    /// Distinct files among those matches, also counted before truncation
    pub files_with_matches: usize,
    pub roots_searched: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_roots: Vec<RootFailure>,
    pub elapsed_ms: f64,
}

impl SearchOutcome {
    pub fn truncated(&self) -> bool {
        self.total_matches > self.matches.len()
    }
}
