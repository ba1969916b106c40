// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types with helpful suggestions
//!
//! Every failure the pipeline can report is a `PipelineError` variant. Callers
//! can always tell "the search failed" apart from "the search found nothing".

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No workspace available: at least one search root is required")]
    NoWorkspace,

    /// The search binary is missing or cannot be spawned at all.
    #[error("Search tool '{tool}' is unavailable: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("Search tool failed in {}: exit code {code:?}: {stderr}", root.display())]
    ToolFailed {
        root: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Search tool timed out after {secs}s in {}", root.display())]
    ToolTimeout { root: PathBuf, secs: u64 },

    /// One unparsable output line. Logged and skipped, never fatal.
    #[error("Malformed search tool output line: {line}")]
    ToolOutputMalformed {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Search failed in every root: {}", format_roots(roots))]
    AllRootsFailed { roots: Vec<PathBuf> },

    #[error("Search was cancelled")]
    Cancelled,

    #[error("Indexed store unreachable at {url}: {source}")]
    StoreUnreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Indexed store rejected query `{query}` (HTTP {status}): {message}")]
    StoreQueryRejected {
        query: String,
        status: u16,
        message: String,
    },

    #[error("Indexed store {operation} failed (HTTP {status}): {message}")]
    StoreRequestFailed {
        operation: &'static str,
        status: u16,
        message: String,
    },

    #[error("Indexed store returned an unexpected {operation} response: {message}")]
    StoreResponseInvalid {
        operation: &'static str,
        message: String,
    },

    /// Best-effort enrichment failure. Only ever logged.
    #[error("File metadata unavailable for {}: {source}", path.display())]
    FileMetadataUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// True when the caller may retry with a tool-only search instead.
    pub fn is_store_unreachable(&self) -> bool {
        matches!(self, Self::StoreUnreachable { .. })
    }

    /// Actionable hint shown under the error message by the CLI.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NoWorkspace => Some(suggestions::no_workspace_suggestion()),
            Self::ToolUnavailable { tool, .. } => Some(suggestions::tool_unavailable_suggestion(tool)),
            Self::StoreUnreachable { url, .. } => Some(suggestions::store_unreachable_suggestion(url)),
            Self::StoreQueryRejected { .. } => Some(
                "Quote special characters or drop field prefixes, e.g. ripsolr stored '\"a+b\"'"
                    .to_string(),
            ),
            _ => None,
        }
    }
}

fn format_roots(roots: &[PathBuf]) -> String {
    roots
        .iter()
        .map(|root| root.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Helper functions for creating helpful error messages
pub mod suggestions {
    pub fn no_workspace_suggestion() -> String {
        "Pass one or more directories to search:\n\
         $ ripsolr search \"needle\" src/ tests/"
            .to_string()
    }

    pub fn tool_unavailable_suggestion(tool: &str) -> String {
        format!(
            "Install ripgrep or point ripsolr at it:\n\
             - https://github.com/BurntSushi/ripgrep#installation\n\
             - set [search] rg_path in .ripsolrrc.toml (currently '{}')",
            tool
        )
    }

    pub fn store_unreachable_suggestion(url: &str) -> String {
        format!(
            "Check that Solr is running and reachable at {}\n\
             $ ripsolr status\n\
             Or search the workspace directly without the store:\n\
             $ ripsolr search \"needle\"",
            url
        )
    }

    /// Get suggestion for no results
    pub fn no_results_suggestion(query: &str) -> String {
        format!(
            "No results found for '{}'\n\n\
             Try:\n\
             - A different or broader search query\n\
             - Dropping --word or --case-sensitive\n\
             - Checking --glob/--exclude filters with 'ripsolr files'",
            query
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_unreachable_suggestion_mentions_url() {
        let text = suggestions::store_unreachable_suggestion("http://solr:8983/solr");
        assert!(text.contains("http://solr:8983/solr"));
    }

    #[test]
    fn all_roots_failed_lists_every_root() {
        let err = PipelineError::AllRootsFailed {
            roots: vec![PathBuf::from("/a"), PathBuf::from("/b")],
        };
        assert_eq!(err.to_string(), "Search failed in every root: /a, /b");
    }

    #[test]
    fn query_rejection_keeps_offending_query() {
        let err = PipelineError::StoreQueryRejected {
            query: "full_line:(a:b)".into(),
            status: 400,
            message: "undefined field a".into(),
        };
        assert!(err.to_string().contains("full_line:(a:b)"));
        assert!(err.suggestion().is_some());
        assert!(!err.is_store_unreachable());
    }
}
