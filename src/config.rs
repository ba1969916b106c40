// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for ripsolr
//!
//! Loads configuration from .ripsolrrc.toml in current directory or ~/.config/ripsolr/config.toml

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::errors::{PipelineError, Result};

pub const DEFAULT_MAX_RESULTS: usize = 100;
pub const DEFAULT_CONTEXT_LINES: usize = 30;
pub const DEFAULT_MAX_PARALLEL_ROOTS: usize = 5;

/// Output format for results (mirrored from cli for library use)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigOutputFormat {
    #[default]
    Text,
    Json,
}

/// Configuration loaded from .ripsolrrc.toml or ~/.config/ripsolr/config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output format (text or json)
    pub default_format: Option<String>,
    pub search: SearchConfig,
    pub store: StoreConfig,
    pub query: QueryConfig,
    pub highlight: HighlightConfig,
}

/// `[search]`: how ripgrep is driven
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub rg_path: String,
    pub max_results: usize,
    pub context_before: usize,
    pub context_after: usize,
    /// Roots are searched concurrently only while their count stays at or below this.
    pub max_parallel_roots: usize,
    pub tool_timeout_secs: u64,
    /// Capacity of the bounded event channel between the rg reader and the consumer.
    pub event_buffer: usize,
    /// Patterns always excluded from search
    pub exclude_patterns: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rg_path: "rg".to_string(),
            max_results: DEFAULT_MAX_RESULTS,
            context_before: DEFAULT_CONTEXT_LINES,
            context_after: DEFAULT_CONTEXT_LINES,
            max_parallel_roots: DEFAULT_MAX_PARALLEL_ROOTS,
            tool_timeout_secs: 15,
            event_buffer: 1024,
            exclude_patterns: Vec::new(),
        }
    }
}

impl SearchConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs.max(1))
    }
}

/// `[store]`: where the Solr core lives
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub core: String,
    pub timeout_secs: u64,
    /// Rows requested per stored search when the caller gives no limit
    pub rows: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8983/solr".to_string(),
            core: "search_results".to_string(),
            timeout_secs: 10,
            rows: 100,
        }
    }
}

impl StoreConfig {
    /// Base URL of the core, without a trailing slash.
    pub fn core_url(&self) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), self.core)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// `[query]`: field routing for stored searches
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_fields: Vec<String>,
    pub boosts: BTreeMap<String, f32>,
    pub code_boost: f32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        let boosts = [
            ("match_text", 2.0),
            ("full_line", 1.5),
            ("context_before", 0.5),
            ("context_after", 0.5),
            ("file_name", 3.0),
            ("file_path", 1.5),
        ]
        .into_iter()
        .map(|(field, boost)| (field.to_string(), boost))
        .collect();

        Self {
            default_fields: vec![
                "match_text".to_string(),
                "full_line".to_string(),
                "context_before".to_string(),
                "context_after".to_string(),
            ],
            boosts,
            code_boost: 3.0,
        }
    }
}

/// `[highlight]`: snippet rendering
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub snippet_window: usize,
    pub max_snippets: usize,
    /// Solr `hl.fragsize`; 0 returns whole field values.
    pub fragment_size: usize,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            snippet_window: 150,
            max_snippets: 3,
            fragment_size: 0,
        }
    }
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .ripsolrrc.toml in current directory
    /// 2. ~/.config/ripsolr/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::load_from_path(Path::new(".ripsolrrc.toml")) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("ripsolr").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Load an explicit config file; unlike `load`, a bad file is an error.
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str::<Self>(&content) {
            Ok(config) => match config.validate() {
                Ok(()) => Some(config),
                Err(e) => {
                    tracing::warn!("ignoring {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.rg_path.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "search.rg_path must not be empty".into(),
            ));
        }
        if self.search.event_buffer == 0 {
            return Err(PipelineError::InvalidConfig(
                "search.event_buffer must be at least 1".into(),
            ));
        }
        if self.store.core.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "store.core must not be empty".into(),
            ));
        }
        if self.query.default_fields.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "query.default_fields must name at least one field".into(),
            ));
        }
        Ok(())
    }

    /// Get output format from config, parsing the string to ConfigOutputFormat
    pub fn output_format(&self) -> Option<ConfigOutputFormat> {
        self.default_format
            .as_ref()
            .and_then(|s| match s.to_lowercase().as_str() {
                "json" => Some(ConfigOutputFormat::Json),
                "text" => Some(ConfigOutputFormat::Text),
                _ => None,
            })
    }

    /// Merge CLI options with config (CLI wins)
    pub fn merge_max_results(&self, cli_value: Option<usize>) -> usize {
        cli_value.unwrap_or(self.search.max_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.search.max_results, 100);
        assert_eq!(config.search.context_before, 30);
        assert_eq!(config.search.context_after, 30);
        assert_eq!(config.search.max_parallel_roots, 5);
        assert_eq!(
            config.store.core_url(),
            "http://localhost:8983/solr/search_results"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_format = "json"

[store]
url = "http://solr.internal:8983/solr/"
core = "hits"

[query.boosts]
match_text = 4.0
"#,
        )
        .expect("write config");

        let config = Config::load_file(&path).expect("load");
        assert_eq!(config.output_format(), Some(ConfigOutputFormat::Json));
        assert_eq!(config.store.core_url(), "http://solr.internal:8983/solr/hits");
        assert_eq!(config.query.boosts.get("match_text"), Some(&4.0));
        assert_eq!(config.search.rg_path, "rg");
        assert_eq!(config.merge_max_results(None), 100);
        assert_eq!(config.merge_max_results(Some(7)), 7);
    }

    #[test]
    fn empty_default_fields_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[query]\ndefault_fields = []\n").expect("write config");
        assert!(matches!(
            Config::load_file(&path),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn discovered_file_loads_and_invalid_one_is_skipped() {
        let dir = TempDir::new().expect("tempdir");
        let good = dir.path().join(".ripsolrrc.toml");
        std::fs::write(&good, "[search]\nmax_results = 7\n").expect("write config");
        let config = Config::load_from_path(good.as_path()).expect("load");
        assert_eq!(config.search.max_results, 7);

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[query]\ndefault_fields = []\n").expect("write config");
        assert!(Config::load_from_path(&bad).is_none());
        assert!(Config::load_from_path(Path::new("/nonexistent/ripsolr.toml")).is_none());
    }
}
