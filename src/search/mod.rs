// SPDX-License-Identifier: MIT OR Apache-2.0

//! Search orchestrator - runs ripgrep across workspace roots and ranks the hits

pub mod context;
pub mod events;
pub mod ripgrep;
pub mod scoring;
pub mod types;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::SearchConfig;
use crate::errors::{PipelineError, Result};
use context::MatchCollector;
use ripgrep::RootRun;
use scoring::MatchScorer;
pub use types::{ContextLine, Match, QuerySpec, RootFailure, SearchOptions, SearchOutcome, SubMatch};

/// Runs one search per workspace root and merges the results.
///
/// Holds only configuration; nothing carries over between calls.
#[derive(Debug, Clone)]
pub struct SearchOrchestrator {
    config: SearchConfig,
}

impl SearchOrchestrator {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    /// Search every root, then apply the file-frequency bonus, sort by score
    /// and keep the best `max_results`.
    pub async fn search(
        &self,
        roots: &[PathBuf],
        spec: &QuerySpec,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome> {
        if roots.is_empty() {
            return Err(PipelineError::NoWorkspace);
        }
        let started = Instant::now();
        let binary = ripgrep::resolve_binary(&self.config.rg_path)?;

        let options = &spec.options;
        let before = options.before_lines(&self.config);
        let after = options.after_lines(&self.config);
        let max_results = options.max_results_or(&self.config);

        let run = Arc::new(RootRun {
            binary,
            args: ripgrep::search_args(
                &spec.query,
                options,
                before,
                after,
                &self.config.exclude_patterns,
            ),
            timeout: self.config.tool_timeout(),
            event_buffer: self.config.event_buffer,
        });
        let scorer = MatchScorer::new(&spec.query, options.case_sensitive);
        let roots: Vec<PathBuf> = roots.iter().map(|root| normalize_root(root)).collect();

        let parallel = roots.len() > 1 && roots.len() <= self.config.max_parallel_roots;
        tracing::debug!(
            "searching {} root(s) {} for {:?}",
            roots.len(),
            if parallel { "in parallel" } else { "sequentially" },
            spec.query
        );

        let results = if parallel {
            run_parallel(&run, &roots, &scorer, before, after, cancel).await
        } else {
            run_sequential(&run, &roots, &scorer, before, after, cancel).await
        };

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let mut matches = Vec::new();
        let mut failed_roots = Vec::new();
        for (root, result) in roots.iter().zip(results) {
            match result {
                Ok(found) => matches.extend(found),
                Err(err) => {
                    tracing::warn!("search failed in {}: {}", root.display(), err);
                    failed_roots.push(RootFailure {
                        root: root.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        if failed_roots.len() == roots.len() {
            return Err(PipelineError::AllRootsFailed {
                roots: failed_roots.into_iter().map(|f| f.root).collect(),
            });
        }

        let outcome = finalize_matches(matches, max_results);
        Ok(SearchOutcome {
            roots_searched: roots.len(),
            failed_roots,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            ..outcome
        })
    }

    /// Files the given globs select under the roots, for checking filters
    /// before running a search.
    pub async fn preview_globs(
        &self,
        roots: &[PathBuf],
        include: &[String],
        exclude: &[String],
    ) -> Result<Vec<PathBuf>> {
        if roots.is_empty() {
            return Err(PipelineError::NoWorkspace);
        }
        let binary = ripgrep::resolve_binary(&self.config.rg_path)?;
        let mut excludes = exclude.to_vec();
        excludes.extend(self.config.exclude_patterns.iter().cloned());
        ripgrep::list_files(
            &binary,
            roots,
            include,
            &excludes,
            self.config.tool_timeout(),
        )
        .await
    }
}

/// Single-threaded post-pass over the concatenated results.
pub fn finalize_matches(mut matches: Vec<Match>, max_results: usize) -> SearchOutcome {
    scoring::apply_file_frequency_bonus(&mut matches);
    scoring::sort_matches(&mut matches);

    let total_matches = matches.len();
    let files_with_matches = matches
        .iter()
        .map(|m| m.path.as_path())
        .collect::<HashSet<_>>()
        .len();
    matches.truncate(max_results);

    SearchOutcome {
        matches,
        total_matches,
        files_with_matches,
        ..Default::default()
    }
}

async fn run_parallel(
    run: &Arc<RootRun>,
    roots: &[PathBuf],
    scorer: &MatchScorer,
    before: usize,
    after: usize,
    cancel: &CancellationToken,
) -> Vec<Result<Vec<Match>>> {
    let mut set = JoinSet::new();
    for (idx, root) in roots.iter().enumerate() {
        let run = Arc::clone(run);
        let root = root.clone();
        let collector = MatchCollector::new(root.clone(), before, after, scorer.clone());
        let cancel = cancel.clone();
        set.spawn(async move {
            let result = ripgrep::search_root(&run, &root, collector, &cancel).await;
            (idx, result)
        });
    }

    let mut results: Vec<Option<Result<Vec<Match>>>> = roots.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, result)) => results[idx] = Some(result),
            Err(err) => tracing::warn!("root search task failed: {}", err),
        }
    }

    results
        .into_iter()
        .zip(roots)
        .map(|(result, root)| {
            result.unwrap_or_else(|| {
                Err(PipelineError::ToolFailed {
                    root: root.clone(),
                    code: None,
                    stderr: "search task panicked".to_string(),
                })
            })
        })
        .collect()
}

async fn run_sequential(
    run: &RootRun,
    roots: &[PathBuf],
    scorer: &MatchScorer,
    before: usize,
    after: usize,
    cancel: &CancellationToken,
) -> Vec<Result<Vec<Match>>> {
    let mut results = Vec::with_capacity(roots.len());
    for root in roots {
        if cancel.is_cancelled() {
            results.push(Err(PipelineError::Cancelled));
            continue;
        }
        let collector = MatchCollector::new(root.clone(), before, after, scorer.clone());
        results.push(ripgrep::search_root(run, root, collector, cancel).await);
    }
    results
}

fn normalize_root(root: &Path) -> PathBuf {
    root.canonicalize().unwrap_or_else(|_| root.to_path_buf())
}
