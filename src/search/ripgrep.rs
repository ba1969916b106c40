// SPDX-License-Identifier: MIT OR Apache-2.0

//! ripgrep subprocess driver.
//!
//! The stdout reader is the producer: it decodes `--json` lines into
//! `SearchEvent`s and feeds a bounded channel drained by a `MatchCollector`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::{PipelineError, Result};
use crate::search::context::{collect_events, MatchCollector};
use crate::search::events::{parse_event_line, SearchEvent};
use crate::search::types::{Match, SearchOptions};

/// Exit code 1 means "no match" and is a success.
const EXIT_NOT_FOUND: i32 = 1;

/// Resolve the configured binary name or path to an executable.
pub fn resolve_binary(rg_path: &str) -> Result<PathBuf> {
    which::which(rg_path).map_err(|e| PipelineError::ToolUnavailable {
        tool: rg_path.to_string(),
        reason: e.to_string(),
    })
}

/// Arguments for one search, excluding the root path.
pub fn search_args(
    query: &str,
    options: &SearchOptions,
    before: usize,
    after: usize,
    extra_excludes: &[String],
) -> Vec<String> {
    let mut args = vec![
        "--json".to_string(),
        "--line-number".to_string(),
        "--column".to_string(),
        "--before-context".to_string(),
        before.to_string(),
        "--after-context".to_string(),
        after.to_string(),
    ];

    args.push(if options.case_sensitive {
        "--case-sensitive".to_string()
    } else {
        "--ignore-case".to_string()
    });
    if options.whole_word {
        args.push("--word-regexp".to_string());
    }
    if !options.use_regex {
        args.push("--fixed-strings".to_string());
    }
    push_glob_args(
        &mut args,
        &options.include_globs,
        options.exclude_globs.iter().chain(extra_excludes),
    );

    args.push("--".to_string());
    args.push(query.to_string());
    args
}

fn push_glob_args<'a>(
    args: &mut Vec<String>,
    include: &[String],
    exclude: impl Iterator<Item = &'a String>,
) {
    for glob in include.iter().filter(|g| !g.trim().is_empty()) {
        args.push("--glob".to_string());
        args.push(glob.trim().to_string());
    }
    for glob in exclude.filter(|g| !g.trim().is_empty()) {
        let glob = glob.trim();
        args.push("--glob".to_string());
        if glob.starts_with('!') {
            args.push(glob.to_string());
        } else {
            args.push(format!("!{}", glob));
        }
    }
}

/// Settings for one root run.
#[derive(Debug, Clone)]
pub struct RootRun {
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub event_buffer: usize,
}

/// Search one root. Cancellation or timeout kills the child and discards
/// whatever it produced so far.
pub async fn search_root(
    run: &RootRun,
    root: &Path,
    collector: MatchCollector,
    cancel: &CancellationToken,
) -> Result<Vec<Match>> {
    if !root.exists() {
        return Err(PipelineError::ToolFailed {
            root: root.to_path_buf(),
            code: None,
            stderr: "root not found".to_string(),
        });
    }
    tracing::debug!("spawning {} for {}", run.binary.display(), root.display());

    // With the root checked, NotFound can only mean the binary itself.
    let mut child = Command::new(&run.binary)
        .args(&run.args)
        .arg(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::ToolUnavailable {
                    tool: run.binary.display().to_string(),
                    reason: e.to_string(),
                }
            } else {
                PipelineError::ToolFailed {
                    root: root.to_path_buf(),
                    code: None,
                    stderr: format!("failed to spawn: {}", e),
                }
            }
        })?;

    let stdout = child.stdout.take().ok_or_else(|| PipelineError::ToolFailed {
        root: root.to_path_buf(),
        code: None,
        stderr: "stdout unavailable".to_string(),
    })?;
    let mut stderr = child.stderr.take();

    let (tx, rx) = mpsc::channel(run.event_buffer.max(1));
    let producer = tokio::spawn(pump_events(stdout, tx));
    let consumer = tokio::spawn(collect_events(rx, collector));
    let producer_abort = producer.abort_handle();
    let consumer_abort = consumer.abort_handle();

    let finished = async move {
        let mut stderr_text = String::new();
        if let Some(stderr) = stderr.as_mut() {
            let _ = stderr.read_to_string(&mut stderr_text).await;
        }
        let status = child.wait().await;
        let skipped = producer.await.unwrap_or(0);
        let matches = consumer.await;
        (status, skipped, matches, stderr_text)
    };

    let waited = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        res = tokio::time::timeout(run.timeout, finished) => Some(res),
    };

    let (status, skipped, matches, stderr_text) = match waited {
        None => {
            producer_abort.abort();
            consumer_abort.abort();
            tracing::debug!("search in {} cancelled", root.display());
            return Err(PipelineError::Cancelled);
        }
        Some(Err(_elapsed)) => {
            producer_abort.abort();
            consumer_abort.abort();
            return Err(PipelineError::ToolTimeout {
                root: root.to_path_buf(),
                secs: run.timeout.as_secs(),
            });
        }
        Some(Ok(done)) => done,
    };

    let status = status.map_err(|e| PipelineError::ToolFailed {
        root: root.to_path_buf(),
        code: None,
        stderr: e.to_string(),
    })?;
    if !status.success() && status.code() != Some(EXIT_NOT_FOUND) {
        return Err(PipelineError::ToolFailed {
            root: root.to_path_buf(),
            code: status.code(),
            stderr: stderr_text.trim().to_string(),
        });
    }
    if skipped > 0 {
        tracing::warn!(
            "skipped {} malformed output line(s) in {}",
            skipped,
            root.display()
        );
    }

    matches.map_err(|e| PipelineError::ToolFailed {
        root: root.to_path_buf(),
        code: status.code(),
        stderr: format!("match collector failed: {}", e),
    })
}

/// Read stdout line by line into the channel. Returns the number of lines
/// that were not valid tool records.
async fn pump_events(stdout: ChildStdout, tx: mpsc::Sender<SearchEvent>) -> usize {
    let mut lines = BufReader::new(stdout).lines();
    let mut skipped = 0usize;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_event_line(&line) {
                Ok(Some(event)) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    skipped += 1;
                    tracing::warn!("{}", err);
                }
            },
            Ok(None) => break,
            Err(err) => {
                tracing::warn!("stopped reading search output: {}", err);
                break;
            }
        }
    }
    skipped
}

/// List the files a search with these globs would consider (`rg --files`).
pub async fn list_files(
    binary: &Path,
    roots: &[PathBuf],
    include: &[String],
    exclude: &[String],
    timeout: Duration,
) -> Result<Vec<PathBuf>> {
    let mut args = vec!["--files".to_string()];
    push_glob_args(&mut args, include, exclude.iter());

    let output = Command::new(binary)
        .args(&args)
        .args(roots)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let label = roots.first().cloned().unwrap_or_default();
    let output = tokio::time::timeout(timeout, output)
        .await
        .map_err(|_| PipelineError::ToolTimeout {
            root: label.clone(),
            secs: timeout.as_secs(),
        })?
        .map_err(|e| PipelineError::ToolUnavailable {
            tool: binary.display().to_string(),
            reason: e.to_string(),
        })?;

    let code = output.status.code();
    if !output.status.success() && code != Some(EXIT_NOT_FOUND) {
        return Err(PipelineError::ToolFailed {
            root: label,
            code,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let mut files: Vec<PathBuf> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(PathBuf::from)
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_case_insensitive_args() {
        let args = search_args("a.b", &SearchOptions::default(), 30, 30, &[]);
        assert_eq!(
            args,
            vec![
                "--json",
                "--line-number",
                "--column",
                "--before-context",
                "30",
                "--after-context",
                "30",
                "--ignore-case",
                "--fixed-strings",
                "--",
                "a.b",
            ]
        );
    }

    #[test]
    fn regex_whole_word_and_globs() {
        let options = SearchOptions {
            case_sensitive: true,
            whole_word: true,
            use_regex: true,
            include_globs: vec!["*.rs".into(), " ".into()],
            exclude_globs: vec!["target/**".into(), "!vendor/**".into()],
            ..Default::default()
        };
        let args = search_args("-fn", &options, 2, 3, &["node_modules".to_string()]);
        let joined = args.join(" ");
        assert!(joined.contains("--case-sensitive"));
        assert!(joined.contains("--word-regexp"));
        assert!(!joined.contains("--fixed-strings"));
        assert!(joined.contains("--glob *.rs"));
        assert!(joined.contains("--glob !target/**"));
        assert!(joined.contains("--glob !vendor/**"));
        assert!(joined.contains("--glob !node_modules"));
        assert_eq!(args.iter().filter(|a| *a == "--glob").count(), 4);
        // A query starting with a dash must stay a pattern.
        assert_eq!(&args[args.len() - 2..], ["--", "-fn"]);
    }

    #[test]
    fn missing_binary_is_tool_unavailable() {
        let err = resolve_binary("ripsolr-no-such-rg-binary").expect_err("missing");
        assert!(matches!(err, PipelineError::ToolUnavailable { .. }));
    }
}
