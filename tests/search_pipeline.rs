// SPDX-License-Identifier: MIT OR Apache-2.0

use ripsolr::config::SearchConfig;
use ripsolr::errors::PipelineError;
use ripsolr::search::{QuerySpec, SearchOptions, SearchOrchestrator};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn rg_available() -> bool {
    if which::which("rg").is_ok() {
        return true;
    }
    eprintln!("skipping: rg not installed");
    false
}

fn write_lines(path: &Path, count: usize, hits: &[usize]) {
    let body: String = (1..=count)
        .map(|n| {
            if hits.contains(&n) {
                format!("needle on line {n}\n")
            } else {
                format!("filler {n}\n")
            }
        })
        .collect();
    fs::write(path, body).expect("write file");
}

fn lines_of(m: &ripsolr::search::Match) -> Vec<u64> {
    m.context.iter().map(|c| c.line).collect()
}

#[tokio::test]
async fn context_between_matches_is_split_at_the_midpoint() {
    if !rg_available() {
        return;
    }
    let dir = TempDir::new().expect("tempdir");
    write_lines(&dir.path().join("a.txt"), 40, &[10, 20]);

    let outcome = SearchOrchestrator::new(SearchConfig::default())
        .search(
            &[dir.path().to_path_buf()],
            &QuerySpec::new("needle"),
            &CancellationToken::new(),
        )
        .await
        .expect("search");

    let mut matches = outcome.matches;
    matches.sort_by_key(|m| m.line);
    assert_eq!(matches.len(), 2);

    let first = lines_of(&matches[0]);
    let second = lines_of(&matches[1]);
    assert_eq!(first, (1..=14).collect::<Vec<u64>>());
    assert_eq!(second, (15..=40).collect::<Vec<u64>>());
    assert_eq!(matches[0].context.iter().filter(|c| c.is_match).count(), 1);
    assert_eq!(matches[1].context.iter().filter(|c| c.is_match).count(), 1);
}

#[tokio::test]
async fn every_root_is_searched_in_parallel() {
    if !rg_available() {
        return;
    }
    let roots: Vec<TempDir> = (0..3).map(|_| TempDir::new().expect("tempdir")).collect();
    for (i, root) in roots.iter().enumerate() {
        write_lines(&root.path().join(format!("r{i}.txt")), 3, &[2]);
    }
    let paths: Vec<PathBuf> = roots.iter().map(|r| r.path().to_path_buf()).collect();

    let spec = QuerySpec::new("needle").with_options(SearchOptions {
        context: Some(0),
        ..Default::default()
    });
    let outcome = SearchOrchestrator::new(SearchConfig::default())
        .search(&paths, &spec, &CancellationToken::new())
        .await
        .expect("search");

    assert_eq!(outcome.roots_searched, 3);
    assert_eq!(outcome.matches.len(), 3);
    assert_eq!(outcome.files_with_matches, 3);
    assert!(outcome.failed_roots.is_empty());
}

#[tokio::test]
async fn a_failing_root_does_not_abort_the_search() {
    if !rg_available() {
        return;
    }
    let good = TempDir::new().expect("tempdir");
    write_lines(&good.path().join("ok.txt"), 2, &[1]);
    let missing = good.path().join("does-not-exist");

    let outcome = SearchOrchestrator::new(SearchConfig::default())
        .search(
            &[good.path().to_path_buf(), missing.clone()],
            &QuerySpec::new("needle"),
            &CancellationToken::new(),
        )
        .await
        .expect("search");

    assert_eq!(outcome.matches.len(), 1);
    assert_eq!(outcome.failed_roots.len(), 1);
    assert_eq!(outcome.failed_roots[0].root, missing);
}

#[tokio::test]
async fn all_roots_failing_is_not_an_empty_result() {
    if !rg_available() {
        return;
    }
    let dir = TempDir::new().expect("tempdir");
    let err = SearchOrchestrator::new(SearchConfig::default())
        .search(
            &[dir.path().join("nope")],
            &QuerySpec::new("needle"),
            &CancellationToken::new(),
        )
        .await
        .expect_err("all roots failed");
    assert!(matches!(err, PipelineError::AllRootsFailed { .. }));
}

#[tokio::test]
async fn cancelled_search_discards_results() {
    if !rg_available() {
        return;
    }
    let dir = TempDir::new().expect("tempdir");
    write_lines(&dir.path().join("a.txt"), 5, &[1, 3]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = SearchOrchestrator::new(SearchConfig::default())
        .search(&[dir.path().to_path_buf()], &QuerySpec::new("needle"), &cancel)
        .await
        .expect_err("cancelled");
    assert!(matches!(err, PipelineError::Cancelled));
}

#[tokio::test]
async fn whole_word_and_case_flags_reach_the_tool() {
    if !rg_available() {
        return;
    }
    let dir = TempDir::new().expect("tempdir");
    fs::write(
        dir.path().join("a.txt"),
        "Needle\nneedle\nneedles\n",
    )
    .expect("write");

    let spec = QuerySpec::new("needle").with_options(SearchOptions {
        case_sensitive: true,
        whole_word: true,
        context: Some(0),
        ..Default::default()
    });
    let outcome = SearchOrchestrator::new(SearchConfig::default())
        .search(&[dir.path().to_path_buf()], &spec, &CancellationToken::new())
        .await
        .expect("search");
    assert_eq!(outcome.matches.len(), 1);
    assert_eq!(outcome.matches[0].line, 2);
}
