// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command runners for the CLI

use anyhow::{Context, Result};
use clap::CommandFactory;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Commands, OutputFormat};
use ripsolr::config::{Config, ConfigOutputFormat};
use ripsolr::errors::suggestions;
use ripsolr::highlight::{self, HighlightStats};
use ripsolr::output::{
    colorize_context, colorize_line_num, colorize_path, colorize_submatches, print_json,
    render_marked, use_colors,
};
use ripsolr::pipeline::{FallbackResults, Pipeline};
use ripsolr::search::{Match, QuerySpec, SearchOptions, SearchOutcome};
use ripsolr::store::{StoredQuery, StoredResults};

/// Exit status when a search ran fine but found nothing (grep convention).
const EXIT_NO_MATCHES: u8 = 1;

struct Output {
    format: OutputFormat,
    compact: bool,
    use_color: bool,
}

impl Output {
    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

#[derive(Serialize)]
struct SearchReport<'a> {
    #[serde(flatten)]
    outcome: &'a SearchOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct HighlightReport {
    html: String,
    stats: HighlightStats,
}

#[derive(Serialize)]
struct StatusReport {
    rg: Option<PathBuf>,
    rg_error: Option<String>,
    store_url: String,
    store_ok: bool,
    store_error: Option<String>,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load_file(path)?),
        None => Ok(Config::load()),
    }
}

fn resolve_roots(paths: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    if !paths.is_empty() {
        return Ok(paths);
    }
    Ok(vec![
        std::env::current_dir().context("Cannot determine current directory")?
    ])
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

fn spinner(message: &str, out: &Output) -> ProgressBar {
    if out.json() || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub async fn run(cli: Cli) -> Result<ExitCode> {
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "ripsolr", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(cli.config.as_deref())?;
    let format = cli.format.unwrap_or(match config.output_format() {
        Some(ConfigOutputFormat::Json) => OutputFormat::Json,
        _ => OutputFormat::Text,
    });
    let out = Output {
        format,
        compact: cli.compact,
        use_color: use_colors() && format == OutputFormat::Text,
    };

    if let Commands::Highlight { text, query, stats } = cli.command {
        return run_highlight(&text, &query, stats, &out);
    }

    let pipeline = Pipeline::new(config)?;
    match cli.command {
        Commands::Search {
            query,
            paths,
            limit,
            context,
            before_context,
            after_context,
            globs,
            excludes,
            case_sensitive,
            word,
            regex,
            store,
            quiet,
        } => {
            let options = SearchOptions {
                case_sensitive,
                whole_word: word,
                use_regex: regex,
                include_globs: globs,
                exclude_globs: excludes,
                max_results: Some(pipeline.config().merge_max_results(limit)),
                context_before: before_context,
                context_after: after_context,
                context,
            };
            let roots = resolve_roots(paths)?;
            run_search(&pipeline, &roots, query, options, store, quiet, &out).await
        }
        Commands::Stored {
            query,
            session,
            limit,
            case_sensitive,
            word,
            extensions,
            fallback,
        } => {
            let request = StoredQuery {
                query,
                session_id: session,
                case_sensitive: case_sensitive.then_some(true),
                whole_word: word.then_some(true),
                extensions,
                rows: limit,
            };
            run_stored(&pipeline, &request, fallback, &out).await
        }
        Commands::Sessions { limit } => run_sessions(&pipeline, limit, &out).await,
        Commands::DeleteSession { session_id } => {
            let removed = pipeline.delete_session(&session_id).await?;
            if out.json() {
                print_json(
                    &serde_json::json!({ "session_id": session_id, "removed": removed }),
                    out.compact,
                )?;
            } else {
                println!("Deleted session {} ({} document(s))", session_id, removed);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Cleanup { days } => {
            let removed = pipeline.cleanup_older_than(days).await?;
            if out.json() {
                print_json(
                    &serde_json::json!({ "max_age_days": days, "removed": removed }),
                    out.compact,
                )?;
            } else {
                println!("Removed {} document(s) older than {} day(s)", removed, days);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Files {
            paths,
            globs,
            excludes,
        } => {
            let roots = resolve_roots(paths)?;
            let files = pipeline.preview_globs(&roots, &globs, &excludes).await?;
            if out.json() {
                print_json(&files, out.compact)?;
            } else {
                for file in &files {
                    println!("{}", colorize_path(&file.display().to_string(), out.use_color));
                }
                eprintln!("{} file(s)", files.len());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => run_status(&pipeline, &out).await,
        Commands::Highlight { .. } | Commands::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

async fn run_search(
    pipeline: &Pipeline,
    roots: &[PathBuf],
    query: String,
    options: SearchOptions,
    store: bool,
    quiet: bool,
    out: &Output,
) -> Result<ExitCode> {
    let spec = QuerySpec::new(query).with_options(options);
    let cancel = cancel_on_ctrl_c();

    let pb = spinner(&format!("Searching {} root(s)...", roots.len()), out);
    let outcome = pipeline.fresh_search(roots, &spec, &cancel).await;
    pb.finish_and_clear();
    let outcome = outcome?;

    let session_id = if store {
        Some(
            pipeline
                .store_and_get_session_id(&outcome.matches, &spec.query, &spec.options)
                .await?,
        )
    } else {
        None
    };

    if out.json() {
        print_json(
            &SearchReport {
                outcome: &outcome,
                session_id,
            },
            out.compact,
        )?;
    } else {
        print_outcome(&outcome, &spec.query, out);
        for failure in &outcome.failed_roots {
            eprintln!(
                "Warning: search failed in {}: {}",
                failure.root.display(),
                failure.reason
            );
        }
        if let Some(id) = &session_id {
            println!("Session: {}", id);
        }
        if !quiet {
            let shown = if outcome.truncated() {
                format!(" (showing {})", outcome.matches.len())
            } else {
                String::new()
            };
            eprintln!(
                "\n{} files | {} matches{} | {:.2}ms",
                outcome.files_with_matches, outcome.total_matches, shown, outcome.elapsed_ms
            );
        }
        if outcome.matches.is_empty() {
            eprintln!("{}", suggestions::no_results_suggestion(&spec.query));
        }
    }

    Ok(if outcome.matches.is_empty() {
        ExitCode::from(EXIT_NO_MATCHES)
    } else {
        ExitCode::SUCCESS
    })
}

fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| cwd.canonicalize().ok())
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

fn print_outcome(outcome: &SearchOutcome, query: &str, out: &Output) {
    let use_color = out.use_color;
    if outcome.matches.is_empty() {
        if use_color {
            println!("{} No results found for: {}", "✗".red(), query.yellow());
        } else {
            println!("No results found for: {}", query);
        }
        return;
    }
    if use_color {
        println!(
            "\n{} Found {} results for: {}\n",
            "✓".green(),
            outcome.matches.len().to_string().cyan(),
            query.yellow()
        );
    } else {
        println!("\nFound {} results for: {}\n", outcome.matches.len(), query);
    }

    for (idx, m) in outcome.matches.iter().enumerate() {
        if idx > 0 {
            println!(
                "{}",
                if use_color {
                    "--".dimmed().to_string()
                } else {
                    "--".to_string()
                }
            );
        }
        print_match(m, use_color);
    }
}

fn print_match(m: &Match, use_color: bool) {
    println!(
        "{}:{}",
        colorize_path(&display_path(&m.path), use_color),
        colorize_line_num(m.line, use_color)
    );

    let width = m
        .context
        .iter()
        .map(|c| c.line)
        .chain(std::iter::once(m.line))
        .max()
        .unwrap_or(m.line)
        .to_string()
        .len();
    let prefix = |marker: &str, line: u64| {
        let padded = format!("{:>width$}", line, width = width);
        let num = if use_color {
            padded.yellow().to_string()
        } else {
            padded
        };
        let marker = if use_color && marker == ">" {
            marker.blue().to_string()
        } else {
            marker.to_string()
        };
        format!("{} {} | ", marker, num)
    };

    if m.context.is_empty() {
        println!("{}{}", prefix(">", m.line), colorize_submatches(&m.text, &m.submatches, use_color));
        return;
    }
    for line in &m.context {
        if line.is_match {
            println!(
                "{}{}",
                prefix(">", line.line),
                colorize_submatches(&m.text, &m.submatches, use_color)
            );
        } else {
            println!("{}{}", prefix(" ", line.line), colorize_context(&line.text, use_color));
        }
    }
}

async fn run_stored(
    pipeline: &Pipeline,
    request: &StoredQuery,
    fallback: Option<Vec<PathBuf>>,
    out: &Output,
) -> Result<ExitCode> {
    let pb = spinner("Searching stored results...", out);
    let found = match fallback {
        Some(paths) => {
            let roots = resolve_roots(paths)?;
            let options = SearchOptions {
                case_sensitive: request.case_sensitive.unwrap_or(false),
                whole_word: request.whole_word.unwrap_or(false),
                max_results: request.rows,
                ..Default::default()
            };
            let cancel = cancel_on_ctrl_c();
            pipeline
                .search_with_fallback(&roots, request, &options, &cancel)
                .await
        }
        None => pipeline
            .search_stored_with(request)
            .await
            .map(FallbackResults::Stored),
    };
    pb.finish_and_clear();
    let found = found?;

    if out.json() {
        print_json(&found, out.compact)?;
    }
    let empty = match &found {
        FallbackResults::Stored(results) => {
            if !out.json() {
                print_stored(results, &request.query, out.use_color);
            }
            results.documents.is_empty()
        }
        FallbackResults::Fresh(outcome) => {
            if !out.json() {
                eprintln!("Warning: Solr unreachable, showing a fresh search instead");
                print_outcome(outcome, &request.query, out);
            }
            outcome.matches.is_empty()
        }
    };

    Ok(if empty {
        ExitCode::from(EXIT_NO_MATCHES)
    } else {
        ExitCode::SUCCESS
    })
}

fn print_stored(results: &StoredResults, query: &str, use_color: bool) {
    if results.documents.is_empty() {
        println!("No stored results found for: {}", query);
        return;
    }
    println!(
        "\nFound {} of {} stored results for: {}\n",
        results.documents.len(),
        results.num_found,
        query
    );
    for doc in &results.documents {
        let d = &doc.document;
        let score = d
            .score
            .map(|s| format!(" [{:.3}]", s))
            .unwrap_or_default();
        println!(
            "{}:{}{} {}",
            colorize_path(&d.file_path, use_color),
            colorize_line_num(d.line_number, use_color),
            score,
            colorize_context(&d.session_id, use_color)
        );
        for snippet in &doc.snippets {
            println!("    {}", render_marked(snippet, use_color));
        }
        println!();
    }
}

async fn run_sessions(pipeline: &Pipeline, limit: Option<usize>, out: &Output) -> Result<ExitCode> {
    let sessions = pipeline.list_sessions(limit).await?;
    if out.json() {
        print_json(&sessions, out.compact)?;
        return Ok(ExitCode::SUCCESS);
    }
    if sessions.is_empty() {
        println!("No stored sessions");
        return Ok(ExitCode::SUCCESS);
    }
    for session in &sessions {
        let when = session
            .search_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {}  {:>5} match(es)  {}",
            colorize_path(&session.session_id, out.use_color),
            when,
            session.match_count,
            session.original_query
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn run_highlight(text: &str, query: &str, stats: bool, out: &Output) -> Result<ExitCode> {
    let html = highlight::highlight(text, query);
    let summary = highlight::highlight_stats(&html);
    if out.json() {
        print_json(&HighlightReport { html, stats: summary }, out.compact)?;
    } else if stats {
        println!(
            "{} mark(s) | {} of {} chars highlighted",
            summary.marks, summary.highlighted_chars, summary.total_chars
        );
    } else {
        println!("{}", html);
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_status(pipeline: &Pipeline, out: &Output) -> Result<ExitCode> {
    let (rg, rg_error) = match ripsolr::search::ripgrep::resolve_binary(&pipeline.config().search.rg_path) {
        Ok(path) => (Some(path), None),
        Err(err) => (None, Some(err.to_string())),
    };
    let (store_ok, store_error) = match pipeline.ping().await {
        Ok(ok) => (ok, (!ok).then(|| "ping status was not OK".to_string())),
        Err(err) => (false, Some(err.to_string())),
    };
    let report = StatusReport {
        rg,
        rg_error,
        store_url: pipeline.store().core_url().to_string(),
        store_ok,
        store_error,
    };

    if out.json() {
        print_json(&report, out.compact)?;
    } else {
        let ok = |good: bool| {
            let word = if good { "ok" } else { "unavailable" };
            match (out.use_color, good) {
                (false, _) => word.to_string(),
                (true, true) => word.green().to_string(),
                (true, false) => word.red().to_string(),
            }
        };
        match (&report.rg, &report.rg_error) {
            (Some(path), _) => println!("ripgrep: {} ({})", ok(true), path.display()),
            (None, reason) => println!("ripgrep: {} {}", ok(false), reason.as_deref().unwrap_or("")),
        }
        println!("solr:    {} ({})", ok(report.store_ok), report.store_url);
        if let Some(reason) = &report.store_error {
            println!("         {}", reason);
        }
    }

    Ok(if report.rg.is_some() && report.store_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
