// SPDX-License-Identifier: MIT OR Apache-2.0

//! ripsolr - ripgrep search with a Solr-backed session store
//!
//! Runs ripgrep over one or more workspace roots, ranks the hits, and
//! optionally stores them in Solr for ranked, highlighted re-querying.

mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use ripsolr::errors::PipelineError;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status for failures, distinct from "no matches" (1).
const EXIT_ERROR: u8 = 2;

fn init_tracing(verbose: bool) {
    let default = if verbose { "ripsolr=debug" } else { "ripsolr=warn" };
    let filter = std::env::var("RIPSOLR_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match commands::run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            if let Some(hint) = err
                .downcast_ref::<PipelineError>()
                .and_then(PipelineError::suggestion)
            {
                eprintln!("\n{}", hint);
            }
            ExitCode::from(EXIT_ERROR)
        }
    }
}
