// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// ripsolr - ripgrep search with a Solr session store
///
/// Search workspaces with ripgrep, store the results in Solr as a session,
/// and search stored sessions again with ranking and highlighting.
#[derive(Parser, Debug)]
#[command(name = "ripsolr")]
#[command(
    author,
    version,
    about,
    long_about = None,
    override_usage = "ripsolr [OPTIONS] <COMMAND>",
    after_help = "Search quickstart:\n  ripsolr s \"token refresh\" src/ tests/\n  ripsolr search --store -g '*.rs' needle\n  ripsolr ss needle --session <ID>\n\nLiteral query tips:\n  ripsolr search -- --literal\n  ripsolr search --regex 'fn \\w+_test'"
)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Use this config file instead of .ripsolrrc.toml / ~/.config/ripsolr/config.toml
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Debug logging on stderr (RIPSOLR_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search workspace roots with ripgrep
    #[command(visible_alias = "s")]
    Search {
        /// Search query (literal unless --regex)
        query: String,

        /// Workspace roots (defaults to current directory)
        #[arg(value_name = "PATH")]
        paths: Vec<PathBuf>,

        /// Maximum number of results
        #[arg(
            short = 'm',
            long = "limit",
            visible_alias = "max-results",
            help_heading = "Core"
        )]
        limit: Option<usize>,

        /// Show N lines before and after each match (like grep -C)
        #[arg(short = 'C', long, help_heading = "Core")]
        context: Option<usize>,

        /// Lines of context before each match (like grep -B)
        #[arg(short = 'B', long, help_heading = "Core")]
        before_context: Option<usize>,

        /// Lines of context after each match (like grep -A)
        #[arg(short = 'A', long, help_heading = "Core")]
        after_context: Option<usize>,

        /// Include files matching glob pattern (repeatable, e.g. "*.rs")
        #[arg(short = 'g', long = "glob", visible_alias = "include", help_heading = "Scope")]
        globs: Vec<String>,

        /// Exclude files matching glob pattern (repeatable)
        #[arg(short = 'x', long = "exclude", help_heading = "Scope")]
        excludes: Vec<String>,

        /// Case-sensitive matching (default: insensitive)
        #[arg(short = 's', long, help_heading = "Mode")]
        case_sensitive: bool,

        /// Match whole words only
        #[arg(short = 'w', long, help_heading = "Mode")]
        word: bool,

        /// Treat query as a regular expression
        #[arg(long, help_heading = "Mode")]
        regex: bool,

        /// Store the results as a new session and print its id
        #[arg(long, help_heading = "Session")]
        store: bool,

        /// Suppress statistics output
        #[arg(short = 'q', long, help_heading = "Core")]
        quiet: bool,
    },

    /// Search results stored in Solr
    #[command(visible_aliases = ["ss", "stored-search"])]
    Stored {
        /// Query (free text, or Solr field syntax such as file_extension:rs)
        query: String,

        /// Only search this session
        #[arg(short = 'S', long)]
        session: Option<String>,

        /// Maximum number of documents
        #[arg(short = 'm', long = "limit", visible_alias = "max-results")]
        limit: Option<usize>,

        /// Only documents stored from case-sensitive searches
        #[arg(short = 's', long)]
        case_sensitive: bool,

        /// Only documents stored from whole-word searches
        #[arg(short = 'w', long)]
        word: bool,

        /// Only files with this extension (repeatable, e.g. rs)
        #[arg(short = 'e', long = "ext")]
        extensions: Vec<String>,

        /// Fall back to a fresh search of these roots if Solr is unreachable
        #[arg(long, value_name = "PATH", num_args = 0.., default_missing_value = ".")]
        fallback: Option<Vec<PathBuf>>,
    },

    /// List stored sessions, newest first
    Sessions {
        /// Maximum number of sessions
        #[arg(short = 'm', long = "limit")]
        limit: Option<usize>,
    },

    /// Delete one stored session
    #[command(visible_alias = "rm")]
    DeleteSession {
        /// Session id as printed by `search --store`
        session_id: String,
    },

    /// Delete stored results older than N days
    Cleanup {
        /// Maximum age in days
        #[arg(short = 'd', long, default_value_t = 30)]
        days: u32,
    },

    /// Highlight query terms in text as HTML
    #[command(visible_alias = "hl")]
    Highlight {
        /// Text to highlight
        text: String,

        /// Query whose terms are marked
        query: String,

        /// Print mark statistics instead of the HTML
        #[arg(long)]
        stats: bool,
    },

    /// List files the given globs select (rg --files)
    Files {
        /// Workspace roots (defaults to current directory)
        #[arg(value_name = "PATH")]
        paths: Vec<PathBuf>,

        /// Include files matching glob pattern (repeatable)
        #[arg(short = 'g', long = "glob", visible_alias = "include")]
        globs: Vec<String>,

        /// Exclude files matching glob pattern (repeatable)
        #[arg(short = 'x', long = "exclude")]
        excludes: Vec<String>,
    },

    /// Check that ripgrep and the Solr core are available
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
