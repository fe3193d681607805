//! Command line interface for the paperflow library automation system.
//!
//! This crate provides a CLI tool for maintaining an academic paper
//! library using the `paperflow` library. It supports operations like:
//! - Duplicate detection and merging
//! - Watching feeds for new papers and importing them
//! - Filling in missing record metadata from external services
//! - Summarizing attached PDFs into notes with a language model
//! - Exporting the library into a Notion database
//!
//! # Usage
//!
//! ```bash
//! # Preview duplicate merges without writing anything
//! paperflow merge --dry-run
//!
//! # Import this week's trending and keyword-matched papers
//! paperflow watch --tags tag.json --create-collections
//!
//! # Fill missing metadata for one collection
//! paperflow enrich --collection-name "Inbox" --use-pdf
//!
//! # Summarize tagged PDFs into child notes
//! paperflow summarize --tag Awesome-VLA --limit 5
//!
//! # Push records into Notion
//! paperflow sync --since-days 7
//! ```
//!
//! Credentials come from the environment (`ZOTERO_USER_ID`,
//! `ZOTERO_API_KEY`, and per-service keys). Destructive operations prompt
//! for confirmation unless `--yes` or `--dry-run` is set, and the `-v`
//! flag raises the logging verbosity.

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use clap::{builder::ArgAction, Args, Parser, Subcommand};
use console::style;
use paperflow::{
  error::PaperflowError,
  record::{non_empty, Item},
  zotero::{ItemScope, ZoteroClient, ZoteroConfig},
};
use serde_json::{json, Value};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

pub mod commands;
pub mod error;

use crate::{commands::*, error::*};

/// Prefix for information messages
static INFO_PREFIX: &str = "ℹ ";
/// Prefix for success messages
static SUCCESS_PREFIX: &str = "✓ ";
/// Prefix for warning messages
static WARNING_PREFIX: &str = "⚠ ";
/// Prefix for error messages
static ERROR_PREFIX: &str = "✗ ";
/// Prefix for user prompts
static PROMPT_PREFIX: &str = "❯ ";

/// Command line interface configuration and argument parsing
#[derive(Parser)]
#[command(author, version, about = "CLI for the paperflow paper library automation system")]
pub struct Cli {
  /// Verbose mode (-v, -vv, -vvv) for different levels of logging detail
  #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase logging verbosity"
    )]
  verbose: u8,

  /// The subcommand to execute
  #[command(subcommand)]
  command: Commands,
}

/// Configures the logging system based on the verbosity level
///
/// The verbosity levels are:
/// - 0: error (default)
/// - 1: warn
/// - 2: info
/// - 3: debug
/// - 4+: trace
fn setup_logging(verbosity: u8) {
  let filter = match verbosity {
    0 => "error",
    1 => "warn",
    2 => "info",
    3 => "debug",
    _ => "trace",
  };

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_file(true)
    .with_line_number(true)
    .with_target(true)
    .init();
}

/// Entry point for the paperflow CLI application
///
/// Handles command line argument parsing, sets up logging, and executes
/// the requested command. Commands provide colored output and an
/// interactive confirmation before merges delete records.
#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  setup_logging(cli.verbose);

  let outcome = match cli.command {
    Commands::Merge(args) => merge(args).await,
    Commands::Watch(args) => watch(args).await,
    Commands::Enrich(args) => enrich(args).await,
    Commands::Summarize(args) => summarize(args).await,
    Commands::Sync(args) => sync(args).await,
  };

  if let Err(e) = &outcome {
    eprintln!("{} {e}", style(ERROR_PREFIX).red());
  }
  outcome
}
