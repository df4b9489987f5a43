//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct. Global flags mirror the
//! `DEPOT_*` environment variables so flags and environment resolve the
//! same way.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Depot - Shared artifact download cache for staging pipelines.
#[derive(Debug, Parser)]
#[command(name = "depot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Cache root directory (defaults to the platform cache dir)
    #[arg(long, global = true, env = "DEPOT_CACHE_ROOT")]
    pub cache_root: Option<PathBuf>,

    /// Pre-staged offline cache directory
    #[arg(long, global = true, env = "DEPOT_OFFLINE_ROOT")]
    pub offline_root: Option<PathBuf>,

    /// Host (or *.suffix pattern, or URL) exempt from certificate validation
    #[arg(long, global = true, env = "DEPOT_INSECURE_HOST")]
    pub insecure_host: Option<String>,

    /// Freshness window during which cached entries skip revalidation
    /// (e.g. "30s", "15m", "24h")
    #[arg(long, global = true, env = "DEPOT_FRESH_FOR")]
    pub fresh_for: Option<String>,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve an artifact URI to a local path, fetching if necessary
    Get(GetArgs),

    /// List cached entries
    List(ListArgs),

    /// Show cache statistics
    Stats,

    /// Clear the cache
    Clear(ClearArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the `get` command.
#[derive(Debug, Clone, clap::Args)]
pub struct GetArgs {
    /// Artifact URI (absolute http/https)
    pub uri: String,

    /// Force revalidation even inside the freshness window
    #[arg(long)]
    pub refresh: bool,
}

/// Arguments for the `list` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ListArgs {
    /// Show detailed information
    #[arg(long)]
    pub verbose: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `clear` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ClearArgs {
    /// Don't prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the `completions` command.
#[derive(Debug, Clone, clap::Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
