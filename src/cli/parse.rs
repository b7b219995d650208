//! CLI parse: clap types for tabsum. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tabsum CLI - cache-first summaries of open tabs
#[derive(Parser)]
#[command(name = "tabsum")]
#[command(about = "Summarize open tabs with an on-device model and ask questions across them")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (for config/ files)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Negotiate with the generation service and report its capability
    Status {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Summarize every tab in a JSON snapshot (cache first)
    Summarize {
        /// Path to a JSON array of tabs ({id, url, title, ...})
        #[arg(long)]
        tabs: PathBuf,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Summarize the tabs, then ask a question across their summaries
    Ask {
        /// Path to a JSON array of tabs ({id, url, title, ...})
        #[arg(long)]
        tabs: PathBuf,
        /// The question to ask
        question: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Summary cache operations
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Print the cached summary for a URL
    Get {
        /// Page URL (cache key)
        url: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}
