//! CLI help and command-name contract for logging.

use crate::cli::parse::{CacheCommands, Commands};

/// Command name string for log fields (e.g. "summarize", "cache.get").
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::Status { .. } => "status".to_string(),
        Commands::Summarize { .. } => "summarize".to_string(),
        Commands::Ask { .. } => "ask".to_string(),
        Commands::Cache { command } => format!("cache.{}", cache_command_name(command)),
        Commands::Config => "config".to_string(),
    }
}

pub fn cache_command_name(command: &CacheCommands) -> &'static str {
    match command {
        CacheCommands::Get { .. } => "get",
    }
}
