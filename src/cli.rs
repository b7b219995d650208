//! CLI domain: parse, route, help, output, and presentation only.
//! No pipeline orchestration beyond wiring; the route table dispatches to the
//! registry and query engine.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::command_name;
pub use output::map_error;
pub use parse::{CacheCommands, Cli, Commands};
pub use presentation::{
    format_cached_summary_json, format_cached_summary_text, format_config_toml,
    format_entries_json, format_entries_text, format_query_json, format_query_text,
    format_status_json, format_status_text, EntryView,
};
pub use route::{load_tabs, RunContext};
