//! Merge rules: defaults first, later sources override earlier ones.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Create a Config builder with the pipeline defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("summarizer.chunk_size", 4000_i64)?
        .set_default("summarizer.merge_threshold", 5_i64)?
        .set_default("summarizer.style", "tldr")?
        .set_default("summarizer.length", "short")?
        .set_default("query.relevance_token", "YES")
}
