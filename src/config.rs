//! Configuration System
//!
//! Layered configuration for the summarization pipeline: built-in defaults,
//! a user-level file, workspace files, then `TABSUM__*` environment overrides.

use crate::error::PipelineError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod loader;
mod merge_policy;
mod sources;

pub use loader::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TabsumConfig {
    /// Generation service connection
    #[serde(default)]
    pub service: ServiceConfig,

    /// Chunking and summary style
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// Ask/answer loop settings
    #[serde(default)]
    pub query: QueryConfig,

    /// Cache location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Generation service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Download-then-requery rounds before the service is declared unavailable
    #[serde(default = "default_max_download_rounds")]
    pub max_download_rounds: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_max_download_rounds() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            max_download_rounds: default_max_download_rounds(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Summary style preset passed to summarization sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryStyle {
    #[default]
    Tldr,
    KeyPoints,
    Teaser,
    Headline,
}

impl SummaryStyle {
    pub fn instruction(self) -> &'static str {
        match self {
            SummaryStyle::Tldr => "Write a TL;DR of the text: a compact overview a busy reader can skim.",
            SummaryStyle::KeyPoints => "List the most important points of the text as short bullet points.",
            SummaryStyle::Teaser => "Write an intriguing teaser that makes the reader want to read the text.",
            SummaryStyle::Headline => "Write a single headline that captures the main point of the text.",
        }
    }
}

/// Summary length preset passed to summarization sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryLength {
    #[default]
    Short,
    Medium,
    Long,
}

impl SummaryLength {
    pub fn instruction(self) -> &'static str {
        match self {
            SummaryLength::Short => "Keep it to one or two sentences.",
            SummaryLength::Medium => "Keep it to a short paragraph.",
            SummaryLength::Long => "Use up to three short paragraphs.",
        }
    }
}

/// Chunking and summary settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunk counts above this trigger a summary-of-summaries merge
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: usize,

    #[serde(default)]
    pub style: SummaryStyle,

    #[serde(default)]
    pub length: SummaryLength,

    /// Optional per-call timeout; none by default
    #[serde(default)]
    pub chunk_timeout_ms: Option<u64>,

    /// Consume the streaming variant of the service
    #[serde(default)]
    pub streaming: bool,
}

fn default_chunk_size() -> usize {
    4000
}

fn default_merge_threshold() -> usize {
    5
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            merge_threshold: default_merge_threshold(),
            style: SummaryStyle::default(),
            length: SummaryLength::default(),
            chunk_timeout_ms: None,
            streaming: false,
        }
    }
}

/// Ask/answer loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_instruction")]
    pub instruction: String,

    #[serde(default = "default_relevance_token")]
    pub relevance_token: String,
}

fn default_instruction() -> String {
    "You will be given the title and summary of a web page, followed by a question. \
     If the page helps answer the question, reply with YES on its own line and then \
     a concise answer. Otherwise reply with NO on its own line and nothing else."
        .to_string()
}

fn default_relevance_token() -> String {
    "YES".to_string()
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            instruction: default_instruction(),
            relevance_token: default_relevance_token(),
        }
    }
}

/// Cache location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
}

pub(crate) fn default_cache_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "tabsum")
        .map(|dirs| dirs.data_dir().join("summaries"))
        .unwrap_or_else(|| PathBuf::from(".tabsum/summaries"))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Service(String),
    Summarizer(String),
    Query(String),
    Storage(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Service(msg) => write!(f, "Service: {}", msg),
            ValidationError::Summarizer(msg) => write!(f, "Summarizer: {}", msg),
            ValidationError::Query(msg) => write!(f, "Query: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl TabsumConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.service.endpoint.trim().is_empty() {
            errors.push(ValidationError::Service("endpoint cannot be empty".to_string()));
        } else if url::Url::parse(&self.service.endpoint).is_err() {
            errors.push(ValidationError::Service(format!(
                "endpoint is not a valid URL: {}",
                self.service.endpoint
            )));
        }
        if self.service.model.trim().is_empty() {
            errors.push(ValidationError::Service("model cannot be empty".to_string()));
        }
        if self.summarizer.chunk_size == 0 {
            errors.push(ValidationError::Summarizer(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.summarizer.merge_threshold == 0 {
            errors.push(ValidationError::Summarizer(
                "merge_threshold must be at least 1".to_string(),
            ));
        }
        if self.query.relevance_token.trim().is_empty() {
            errors.push(ValidationError::Query(
                "relevance_token cannot be empty".to_string(),
            ));
        }
        if self.storage.cache_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage("cache_path cannot be empty".to_string()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all failures into one error
    pub fn validated(self) -> Result<Self, PipelineError> {
        self.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            PipelineError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })?;
        Ok(self)
    }
}
