//! Error types for the tab summarization pipeline.

use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to open summary cache: {0}")]
    Open(String),

    #[error("Failed to encode cached summary for {url}: {reason}")]
    Encode { url: String, reason: String },

    #[error("Failed to decode cached summary for {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cache backend error: {0}")]
    Backend(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// Pipeline-wide errors.
///
/// Only `ServiceUnavailable` is fatal for the whole pipeline. Everything else is
/// contained at the chunk, entry, or query-entry level by the caller.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Generation service is unavailable on this device")]
    ServiceUnavailable,

    #[error("Generation service is not ready (capability: {0})")]
    NotReady(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Session creation failed: {0}")]
    SessionCreation(String),

    #[error("Session has already been disposed")]
    SessionDisposed,

    #[error("Content extraction failed: {0}")]
    Extraction(String),

    #[error("Summarization queue is closed")]
    QueueClosed,

    #[error("Chunk generation timed out after {0} ms")]
    ChunkTimeout(u64),

    #[error("Model download did not complete after {rounds} rounds")]
    DownloadStalled { rounds: u32 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to encode output: {0}")]
    OutputEncoding(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::ConfigError(err.to_string())
    }
}
