//! Generation Service Abstraction
//!
//! The text-generation capability the pipeline drives: a capability query,
//! session creation (optionally monitoring a model download), and per-session
//! summarize / prompt / fork / destroy. Concrete backends live in submodules.

use crate::config::{SummaryLength, SummaryStyle};
use crate::error::PipelineError;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

pub mod ollama;

pub use ollama::OllamaService;

/// Result of a capability query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Availability {
    Ready,
    NeedsDownload,
    Unavailable,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Ready => write!(f, "ready"),
            Availability::NeedsDownload => write!(f, "needs-download"),
            Availability::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Byte progress of a model download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub loaded_bytes: u64,
    pub total_bytes: u64,
}

impl DownloadProgress {
    /// Percentage of bytes loaded, clamped to 0..=100
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        let pct = self.loaded_bytes.saturating_mul(100) / self.total_bytes;
        pct.min(100) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.percent() >= 100
    }
}

/// Callback receiving download progress
pub type DownloadMonitor = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Incremental text versions; each item is the full text so far.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, PipelineError>> + Send>>;

/// Shared handle to a generation session
pub type SharedSession = Arc<dyn GenerationSession>;

/// Session configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub style: SummaryStyle,
    pub length: SummaryLength,
    /// Context shared by every call made through the session
    pub shared_context: Option<String>,
    /// Fixed instruction for prompt sessions
    pub instruction: Option<String>,
}

impl SessionOptions {
    /// Options for a summarization session
    pub fn summarizer(
        style: SummaryStyle,
        length: SummaryLength,
        shared_context: impl Into<String>,
    ) -> Self {
        Self {
            style,
            length,
            shared_context: Some(shared_context.into()),
            instruction: None,
        }
    }

    /// Options for a prompt session with a fixed instruction
    pub fn prompt(instruction: impl Into<String>) -> Self {
        Self {
            instruction: Some(instruction.into()),
            ..Self::default()
        }
    }

    /// System prompt derived from the options
    pub fn system_prompt(&self) -> String {
        let mut parts = Vec::new();
        match &self.instruction {
            Some(instruction) => parts.push(instruction.clone()),
            None => {
                parts.push(self.style.instruction().to_string());
                parts.push(self.length.instruction().to_string());
            }
        }
        if let Some(context) = &self.shared_context {
            parts.push(format!("Context: {}", context));
        }
        parts.join("\n")
    }
}

/// Generation service
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Query whether the service can run on this device
    async fn capability(&self) -> Result<Availability, PipelineError>;

    /// Create a session. With a monitor, any pending model download runs first
    /// and reports progress through it.
    async fn create_session(
        &self,
        options: SessionOptions,
        monitor: Option<DownloadMonitor>,
    ) -> Result<SharedSession, PipelineError>;
}

/// One generation session
#[async_trait]
pub trait GenerationSession: Send + Sync {
    /// Summarize `text` in one shot
    async fn summarize(&self, text: &str) -> Result<String, PipelineError>;

    /// Summarize `text`, yielding incremental versions
    async fn summarize_streaming(&self, text: &str) -> Result<TextStream, PipelineError> {
        let summary = self.summarize(text).await;
        Ok(Box::pin(futures::stream::iter(vec![summary])))
    }

    /// Send one prompt within the session's conversation
    async fn prompt(&self, input: &str) -> Result<String, PipelineError>;

    /// Fork a session that keeps this one's configuration and context but has
    /// its own conversation state
    async fn fork(&self) -> Result<SharedSession, PipelineError>;

    /// Release the session; later calls fail with `SessionDisposed`
    async fn destroy(&self);
}

/// Drain a [`TextStream`] and keep the final version.
pub async fn final_version(mut stream: TextStream) -> Result<String, PipelineError> {
    let mut latest = String::new();
    while let Some(version) = stream.next().await {
        latest = version?;
    }
    Ok(latest)
}
