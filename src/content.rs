//! Page text extraction.

use crate::error::PipelineError;
use crate::tabs::TabInfo;
use async_trait::async_trait;

pub mod html;

pub use html::{extract_main_text, HttpContentSource};

/// Returns the extracted text of a tab's page. Best-effort: callers treat an
/// error the same as empty text.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn extract(&self, tab: &TabInfo) -> Result<String, PipelineError>;
}
