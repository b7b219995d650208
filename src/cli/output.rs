//! CLI output: error mapping from pipeline errors to stable CLI surface.

use crate::error::PipelineError;

/// Map pipeline errors to a string for CLI output.
pub fn map_error(e: &PipelineError) -> String {
    match e {
        PipelineError::ServiceUnavailable | PipelineError::DownloadStalled { .. } => format!(
            "{}\n\nThe on-device model could not be made ready. Check that the generation \
             service is running and that the configured model can be pulled.",
            e
        ),
        _ => e.to_string(),
    }
}
