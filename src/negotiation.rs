//! Capability negotiation with the generation service.
//!
//! Runs once at startup. `ready` proceeds, `unavailable` is fatal, and
//! `needs-download` opens a provisional session that drives the download, then
//! queries again.

use crate::error::PipelineError;
use crate::events::{EventBus, PipelineEvent};
use crate::generation::{
    Availability, DownloadMonitor, DownloadProgress, GenerationService, SessionOptions,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Negotiate until the service reports `ready` or `unavailable`.
///
/// Download rounds are capped at `max_download_rounds`; running out is reported
/// as unavailability.
pub async fn negotiate(
    service: &dyn GenerationService,
    events: &EventBus,
    max_download_rounds: u32,
) -> Result<Availability, PipelineError> {
    let mut rounds = 0;

    loop {
        let availability = match service.capability().await {
            Ok(availability) => availability,
            Err(e) => {
                warn!(error = %e, "Capability query failed");
                Availability::Unavailable
            }
        };
        info!(%availability, rounds, "Generation service capability");

        match availability {
            Availability::Ready => {
                events.emit(PipelineEvent::CapabilityResolved);
                return Ok(Availability::Ready);
            }
            Availability::Unavailable => {
                events.emit(PipelineEvent::ServiceUnavailable);
                return Err(PipelineError::ServiceUnavailable);
            }
            Availability::NeedsDownload if rounds >= max_download_rounds => {
                warn!(rounds, "Model download did not make the service ready");
                events.emit(PipelineEvent::ServiceUnavailable);
                return Err(PipelineError::DownloadStalled { rounds });
            }
            Availability::NeedsDownload => {
                rounds += 1;
                run_download(service, events).await?;
            }
        }
    }
}

async fn run_download(
    service: &dyn GenerationService,
    events: &EventBus,
) -> Result<(), PipelineError> {
    let last_percent = Arc::new(Mutex::new(None::<u8>));
    let monitor: DownloadMonitor = {
        let events = events.clone();
        let last_percent = Arc::clone(&last_percent);
        Arc::new(move |progress: DownloadProgress| {
            let percent = progress.percent();
            let mut last = last_percent.lock();
            if *last != Some(percent) {
                *last = Some(percent);
                events.emit(PipelineEvent::DownloadProgress { percent });
                if progress.is_complete() {
                    info!("Model download complete");
                }
            }
        })
    };

    let session = service
        .create_session(SessionOptions::default(), Some(monitor))
        .await
        .map_err(|e| {
            events.emit(PipelineEvent::ServiceUnavailable);
            e
        })?;
    session.destroy().await;

    if *last_percent.lock() != Some(100) {
        warn!("Provisional session returned before the download reported completion");
    }
    Ok(())
}
