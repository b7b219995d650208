//! Pipeline context: the collaborators, the shared queue, and the negotiated
//! capability, constructed once and shared by the registry and query engine.

use crate::cache::SummaryCache;
use crate::config::TabsumConfig;
use crate::content::ContentSource;
use crate::error::PipelineError;
use crate::events::EventBus;
use crate::generation::{Availability, GenerationService};
use crate::negotiation::negotiate;
use crate::queue::{QueueOptions, SummarizationQueue};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Negotiated service state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Negotiation has not finished
    Pending,
    Ready,
    Unavailable,
}

pub struct Pipeline {
    config: TabsumConfig,
    service: Arc<dyn GenerationService>,
    cache: Arc<dyn SummaryCache>,
    content: Arc<dyn ContentSource>,
    queue: SummarizationQueue,
    events: EventBus,
    state: RwLock<ServiceState>,
}

impl Pipeline {
    /// Build the pipeline and start the queue worker. Must be called inside a
    /// tokio runtime.
    pub fn new(
        config: TabsumConfig,
        service: Arc<dyn GenerationService>,
        cache: Arc<dyn SummaryCache>,
        content: Arc<dyn ContentSource>,
    ) -> Arc<Self> {
        let queue = SummarizationQueue::start(QueueOptions {
            call_timeout: config.summarizer.chunk_timeout_ms.map(Duration::from_millis),
            streaming: config.summarizer.streaming,
        });

        Arc::new(Self {
            config,
            service,
            cache,
            content,
            queue,
            events: EventBus::new(),
            state: RwLock::new(ServiceState::Pending),
        })
    }

    /// Run capability negotiation and record the outcome.
    pub async fn negotiate(&self) -> Result<Availability, PipelineError> {
        let result = negotiate(
            self.service.as_ref(),
            &self.events,
            self.config.service.max_download_rounds,
        )
        .await;

        *self.state.write() = match result {
            Ok(_) => ServiceState::Ready,
            Err(_) => ServiceState::Unavailable,
        };
        result
    }

    /// Error unless negotiation has resolved to ready.
    pub fn ensure_ready(&self) -> Result<(), PipelineError> {
        match *self.state.read() {
            ServiceState::Ready => Ok(()),
            ServiceState::Unavailable => Err(PipelineError::ServiceUnavailable),
            ServiceState::Pending => Err(PipelineError::NotReady("pending".to_string())),
        }
    }

    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    pub fn config(&self) -> &TabsumConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<dyn GenerationService> {
        &self.service
    }

    pub fn cache(&self) -> &Arc<dyn SummaryCache> {
        &self.cache
    }

    pub fn content(&self) -> &Arc<dyn ContentSource> {
        &self.content
    }

    pub fn queue(&self) -> &SummarizationQueue {
        &self.queue
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
