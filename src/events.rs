//! Events published to the presentation layer.
//!
//! Emission is best-effort: with no subscribers, or a lagging subscriber, events
//! are dropped and the pipeline carries on.

use crate::registry::EntryState;
use crate::tabs::TabId;
use serde::Serialize;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    CapabilityResolved,
    DownloadProgress { percent: u8 },
    ServiceUnavailable,
    EntryState { tab_id: TabId, state: EntryState },
    FragmentReady { tab_id: TabId, index: usize },
    QueryAnswered { tab_id: TabId, relevant: bool },
}

/// Broadcast channel for [`PipelineEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: PipelineEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
