//! Tab Summary Registry
//!
//! Owns one [`TabEntry`] per live tab and drives each entry through cache
//! lookup, extraction, chunked summarization via the shared queue, the
//! optional merge pass, and cache write-back.

use crate::chunking::{join_fragments, needs_merge, split_into_chunks};
use crate::error::PipelineError;
use crate::events::PipelineEvent;
use crate::generation::SessionOptions;
use crate::pipeline::Pipeline;
use crate::queue::{Fragment, WorkLabel};
use crate::tabs::{is_trackable_url, TabEvent, TabId, TabInfo};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

mod entry;

pub use entry::{CombinedSummary, EntryState, TabEntry};

#[derive(Default)]
struct RegistryState {
    entries: HashMap<TabId, Arc<TabEntry>>,
    /// Iteration order
    order: Vec<TabId>,
    active: Option<TabId>,
    next_epoch: u64,
}

impl RegistryState {
    /// Position for a newly seen tab: sorted by case-insensitive title.
    fn insertion_index(&self, title: &str) -> usize {
        let key = title.to_lowercase();
        self.order
            .iter()
            .position(|id| {
                self.entries
                    .get(id)
                    .map(|e| e.title().to_lowercase() > key)
                    .unwrap_or(false)
            })
            .unwrap_or(self.order.len())
    }
}

pub struct TabSummaryRegistry {
    pipeline: Arc<Pipeline>,
    state: RwLock<RegistryState>,
}

impl TabSummaryRegistry {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Install a fresh entry for `tab`, replacing any entry with the same id.
    ///
    /// Returns `None` when the URL is not trackable; an existing entry for the
    /// tab is dropped in that case.
    pub fn track(&self, tab: TabInfo) -> Result<Option<Arc<TabEntry>>, PipelineError> {
        self.pipeline.ensure_ready()?;

        if !is_trackable_url(&tab.url) {
            debug!(tab_id = %tab.id, url = %tab.url, "Ignoring untracked URL scheme");
            self.remove(tab.id);
            return Ok(None);
        }

        let tab_id = tab.id;
        let (entry, replaced) = {
            let mut state = self.state.write();
            state.next_epoch += 1;
            let entry = Arc::new(TabEntry::new(tab, state.next_epoch));

            let replaced = state.entries.insert(tab_id, Arc::clone(&entry));
            if replaced.is_none() {
                let index = state.insertion_index(entry.title());
                state.order.insert(index, tab_id);
            }
            (entry, replaced)
        };

        if let Some(old) = replaced {
            old.detach();
            debug!(
                tab_id = %tab_id,
                old_url = %old.url(),
                new_url = %entry.url(),
                "Superseded tab entry"
            );
        }
        self.emit_state(&entry, EntryState::New);
        Ok(Some(entry))
    }

    /// Track `tab` and run its summarization to completion.
    pub async fn refresh(&self, tab: TabInfo) -> Result<Option<Arc<TabEntry>>, PipelineError> {
        let Some(entry) = self.track(tab)? else {
            return Ok(None);
        };
        self.run(&entry).await;
        Ok(Some(entry))
    }

    /// Apply a tab lifecycle event. Summarization for created or navigated
    /// tabs runs on a spawned task whose handle is returned.
    pub fn handle_event(
        self: &Arc<Self>,
        event: TabEvent,
    ) -> Result<Option<JoinHandle<()>>, PipelineError> {
        match event {
            TabEvent::Updated(tab) | TabEvent::Navigated(tab) => {
                let Some(entry) = self.track(tab)? else {
                    return Ok(None);
                };
                let registry = Arc::clone(self);
                Ok(Some(tokio::spawn(async move {
                    registry.run(&entry).await;
                })))
            }
            TabEvent::Removed(tab_id) => {
                self.remove(tab_id);
                Ok(None)
            }
            TabEvent::Activated(tab_id) => {
                self.activate(tab_id);
                Ok(None)
            }
            TabEvent::Moved { tab_id, index } => {
                self.move_to(tab_id, index);
                Ok(None)
            }
        }
    }

    /// Drive `entry` through the summarization state machine.
    ///
    /// Failures are contained: a failed extraction yields an empty summary and
    /// failed chunks become placeholder fragments. Only a failure to create the
    /// summarization session leaves the entry without a summary.
    pub async fn run(&self, entry: &Arc<TabEntry>) -> Option<CombinedSummary> {
        let tab = entry.tab();
        let config = &self.pipeline.config().summarizer;
        let start = Instant::now();

        self.transition(entry, EntryState::CacheCheck);
        match self.pipeline.cache().get(&tab.url).await {
            Ok(Some(stored)) => {
                let summary = CombinedSummary::from(stored);
                entry.resolve(summary.clone());
                self.transition(entry, EntryState::Done);
                info!(tab_id = %tab.id, url = %tab.url, "Summary served from cache");
                return Some(summary);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(tab_id = %tab.id, url = %tab.url, error = %e, "Cache lookup failed, recomputing");
            }
        }

        self.transition(entry, EntryState::Extracting);
        let text = match self.pipeline.content().extract(tab).await {
            Ok(text) => text,
            Err(e) => {
                warn!(tab_id = %tab.id, url = %tab.url, error = %e, "Extraction failed, using empty text");
                String::new()
            }
        };

        let chunks = split_into_chunks(&text, config.chunk_size);
        if chunks.is_empty() {
            let summary = CombinedSummary::default();
            entry.prepare_slots(0);
            entry.resolve(summary.clone());
            self.persist(entry, &summary).await;
            return Some(summary);
        }

        let chunk_count = chunks.len();
        self.transition(entry, EntryState::Summarizing { chunks: chunk_count });

        let options = SessionOptions::summarizer(config.style, config.length, tab.shared_context());
        let session = match self.pipeline.service().create_session(options, None).await {
            Ok(session) => session,
            Err(e) => {
                warn!(tab_id = %tab.id, url = %tab.url, error = %e, "Could not create summarization session");
                self.transition(
                    entry,
                    EntryState::Failed {
                        reason: e.to_string(),
                    },
                );
                return None;
            }
        };

        entry.prepare_slots(chunk_count);
        let queue = self.pipeline.queue();
        let mut pending: FuturesUnordered<_> = chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let label = WorkLabel::Chunk {
                    tab_id: tab.id,
                    index,
                    count: chunk_count,
                };
                let ticket = queue.enqueue(Arc::clone(&session), chunk, label);
                let request_id = ticket.request_id();
                async move { (index, request_id, ticket.await) }
            })
            .collect();

        while let Some((index, request_id, fragment)) = pending.next().await {
            debug!(
                tab_id = %tab.id,
                index,
                request_id = request_id.as_u64(),
                failed = fragment.is_failed(),
                "Chunk fragment settled"
            );
            entry.fill_slot(index, fragment);
            if !entry.is_detached() {
                self.pipeline.events().emit(PipelineEvent::FragmentReady {
                    tab_id: tab.id,
                    index,
                });
            }
        }

        let mut fragments = entry.settled_fragments();
        if needs_merge(chunk_count, config.merge_threshold) {
            self.transition(
                entry,
                EntryState::Merging {
                    fragments: fragments.len(),
                },
            );
            let texts: Vec<String> = fragments.iter().map(Fragment::display_text).collect();
            let label = WorkLabel::Merge {
                tab_id: tab.id,
                fragments: texts.len(),
            };
            match queue.enqueue(Arc::clone(&session), join_fragments(&texts), label).await {
                Fragment::Summary(merged) => {
                    let merged = Fragment::Summary(merged);
                    entry.replace_fragments(vec![merged.clone()]);
                    fragments = vec![merged];
                }
                Fragment::Failed(reason) => {
                    warn!(tab_id = %tab.id, url = %tab.url, reason = %reason, "Merge pass failed, keeping chunk fragments");
                }
            }
        }

        let summary = CombinedSummary::new(fragments.iter().map(Fragment::display_text).collect());
        entry.resolve(summary.clone());
        self.persist(entry, &summary).await;

        info!(
            tab_id = %tab.id,
            url = %tab.url,
            chunks = chunk_count,
            fragments = summary.fragments().len(),
            duration_ms = start.elapsed().as_millis(),
            "Tab summarized"
        );
        Some(summary)
    }

    /// Write the summary to cache once, then mark the entry persisted.
    async fn persist(&self, entry: &TabEntry, summary: &CombinedSummary) {
        if let Err(e) = self.pipeline.cache().set(entry.url(), summary.to_stored()).await {
            warn!(tab_id = %entry.id(), url = %entry.url(), error = %e, "Cache write failed");
        }
        self.transition(entry, EntryState::Persisted);
    }

    /// Drop the entry for `tab_id`. Work still queued for it completes into the
    /// detached entry.
    pub fn remove(&self, tab_id: TabId) -> Option<Arc<TabEntry>> {
        let removed = {
            let mut state = self.state.write();
            let removed = state.entries.remove(&tab_id);
            if removed.is_some() {
                state.order.retain(|id| *id != tab_id);
                if state.active == Some(tab_id) {
                    state.active = None;
                }
            }
            removed
        };

        if let Some(entry) = &removed {
            self.emit_state(entry, EntryState::Removed);
            entry.set_state(EntryState::Removed);
            entry.detach();
            debug!(tab_id = %tab_id, url = %entry.url(), "Removed tab entry");
        }
        removed
    }

    pub fn activate(&self, tab_id: TabId) {
        let mut state = self.state.write();
        if state.entries.contains_key(&tab_id) {
            state.active = Some(tab_id);
        }
    }

    pub fn active(&self) -> Option<TabId> {
        self.state.read().active
    }

    /// Move a tracked tab to `index` in iteration order (clamped).
    pub fn move_to(&self, tab_id: TabId, index: usize) {
        let mut state = self.state.write();
        if let Some(pos) = state.order.iter().position(|id| *id == tab_id) {
            state.order.remove(pos);
            let index = index.min(state.order.len());
            state.order.insert(index, tab_id);
        }
    }

    pub fn get(&self, tab_id: TabId) -> Option<Arc<TabEntry>> {
        self.state.read().entries.get(&tab_id).cloned()
    }

    /// Live entries in iteration order
    pub fn entries(&self) -> Vec<Arc<TabEntry>> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|id| state.entries.get(id).cloned())
            .collect()
    }

    /// Live entries holding their final summary, in iteration order
    pub fn resolved_entries(&self) -> Vec<Arc<TabEntry>> {
        self.entries()
            .into_iter()
            .filter(|e| e.is_resolved())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn transition(&self, entry: &TabEntry, state: EntryState) {
        entry.set_state(state.clone());
        self.emit_state(entry, state);
    }

    fn emit_state(&self, entry: &TabEntry, state: EntryState) {
        if entry.is_detached() {
            return;
        }
        self.pipeline.events().emit(PipelineEvent::EntryState {
            tab_id: entry.id(),
            state,
        });
    }
}
