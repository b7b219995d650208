//! Per-tab entry: identity, lifecycle state, and index-addressed fragment slots.

use crate::cache::StoredSummary;
use crate::chunking::join_fragments;
use crate::queue::Fragment;
use crate::tabs::{TabId, TabInfo};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// Entry lifecycle.
///
/// `New → CacheCheck → Done` on a cache hit, otherwise
/// `CacheCheck → Extracting → Summarizing → [Merging] → Persisted`.
/// `Removed` is reachable from anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EntryState {
    New,
    CacheCheck,
    /// Served from cache
    Done,
    Extracting,
    Summarizing { chunks: usize },
    Merging { fragments: usize },
    Persisted,
    /// No summarization session could be created
    Failed { reason: String },
    Removed,
}

impl EntryState {
    /// Whether the entry holds its final summary
    pub fn is_resolved(&self) -> bool {
        matches!(self, EntryState::Done | EntryState::Persisted)
    }

    /// Whether work is still running for the entry
    pub fn is_working(&self) -> bool {
        matches!(
            self,
            EntryState::CacheCheck
                | EntryState::Extracting
                | EntryState::Summarizing { .. }
                | EntryState::Merging { .. }
        )
    }
}

/// Final summary of an entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CombinedSummary {
    fragments: Vec<String>,
}

impl CombinedSummary {
    pub fn new(fragments: Vec<String>) -> Self {
        Self { fragments }
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn text(&self) -> String {
        join_fragments(&self.fragments)
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.iter().all(|f| f.trim().is_empty())
    }

    pub fn to_stored(&self) -> StoredSummary {
        StoredSummary::new(self.fragments.clone())
    }
}

impl From<StoredSummary> for CombinedSummary {
    fn from(stored: StoredSummary) -> Self {
        Self {
            fragments: stored.fragments,
        }
    }
}

/// One tracked tab.
///
/// Entries are never reused across navigations: the registry installs a new
/// entry and detaches the old one, so late writes land on an object nobody
/// reads anymore.
#[derive(Debug)]
pub struct TabEntry {
    tab: TabInfo,
    epoch: u64,
    state: RwLock<EntryState>,
    slots: RwLock<Vec<Option<Fragment>>>,
    summary: RwLock<Option<CombinedSummary>>,
    detached: AtomicBool,
}

impl TabEntry {
    pub(crate) fn new(tab: TabInfo, epoch: u64) -> Self {
        Self {
            tab,
            epoch,
            state: RwLock::new(EntryState::New),
            slots: RwLock::new(Vec::new()),
            summary: RwLock::new(None),
            detached: AtomicBool::new(false),
        }
    }

    pub fn tab(&self) -> &TabInfo {
        &self.tab
    }

    pub fn id(&self) -> TabId {
        self.tab.id
    }

    pub fn url(&self) -> &str {
        &self.tab.url
    }

    pub fn title(&self) -> &str {
        &self.tab.title
    }

    /// Registry-wide creation counter; a newer entry has a larger epoch
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn state(&self) -> EntryState {
        self.state.read().clone()
    }

    /// `Removed` is terminal; later transitions from a still-running
    /// summarization are dropped.
    pub(crate) fn set_state(&self, state: EntryState) {
        let mut current = self.state.write();
        if *current != EntryState::Removed {
            *current = state;
        }
    }

    pub fn summary(&self) -> Option<CombinedSummary> {
        self.summary.read().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.state.read().is_resolved()
    }

    /// True once the registry no longer owns this entry
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    /// Snapshot of the fragment slots, in chunk order
    pub fn fragments(&self) -> Vec<Option<Fragment>> {
        self.slots.read().clone()
    }

    pub(crate) fn prepare_slots(&self, count: usize) {
        *self.slots.write() = vec![None; count];
    }

    /// Write a fragment into its chunk's slot. Out-of-range indexes are ignored.
    pub(crate) fn fill_slot(&self, index: usize, fragment: Fragment) -> bool {
        match self.slots.write().get_mut(index) {
            Some(slot) => {
                *slot = Some(fragment);
                true
            }
            None => false,
        }
    }

    /// Settled fragments in slot order
    pub(crate) fn settled_fragments(&self) -> Vec<Fragment> {
        self.slots.read().iter().flatten().cloned().collect()
    }

    pub(crate) fn replace_fragments(&self, fragments: Vec<Fragment>) {
        *self.slots.write() = fragments.into_iter().map(Some).collect();
    }

    pub(crate) fn resolve(&self, summary: CombinedSummary) {
        *self.summary.write() = Some(summary);
    }
}
