//! Summary cache keyed by page URL.
//!
//! Values are advisory: a hit is trusted verbatim even if the live page has
//! changed since it was written.

use crate::error::StorageError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod sled_cache;

pub use sled_cache::SledSummaryCache;

/// Stored form of a combined summary: the ordered fragment texts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSummary {
    pub fragments: Vec<String>,
    /// Unix milliseconds at write time
    pub stored_at: i64,
}

impl StoredSummary {
    pub fn new(fragments: Vec<String>) -> Self {
        Self {
            fragments,
            stored_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// URL-keyed summary store
#[async_trait]
pub trait SummaryCache: Send + Sync {
    async fn get(&self, url: &str) -> Result<Option<StoredSummary>, StorageError>;

    /// Unconditional overwrite; last writer wins
    async fn set(&self, url: &str, summary: StoredSummary) -> Result<(), StorageError>;
}

/// In-process cache for ephemeral runs
#[derive(Debug, Default)]
pub struct MemorySummaryCache {
    entries: RwLock<HashMap<String, StoredSummary>>,
}

impl MemorySummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl SummaryCache for MemorySummaryCache {
    async fn get(&self, url: &str) -> Result<Option<StoredSummary>, StorageError> {
        Ok(self.entries.read().get(url).cloned())
    }

    async fn set(&self, url: &str, summary: StoredSummary) -> Result<(), StorageError> {
        self.entries.write().insert(url.to_string(), summary);
        Ok(())
    }
}
