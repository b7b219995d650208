//! Sled-backed summary cache

use super::{StoredSummary, SummaryCache};
use crate::error::StorageError;
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Summary cache persisted in a sled database, keyed by URL bytes.
pub struct SledSummaryCache {
    db: sled::Db,
}

impl SledSummaryCache {
    /// Open (or create) the cache at the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(path.as_ref())
            .map_err(|e| StorageError::Open(format!("{}: {}", path.as_ref().display(), e)))?;
        Ok(Self { db })
    }

    /// Number of cached URLs
    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl SummaryCache for SledSummaryCache {
    async fn get(&self, url: &str) -> Result<Option<StoredSummary>, StorageError> {
        match self.db.get(url.as_bytes())? {
            Some(value) => {
                let summary: StoredSummary =
                    bincode::deserialize(&value).map_err(|e| StorageError::Decode {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(Some(summary))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, url: &str, summary: StoredSummary) -> Result<(), StorageError> {
        let value = bincode::serialize(&summary).map_err(|e| StorageError::Encode {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        self.db.insert(url.as_bytes(), value)?;
        debug!(url, fragments = summary.fragments.len(), "Cached summary written");
        Ok(())
    }
}
