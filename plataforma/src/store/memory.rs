use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use crate::error::{PlataformaError, Result};
use crate::models::CacheEntry;
use crate::store::traits::CacheStore;

/// Thread-safe in-memory cache backend with LRU eviction
///
/// Uses the Arc<Mutex<>> pattern for safe concurrent access across tasks.
/// Suitable for tests and single-process deployments; persistent backends
/// live in infrastructure code behind the same trait.
#[derive(Clone)]
pub struct MemoryCacheStore {
    entries: Arc<Mutex<LruCache<(String, String), CacheEntry>>>,
}

impl MemoryCacheStore {
    /// Create a new store with the given capacity (LRU eviction applies).
    ///
    /// # Panics
    /// Panics if capacity is 0
    pub fn new(capacity: usize) -> Self {
        let entries =
            LruCache::new(NonZeroUsize::new(capacity).expect("Capacity must be non-zero"));
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<(String, String), CacheEntry>>> {
        self.entries
            .lock()
            .map_err(|e| PlataformaError::Cache(format!("Cache lock poisoned: {e}")))
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, topic_hash: &str, party_ids_hash: &str) -> Result<Option<CacheEntry>> {
        let mut entries = self.lock()?;
        Ok(entries
            .get(&(topic_hash.to_string(), party_ids_hash.to_string()))
            .cloned())
    }

    async fn upsert(&self, entry: CacheEntry) -> Result<()> {
        let mut entries = self.lock()?;
        entries.put(
            (entry.topic_hash.clone(), entry.party_ids_hash.clone()),
            entry,
        );
        Ok(())
    }

    async fn delete(&self, topic_hash: &str, party_ids_hash: &str) -> Result<bool> {
        let mut entries = self.lock()?;
        Ok(entries
            .pop(&(topic_hash.to_string(), party_ids_hash.to_string()))
            .is_some())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut entries = self.lock()?;
        let expired: Vec<(String, String)> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }

        Ok(expired.len() as u64)
    }

    async fn count(&self) -> Result<u64> {
        let entries = self.lock()?;
        Ok(entries.len() as u64)
    }
}
