use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use nanoid::nanoid;
use sha2::{Digest, Sha256};

use crate::models::{CacheEntry, CacheMetadata, CacheStats, PartyComparison};
use crate::store::CacheStore;

/// Content-addressed cache for comparison results. Keys are hashes of a
/// canonicalized topic and a sorted party-id set, so casing, whitespace
/// noise, and party order never split equivalent requests across entries.
///
/// The cache is a performance optimization, never a correctness dependency:
/// every read/write error degrades to a miss or no-op, and callers must
/// work with the cache disabled (`store == None`).
pub struct ResultCache {
    store: Option<Arc<dyn CacheStore>>,
    default_ttl_hours: Option<u32>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired_removed: AtomicU64,
}

impl ResultCache {
    pub fn new(store: Option<Arc<dyn CacheStore>>, default_ttl_hours: Option<u32>) -> Self {
        Self {
            store,
            default_ttl_hours,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired_removed: AtomicU64::new(0),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub async fn get_cached(&self, topic: &str, party_ids: &[String]) -> Option<CacheEntry> {
        let Some(store) = &self.store else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let th = topic_hash(topic);
        let ph = party_ids_hash(party_ids);

        let entry = match store.get(&th, &ph).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Cache read failed, treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match entry {
            Some(entry) if entry.is_expired(Utc::now()) => {
                // Lazy expiry: remove on read, report a miss.
                if let Err(e) = store.delete(&th, &ph).await {
                    tracing::warn!(error = %e, "Failed to delete expired cache entry");
                }
                self.expired_removed.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(topic_hash = %th, "Expired cache entry removed on read");
                None
            }
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(topic_hash = %th, "Cache hit");
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Upsert keyed on the canonical hash pair; two concurrent fills for
    /// the same (topic, party-set) race safely to one row. `expires_in_hours`
    /// falls back to the configured default; absent on both means the entry
    /// never expires.
    pub async fn set_cached(
        &self,
        topic: &str,
        party_ids: &[String],
        comparisons: Vec<PartyComparison>,
        processing_time_ms: u64,
        expires_in_hours: Option<u32>,
    ) {
        let Some(store) = &self.store else {
            return;
        };

        let mut sorted_ids: Vec<String> = party_ids.to_vec();
        sorted_ids.sort();

        let ttl_hours = expires_in_hours.or(self.default_ttl_hours);
        let expires_at = ttl_hours.map(|hours| Utc::now() + Duration::hours(i64::from(hours)));

        let entry = CacheEntry {
            id: nanoid!(),
            topic_hash: topic_hash(topic),
            party_ids_hash: party_ids_hash(party_ids),
            topic: canonical_topic(topic),
            party_ids: sorted_ids,
            comparisons,
            metadata: CacheMetadata {
                processing_time_ms,
                cached_at: Utc::now(),
            },
            expires_at,
        };

        if let Err(e) = store.upsert(entry).await {
            tracing::warn!(error = %e, "Cache write failed, continuing without caching");
        }
    }

    pub async fn invalidate(&self, topic: &str, party_ids: &[String]) -> bool {
        let Some(store) = &self.store else {
            return false;
        };

        match store
            .delete(&topic_hash(topic), &party_ids_hash(party_ids))
            .await
        {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(error = %e, "Cache invalidation failed");
                false
            }
        }
    }

    /// Proactive reclamation; lazy read-time expiry keeps correctness even
    /// if this is never called.
    pub async fn cleanup_expired(&self) -> u64 {
        let Some(store) = &self.store else {
            return 0;
        };

        match store.delete_expired(Utc::now()).await {
            Ok(removed) => {
                self.expired_removed.fetch_add(removed, Ordering::Relaxed);
                removed
            }
            Err(e) => {
                tracing::warn!(error = %e, "Expired-entry cleanup failed");
                0
            }
        }
    }

    pub async fn get_stats(&self) -> CacheStats {
        let entries = match &self.store {
            Some(store) => store.count().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Cache count failed");
                0
            }),
            None => 0,
        };

        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired_removed: self.expired_removed.load(Ordering::Relaxed),
        }
    }
}

/// Lowercase, trim, and collapse internal whitespace so equivalent topics
/// map to one entry.
pub fn canonical_topic(topic: &str) -> String {
    topic
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn topic_hash(topic: &str) -> String {
    hash_text(&canonical_topic(topic))
}

/// Party-id sets are sorted before hashing; input order never changes the
/// key.
pub fn party_ids_hash(party_ids: &[String]) -> String {
    let mut sorted: Vec<&str> = party_ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    hash_text(&sorted.join("|"))
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    format!("{digest:x}")
}
