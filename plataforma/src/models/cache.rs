use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PartyComparison;

/// Persisted comparison row, addressed by the canonical hash pair. The
/// non-hashed topic and party list are stored alongside for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: String,
    pub topic_hash: String,
    pub party_ids_hash: String,
    pub topic: String,
    pub party_ids: Vec<String>,
    pub comparisons: Vec<PartyComparison>,
    pub metadata: CacheMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub processing_time_ms: u64,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub expired_removed: u64,
}
