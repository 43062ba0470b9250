use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{CacheEntry, RetrievedChunk};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Filters applied inside the vector store's candidate selection.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub party: Option<String>,
    pub min_quality_score: Option<f32>,
}

/// Options for the combined vector + keyword search primitive. Weights must
/// sum to 1.0; the searcher validates before dispatch.
#[derive(Debug, Clone)]
pub struct HybridSearchOptions {
    pub vector_weight: f32,
    pub keyword_weight: f32,
    pub min_score: f32,
    pub party: Option<String>,
    pub min_quality_score: Option<f32>,
}

impl Default for HybridSearchOptions {
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            keyword_weight: 0.3,
            min_score: 0.0,
            party: None,
            min_quality_score: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParty {
    pub canonical_id: String,
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// Provider traits (implemented by infrastructure code)
// ---------------------------------------------------------------------------

/// Nearest-neighbor and combined search over indexed platform chunks. The
/// store returns per-signal scores; fusion into `hybrid_score` happens in
/// the searcher so the fusion invariant stays in this crate.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn similarity_search(
        &self,
        embedding: &[f32],
        limit: u32,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Combined candidate lookup: each returned chunk carries both a
    /// `vector_score` and a `keyword_score` for the query text.
    async fn hybrid_search(
        &self,
        embedding: &[f32],
        query_text: &str,
        limit: u32,
        options: &HybridSearchOptions,
    ) -> Result<Vec<RetrievedChunk>>;
}

/// Best-effort resolution of party slugs/abbreviations to canonical ids.
#[async_trait]
pub trait PartyDirectory: Send + Sync {
    async fn resolve(&self, id_or_slug: &str) -> Result<Option<ResolvedParty>>;
}

/// Persistence for comparison results, keyed by the canonical hash pair.
/// Implementations must make `upsert` idempotent so concurrent fills for
/// the same key race safely to one row.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, topic_hash: &str, party_ids_hash: &str) -> Result<Option<CacheEntry>>;
    async fn upsert(&self, entry: CacheEntry) -> Result<()>;
    async fn delete(&self, topic_hash: &str, party_ids_hash: &str) -> Result<bool>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
    async fn count(&self) -> Result<u64>;
}
