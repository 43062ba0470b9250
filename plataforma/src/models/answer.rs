use serde::{Deserialize, Serialize};

use super::SourceRef;

/// LLM output for one party/topic, with the confidence derived from
/// retrieval and generation signals (never a bare model self-report).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub confidence: f32,
    pub tokens_used: u32,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub confidence: f32,
    pub metadata: QueryMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub query_time_ms: u64,
    pub chunks_retrieved: usize,
    pub chunks_used: usize,
    pub model: String,
    pub tokens_used: u32,
}

/// Events yielded by the streaming query path. The consumer accumulates
/// `Chunk` texts; `Metadata` arrives exactly once, after the stream of
/// chunks is exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Chunk { text: String },
    Metadata { metadata: QueryMetadata },
}
