use serde::{Deserialize, Serialize};

/// Provenance of a retrieved passage: which party's platform it came from,
/// which document, and where in that document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSource {
    pub party: String,
    pub document: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
}

/// A scored passage produced by the searcher. Ordering among chunks is
/// strictly descending by whichever score the caller asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub content: String,
    /// Dropped after scoring unless the caller needs it; embeddings are
    /// large and never serialized to API consumers.
    #[serde(skip_serializing, default)]
    pub embedding: Option<Vec<f32>>,
    pub source: ChunkSource,
    pub vector_score: f32,
    pub keyword_score: f32,
    pub hybrid_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f32>,
}

impl RetrievedChunk {
    pub fn without_embedding(mut self) -> Self {
        self.embedding = None;
        self
    }
}

/// Reference to a source cited in an answer, as exposed to API consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub party: String,
    pub document: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
    pub score: f32,
}

impl SourceRef {
    pub fn from_chunk(chunk: &RetrievedChunk) -> Self {
        Self {
            party: chunk.source.party.clone(),
            document: chunk.source.document.clone(),
            pages: chunk.source.pages.clone(),
            score: chunk.hybrid_score,
        }
    }
}
