use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use serde_json::json;

use plataforma::config::{
    CacheConfig, ComparisonConfig, Config, ContextConfig, EmbeddingsConfig, GenerationConfig,
    LlmConfig, SearchConfig, SecurityConfig,
};
use plataforma::embeddings::EmbeddingProvider;
use plataforma::error::Result;
use plataforma::llm::LlmProvider;
use plataforma::models::{ChunkSource, RetrievedChunk};
use plataforma::store::{
    HybridSearchOptions, MemoryCacheStore, PartyDirectory, ResolvedParty, SearchFilter,
    VectorStore,
};
use plataforma::RagPipeline;

static TRACING: Once = Once::new();

/// Log pipeline internals when RUST_LOG is set; safe to call from every
/// test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "plataforma=debug".into()),
            )
            .try_init();
    });
}

pub fn make_chunk(
    id: &str,
    party: &str,
    vector_score: f32,
    keyword_score: f32,
    content: &str,
) -> RetrievedChunk {
    RetrievedChunk {
        id: id.to_string(),
        content: content.to_string(),
        embedding: None,
        source: ChunkSource {
            party: party.to_string(),
            document: format!("Plan de Gobierno {party}"),
            pages: None,
        },
        vector_score,
        keyword_score,
        hybrid_score: 0.0,
        quality_score: None,
    }
}

/// Vector store stub returning a fixed chunk set, recording every hybrid
/// call's (party filter, min_score) pair so tests can assert the threshold
/// staircase.
pub struct StubVectorStore {
    chunks: Vec<RetrievedChunk>,
    pub hybrid_calls: Mutex<Vec<(Option<String>, f32)>>,
}

impl StubVectorStore {
    pub fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            chunks,
            hybrid_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded_calls(&self) -> Vec<(Option<String>, f32)> {
        self.hybrid_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for StubVectorStore {
    async fn similarity_search(
        &self,
        _embedding: &[f32],
        limit: u32,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<RetrievedChunk>> {
        let mut chunks: Vec<RetrievedChunk> = self
            .chunks
            .iter()
            .filter(|c| {
                filter
                    .and_then(|f| f.party.as_ref())
                    .map_or(true, |party| &c.source.party == party)
            })
            .cloned()
            .collect();
        chunks.truncate(limit as usize);
        Ok(chunks)
    }

    async fn hybrid_search(
        &self,
        _embedding: &[f32],
        _query_text: &str,
        _limit: u32,
        options: &HybridSearchOptions,
    ) -> Result<Vec<RetrievedChunk>> {
        self.hybrid_calls
            .lock()
            .unwrap()
            .push((options.party.clone(), options.min_score));

        Ok(self
            .chunks
            .iter()
            .filter(|c| {
                options
                    .party
                    .as_ref()
                    .map_or(true, |party| &c.source.party == party)
            })
            .cloned()
            .collect())
    }
}

pub struct StubPartyDirectory {
    entries: HashMap<String, ResolvedParty>,
}

impl StubPartyDirectory {
    pub fn new(parties: &[(&str, &str, &str)]) -> Self {
        let entries = parties
            .iter()
            .map(|(slug, canonical, display)| {
                (
                    slug.to_lowercase(),
                    ResolvedParty {
                        canonical_id: canonical.to_string(),
                        display_name: display.to_string(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

#[async_trait]
impl PartyDirectory for StubPartyDirectory {
    async fn resolve(&self, id_or_slug: &str) -> Result<Option<ResolvedParty>> {
        Ok(self.entries.get(&id_or_slug.to_lowercase()).cloned())
    }
}

/// Config wired for tests: zero inter-call delay, tiny embedding dimension,
/// providers pointed at the given mock base URLs.
pub fn test_config(llm_base_url: Option<String>, embed_base_url: Option<String>) -> Config {
    Config {
        security: SecurityConfig {
            block_threshold: 75,
            suspicious_threshold: 40,
            max_query_length: 1000,
        },
        search: SearchConfig {
            vector_weight: 0.7,
            keyword_weight: 0.3,
            min_score: 0.3,
            default_top_k: 5,
        },
        context: ContextConfig {
            max_context_chars: 4000,
        },
        generation: GenerationConfig {
            temperature: 0.7,
            max_tokens: 800,
        },
        comparison: ComparisonConfig {
            top_k_per_party: 3,
            llm_call_delay_ms: 0,
        },
        cache: CacheConfig {
            enabled: true,
            capacity: 64,
            expires_in_hours: None,
        },
        embeddings: EmbeddingsConfig {
            model: "openai/text-embedding-3-small".to_string(),
            api_key: Some("test-key".to_string()),
            // Unreachable address by default so tests without an embedding
            // mock fail fast into the degraded path instead of hitting the
            // real provider.
            base_url: Some(
                embed_base_url.unwrap_or_else(|| "http://127.0.0.1:1".to_string()),
            ),
            dimensions: 3,
            batch_size: 8,
            timeout_secs: 5,
            max_retries: 0,
        },
        llm: llm_base_url.map(|base_url| LlmConfig {
            model: "openai/gpt-4o-mini".to_string(),
            api_key: Some("test-key".to_string()),
            base_url: Some(base_url),
            timeout_secs: 5,
            max_retries: 0,
        }),
    }
}

pub fn build_pipeline(
    config: &Config,
    store: Arc<StubVectorStore>,
    directory: Arc<dyn PartyDirectory>,
) -> RagPipeline {
    let llm = LlmProvider::new(config.llm.as_ref());
    let embeddings =
        Arc::new(EmbeddingProvider::new(&config.embeddings).expect("embedding provider"));
    let cache_store = Arc::new(MemoryCacheStore::new(config.cache.capacity));

    RagPipeline::new(config, llm, embeddings, store, directory, Some(cache_store))
}

/// OpenAI-compatible chat completion body for wiremock.
pub fn chat_response(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 120, "completion_tokens": 80, "total_tokens": 200}
    })
}

/// OpenAI-compatible embeddings body for wiremock, one vector per input.
pub fn embeddings_response(count: usize) -> serde_json::Value {
    let data: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            json!({
                "embedding": [0.1, 0.2, 0.3],
                "index": i,
                "object": "embedding"
            })
        })
        .collect();

    json!({
        "data": data,
        "model": "text-embedding-3-small",
        "object": "list",
        "usage": {"prompt_tokens": 8, "total_tokens": 8}
    })
}
