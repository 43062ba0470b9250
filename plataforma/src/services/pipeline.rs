use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::{Stream, StreamExt};

use crate::cache::ResultCache;
use crate::config::{Config, SearchConfig};
use crate::embeddings::EmbeddingProvider;
use crate::error::{PlataformaError, Result};
use crate::llm::LlmProvider;
use crate::models::{
    ComparisonResult, GeneratedAnswer, QueryMetadata, QueryResponse, RetrievedChunk, SourceRef,
    StreamEvent,
};
use crate::security::QuerySanitizer;
use crate::services::assembler::ContextAssembler;
use crate::services::comparator::{CompareOptions, ComparisonOrchestrator};
use crate::services::generator::{AnswerGenerator, GenerationOptions, NOT_FOUND_ANSWER};
use crate::services::processor::QueryProcessor;
use crate::services::searcher::HybridSearcher;
use crate::store::{CacheStore, PartyDirectory, VectorStore};

const MODEL_NONE: &str = "none";

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub top_k: Option<u32>,
    pub party: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub min_relevance_score: Option<f32>,
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Entry point for the whole retrieval pipeline: process → embed → search →
/// assemble → generate, plus cached multi-party comparison. Only the
/// security block escapes as an error; every provider failure degrades to a
/// valid low-confidence response.
pub struct RagPipeline {
    processor: Arc<QueryProcessor>,
    searcher: Arc<HybridSearcher>,
    assembler: ContextAssembler,
    generator: Arc<AnswerGenerator>,
    comparator: ComparisonOrchestrator,
    embeddings: Arc<EmbeddingProvider>,
    cache: ResultCache,
    search_defaults: SearchConfig,
    model_label: String,
}

impl RagPipeline {
    pub fn new(
        config: &Config,
        llm: LlmProvider,
        embeddings: Arc<EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        party_directory: Arc<dyn PartyDirectory>,
        cache_store: Option<Arc<dyn CacheStore>>,
    ) -> Self {
        let sanitizer = QuerySanitizer::new(&config.security);
        let processor = Arc::new(QueryProcessor::new(sanitizer, llm.clone()));
        let searcher = Arc::new(HybridSearcher::new(vector_store, config.search.clone()));
        let assembler = ContextAssembler::new(config.context.max_context_chars);
        let generator = Arc::new(AnswerGenerator::new(llm.clone(), config.generation.clone()));

        let comparator = ComparisonOrchestrator::new(
            Arc::clone(&searcher),
            assembler.clone(),
            Arc::clone(&generator),
            Arc::clone(&embeddings),
            party_directory,
            config.comparison.clone(),
        );

        let cache_store = if config.cache.enabled { cache_store } else { None };
        let cache = ResultCache::new(cache_store, config.cache.expires_in_hours);

        let model_label = config
            .llm
            .as_ref()
            .map(|llm| llm.model.clone())
            .unwrap_or_else(|| MODEL_NONE.to_string());

        Self {
            processor,
            searcher,
            assembler,
            generator,
            comparator,
            embeddings,
            cache,
            search_defaults: config.search.clone(),
            model_label,
        }
    }

    /// Cache surface, exposed to the HTTP layer for invalidation, cleanup,
    /// and stats endpoints.
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub async fn query(&self, question: &str, options: &QueryOptions) -> Result<QueryResponse> {
        let start = Instant::now();

        let processed = self.processor.process(question).await?;
        let chunks = self.retrieve(&processed.search_text(), question, options).await;

        let context = self.assembler.build(&chunks, question);
        let stats = self.assembler.stats(&chunks);

        let generation_options = GenerationOptions {
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            single_party: None,
        };

        let answer = match self
            .generator
            .generate(&context, question, &chunks, &generation_options)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(error = %e, "Generation failed, degrading to not-found answer");
                GeneratedAnswer {
                    answer: NOT_FOUND_ANSWER.to_string(),
                    confidence: 0.0,
                    tokens_used: 0,
                    model: MODEL_NONE.to_string(),
                }
            }
        };

        let sources: Vec<SourceRef> = chunks
            .iter()
            .take(stats.chunks_used)
            .map(SourceRef::from_chunk)
            .collect();

        Ok(QueryResponse {
            answer: answer.answer,
            sources,
            confidence: answer.confidence,
            metadata: QueryMetadata {
                query_time_ms: start.elapsed().as_millis() as u64,
                chunks_retrieved: chunks.len(),
                chunks_used: stats.chunks_used,
                model: answer.model,
                tokens_used: answer.tokens_used,
            },
        })
    }

    /// Streaming variant of `query`. Chunk events carry answer fragments;
    /// one metadata event closes the stream. Token usage is not available
    /// on the streaming interface and is reported as 0.
    pub async fn query_streaming(
        &self,
        question: &str,
        options: &QueryOptions,
    ) -> Result<EventStream> {
        let start = Instant::now();

        let processed = self.processor.process(question).await?;
        let chunks = self.retrieve(&processed.search_text(), question, options).await;

        let context = self.assembler.build(&chunks, question);
        let stats = self.assembler.stats(&chunks);

        let generation_options = GenerationOptions {
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            single_party: None,
        };

        let mut inner = self
            .generator
            .generate_streaming(&context, question, &chunks, &generation_options)
            .await?;

        let metadata = QueryMetadata {
            query_time_ms: start.elapsed().as_millis() as u64,
            chunks_retrieved: chunks.len(),
            chunks_used: stats.chunks_used,
            model: self.model_label.clone(),
            tokens_used: 0,
        };

        let stream = async_stream::try_stream! {
            while let Some(fragment) = inner.next().await {
                let text = fragment?;
                yield StreamEvent::Chunk { text };
            }
            yield StreamEvent::Metadata { metadata };
        };

        Ok(Box::pin(stream))
    }

    /// Cached multi-party comparison. The topic passes the same sanitizer
    /// as single queries; the cache is consulted before orchestration and
    /// filled afterwards, and cache trouble never fails the request.
    pub async fn compare_parties(
        &self,
        topic: &str,
        party_ids: &[String],
        options: &CompareOptions,
    ) -> Result<ComparisonResult> {
        let scan = self.processor.sanitize(topic);
        if scan.blocked {
            tracing::warn!(risk_score = scan.risk_score, "Comparison topic blocked");
            return Err(PlataformaError::SecurityBlocked {
                risk_score: scan.risk_score,
                reasons: scan.reasons,
            });
        }

        if let Some(entry) = self.cache.get_cached(topic, party_ids).await {
            return Ok(ComparisonResult {
                topic: entry.topic,
                comparisons: entry.comparisons,
                from_cache: true,
                processing_time_ms: entry.metadata.processing_time_ms,
            });
        }

        let result = self
            .comparator
            .compare_parties(&scan.sanitized, party_ids, options)
            .await?;

        self.cache
            .set_cached(
                topic,
                party_ids,
                result.comparisons.clone(),
                result.processing_time_ms,
                None,
            )
            .await;

        Ok(result)
    }

    /// Shared retrieval step. Embedding or search trouble degrades to an
    /// empty chunk set; the generator's empty-context short-circuit turns
    /// that into a fixed not-found answer downstream.
    async fn retrieve(
        &self,
        search_text: &str,
        question: &str,
        options: &QueryOptions,
    ) -> Vec<RetrievedChunk> {
        let embedding = match self.embeddings.embed_query(search_text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(error = %e, "Query embedding failed, degrading to empty retrieval");
                return Vec::new();
            }
        };

        let top_k = options.top_k.unwrap_or(self.search_defaults.default_top_k);
        let mut search_options = self.searcher.default_options();
        search_options.party = options.party.clone();
        if let Some(min_score) = options.min_relevance_score {
            search_options.min_score = min_score;
        }

        match self
            .searcher
            .hybrid_search(search_text, &embedding, top_k, &search_options)
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!(error = %e, query_len = question.len(), "Hybrid search failed, degrading to empty retrieval");
                Vec::new()
            }
        }
    }
}
