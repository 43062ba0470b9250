use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ComparisonConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::models::{
    ComparisonResult, PartyComparison, ProposalState, RetrievedChunk, SourceRef,
};
use crate::services::assembler::ContextAssembler;
use crate::services::generator::{AnswerGenerator, GenerationOptions, NOT_FOUND_ANSWER};
use crate::services::searcher::HybridSearcher;
use crate::store::PartyDirectory;

/// Recall-first relaxation staircase: (min_score, top_k multiplier). A
/// per-party filtered search over a narrow document slice often returns
/// nothing at strict thresholds even when relevant content exists, and an
/// explicit no-information entry is worse UX than a lower-confidence match.
pub const RELAXATION_STEPS: &[(f32, u32)] = &[(0.3, 1), (0.2, 1), (0.1, 2)];

#[derive(Debug, Clone, Default)]
pub struct CompareOptions {
    pub top_k_per_party: Option<u32>,
    pub temperature: Option<f32>,
}

/// Drives retrieval and single-party-constrained generation across several
/// parties for one topic. Per-party work is independent; one party's
/// failure degrades that entry only, never the whole comparison.
pub struct ComparisonOrchestrator {
    searcher: Arc<HybridSearcher>,
    assembler: ContextAssembler,
    generator: Arc<AnswerGenerator>,
    embeddings: Arc<EmbeddingProvider>,
    directory: Arc<dyn PartyDirectory>,
    config: ComparisonConfig,
}

impl ComparisonOrchestrator {
    pub fn new(
        searcher: Arc<HybridSearcher>,
        assembler: ContextAssembler,
        generator: Arc<AnswerGenerator>,
        embeddings: Arc<EmbeddingProvider>,
        directory: Arc<dyn PartyDirectory>,
        config: ComparisonConfig,
    ) -> Self {
        Self {
            searcher,
            assembler,
            generator,
            embeddings,
            directory,
            config,
        }
    }

    pub async fn compare_parties(
        &self,
        topic: &str,
        party_ids: &[String],
        options: &CompareOptions,
    ) -> Result<ComparisonResult> {
        let start = Instant::now();

        let embedding = match self.embeddings.embed_query(topic).await {
            Ok(embedding) => embedding,
            Err(e) => {
                // Without an embedding no party can be searched; degrade the
                // whole comparison to explicit no-information entries.
                tracing::warn!(error = %e, "Topic embedding failed, degrading comparison");
                let comparisons = party_ids
                    .iter()
                    .map(|id| no_information_entry(id, id))
                    .collect();
                return Ok(ComparisonResult {
                    topic: topic.to_string(),
                    comparisons,
                    from_cache: false,
                    processing_time_ms: start.elapsed().as_millis() as u64,
                });
            }
        };

        let delay = Duration::from_millis(self.config.llm_call_delay_ms);
        let mut comparisons = Vec::with_capacity(party_ids.len());

        for (index, party_id) in party_ids.iter().enumerate() {
            // Simple backpressure against rate-limited providers: fixed
            // pause between successive per-party LLM calls.
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let (canonical_id, display_name) = self.resolve_party(party_id).await;
            let entry = self
                .compare_single_party(topic, &embedding, &canonical_id, &display_name, options)
                .await;
            comparisons.push(entry);
        }

        let result = ComparisonResult {
            topic: topic.to_string(),
            comparisons,
            from_cache: false,
            processing_time_ms: start.elapsed().as_millis() as u64,
        };

        tracing::info!(
            topic = %topic,
            parties = party_ids.len(),
            elapsed_ms = result.processing_time_ms,
            "Comparison completed"
        );

        Ok(result)
    }

    /// Best-effort id resolution: slugs and abbreviations map to canonical
    /// ids when the directory knows them, otherwise the raw id is used for
    /// both filter and display.
    async fn resolve_party(&self, party_id: &str) -> (String, String) {
        match self.directory.resolve(party_id).await {
            Ok(Some(resolved)) => (resolved.canonical_id, resolved.display_name),
            Ok(None) => {
                tracing::warn!(party = %party_id, "Unknown party id, using raw value");
                (party_id.to_string(), party_id.to_string())
            }
            Err(e) => {
                tracing::warn!(party = %party_id, error = %e, "Party lookup failed, using raw value");
                (party_id.to_string(), party_id.to_string())
            }
        }
    }

    async fn compare_single_party(
        &self,
        topic: &str,
        embedding: &[f32],
        canonical_id: &str,
        display_name: &str,
        options: &CompareOptions,
    ) -> PartyComparison {
        let base_top_k = options
            .top_k_per_party
            .unwrap_or(self.config.top_k_per_party);

        let chunks = self
            .search_with_relaxation(topic, embedding, canonical_id, base_top_k)
            .await;

        if chunks.is_empty() {
            tracing::info!(party = %canonical_id, topic = %topic, "No information found at any threshold");
            return no_information_entry(canonical_id, display_name);
        }

        let context = self.assembler.build(&chunks, topic);
        let question = format!("¿Qué propone {display_name} sobre {topic}?");
        let generation_options = GenerationOptions {
            temperature: options.temperature,
            max_tokens: None,
            single_party: Some(display_name.to_string()),
        };

        match self
            .generator
            .generate(&context, &question, &chunks, &generation_options)
            .await
        {
            Ok(answer) => {
                let sources: Vec<SourceRef> = chunks.iter().map(SourceRef::from_chunk).collect();
                let state =
                    classify_state(answer.answer.chars().count(), sources.len(), answer.confidence);
                PartyComparison {
                    party_id: canonical_id.to_string(),
                    party_name: display_name.to_string(),
                    answer: answer.answer,
                    sources,
                    confidence: answer.confidence,
                    state,
                }
            }
            Err(e) => {
                tracing::warn!(party = %canonical_id, error = %e, "Generation failed, degrading entry");
                no_information_entry(canonical_id, display_name)
            }
        }
    }

    /// Try each relaxation rung in order and stop at the first non-empty
    /// result. A failing rung counts as empty.
    async fn search_with_relaxation(
        &self,
        topic: &str,
        embedding: &[f32],
        canonical_id: &str,
        base_top_k: u32,
    ) -> Vec<RetrievedChunk> {
        for (min_score, multiplier) in RELAXATION_STEPS {
            let mut search_options = self.searcher.default_options();
            search_options.min_score = *min_score;
            search_options.party = Some(canonical_id.to_string());

            match self
                .searcher
                .hybrid_search(topic, embedding, base_top_k * multiplier, &search_options)
                .await
            {
                Ok(chunks) if !chunks.is_empty() => {
                    tracing::debug!(
                        party = %canonical_id,
                        min_score,
                        results = chunks.len(),
                        "Relaxation rung produced results"
                    );
                    return chunks;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(
                        party = %canonical_id,
                        min_score,
                        error = %e,
                        "Search failed at relaxation rung"
                    );
                }
            }
        }

        Vec::new()
    }
}

fn no_information_entry(canonical_id: &str, display_name: &str) -> PartyComparison {
    PartyComparison {
        party_id: canonical_id.to_string(),
        party_name: display_name.to_string(),
        answer: NOT_FOUND_ANSWER.to_string(),
        sources: Vec::new(),
        confidence: 0.0,
        state: ProposalState::SinInformacion,
    }
}

/// Pure classification of a per-party result, evaluated once, in priority
/// order. Deterministic and independently testable against the literal
/// thresholds.
pub fn classify_state(answer_len: usize, source_count: usize, confidence: f32) -> ProposalState {
    if source_count == 0 || confidence < 0.2 {
        ProposalState::SinInformacion
    } else if confidence < 0.4 {
        ProposalState::PocoClara
    } else if answer_len > 200 && source_count >= 2 && confidence >= 0.7 {
        ProposalState::Completa
    } else if answer_len > 100 && source_count >= 1 && confidence >= 0.5 {
        ProposalState::Parcial
    } else {
        ProposalState::PocoClara
    }
}
