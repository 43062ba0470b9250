use crate::config::GenerationConfig;
use crate::error::Result;
use crate::llm::{prompts, Completion, CompletionOptions, CompletionStream, LlmProvider};
use crate::models::{GeneratedAnswer, RetrievedChunk};
use crate::security::PromptHardener;

/// Fixed answer for queries where retrieval produced nothing usable.
pub const NOT_FOUND_ANSWER: &str =
    "No se encontró información sobre este tema en los planes de gobierno consultados.";

/// Fixed answer when the question still carries delimiter-breaking content
/// after hardening; the LLM is never called with a compromised prompt.
pub const UNSAFE_QUERY_ANSWER: &str =
    "La consulta no pudo procesarse de forma segura. Reformule la pregunta.";

const MODEL_NONE: &str = "none";
const SHORT_CONTEXT_WARN_CHARS: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Display name of the party the answer must be constrained to. Used by
    /// the comparison orchestrator to avoid cross-party bleed.
    pub single_party: Option<String>,
}

/// Calls the LLM over assembled context and scores the result. Confidence
/// comes from retrieval and response signals, never from the model's own
/// claim.
pub struct AnswerGenerator {
    llm: LlmProvider,
    hardener: PromptHardener,
    defaults: GenerationConfig,
}

impl AnswerGenerator {
    pub fn new(llm: LlmProvider, defaults: GenerationConfig) -> Self {
        Self {
            llm,
            hardener: PromptHardener::new(),
            defaults,
        }
    }

    pub async fn generate(
        &self,
        context: &str,
        question: &str,
        chunks: &[RetrievedChunk],
        options: &GenerationOptions,
    ) -> Result<GeneratedAnswer> {
        // Calling the LLM on empty context wastes tokens on a guaranteed
        // low-quality answer.
        if context.trim().is_empty() || chunks.is_empty() {
            tracing::debug!("Empty context, short-circuiting with not-found answer");
            return Ok(not_found_answer());
        }

        if context.trim().len() < SHORT_CONTEXT_WARN_CHARS {
            tracing::warn!(
                context_len = context.trim().len(),
                "Context unusually short, answer quality may suffer"
            );
        }

        let system = self.system_prompt(options);
        let hardened = self.hardener.harden(&system, question);
        if hardened.has_escaped_content {
            tracing::warn!("Question still carries delimiter-breaking content, skipping LLM");
            return Ok(GeneratedAnswer {
                answer: UNSAFE_QUERY_ANSWER.to_string(),
                confidence: 0.0,
                tokens_used: 0,
                model: MODEL_NONE.to_string(),
            });
        }

        let user_prompt = prompts::answer_user_prompt(context, &hardened.user_prompt);
        let completion = self
            .llm
            .complete(
                &user_prompt,
                Some(&hardened.system_prompt),
                Some(&self.completion_options(options)),
            )
            .await?;

        Ok(self.score_completion(completion, chunks))
    }

    /// Streaming variant. Yields answer fragments; the caller accumulates
    /// them and computes final metadata once the stream completes, and owns
    /// timeout/cancellation.
    pub async fn generate_streaming(
        &self,
        context: &str,
        question: &str,
        chunks: &[RetrievedChunk],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        if context.trim().is_empty() || chunks.is_empty() {
            tracing::debug!("Empty context, streaming fixed not-found answer");
            let stream = async_stream::try_stream! {
                yield NOT_FOUND_ANSWER.to_string();
            };
            return Ok(Box::pin(stream));
        }

        let system = self.system_prompt(options);
        let hardened = self.hardener.harden(&system, question);
        if hardened.has_escaped_content {
            tracing::warn!("Question still carries delimiter-breaking content, skipping LLM");
            let stream = async_stream::try_stream! {
                yield UNSAFE_QUERY_ANSWER.to_string();
            };
            return Ok(Box::pin(stream));
        }

        let user_prompt = prompts::answer_user_prompt(context, &hardened.user_prompt);
        self.llm
            .complete_streaming(
                &user_prompt,
                Some(&hardened.system_prompt),
                Some(&self.completion_options(options)),
            )
            .await
    }

    fn system_prompt(&self, options: &GenerationOptions) -> String {
        match &options.single_party {
            Some(party) => prompts::single_party_system_prompt(party),
            None => prompts::answer_system_prompt().to_string(),
        }
    }

    fn completion_options(&self, options: &GenerationOptions) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(options.temperature.unwrap_or(self.defaults.temperature)),
            max_tokens: Some(options.max_tokens.unwrap_or(self.defaults.max_tokens)),
            ..Default::default()
        }
    }

    fn score_completion(&self, completion: Completion, chunks: &[RetrievedChunk]) -> GeneratedAnswer {
        let mean_score = if chunks.is_empty() {
            0.0
        } else {
            chunks.iter().map(|c| c.hybrid_score).sum::<f32>() / chunks.len() as f32
        };

        let confidence = compute_confidence(
            &completion.content,
            completion.finish_reason.as_deref(),
            chunks.len(),
            mean_score,
        );

        GeneratedAnswer {
            answer: completion.content,
            confidence,
            tokens_used: completion.tokens_used,
            model: completion.model,
        }
    }
}

fn not_found_answer() -> GeneratedAnswer {
    GeneratedAnswer {
        answer: NOT_FOUND_ANSWER.to_string(),
        confidence: 0.0,
        tokens_used: 0,
        model: MODEL_NONE.to_string(),
    }
}

/// Confidence in [0, 1] from retrieval strength, source breadth, and answer
/// substance. A truncated completion is penalized.
pub(crate) fn compute_confidence(
    answer: &str,
    finish_reason: Option<&str>,
    source_count: usize,
    mean_score: f32,
) -> f32 {
    let retrieval_factor = mean_score.clamp(0.0, 1.0);
    let source_factor = (source_count.min(5) as f32) / 5.0;
    let length_factor = (answer.chars().count() as f32 / 400.0).min(1.0);

    let mut confidence = 0.45 * retrieval_factor + 0.35 * source_factor + 0.2 * length_factor;

    if finish_reason == Some("length") {
        confidence *= 0.8;
    }

    confidence.clamp(0.0, 1.0)
}
