use std::collections::HashSet;

use crate::models::RetrievedChunk;

/// Deterministic placeholder returned when no chunks are available, so
/// downstream generation always receives well-formed input.
pub const NO_INFORMATION_CONTEXT: &str =
    "No se encontró información relevante en los planes de gobierno para esta consulta.";

/// Aggregate signals over the chunks a context was built from, exposed for
/// observability so downstream code never re-derives them.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextStats {
    pub chunks_used: usize,
    pub distinct_documents: usize,
    pub distinct_parties: usize,
    pub mean_score: f32,
}

/// Packs ranked chunks into a bounded context block with provenance tags.
/// Chunks are added whole, in ranked order, until the next one would exceed
/// the character budget.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    max_chars: usize,
}

impl ContextAssembler {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn build(&self, chunks: &[RetrievedChunk], query: &str) -> String {
        if chunks.is_empty() {
            tracing::debug!(query_len = query.len(), "No chunks for context, using placeholder");
            return NO_INFORMATION_CONTEXT.to_string();
        }

        let mut context = String::new();
        let mut used = 0usize;

        for (index, chunk) in chunks.iter().enumerate() {
            let block = format_block(index + 1, chunk);
            let separator_len = if context.is_empty() { 0 } else { 2 };

            if context.len() + separator_len + block.len() > self.max_chars {
                break;
            }

            if !context.is_empty() {
                context.push_str("\n\n");
            }
            context.push_str(&block);
            used += 1;
        }

        if context.is_empty() {
            // Even the top chunk exceeded the budget on its own.
            tracing::warn!(
                max_chars = self.max_chars,
                "No chunk fit the context budget, using placeholder"
            );
            return NO_INFORMATION_CONTEXT.to_string();
        }

        tracing::debug!(
            chunks_used = used,
            context_len = context.len(),
            "Context assembled"
        );
        context
    }

    /// Stats over the chunks that `build` would include for this budget.
    pub fn stats(&self, chunks: &[RetrievedChunk]) -> ContextStats {
        let mut total_len = 0usize;
        let mut used = 0usize;

        for (index, chunk) in chunks.iter().enumerate() {
            let block_len = format_block(index + 1, chunk).len();
            let separator_len = if used == 0 { 0 } else { 2 };
            if total_len + separator_len + block_len > self.max_chars {
                break;
            }
            total_len += separator_len + block_len;
            used += 1;
        }

        let included = &chunks[..used];
        let distinct_documents: HashSet<&str> = included
            .iter()
            .map(|c| c.source.document.as_str())
            .collect();
        let distinct_parties: HashSet<&str> =
            included.iter().map(|c| c.source.party.as_str()).collect();

        let mean_score = if included.is_empty() {
            0.0
        } else {
            included.iter().map(|c| c.hybrid_score).sum::<f32>() / included.len() as f32
        };

        ContextStats {
            chunks_used: used,
            distinct_documents: distinct_documents.len(),
            distinct_parties: distinct_parties.len(),
            mean_score,
        }
    }
}

fn format_block(index: usize, chunk: &RetrievedChunk) -> String {
    format!(
        "[Fuente {index}] {party} - {document}\n{content}",
        party = chunk.source.party,
        document = chunk.source.document,
        content = chunk.content.trim(),
    )
}
