use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::SearchConfig;
use crate::error::{PlataformaError, Result};
use crate::models::RetrievedChunk;
use crate::store::{HybridSearchOptions, SearchFilter, VectorStore};

/// Over-fetch multipliers for the filtered search modes. Filtering after a
/// wider fetch keeps result counts close to the requested `top_k` even when
/// many candidates fall below the floors.
const QUALITY_OVERFETCH: u32 = 2;
const RELEVANCE_OVERFETCH: u32 = 3;

/// Fuses vector similarity and keyword relevance into one ranked result
/// set. Vector similarity alone is noisy for short domain queries; the
/// keyword half pulls exact-terminology passages back above semantically
/// adjacent but topically wrong ones. Defaults are 0.7/0.3 and remain
/// overridable per call.
pub struct HybridSearcher {
    store: Arc<dyn VectorStore>,
    defaults: SearchConfig,
}

impl HybridSearcher {
    pub fn new(store: Arc<dyn VectorStore>, defaults: SearchConfig) -> Self {
        Self { store, defaults }
    }

    /// Options pre-filled with the configured fusion weights and threshold.
    pub fn default_options(&self) -> HybridSearchOptions {
        HybridSearchOptions {
            vector_weight: self.defaults.vector_weight,
            keyword_weight: self.defaults.keyword_weight,
            min_score: self.defaults.min_score,
            party: None,
            min_quality_score: None,
        }
    }

    /// Vector-only nearest-neighbor search, ordered descending by vector
    /// score.
    pub async fn search(
        &self,
        embedding: &[f32],
        top_k: u32,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<RetrievedChunk>> {
        let mut chunks = self.store.similarity_search(embedding, top_k, filter).await?;

        for chunk in &mut chunks {
            chunk.hybrid_score = chunk.vector_score;
        }
        sort_descending(&mut chunks, |c| c.vector_score);
        chunks.truncate(top_k as usize);

        Ok(chunks)
    }

    /// Combined search: the store returns per-signal scores and the fusion
    /// happens here, so `hybrid_score = vw*vector + kw*keyword` holds for
    /// every returned chunk.
    pub async fn hybrid_search(
        &self,
        query_text: &str,
        embedding: &[f32],
        top_k: u32,
        options: &HybridSearchOptions,
    ) -> Result<Vec<RetrievedChunk>> {
        validate_weights(options.vector_weight, options.keyword_weight)?;

        let mut chunks = self
            .store
            .hybrid_search(embedding, query_text, top_k, options)
            .await?;

        for chunk in &mut chunks {
            chunk.hybrid_score = fuse(
                chunk.vector_score,
                chunk.keyword_score,
                options.vector_weight,
                options.keyword_weight,
            );
        }

        chunks.retain(|c| c.hybrid_score >= options.min_score);
        if let Some(floor) = options.min_quality_score {
            chunks.retain(|c| c.quality_score.is_some_and(|q| q >= floor));
        }

        sort_descending(&mut chunks, |c| c.hybrid_score);
        chunks.truncate(top_k as usize);

        Ok(chunks)
    }

    /// Vector search with a hard relevance floor.
    pub async fn search_with_threshold(
        &self,
        embedding: &[f32],
        top_k: u32,
        min_score: f32,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<RetrievedChunk>> {
        let mut chunks = self.search(embedding, top_k, filter).await?;
        chunks.retain(|c| c.vector_score >= min_score);
        Ok(chunks)
    }

    /// Vector search keeping only chunks whose precomputed quality score
    /// clears the floor. Over-fetches 2x, then truncates.
    pub async fn search_quality_filtered(
        &self,
        embedding: &[f32],
        top_k: u32,
        min_quality_score: f32,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<RetrievedChunk>> {
        let mut chunks = self
            .search(embedding, top_k * QUALITY_OVERFETCH, filter)
            .await?;
        chunks.retain(|c| c.quality_score.is_some_and(|q| q >= min_quality_score));
        chunks.truncate(top_k as usize);
        Ok(chunks)
    }

    /// Combined relevance and quality floors over a 3x over-fetch.
    pub async fn search_relevant(
        &self,
        embedding: &[f32],
        top_k: u32,
        min_score: f32,
        min_quality_score: f32,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<RetrievedChunk>> {
        let mut chunks = self
            .search(embedding, top_k * RELEVANCE_OVERFETCH, filter)
            .await?;
        chunks.retain(|c| {
            c.vector_score >= min_score && c.quality_score.is_some_and(|q| q >= min_quality_score)
        });
        chunks.truncate(top_k as usize);
        Ok(chunks)
    }

    /// One hybrid search per party, concatenated and re-sorted into a
    /// single descending ranking. A failing party degrades to an empty
    /// slice for that party rather than failing the union.
    pub async fn search_per_party(
        &self,
        query_text: &str,
        embedding: &[f32],
        party_ids: &[String],
        per_party_top_k: u32,
        options: &HybridSearchOptions,
    ) -> Result<Vec<RetrievedChunk>> {
        validate_weights(options.vector_weight, options.keyword_weight)?;

        let mut union: Vec<RetrievedChunk> = Vec::new();
        for party in party_ids {
            let mut party_options = options.clone();
            party_options.party = Some(party.clone());

            match self
                .hybrid_search(query_text, embedding, per_party_top_k, &party_options)
                .await
            {
                Ok(chunks) => union.extend(chunks),
                Err(e) => {
                    tracing::warn!(party = %party, error = %e, "Per-party search failed, skipping party");
                }
            }
        }

        sort_descending(&mut union, |c| c.hybrid_score);
        Ok(union)
    }
}

pub(crate) fn fuse(vector_score: f32, keyword_score: f32, vector_weight: f32, keyword_weight: f32) -> f32 {
    vector_weight * vector_score + keyword_weight * keyword_score
}

fn validate_weights(vector_weight: f32, keyword_weight: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&vector_weight) || !(0.0..=1.0).contains(&keyword_weight) {
        return Err(PlataformaError::Validation(
            "Fusion weights must be within [0, 1]".to_string(),
        ));
    }
    if (vector_weight + keyword_weight - 1.0).abs() > 1e-3 {
        return Err(PlataformaError::Validation(format!(
            "Fusion weights must sum to 1.0, got {vector_weight} + {keyword_weight}"
        )));
    }
    Ok(())
}

fn sort_descending<F>(chunks: &mut [RetrievedChunk], score: F)
where
    F: Fn(&RetrievedChunk) -> f32,
{
    chunks.sort_by(|a, b| {
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkSource;
    use async_trait::async_trait;

    fn chunk(id: &str, vector_score: f32, keyword_score: f32) -> RetrievedChunk {
        RetrievedChunk {
            id: id.to_string(),
            content: format!("contenido {id}"),
            embedding: None,
            source: ChunkSource {
                party: "PLN".to_string(),
                document: "Plan de Gobierno 2022".to_string(),
                pages: None,
            },
            vector_score,
            keyword_score,
            hybrid_score: 0.0,
            quality_score: None,
        }
    }

    struct StubStore {
        chunks: Vec<RetrievedChunk>,
    }

    #[async_trait]
    impl VectorStore for StubStore {
        async fn similarity_search(
            &self,
            _embedding: &[f32],
            limit: u32,
            _filter: Option<&SearchFilter>,
        ) -> Result<Vec<RetrievedChunk>> {
            let mut chunks = self.chunks.clone();
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
            let chunks = self
                .chunks
                .iter()
                .filter(|c| {
                    options
                        .party
                        .as_ref()
                        .map_or(true, |party| &c.source.party == party)
                })
                .cloned()
                .collect();
            Ok(chunks)
        }
    }

    fn searcher(chunks: Vec<RetrievedChunk>) -> HybridSearcher {
        HybridSearcher::new(
            Arc::new(StubStore { chunks }),
            SearchConfig {
                vector_weight: 0.7,
                keyword_weight: 0.3,
                min_score: 0.3,
                default_top_k: 5,
            },
        )
    }

    #[test]
    fn test_fusion_formula() {
        assert!((fuse(0.9, 0.2, 0.7, 0.3) - 0.69).abs() < 1e-6);
        assert!((fuse(0.8, 0.9, 0.7, 0.3) - 0.83).abs() < 1e-6);
        assert!((fuse(0.7, 0.1, 0.7, 0.3) - 0.52).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_hybrid_fusion_reorders_pure_vector_ranking() {
        // Vector order is c1, c2, c3; keyword relevance flips c2 above c1.
        let searcher = searcher(vec![
            chunk("c1", 0.9, 0.2),
            chunk("c2", 0.8, 0.9),
            chunk("c3", 0.7, 0.1),
        ]);

        let results = searcher
            .hybrid_search("educación", &[0.0; 3], 10, &searcher.default_options())
            .await
            .unwrap();

        let ids: Vec<&str> = results.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1", "c3"]);
        assert!((results[0].hybrid_score - 0.83).abs() < 1e-6);
        assert!((results[1].hybrid_score - 0.69).abs() < 1e-6);
        assert!((results[2].hybrid_score - 0.52).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_hybrid_results_sorted_non_increasing() {
        let searcher = searcher(vec![
            chunk("a", 0.5, 0.9),
            chunk("b", 0.9, 0.1),
            chunk("c", 0.7, 0.7),
            chunk("d", 0.4, 0.4),
        ]);

        let mut options = searcher.default_options();
        options.min_score = 0.0;
        let results = searcher
            .hybrid_search("q", &[0.0; 3], 10, &options)
            .await
            .unwrap();

        for pair in results.windows(2) {
            assert!(pair[0].hybrid_score >= pair[1].hybrid_score);
        }
        for result in &results {
            let expected = fuse(result.vector_score, result.keyword_score, 0.7, 0.3);
            assert!((result.hybrid_score - expected).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_min_score_threshold_applied() {
        let searcher = searcher(vec![chunk("high", 0.9, 0.9), chunk("low", 0.1, 0.1)]);

        let results = searcher
            .hybrid_search("q", &[0.0; 3], 10, &searcher.default_options())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "high");
    }

    #[tokio::test]
    async fn test_quality_floor_drops_unscored_chunks() {
        let mut good = chunk("good", 0.9, 0.9);
        good.quality_score = Some(0.8);
        let mut poor = chunk("poor", 0.9, 0.9);
        poor.quality_score = Some(0.2);
        let unscored = chunk("unscored", 0.9, 0.9);

        let searcher = searcher(vec![good, poor, unscored]);
        let mut options = searcher.default_options();
        options.min_quality_score = Some(0.5);

        let results = searcher
            .hybrid_search("q", &[0.0; 3], 10, &options)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "good");
    }

    #[tokio::test]
    async fn test_invalid_weights_rejected() {
        let searcher = searcher(vec![]);
        let mut options = searcher.default_options();
        options.vector_weight = 0.8;
        options.keyword_weight = 0.3;

        let err = searcher
            .hybrid_search("q", &[0.0; 3], 10, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, PlataformaError::Validation(_)));
    }

    #[tokio::test]
    async fn test_custom_weights_change_fusion() {
        let searcher = searcher(vec![chunk("c1", 0.9, 0.2), chunk("c2", 0.8, 0.9)]);
        let mut options = searcher.default_options();
        options.vector_weight = 0.9;
        options.keyword_weight = 0.1;
        options.min_score = 0.0;

        let results = searcher
            .hybrid_search("q", &[0.0; 3], 10, &options)
            .await
            .unwrap();

        // With vector-heavy weights c1 stays on top.
        assert_eq!(results[0].id, "c1");
    }

    #[tokio::test]
    async fn test_vector_search_orders_by_vector_score() {
        let searcher = searcher(vec![
            chunk("b", 0.8, 0.0),
            chunk("a", 0.9, 0.0),
            chunk("c", 0.7, 0.0),
        ]);

        let results = searcher.search(&[0.0; 3], 2, None).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(results[0].hybrid_score, results[0].vector_score);
    }

    #[tokio::test]
    async fn test_threshold_filter_drops_weak_vectors() {
        let searcher = searcher(vec![chunk("a", 0.9, 0.0), chunk("b", 0.4, 0.0)]);
        let results = searcher
            .search_with_threshold(&[0.0; 3], 10, 0.5, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn test_quality_filtered_overfetches_then_truncates() {
        let mut chunks = Vec::new();
        for i in 0..6 {
            let mut c = chunk(&format!("c{i}"), 0.9 - i as f32 * 0.1, 0.0);
            // Alternate good and poor quality so the floor halves the pool.
            c.quality_score = Some(if i % 2 == 0 { 0.9 } else { 0.1 });
            chunks.push(c);
        }

        let searcher = searcher(chunks);
        let results = searcher
            .search_quality_filtered(&[0.0; 3], 2, 0.5, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|c| c.quality_score == Some(0.9)));
    }

    #[tokio::test]
    async fn test_relevance_filter_applies_both_floors() {
        let mut relevant = chunk("relevant", 0.8, 0.0);
        relevant.quality_score = Some(0.9);
        let mut weak_score = chunk("weak_score", 0.3, 0.0);
        weak_score.quality_score = Some(0.9);
        let mut weak_quality = chunk("weak_quality", 0.8, 0.0);
        weak_quality.quality_score = Some(0.2);

        let searcher = searcher(vec![relevant, weak_score, weak_quality]);
        let results = searcher
            .search_relevant(&[0.0; 3], 5, 0.5, 0.5, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "relevant");
    }

    #[tokio::test]
    async fn test_per_party_union_sorted() {
        let mut pac = chunk("pac1", 0.9, 0.9);
        pac.source.party = "PAC".to_string();
        let searcher = searcher(vec![chunk("pln1", 0.6, 0.6), pac]);

        let mut options = searcher.default_options();
        options.min_score = 0.0;
        let results = searcher
            .search_per_party(
                "q",
                &[0.0; 3],
                &["PLN".to_string(), "PAC".to_string()],
                3,
                &options,
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "pac1");
        assert_eq!(results[1].id, "pln1");
    }
}
