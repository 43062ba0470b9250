use crate::config::{parse_llm_provider_model, EmbeddingsConfig};
use crate::embeddings::api::{default_base_url, ApiConfig, EmbeddingApiClient};
use crate::error::{PlataformaError, Result};

enum EmbeddingBackend {
    Api { client: EmbeddingApiClient },
    Unavailable { reason: String },
}

/// Facade over the configured embedding backend. Constructed once at
/// startup and injected into the pipeline; batch requests are chunked to
/// the configured batch size.
pub struct EmbeddingProvider {
    backend: EmbeddingBackend,
    dimensions: usize,
    batch_size: usize,
}

impl EmbeddingProvider {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let (provider, model) = parse_llm_provider_model(&config.model);

        if provider == "local" {
            return Ok(Self {
                backend: EmbeddingBackend::Unavailable {
                    reason: format!(
                        "Local embedding models are not supported; got '{}'",
                        config.model
                    ),
                },
                dimensions: config.dimensions,
                batch_size: config.batch_size,
            });
        }

        let api_config = ApiConfig {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base_url(provider).to_string()),
            api_key: config.api_key.clone(),
            model: model.to_string(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        };

        let client = EmbeddingApiClient::new(api_config)?;

        Ok(Self {
            backend: EmbeddingBackend::Api { client },
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
        })
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.backend, EmbeddingBackend::Unavailable { .. })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[query]).await?;
        embeddings
            .pop()
            .ok_or_else(|| PlataformaError::Embedding("No embedding generated".to_string()))
    }

    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match &self.backend {
            EmbeddingBackend::Unavailable { reason } => {
                Err(PlataformaError::EmbeddingUnavailable(reason.clone()))
            }
            EmbeddingBackend::Api { client } => {
                let mut all = Vec::with_capacity(texts.len());
                for batch in texts.chunks(self.batch_size) {
                    let embeddings = client.embed(batch).await?;
                    for embedding in &embeddings {
                        if embedding.len() != self.dimensions {
                            return Err(PlataformaError::Embedding(format!(
                                "Embedding dimension mismatch: expected {}, got {}",
                                self.dimensions,
                                embedding.len()
                            )));
                        }
                    }
                    all.extend(embeddings);
                }
                Ok(all)
            }
        }
    }
}
