use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;

use crate::config::{parse_llm_provider_model, LlmConfig};
use crate::error::{PlataformaError, Result};
use crate::llm::api::LlmApiClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAI,
    OpenRouter,
    Ollama,
    LmStudio,
    OpenAICompatible { base_url: String },
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub stop: Option<Vec<String>>,
}

/// Completion result with the response metadata the confidence scorer needs.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub tokens_used: u32,
    pub finish_reason: Option<String>,
}

/// Incremental text fragments from a streaming completion. The consumer
/// drives the stream and owns timeout/cancellation.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Facade over the configured LLM backend, resolved once from configuration
/// and injected into pipeline components. No module-level client state.
#[derive(Debug, Clone)]
pub struct LlmProvider {
    backend: LlmBackend,
    config: Option<Arc<LlmConfig>>,
}

impl LlmProvider {
    pub fn new(config: Option<&LlmConfig>) -> Self {
        let Some(config) = config else {
            return Self::unavailable("No LLM configuration provided");
        };

        let (provider, _model) = parse_llm_provider_model(&config.model);

        let backend = match provider.to_lowercase().as_str() {
            "openai" => LlmBackend::OpenAI,
            "openrouter" => LlmBackend::OpenRouter,
            "ollama" => LlmBackend::Ollama,
            "lmstudio" => LlmBackend::LmStudio,
            _ => {
                if let Some(base_url) = &config.base_url {
                    LlmBackend::OpenAICompatible {
                        base_url: base_url.clone(),
                    }
                } else {
                    LlmBackend::Unavailable {
                        reason: format!("Unknown provider in model: {}", config.model),
                    }
                }
            }
        };

        Self {
            backend,
            config: Some(Arc::new(config.clone())),
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            backend: LlmBackend::Unavailable {
                reason: reason.to_string(),
            },
            config: None,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.backend, LlmBackend::Unavailable { .. })
    }

    pub fn backend(&self) -> &LlmBackend {
        &self.backend
    }

    pub fn config(&self) -> Option<&LlmConfig> {
        self.config.as_deref()
    }

    pub async fn complete(
        &self,
        user_prompt: &str,
        system_prompt: Option<&str>,
        options: Option<&CompletionOptions>,
    ) -> Result<Completion> {
        let client = self.client()?;
        client.complete(user_prompt, system_prompt, options).await
    }

    pub async fn complete_streaming(
        &self,
        user_prompt: &str,
        system_prompt: Option<&str>,
        options: Option<&CompletionOptions>,
    ) -> Result<CompletionStream> {
        let client = self.client()?;
        client
            .complete_streaming(user_prompt, system_prompt, options)
            .await
    }

    fn client(&self) -> Result<LlmApiClient> {
        if !self.is_available() {
            return Err(PlataformaError::LlmUnavailable(self.unavailable_reason()));
        }

        let config = self
            .config()
            .ok_or_else(|| PlataformaError::LlmUnavailable("No config available".to_string()))?;

        LlmApiClient::new(config)
    }

    fn unavailable_reason(&self) -> String {
        match &self.backend {
            LlmBackend::Unavailable { reason } => reason.clone(),
            _ => "LLM backend unavailable".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model: &str, base_url: Option<&str>) -> LlmConfig {
        LlmConfig {
            model: model.to_string(),
            api_key: Some("test-key".to_string()),
            base_url: base_url.map(str::to_string),
            timeout_secs: 5,
            max_retries: 0,
        }
    }

    #[test]
    fn test_backend_resolution() {
        let provider = LlmProvider::new(Some(&config("openai/gpt-4o-mini", None)));
        assert_eq!(provider.backend(), &LlmBackend::OpenAI);

        let provider = LlmProvider::new(Some(&config("ollama/llama3", None)));
        assert_eq!(provider.backend(), &LlmBackend::Ollama);

        let provider = LlmProvider::new(Some(&config(
            "custom-model",
            Some("http://localhost:8080/v1"),
        )));
        assert_eq!(
            provider.backend(),
            &LlmBackend::OpenAICompatible {
                base_url: "http://localhost:8080/v1".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_model_without_base_url_is_unavailable() {
        let provider = LlmProvider::new(Some(&config("mystery-model", None)));
        assert!(!provider.is_available());
    }

    #[test]
    fn test_missing_config_is_unavailable() {
        let provider = LlmProvider::new(None);
        assert!(!provider.is_available());
    }

    #[tokio::test]
    async fn test_unavailable_provider_errors_without_network() {
        let provider = LlmProvider::unavailable("test unavailable");
        let err = provider.complete("hola", None, None).await.unwrap_err();
        assert!(matches!(err, PlataformaError::LlmUnavailable(_)));
    }
}
