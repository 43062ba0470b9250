use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
        FinishReason, Stop,
    },
    Client,
};
use futures::StreamExt;

use crate::{
    config::{parse_llm_provider_model, LlmConfig},
    error::{PlataformaError, Result},
    llm::provider::{Completion, CompletionOptions, CompletionStream},
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const LMSTUDIO_BASE_URL: &str = "http://localhost:1234/v1";

#[derive(Debug, Clone)]
struct ApiConfig {
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
    max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct LlmApiClient {
    client: Client<OpenAIConfig>,
    config: ApiConfig,
}

impl LlmApiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_config = ApiConfig::from_llm_config(config);

        let (provider, _) = parse_llm_provider_model(&config.model);
        let needs_api_key = !matches!(
            provider.to_lowercase().as_str(),
            "ollama" | "local" | "lmstudio"
        );

        if needs_api_key && api_config.api_key.is_none() {
            return Err(PlataformaError::Llm(
                "API key required for this provider".to_string(),
            ));
        }

        let openai_config = OpenAIConfig::new()
            .with_api_base(api_config.base_url.clone())
            .with_api_key(api_config.api_key.clone().unwrap_or_default());

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api_config.timeout_secs))
            .build()
            .map_err(|error| {
                PlataformaError::Llm(format!("Failed to create LLM HTTP client: {error}"))
            })?;

        // Bound async-openai's internal backoff to our timeout; its default
        // max_elapsed_time retries server errors for up to 15 minutes,
        // independent of the retry loop below.
        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(api_config.timeout_secs)),
            ..Default::default()
        };

        let client = Client::with_config(openai_config)
            .with_http_client(http_client)
            .with_backoff(backoff);

        Ok(Self {
            client,
            config: api_config,
        })
    }

    pub async fn complete(
        &self,
        user_prompt: &str,
        system_prompt: Option<&str>,
        options: Option<&CompletionOptions>,
    ) -> Result<Completion> {
        if user_prompt.trim().is_empty() {
            return Err(PlataformaError::Validation(
                "Prompt cannot be empty".to_string(),
            ));
        }

        let request = self.build_request(user_prompt, system_prompt, options, false)?;
        let response = self.execute_with_retries(request).await?;
        Self::extract_completion(response)
    }

    pub async fn complete_streaming(
        &self,
        user_prompt: &str,
        system_prompt: Option<&str>,
        options: Option<&CompletionOptions>,
    ) -> Result<CompletionStream> {
        if user_prompt.trim().is_empty() {
            return Err(PlataformaError::Validation(
                "Prompt cannot be empty".to_string(),
            ));
        }

        let request = self.build_request(user_prompt, system_prompt, options, true)?;
        let mut inner = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(Self::map_openai_error)?;

        let stream = async_stream::try_stream! {
            while let Some(item) = inner.next().await {
                let chunk = item.map_err(Self::map_openai_error)?;
                for choice in chunk.choices {
                    if let Some(text) = choice.delta.content {
                        if !text.is_empty() {
                            yield text;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn execute_with_retries(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse> {
        let mut last_error: Option<PlataformaError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay_ms = 100 * 2_u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            match self.client.chat().create(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    if let Some(rate_limit_error) = Self::rate_limit_error(&error) {
                        return Err(rate_limit_error);
                    }

                    if let Some(auth_error) = Self::auth_error(&error) {
                        return Err(auth_error);
                    }

                    let retryable = Self::is_retryable(&error);
                    let mapped_error = Self::map_openai_error(error);

                    if retryable && attempt < self.config.max_retries {
                        last_error = Some(mapped_error);
                        continue;
                    }

                    return Err(mapped_error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PlataformaError::Llm("LLM completion failed after retries".to_string())
        }))
    }

    fn build_request(
        &self,
        user_prompt: &str,
        system_prompt: Option<&str>,
        options: Option<&CompletionOptions>,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest> {
        let mut messages = Vec::new();

        if let Some(system_prompt) = system_prompt.filter(|value| !value.trim().is_empty()) {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(|error| {
                        PlataformaError::Validation(format!("Invalid system prompt: {error}"))
                    })?
                    .into(),
            );
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt)
                .build()
                .map_err(|error| {
                    PlataformaError::Validation(format!("Invalid user prompt: {error}"))
                })?
                .into(),
        );

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(self.config.model.clone()).messages(messages);
        if stream {
            request.stream(true);
        }
        Self::apply_completion_options(&mut request, options);

        request.build().map_err(|error| {
            PlataformaError::Validation(format!("Invalid LLM completion request: {error}"))
        })
    }

    fn apply_completion_options(
        request: &mut CreateChatCompletionRequestArgs,
        options: Option<&CompletionOptions>,
    ) {
        let Some(options) = options else {
            return;
        };

        if let Some(temperature) = options.temperature {
            request.temperature(temperature);
        }

        if let Some(max_tokens) = options.max_tokens {
            request.max_tokens(max_tokens);
        }

        if let Some(top_p) = options.top_p {
            request.top_p(top_p);
        }

        if let Some(stop) = options.stop.as_ref().filter(|values| !values.is_empty()) {
            request.stop(Stop::StringArray(stop.clone()));
        }
    }

    fn extract_completion(response: CreateChatCompletionResponse) -> Result<Completion> {
        let model = response.model.clone();
        let tokens_used = response
            .usage
            .as_ref()
            .map(|usage| usage.total_tokens)
            .unwrap_or(0);

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PlataformaError::Llm("LLM response contained no choices".to_string()))?;

        let finish_reason = choice.finish_reason.map(finish_reason_label);
        let content = choice.message.content.unwrap_or_default();

        if content.trim().is_empty() {
            return Err(PlataformaError::Llm(
                "LLM response contained empty content".to_string(),
            ));
        }

        Ok(Completion {
            content,
            model,
            tokens_used,
            finish_reason,
        })
    }

    fn is_retryable(error: &OpenAIError) -> bool {
        match error {
            OpenAIError::ApiError(api_error) => {
                api_error.r#type.is_none() && api_error.code.is_none()
            }
            OpenAIError::Reqwest(reqwest_error) => reqwest_error
                .status()
                .map(|status| status.is_server_error())
                .unwrap_or(true),
            _ => false,
        }
    }

    fn rate_limit_error(error: &OpenAIError) -> Option<PlataformaError> {
        match error {
            OpenAIError::Reqwest(reqwest_error)
                if reqwest_error.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) =>
            {
                Some(PlataformaError::LlmRateLimit { retry_after: None })
            }
            OpenAIError::ApiError(api_error) if Self::is_rate_limit_api_error(api_error) => {
                Some(PlataformaError::LlmRateLimit { retry_after: None })
            }
            _ => None,
        }
    }

    fn auth_error(error: &OpenAIError) -> Option<PlataformaError> {
        match error {
            OpenAIError::Reqwest(reqwest_error)
                if reqwest_error.status() == Some(reqwest::StatusCode::UNAUTHORIZED)
                    || reqwest_error.status() == Some(reqwest::StatusCode::FORBIDDEN) =>
            {
                Some(PlataformaError::Llm(format!(
                    "LLM authentication failed: {reqwest_error}"
                )))
            }
            OpenAIError::ApiError(api_error) if Self::is_auth_api_error(api_error) => Some(
                PlataformaError::Llm(format!("LLM authentication failed: {api_error}")),
            ),
            _ => None,
        }
    }

    fn is_rate_limit_api_error(api_error: &ApiError) -> bool {
        let message = api_error.message.to_lowercase();
        let error_type = api_error.r#type.clone().unwrap_or_default().to_lowercase();
        let code = api_error.code.clone().unwrap_or_default().to_lowercase();

        message.contains("rate limit")
            || message.contains("too many requests")
            || error_type.contains("rate_limit")
            || code.contains("rate_limit")
            || code == "insufficient_quota"
    }

    fn is_auth_api_error(api_error: &ApiError) -> bool {
        let message = api_error.message.to_lowercase();
        let error_type = api_error.r#type.clone().unwrap_or_default().to_lowercase();
        let code = api_error.code.clone().unwrap_or_default().to_lowercase();

        message.contains("unauthorized")
            || message.contains("forbidden")
            || message.contains("authentication")
            || message.contains("invalid api key")
            || code.contains("invalid_api_key")
            || code.contains("authentication")
            || error_type.contains("authentication")
    }

    fn map_openai_error(error: OpenAIError) -> PlataformaError {
        match error {
            OpenAIError::Reqwest(reqwest_error) => {
                PlataformaError::Llm(format!("LLM request failed: {reqwest_error}"))
            }
            OpenAIError::ApiError(api_error) => {
                PlataformaError::Llm(format!("LLM API error: {api_error}"))
            }
            OpenAIError::JSONDeserialize(err) => {
                PlataformaError::Llm(format!("Failed to parse LLM response: {err}"))
            }
            OpenAIError::InvalidArgument(message) => PlataformaError::Validation(message),
            other => PlataformaError::Llm(other.to_string()),
        }
    }
}

fn finish_reason_label(reason: FinishReason) -> String {
    match reason {
        FinishReason::Stop => "stop",
        FinishReason::Length => "length",
        FinishReason::ToolCalls => "tool_calls",
        FinishReason::ContentFilter => "content_filter",
        FinishReason::FunctionCall => "function_call",
    }
    .to_string()
}

impl ApiConfig {
    fn from_llm_config(config: &LlmConfig) -> Self {
        let (provider, model) = parse_llm_provider_model(&config.model);

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(provider).to_string());

        let normalized_model = if provider.eq_ignore_ascii_case("local") {
            config.model.clone()
        } else {
            model.to_string()
        };

        Self {
            base_url,
            api_key: config.api_key.clone(),
            model: normalized_model,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }
}

fn default_base_url(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "openai" => OPENAI_BASE_URL,
        "openrouter" => OPENROUTER_BASE_URL,
        "ollama" => OLLAMA_BASE_URL,
        "lmstudio" => LMSTUDIO_BASE_URL,
        _ => OPENAI_BASE_URL,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_llm_config(base_url: Option<String>) -> LlmConfig {
        LlmConfig {
            model: "openai/gpt-4o-mini".to_string(),
            api_key: Some("test-key".to_string()),
            base_url,
            timeout_secs: 5,
            max_retries: 0,
        }
    }

    fn chat_response(content: &str) -> serde_json::Value {
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
            "usage": {"prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19}
        })
    }

    #[test]
    fn test_api_key_required_for_hosted_providers() {
        let mut config = test_llm_config(None);
        config.api_key = None;
        let err = LlmApiClient::new(&config).unwrap_err();
        assert!(matches!(err, PlataformaError::Llm(_)));

        let ollama = LlmConfig {
            model: "ollama/llama3".to_string(),
            api_key: None,
            base_url: None,
            timeout_secs: 5,
            max_retries: 0,
        };
        assert!(LlmApiClient::new(&ollama).is_ok());
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_before_network() {
        let client = LlmApiClient::new(&test_llm_config(None)).unwrap();
        let err = client.complete("   ", None, None).await.unwrap_err();
        assert!(matches!(err, PlataformaError::Validation(_)));
    }

    #[tokio::test]
    async fn test_complete_returns_content_and_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("Hola mundo")))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmApiClient::new(&test_llm_config(Some(server.uri()))).unwrap();
        let completion = client
            .complete("pregunta", Some("sistema"), None)
            .await
            .unwrap();

        assert_eq!(completion.content, "Hola mundo");
        assert_eq!(completion.model, "gpt-4o-mini");
        assert_eq!(completion.tokens_used, 19);
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_rate_limit_surfaced_distinctly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(json!({
                    "error": {
                        "message": "Rate limit reached",
                        "type": "rate_limit_error",
                        "code": "rate_limit_exceeded"
                    }
                })),
            )
            .mount(&server)
            .await;

        let client = LlmApiClient::new(&test_llm_config(Some(server.uri()))).unwrap();
        let err = client.complete("pregunta", None, None).await.unwrap_err();
        assert!(matches!(err, PlataformaError::LlmRateLimit { .. }));
    }

    #[test]
    fn test_default_base_urls() {
        assert_eq!(default_base_url("openai"), OPENAI_BASE_URL);
        assert_eq!(default_base_url("openrouter"), OPENROUTER_BASE_URL);
        assert_eq!(default_base_url("ollama"), OLLAMA_BASE_URL);
        assert_eq!(default_base_url("unknown"), OPENAI_BASE_URL);
    }
}
