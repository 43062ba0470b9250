use serde::Deserialize;
use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        Err(_) => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub security: SecurityConfig,
    pub search: SearchConfig,
    pub context: ContextConfig,
    pub generation: GenerationConfig,
    pub comparison: ComparisonConfig,
    pub cache: CacheConfig,
    pub embeddings: EmbeddingsConfig,
    pub llm: Option<LlmConfig>,
}

/// Thresholds for the query sanitizer. Both are 0-100 risk scores; the
/// defaults (40/75) are carried over from production tuning and are not
/// claimed to be optimal.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub block_threshold: u8,
    pub suspicious_threshold: u8,
    pub max_query_length: usize,
}

/// Hybrid search fusion weights and default thresholds. The weights must
/// sum to 1.0; `HybridSearcher` rejects option sets that do not.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub vector_weight: f32,
    pub keyword_weight: f32,
    pub min_score: f32,
    pub default_top_k: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    pub max_context_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Multi-party comparison settings. `llm_call_delay_ms` is the fixed
/// inter-call pause used as simple backpressure against rate-limited
/// providers; set it to 0 in tests.
#[derive(Debug, Clone, Deserialize)]
pub struct ComparisonConfig {
    pub top_k_per_party: u32,
    pub llm_call_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
    /// Default TTL for new entries. Absent means entries never expire.
    pub expires_in_hours: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub dimensions: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// LLM configuration for chat/completion models
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            security: SecurityConfig {
                block_threshold: parse_env_or("SECURITY_BLOCK_THRESHOLD", 75),
                suspicious_threshold: parse_env_or("SECURITY_SUSPICIOUS_THRESHOLD", 40),
                max_query_length: parse_env_or("SECURITY_MAX_QUERY_LENGTH", 1000),
            },
            search: SearchConfig {
                vector_weight: parse_env_or("HYBRID_VECTOR_WEIGHT", 0.7),
                keyword_weight: parse_env_or("HYBRID_KEYWORD_WEIGHT", 0.3),
                min_score: parse_env_or("SEARCH_MIN_SCORE", 0.3),
                default_top_k: parse_env_or("SEARCH_TOP_K", 5),
            },
            context: ContextConfig {
                max_context_chars: parse_env_or("CONTEXT_MAX_CHARS", 4000),
            },
            generation: GenerationConfig {
                temperature: parse_env_or("GENERATION_TEMPERATURE", 0.7),
                max_tokens: parse_env_or("GENERATION_MAX_TOKENS", 800),
            },
            comparison: ComparisonConfig {
                top_k_per_party: parse_env_or("COMPARISON_TOP_K_PER_PARTY", 3),
                llm_call_delay_ms: parse_env_or("COMPARISON_LLM_DELAY_MS", 1000),
            },
            cache: CacheConfig {
                enabled: parse_env_or("CACHE_ENABLED", true),
                capacity: parse_env_or("CACHE_CAPACITY", 512),
                expires_in_hours: parse_env_opt("CACHE_EXPIRES_IN_HOURS"),
            },
            embeddings: EmbeddingsConfig {
                model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "openai/text-embedding-3-small".to_string()),
                api_key: env::var("EMBEDDING_API_KEY").ok(),
                base_url: env::var("EMBEDDING_BASE_URL").ok(),
                dimensions: parse_env_or("EMBEDDING_DIMENSIONS", 1536),
                batch_size: parse_env_or("EMBEDDING_BATCH_SIZE", 32),
                timeout_secs: parse_env_or("EMBEDDING_TIMEOUT", 30),
                max_retries: parse_env_or("EMBEDDING_MAX_RETRIES", 3),
            },
            llm: env::var("LLM_MODEL").ok().map(|model| LlmConfig {
                model,
                api_key: env::var("LLM_API_KEY").ok(),
                base_url: env::var("LLM_BASE_URL").ok(),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 30),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 3),
            }),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Parse a model name into (provider, model) tuple.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    // Default to treating the whole string as a local model
    ("local", model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_security_config_defaults() {
        std::env::remove_var("SECURITY_BLOCK_THRESHOLD");
        std::env::remove_var("SECURITY_SUSPICIOUS_THRESHOLD");

        let config = Config::default();
        assert_eq!(config.security.block_threshold, 75);
        assert_eq!(config.security.suspicious_threshold, 40);
        assert_eq!(config.security.max_query_length, 1000);
    }

    #[test]
    #[serial]
    fn test_search_config_defaults() {
        std::env::remove_var("HYBRID_VECTOR_WEIGHT");
        std::env::remove_var("HYBRID_KEYWORD_WEIGHT");

        let config = Config::default();
        assert_eq!(config.search.vector_weight, 0.7);
        assert_eq!(config.search.keyword_weight, 0.3);
        assert_eq!(config.search.min_score, 0.3);
        assert_eq!(config.context.max_context_chars, 4000);
    }

    #[test]
    #[serial]
    fn test_search_weights_from_env() {
        std::env::set_var("HYBRID_VECTOR_WEIGHT", "0.6");
        std::env::set_var("HYBRID_KEYWORD_WEIGHT", "0.4");

        let config = Config::default();
        assert_eq!(config.search.vector_weight, 0.6);
        assert_eq!(config.search.keyword_weight, 0.4);

        std::env::remove_var("HYBRID_VECTOR_WEIGHT");
        std::env::remove_var("HYBRID_KEYWORD_WEIGHT");
    }

    #[test]
    #[serial]
    fn test_llm_config_gated_on_model() {
        std::env::remove_var("LLM_MODEL");
        let config = Config::default();
        assert!(config.llm.is_none());

        std::env::set_var("LLM_MODEL", "openai/gpt-4o-mini");
        let config = Config::default();
        let llm = config.llm.expect("llm config should be present");
        assert_eq!(llm.model, "openai/gpt-4o-mini");
        assert_eq!(llm.timeout_secs, 30);
        assert_eq!(llm.max_retries, 3);

        std::env::remove_var("LLM_MODEL");
    }

    #[test]
    #[serial]
    fn test_cache_config_defaults() {
        std::env::remove_var("CACHE_ENABLED");
        std::env::remove_var("CACHE_EXPIRES_IN_HOURS");

        let config = Config::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.capacity, 512);
        assert!(config.cache.expires_in_hours.is_none());
    }

    #[test]
    #[serial]
    fn test_cache_ttl_from_env() {
        std::env::set_var("CACHE_EXPIRES_IN_HOURS", "24");
        let config = Config::default();
        assert_eq!(config.cache.expires_in_hours, Some(24));
        std::env::remove_var("CACHE_EXPIRES_IN_HOURS");
    }

    #[test]
    #[serial]
    fn test_parse_env_or_invalid_value_falls_back() {
        std::env::set_var("__TEST_PARSE_TOP_K", "not-a-number");
        let result: u32 = parse_env_or("__TEST_PARSE_TOP_K", 5);
        assert_eq!(result, 5);
        std::env::remove_var("__TEST_PARSE_TOP_K");
    }

    #[test]
    fn test_parse_llm_provider_model() {
        assert_eq!(
            parse_llm_provider_model("openai/gpt-4o-mini"),
            ("openai", "gpt-4o-mini")
        );
        assert_eq!(
            parse_llm_provider_model("ollama/llama3"),
            ("ollama", "llama3")
        );
        assert_eq!(
            parse_llm_provider_model("mistral-7b-instruct"),
            ("local", "mistral-7b-instruct")
        );
    }
}
