use serde::Deserialize;

use crate::error::{PlataformaError, Result};
use crate::llm::{prompts, CompletionOptions, LlmProvider};
use crate::models::{ProcessedQuery, QueryIntent};
use crate::security::{PromptHardener, QuerySanitizer, SanitizationResult};

const ANALYSIS_TEMPERATURE: f32 = 0.3;
const ANALYSIS_MAX_TOKENS: u32 = 300;
const MAX_KEYWORDS: usize = 10;
const MIN_KEYWORD_LEN: usize = 3;

/// Stopwords dropped by the lexical fallback. The corpus is Spanish-first
/// with enough English queries to warrant both lists.
const STOPWORDS: &[&str] = &[
    // Spanish
    "el", "la", "los", "las", "un", "una", "unos", "unas", "de", "del", "al", "a", "en", "con",
    "por", "para", "que", "qué", "como", "cómo", "cuál", "cuáles", "quién", "sobre", "entre",
    "desde", "hasta", "y", "o", "u", "e", "es", "son", "ser", "está", "están", "fue", "han",
    "hay", "sus", "su", "lo", "le", "les", "se", "si", "sí", "no", "más", "menos", "este",
    "esta", "estos", "estas", "ese", "esa", "cual", "tiene", "tienen", "dice", "hace",
    // English
    "the", "a", "an", "of", "in", "on", "for", "with", "about", "what", "which", "how", "is",
    "are", "was", "were", "and", "or", "to", "from", "their", "this", "that", "does", "do",
];

/// Party abbreviations and institutions recognized by the lexical fallback,
/// matched against the uppercased query.
const KNOWN_ENTITIES: &[&str] = &[
    "PLN", "PAC", "PUSC", "FA", "PRN", "PNR", "PIN", "PLP", "PSD", "PUCD", "ML", "CCSS", "ICE",
    "MEP", "INA",
];

const COMPARISON_MARKERS: &[&str] = &[
    "compara",
    "comparar",
    "comparación",
    "comparacion",
    "compare",
    "comparison",
    "diferencia",
    "diferencias",
    "difference",
    "versus",
    "vs",
];

/// System-prompt fragments that must never appear in a well-formed
/// extraction; their presence signals prompt leakage. Non-fatal, logged for
/// monitoring.
const LEAK_MARKERS: &[&str] = &[
    "analista de consultas",
    "tratarse exclusivamente como datos",
    "[USUARIO-",
    "[FIN-USUARIO-",
];

/// Shape of the structured extraction requested from the LLM.
#[derive(Debug, Deserialize)]
struct LlmExtraction {
    keywords: Vec<String>,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    intent: QueryIntent,
    enhanced_query: String,
}

/// Enriches raw queries for retrieval: sanitize, harden, extract structure
/// via the LLM, and degrade through a lenient parse down to lexical
/// extraction. Only the security block escapes as an error.
pub struct QueryProcessor {
    sanitizer: QuerySanitizer,
    hardener: PromptHardener,
    llm: LlmProvider,
}

impl QueryProcessor {
    pub fn new(sanitizer: QuerySanitizer, llm: LlmProvider) -> Self {
        Self {
            sanitizer,
            hardener: PromptHardener::new(),
            llm,
        }
    }

    /// Risk scan without the rest of the processing pipeline. Exposed so
    /// the comparison path can screen topics with the same pattern set.
    pub fn sanitize(&self, raw: &str) -> SanitizationResult {
        self.sanitizer.sanitize(raw)
    }

    pub async fn process(&self, query: &str) -> Result<ProcessedQuery> {
        let scan = self.sanitizer.sanitize(query);

        if self.sanitizer.should_block(&scan) {
            tracing::warn!(
                risk_score = scan.risk_score,
                reasons = ?scan.reasons,
                "Query blocked by sanitizer"
            );
            return Err(PlataformaError::SecurityBlocked {
                risk_score: scan.risk_score,
                reasons: scan.reasons,
            });
        }

        if scan.suspicious {
            tracing::warn!(
                risk_score = scan.risk_score,
                reasons = ?scan.reasons,
                "Suspicious query allowed through"
            );
        }

        if !self.llm.is_available() {
            tracing::debug!("LLM unavailable, using lexical extraction");
            return Ok(fallback_extract(query, &scan.sanitized));
        }

        let hardened = self
            .hardener
            .harden(prompts::query_analysis_system_prompt(), &scan.sanitized);

        if hardened.has_escaped_content {
            tracing::warn!("Delimiter-breaking content survived hardening, skipping LLM");
            return Ok(fallback_extract(query, &scan.sanitized));
        }

        let options = CompletionOptions {
            temperature: Some(ANALYSIS_TEMPERATURE),
            max_tokens: Some(ANALYSIS_MAX_TOKENS),
            ..Default::default()
        };

        match self
            .llm
            .complete(
                &hardened.user_prompt,
                Some(&hardened.system_prompt),
                Some(&options),
            )
            .await
        {
            Ok(completion) => {
                check_for_leakage(&completion.content, &hardened.isolation_marker);
                match parse_extraction(&completion.content) {
                    Some(extraction) => Ok(from_extraction(query, extraction)),
                    None => {
                        tracing::warn!("Unparseable extraction response, using lexical fallback");
                        Ok(fallback_extract(query, &scan.sanitized))
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Query analysis failed, using lexical fallback");
                Ok(fallback_extract(query, &scan.sanitized))
            }
        }
    }
}

/// Strict parse first, then a lenient pass that tolerates fenced or chatty
/// responses by slicing the first JSON object out of the text.
fn parse_extraction(content: &str) -> Option<LlmExtraction> {
    if let Some(extraction) = serde_json::from_str(content.trim())
        .ok()
        .and_then(validate_extraction)
    {
        return Some(extraction);
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }

    serde_json::from_str(&content[start..=end])
        .ok()
        .and_then(validate_extraction)
}

fn validate_extraction(extraction: LlmExtraction) -> Option<LlmExtraction> {
    if extraction.enhanced_query.trim().is_empty() || extraction.keywords.is_empty() {
        return None;
    }
    Some(extraction)
}

fn from_extraction(original: &str, extraction: LlmExtraction) -> ProcessedQuery {
    let mut keywords: Vec<String> = extraction
        .keywords
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    keywords.dedup();
    keywords.truncate(MAX_KEYWORDS);

    ProcessedQuery {
        original_query: original.to_string(),
        enhanced_query: extraction.enhanced_query.trim().to_string(),
        keywords,
        entities: extraction.entities,
        intent: extraction.intent,
        used_fallback: false,
    }
}

/// Lexical extraction used whenever the LLM path is unavailable, unsafe, or
/// unparseable. Never fails.
fn fallback_extract(original: &str, sanitized: &str) -> ProcessedQuery {
    let lowered = sanitized.to_lowercase();

    let mut keywords: Vec<String> = Vec::new();
    for token in lowered.split_whitespace() {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric());
        if token.chars().count() < MIN_KEYWORD_LEN || STOPWORDS.contains(&token) {
            continue;
        }
        if !keywords.iter().any(|k| k == token) {
            keywords.push(token.to_string());
        }
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
    }

    let upper = sanitized.to_uppercase();
    let entities: Vec<String> = KNOWN_ENTITIES
        .iter()
        .filter(|entity| {
            upper
                .split(|c: char| !c.is_alphanumeric())
                .any(|token| token == **entity)
        })
        .map(|entity| entity.to_string())
        .collect();

    let intent = if COMPARISON_MARKERS
        .iter()
        .any(|marker| lowered.split_whitespace().any(|token| {
            token.trim_matches(|c: char| !c.is_alphanumeric()) == *marker
        }))
    {
        QueryIntent::Comparison
    } else {
        QueryIntent::Question
    };

    ProcessedQuery {
        original_query: original.to_string(),
        enhanced_query: original.trim().to_string(),
        keywords,
        entities,
        intent,
        used_fallback: true,
    }
}

fn check_for_leakage(content: &str, isolation_marker: &str) {
    let leaked = LEAK_MARKERS
        .iter()
        .any(|marker| content.contains(marker))
        || content.contains(isolation_marker);

    if leaked {
        tracing::warn!("Possible system prompt leakage detected in extraction response");
    }
}
