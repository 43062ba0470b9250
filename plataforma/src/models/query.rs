use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Coarse intent of a user query, used to pick retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    /// A question about one party or topic (default)
    #[default]
    Question,
    /// A request to compare positions across parties
    Comparison,
    /// A lookup for a concrete fact or figure
    Lookup,
}

impl<'de> Deserialize<'de> for QueryIntent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.to_lowercase().as_str() {
            "question" | "pregunta" => Ok(QueryIntent::Question),
            "comparison" | "comparacion" | "comparación" => Ok(QueryIntent::Comparison),
            "lookup" | "consulta" => Ok(QueryIntent::Lookup),
            _ => Err(de::Error::custom(format!(
                "Invalid intent '{raw}'. Valid intents: question, comparison, lookup"
            ))),
        }
    }
}

impl std::fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Question => write!(f, "question"),
            Self::Comparison => write!(f, "comparison"),
            Self::Lookup => write!(f, "lookup"),
        }
    }
}

/// Enriched query ready for retrieval. Produced by the query processor,
/// either from LLM extraction or from the lexical fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedQuery {
    pub original_query: String,
    pub enhanced_query: String,
    pub keywords: Vec<String>,
    pub entities: Vec<String>,
    pub intent: QueryIntent,
    /// True when the LLM path was skipped or failed and lexical extraction
    /// produced this result.
    pub used_fallback: bool,
}

impl ProcessedQuery {
    /// Search string combining the enhanced query with extracted keywords
    /// and entities, for the keyword half of hybrid retrieval.
    pub fn search_text(&self) -> String {
        let mut parts: Vec<&str> = vec![self.enhanced_query.as_str()];
        parts.extend(self.keywords.iter().map(String::as_str));
        parts.extend(self.entities.iter().map(String::as_str));
        parts.join(" ")
    }
}
