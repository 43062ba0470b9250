use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlataformaError {
    /// Raised by the query sanitizer when the risk score reaches the block
    /// threshold. Terminal: no provider call is made for the offending query.
    #[error("Query blocked by security policy (risk score {risk_score}): {reasons:?}")]
    SecurityBlocked { risk_score: u8, reasons: Vec<String> },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM rate limit exceeded, retry after {retry_after:?} seconds")]
    LlmRateLimit { retry_after: Option<u64> },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlataformaError {
    /// Whether this is the terminal security rejection. Every other variant
    /// is expected to be recovered into a degraded result somewhere in the
    /// pipeline.
    pub fn is_security_blocked(&self) -> bool {
        matches!(self, PlataformaError::SecurityBlocked { .. })
    }
}

impl IntoResponse for PlataformaError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            PlataformaError::SecurityBlocked { .. } => (StatusCode::FORBIDDEN, self.to_string()),
            PlataformaError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            PlataformaError::Embedding(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            PlataformaError::EmbeddingUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone())
            }
            PlataformaError::VectorStore(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            PlataformaError::Cache(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            PlataformaError::Llm(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            PlataformaError::LlmUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            PlataformaError::LlmRateLimit { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("LLM rate limit exceeded, retry after {retry_after:?} seconds"),
            ),
            PlataformaError::Http(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            PlataformaError::Json(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            PlataformaError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, PlataformaError>;
