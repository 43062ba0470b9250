//! Retrieval-augmented answers about political party platforms.
//!
//! The crate is the core pipeline behind a platform Q&A service: query
//! sanitization and enrichment, hybrid (vector + keyword) retrieval with
//! adaptive thresholds, bounded context assembly, grounded answer
//! generation with derived confidence, multi-party comparison, and a
//! content-addressed result cache.
//!
//! Provider interfaces (vector store, party directory, cache store) are
//! injected at construction; the HTTP surface, authentication, and document
//! ingestion live in infrastructure crates that consume [`RagPipeline`].

pub mod cache;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod llm;
pub mod models;
pub mod security;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{PlataformaError, Result};
pub use services::RagPipeline;
