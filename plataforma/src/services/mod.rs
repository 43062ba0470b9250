mod assembler;
mod comparator;
mod generator;
mod pipeline;
mod processor;
mod searcher;

pub use assembler::{ContextAssembler, ContextStats, NO_INFORMATION_CONTEXT};
pub use comparator::{
    classify_state, CompareOptions, ComparisonOrchestrator, RELAXATION_STEPS,
};
pub use generator::{AnswerGenerator, GenerationOptions, NOT_FOUND_ANSWER, UNSAFE_QUERY_ANSWER};
pub use pipeline::{EventStream, QueryOptions, RagPipeline};
pub use processor::QueryProcessor;
pub use searcher::HybridSearcher;
