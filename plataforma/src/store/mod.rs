mod memory;
mod traits;

pub use memory::MemoryCacheStore;
pub use traits::{
    CacheStore, HybridSearchOptions, PartyDirectory, ResolvedParty, SearchFilter, VectorStore,
};
