mod result_cache;

pub use result_cache::{canonical_topic, party_ids_hash, topic_hash, ResultCache};
