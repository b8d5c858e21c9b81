//! Persistent vector store for docsearch.
//!
//! A store is a LanceDB directory with a `chunks` table (text and metadata)
//! and an `embeddings` table (384-dim vectors), joined on an `id` assigned
//! 1..=N at build time. Stores are always rebuilt in full.
pub mod index_build;
pub mod schema;
pub mod search;
pub mod stats;
pub mod table;
pub mod writer;

pub use schema::{decode_embedding, encode_embeddings};
pub use search::{QueryEngine, QueryError, SearchHit, SearchOutcome};
pub use stats::{index_stats, index_stats_by_kind, store_size_bytes, CollectionCount, KindCount};
pub use writer::{BuildError, BuildSummary, IndexBuilder};
