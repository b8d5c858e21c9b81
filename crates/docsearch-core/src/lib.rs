pub mod chunker;
pub mod config;
pub mod error;
pub mod sources;
pub mod tokens;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use types::{ChunkKind, ChunkRecord, EMBEDDING_DIM};
