//! Nearest-neighbour queries over a published store.
//!
//! Without a collection filter the engine asks the vector index for exactly
//! `top_k` neighbours. With one it over-fetches `top_k * overfetch_factor`
//! candidates, drops other collections and truncates, so a sparse collection
//! can yield fewer than `top_k` hits.
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::DistanceType;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use docsearch_core::traits::Embedder;
use docsearch_core::{ChunkKind, EMBEDDING_DIM};

use crate::schema::{CHUNKS_TABLE, EMBEDDINGS_TABLE, EMBEDDING_COLUMN};
use crate::stats::{index_stats, CollectionCount};
use crate::table::{float32_column, int32_column, int64_column, open_db, store_exists, string_column};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("search index not found at {}", .0.display())]
    IndexNotFound(PathBuf),

    #[error("top_k must be at least 1")]
    InvalidTopK,

    #[error("{0}")]
    Embedding(String),

    #[error("query embedding has {actual} values, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Store(#[from] lancedb::Error),

    #[error("corrupt index: {0}")]
    Corrupt(String),
}

pub const INDEX_NOT_FOUND_MESSAGE: &str = "Documentation index not found. Run docsearch-ingest first.";

/// One stored chunk returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub text: String,
    pub source_file: String,
    pub collection: String,
    pub chunk_index: usize,
    pub kind: ChunkKind,
    /// Cosine distance to the query, ascending across a result list.
    pub distance: f32,
}

impl SearchHit {
    /// `(1 - distance)` as a percentage, one decimal.
    pub fn similarity(&self) -> f64 { ((1.0 - f64::from(self.distance)) * 1000.0).round() / 10.0 }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Results { query: String, hits: Vec<SearchHit> },
    NoResults { query: String, collection: Option<String> },
}

impl SearchOutcome {
    pub fn hits(&self) -> &[SearchHit] {
        match self {
            Self::Results { hits, .. } => hits,
            Self::NoResults { .. } => &[],
        }
    }

    /// Human-readable listing, ranks starting at 1.
    pub fn render(&self) -> String {
        match self {
            Self::NoResults { query, collection } => {
                let mut msg = format!("No results found for '{query}'");
                if let Some(c) = collection {
                    let _ = write!(msg, " in collection '{c}'");
                }
                msg
            }
            Self::Results { query, hits } => {
                let mut parts = vec![format!("## Results for: {query}\n")];
                for (i, hit) in hits.iter().enumerate() {
                    parts.push(format!(
                        "### [{}] {} - {} ({}, {:.1}% relevance)\n\n{}",
                        i + 1,
                        hit.source_file,
                        hit.collection,
                        hit.kind.label(),
                        hit.similarity(),
                        hit.text
                    ));
                }
                parts.join("\n\n---\n\n")
            }
        }
    }
}

pub struct QueryEngine {
    index_dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    overfetch_factor: usize,
}

impl QueryEngine {
    pub fn new(index_dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index_dir: index_dir.into(), embedder, overfetch_factor: 10 }
    }

    pub fn with_overfetch_factor(mut self, factor: usize) -> Self {
        self.overfetch_factor = factor.max(1);
        self
    }

    /// Typed query. An empty `collection` counts as no filter.
    pub async fn search(&self, query: &str, collection: Option<&str>, top_k: usize) -> Result<SearchOutcome, QueryError> {
        if top_k == 0 {
            return Err(QueryError::InvalidTopK);
        }
        let collection = collection.filter(|c| !c.is_empty());
        if !store_exists(&self.index_dir).await? {
            return Err(QueryError::IndexNotFound(self.index_dir.clone()));
        }

        let vector = self.embedder.embed_one(query).map_err(|e| QueryError::Embedding(e.to_string()))?;
        if vector.len() != EMBEDDING_DIM {
            return Err(QueryError::DimensionMismatch { expected: EMBEDDING_DIM, actual: vector.len() });
        }

        let candidates = if collection.is_some() { top_k.saturating_mul(self.overfetch_factor) } else { top_k };
        let conn = open_db(&self.index_dir).await?;
        let neighbours = nearest(&conn, vector, candidates).await?;
        let mut hits = join_chunks(&conn, &neighbours).await?;

        if let Some(c) = collection {
            hits.retain(|h| h.collection == c);
        }
        hits.truncate(top_k);
        info!(query, collection, top_k, candidates, returned = hits.len(), "search");

        if hits.is_empty() {
            return Ok(SearchOutcome::NoResults { query: query.to_string(), collection: collection.map(str::to_string) });
        }
        Ok(SearchOutcome::Results { query: query.to_string(), hits })
    }

    /// Search rendered as text. Failures become messages, never errors.
    pub async fn search_docs(&self, query: &str, collection: Option<&str>, top_k: usize) -> String {
        match self.search(query, collection, top_k).await {
            Ok(outcome) => outcome.render(),
            Err(QueryError::IndexNotFound(_)) => INDEX_NOT_FOUND_MESSAGE.to_string(),
            Err(e @ (QueryError::Embedding(_) | QueryError::DimensionMismatch { .. } | QueryError::InvalidTopK)) => {
                error!(error = %e, "query rejected");
                format!("Error processing the query: {e}")
            }
            Err(e) => {
                error!(error = %e, "index query failed");
                format!("Error querying the index: {e}")
            }
        }
    }

    /// Per-collection chunk counts rendered as text.
    pub async fn list_collections(&self) -> String {
        match store_exists(&self.index_dir).await {
            Ok(true) => {}
            Ok(false) => return INDEX_NOT_FOUND_MESSAGE.to_string(),
            Err(e) => return format!("Error querying the index: {e}"),
        }
        match index_stats(&self.index_dir).await {
            Ok(stats) => render_collections(&stats),
            Err(e) => {
                error!(error = %e, "listing collections failed");
                format!("Error querying the index: {e}")
            }
        }
    }
}

pub fn render_collections(stats: &[CollectionCount]) -> String {
    if stats.is_empty() {
        return "Index is empty: no collections found.".to_string();
    }
    let total: usize = stats.iter().map(|s| s.total).sum();
    let mut lines = vec!["## Available documentation collections\n".to_string()];
    lines.extend(stats.iter().map(|s| format!("- **{}**: {} indexed chunks", s.collection, s.total)));
    lines.push(format!("\n_Total: {total} chunks in {} collections._", stats.len()));
    lines.join("\n")
}

async fn nearest(conn: &lancedb::Connection, vector: Vec<f32>, limit: usize) -> Result<Vec<(i64, f32)>, QueryError> {
    let table = conn.open_table(EMBEDDINGS_TABLE).execute().await?;
    let mut stream = table
        .vector_search(vector)?
        .column(EMBEDDING_COLUMN)
        .distance_type(DistanceType::Cosine)
        .select(Select::columns(&["id"]))
        .limit(limit)
        .execute()
        .await?;

    let mut out = Vec::new();
    while let Some(batch) = stream.try_next().await? {
        let ids = int64_column(&batch, "id").map_err(QueryError::Corrupt)?;
        let distances = float32_column(&batch, "_distance").map_err(QueryError::Corrupt)?;
        out.extend((0..batch.num_rows()).map(|i| (ids.value(i), distances.value(i))));
    }
    out.sort_by(|a, b| a.1.total_cmp(&b.1));
    Ok(out)
}

/// Looks up the chunk rows for `neighbours`, keeping their order.
async fn join_chunks(conn: &lancedb::Connection, neighbours: &[(i64, f32)]) -> Result<Vec<SearchHit>, QueryError> {
    if neighbours.is_empty() {
        return Ok(Vec::new());
    }
    let id_list = neighbours.iter().map(|(id, _)| id.to_string()).collect::<Vec<_>>().join(",");
    let table = conn.open_table(CHUNKS_TABLE).execute().await?;
    let mut stream = table.query().only_if(format!("id IN ({id_list})")).execute().await?;

    let mut rows: HashMap<i64, SearchHit> = HashMap::with_capacity(neighbours.len());
    while let Some(batch) = stream.try_next().await? {
        let ids = int64_column(&batch, "id").map_err(QueryError::Corrupt)?;
        let texts = string_column(&batch, "text").map_err(QueryError::Corrupt)?;
        let files = string_column(&batch, "source_file").map_err(QueryError::Corrupt)?;
        let collections = string_column(&batch, "collection").map_err(QueryError::Corrupt)?;
        let indexes = int32_column(&batch, "chunk_index").map_err(QueryError::Corrupt)?;
        let kinds = string_column(&batch, "type").map_err(QueryError::Corrupt)?;
        for i in 0..batch.num_rows() {
            let kind = kinds.value(i).parse::<ChunkKind>().map_err(|e| QueryError::Corrupt(e.to_string()))?;
            rows.insert(
                ids.value(i),
                SearchHit {
                    text: texts.value(i).to_string(),
                    source_file: files.value(i).to_string(),
                    collection: collections.value(i).to_string(),
                    chunk_index: usize::try_from(indexes.value(i)).unwrap_or_default(),
                    kind,
                    distance: 0.0,
                },
            );
        }
    }

    Ok(neighbours
        .iter()
        .filter_map(|(id, distance)| rows.remove(id).map(|hit| SearchHit { distance: *distance, ..hit }))
        .collect())
}
