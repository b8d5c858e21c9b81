use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

use docsearch_core::ChunkKind;

use crate::schema::CHUNKS_TABLE;
use crate::search::QueryError;
use crate::table::{open_db, store_exists, string_column};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionCount {
    pub collection: String,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindCount {
    pub collection: String,
    pub kind: ChunkKind,
    pub total: usize,
}

/// Chunk counts per `(collection, kind)`, sorted. Absent store: empty.
pub async fn index_stats_by_kind(index_dir: &Path) -> Result<Vec<KindCount>, QueryError> {
    if !store_exists(index_dir).await? {
        return Ok(Vec::new());
    }
    let conn = open_db(index_dir).await?;
    let table = conn.open_table(CHUNKS_TABLE).execute().await?;
    let mut stream = table.query().select(Select::columns(&["collection", "type"])).execute().await?;

    let mut counts: BTreeMap<(String, ChunkKind), usize> = BTreeMap::new();
    while let Some(batch) = stream.try_next().await? {
        let collections = string_column(&batch, "collection").map_err(QueryError::Corrupt)?;
        let kinds = string_column(&batch, "type").map_err(QueryError::Corrupt)?;
        for i in 0..batch.num_rows() {
            let kind = kinds.value(i).parse::<ChunkKind>().map_err(|e| QueryError::Corrupt(e.to_string()))?;
            *counts.entry((collections.value(i).to_string(), kind)).or_default() += 1;
        }
    }
    Ok(counts
        .into_iter()
        .map(|((collection, kind), total)| KindCount { collection, kind, total })
        .collect())
}

/// Chunk counts per collection, sorted by collection. Absent store: empty.
pub async fn index_stats(index_dir: &Path) -> Result<Vec<CollectionCount>, QueryError> {
    let mut out: Vec<CollectionCount> = Vec::new();
    for k in index_stats_by_kind(index_dir).await? {
        match out.last_mut() {
            Some(last) if last.collection == k.collection => last.total += k.total,
            _ => out.push(CollectionCount { collection: k.collection, total: k.total }),
        }
    }
    Ok(out)
}

/// Total size of the files under the store directory.
pub fn store_size_bytes(index_dir: &Path) -> u64 {
    WalkDir::new(index_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
