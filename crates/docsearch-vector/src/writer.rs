//! Full rebuild of the store from embedded chunk records.
//!
//! Rows are written into a staging directory next to the target, then the
//! staging directory replaces the published store with two renames, so
//! readers only ever see a complete store or the previous one.
use arrow_array::{Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::ArrowError;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use docsearch_core::{ChunkRecord, EMBEDDING_DIM};

use crate::index_build::{build_ivfpq_index, compute_ivfpq_params};
use crate::schema::{chunks_schema, embeddings_schema, encode_embeddings, CHUNKS_TABLE, EMBEDDINGS_TABLE};
use crate::table::open_db;

/// Rows per Arrow record batch.
pub const WRITE_BATCH_ROWS: usize = 1000;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no chunks to index")]
    Empty,

    #[error("chunk {position} ({source_file} #{chunk_index}) has no embedding")]
    MissingEmbedding { position: usize, source_file: String, chunk_index: usize },

    #[error("chunk {position} ({source_file} #{chunk_index}) has an embedding of {actual} values, expected {expected}")]
    DimensionMismatch { position: usize, source_file: String, chunk_index: usize, expected: usize, actual: usize },

    #[error("chunk {position} ({source_file} #{chunk_index}) has an index beyond the Int32 column range")]
    ChunkIndexOverflow { position: usize, source_file: String, chunk_index: usize },

    #[error("invalid index path {0}")]
    InvalidPath(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] lancedb::Error),

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

impl BuildError {
    fn io(path: &Path, source: std::io::Error) -> Self { Self::Io { path: path.to_path_buf(), source } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub rows: usize,
    pub ann_index: bool,
}

pub struct IndexBuilder {
    index_dir: PathBuf,
    ann_min_rows: usize,
    show_progress: bool,
}

impl IndexBuilder {
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self { index_dir: index_dir.into(), ann_min_rows: 5000, show_progress: true }
    }

    pub fn with_ann_min_rows(mut self, rows: usize) -> Self {
        self.ann_min_rows = rows;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Replaces the store at `index_dir` with exactly `chunks`, ids 1..=N in order.
    pub async fn build(&self, chunks: &[ChunkRecord]) -> Result<BuildSummary, BuildError> {
        let vectors = validate(chunks)?;
        let target: PathBuf = self.index_dir.components().collect();
        let staging = sibling(&target, ".building")?;
        let previous = sibling(&target, ".old")?;

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| BuildError::io(parent, e))?;
        }
        remove_dir_if_exists(&staging).await?;

        info!(rows = chunks.len(), staging = %staging.display(), "writing index");
        let ann_index = self.write_tables(&staging, chunks, &vectors).await?;

        remove_dir_if_exists(&previous).await?;
        if tokio::fs::try_exists(&target).await.map_err(|e| BuildError::io(&target, e))? {
            tokio::fs::rename(&target, &previous).await.map_err(|e| BuildError::io(&target, e))?;
        }
        tokio::fs::rename(&staging, &target).await.map_err(|e| BuildError::io(&staging, e))?;
        remove_dir_if_exists(&previous).await?;
        info!(rows = chunks.len(), ann_index, index_dir = %target.display(), "index published");

        Ok(BuildSummary { rows: chunks.len(), ann_index })
    }

    async fn write_tables(&self, dir: &Path, chunks: &[ChunkRecord], vectors: &[&[f32]]) -> Result<bool, BuildError> {
        let pb = if self.show_progress { ProgressBar::new(chunks.len() as u64) } else { ProgressBar::hidden() };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut chunk_batches = Vec::new();
        let mut embedding_batches = Vec::new();
        for (n, (records, vecs)) in chunks.chunks(WRITE_BATCH_ROWS).zip(vectors.chunks(WRITE_BATCH_ROWS)).enumerate() {
            let first_id = (n * WRITE_BATCH_ROWS) as i64 + 1;
            let ids: Vec<i64> = (first_id..first_id + records.len() as i64).collect();
            chunk_batches.push(chunks_batch(&ids, records));
            embedding_batches.push(embeddings_batch(&ids, vecs));
            pb.inc(records.len() as u64);
            debug!(batch = n + 1, rows = records.len(), "encoded record batch");
        }

        let conn = open_db(dir).await?;
        pb.set_message("writing chunks");
        let reader = RecordBatchIterator::new(chunk_batches.into_iter(), chunks_schema());
        conn.create_table(CHUNKS_TABLE, Box::new(reader)).execute().await?;
        pb.set_message("writing embeddings");
        let reader = RecordBatchIterator::new(embedding_batches.into_iter(), embeddings_schema());
        conn.create_table(EMBEDDINGS_TABLE, Box::new(reader)).execute().await?;
        pb.finish_with_message("tables written");

        let ann_index = chunks.len() >= self.ann_min_rows;
        if ann_index {
            let params = compute_ivfpq_params(chunks.len(), EMBEDDING_DIM);
            build_ivfpq_index(&conn, &params).await?;
        }
        Ok(ann_index)
    }
}

/// Checks every record before anything touches disk.
fn validate(chunks: &[ChunkRecord]) -> Result<Vec<&[f32]>, BuildError> {
    if chunks.is_empty() {
        return Err(BuildError::Empty);
    }
    chunks
        .iter()
        .enumerate()
        .map(|(position, c)| match c.embedding.as_deref() {
            _ if i32::try_from(c.chunk_index).is_err() => Err(BuildError::ChunkIndexOverflow {
                position,
                source_file: c.source_file.clone(),
                chunk_index: c.chunk_index,
            }),
            None => Err(BuildError::MissingEmbedding {
                position,
                source_file: c.source_file.clone(),
                chunk_index: c.chunk_index,
            }),
            Some(v) if v.len() != EMBEDDING_DIM => Err(BuildError::DimensionMismatch {
                position,
                source_file: c.source_file.clone(),
                chunk_index: c.chunk_index,
                expected: EMBEDDING_DIM,
                actual: v.len(),
            }),
            Some(v) => Ok(v),
        })
        .collect()
}

fn chunks_batch(ids: &[i64], records: &[ChunkRecord]) -> Result<RecordBatch, ArrowError> {
    let indexes = records
        .iter()
        .map(|c| i32::try_from(c.chunk_index).map_err(|e| ArrowError::InvalidArgumentError(format!("chunk_index: {e}"))))
        .collect::<Result<Vec<i32>, _>>()?;
    RecordBatch::try_new(
        chunks_schema(),
        vec![
            Arc::new(Int64Array::from(ids.to_vec())),
            Arc::new(StringArray::from_iter_values(records.iter().map(|c| c.text.as_str()))),
            Arc::new(StringArray::from_iter_values(records.iter().map(|c| c.source_file.as_str()))),
            Arc::new(StringArray::from_iter_values(records.iter().map(|c| c.collection.as_str()))),
            Arc::new(Int32Array::from(indexes)),
            Arc::new(StringArray::from_iter_values(records.iter().map(|c| c.kind.as_str()))),
        ],
    )
}

fn embeddings_batch(ids: &[i64], vectors: &[&[f32]]) -> Result<RecordBatch, ArrowError> {
    RecordBatch::try_new(
        embeddings_schema(),
        vec![Arc::new(Int64Array::from(ids.to_vec())), Arc::new(encode_embeddings(vectors)?)],
    )
}

fn sibling(path: &Path, suffix: &str) -> Result<PathBuf, BuildError> {
    let name = path.file_name().ok_or_else(|| BuildError::InvalidPath(path.to_path_buf()))?;
    let mut sibling = name.to_os_string();
    sibling.push(suffix);
    Ok(path.with_file_name(sibling))
}

async fn remove_dir_if_exists(path: &Path) -> Result<(), BuildError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BuildError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsearch_core::ChunkKind;

    fn record(embedding: Option<Vec<f32>>) -> ChunkRecord {
        let r = ChunkRecord::new("text", "a.md", "billing", 3, ChunkKind::Markdown);
        match embedding {
            Some(v) => r.with_embedding(v),
            None => r,
        }
    }

    #[test]
    fn validation_reports_first_bad_record() {
        assert!(matches!(validate(&[]), Err(BuildError::Empty)));

        let good = record(Some(vec![0.0; EMBEDDING_DIM]));
        assert!(matches!(
            validate(&[good.clone(), record(None)]),
            Err(BuildError::MissingEmbedding { position: 1, chunk_index: 3, .. })
        ));
        assert!(matches!(
            validate(&[record(Some(vec![0.0; 10])), good.clone()]),
            Err(BuildError::DimensionMismatch { position: 0, actual: 10, .. })
        ));
        assert_eq!(validate(&[good.clone(), good.clone()]).unwrap().len(), 2);

        let mut huge = good;
        huge.chunk_index = i32::MAX as usize + 1;
        assert!(matches!(validate(&[huge]), Err(BuildError::ChunkIndexOverflow { position: 0, .. })));
    }

    #[test]
    fn staging_paths_are_siblings() {
        let target = Path::new("data/index");
        assert_eq!(sibling(target, ".building").unwrap(), PathBuf::from("data/index.building"));
        assert!(sibling(Path::new("/"), ".old").is_err());
    }
}
