use anyhow::{ensure, Result};
use tracing::debug;

use docsearch_core::traits::Embedder;
use docsearch_core::ChunkRecord;

/// Attaches an embedding to every chunk, calling the embedder `batch_size`
/// texts at a time. Order is preserved.
pub fn embed_chunks(embedder: &dyn Embedder, mut chunks: Vec<ChunkRecord>, batch_size: usize) -> Result<Vec<ChunkRecord>> {
    ensure!(batch_size > 0, "batch_size must be positive");
    let total = chunks.len();
    for (n, batch) in chunks.chunks_mut(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts)?;
        ensure!(
            vectors.len() == batch.len(),
            "embedder returned {} vectors for {} texts",
            vectors.len(),
            batch.len()
        );
        for (chunk, vector) in batch.iter_mut().zip(vectors) {
            chunk.embedding = Some(vector);
        }
        debug!(batch = n + 1, done = (n * batch_size + batch.len()), total, "embedded chunk batch");
    }
    Ok(chunks)
}
