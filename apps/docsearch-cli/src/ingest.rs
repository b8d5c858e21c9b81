//! Full ingestion run: discover, chunk, describe, embed, build.
use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use docsearch_core::chunker::MarkdownChunker;
use docsearch_core::config::Settings;
use docsearch_core::sources::collect_sources;
use docsearch_core::traits::{Embedder, ImageDescriber, TokenCounter};
use docsearch_core::ChunkRecord;
use docsearch_embed::{check_dimension, embed_chunks};
use docsearch_vector::{index_stats, index_stats_by_kind, store_size_bytes, IndexBuilder, KindCount};
use docsearch_vision::describe_image;

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub markdown_files: usize,
    pub images_described: usize,
    pub images_skipped: usize,
    pub chunks: usize,
    pub ann_index: bool,
    pub stats: Vec<KindCount>,
    pub elapsed: Duration,
}

/// Rebuilds the index at `settings.index_dir()` from the documentation root.
///
/// With `collection`, only that collection is read and the rebuilt index holds
/// only its chunks. Image failures are logged and skipped; anything else aborts
/// the run and leaves the previous index in place.
pub async fn run_ingest(
    settings: &Settings,
    counter: &dyn TokenCounter,
    embedder: &dyn Embedder,
    describer: Option<&dyn ImageDescriber>,
    collection: Option<&str>,
) -> Result<IngestReport> {
    let start = Instant::now();
    check_dimension(embedder)?;
    let docs_dir = settings.docs_dir();
    let sources = collect_sources(&docs_dir, collection)?;
    if sources.is_empty() {
        bail!("no documents found in {}", docs_dir.display());
    }
    info!(markdowns = sources.markdowns.len(), images = sources.images.len(), "files found");

    let chunker = MarkdownChunker::new(settings.chunking.chunking_config(), counter);
    let mut chunks: Vec<ChunkRecord> = Vec::new();
    for md in &sources.markdowns {
        let file_chunks = chunker.chunk_file(md).with_context(|| format!("chunking {}", md.display()))?;
        info!(file = %md.display(), chunks = file_chunks.len(), "markdown chunked");
        chunks.extend(file_chunks);
    }

    let mut images_described = 0usize;
    let mut images_skipped = 0usize;
    match describer {
        Some(describer) => {
            for img in &sources.images {
                match describe_image(describer, img).await {
                    Ok(chunk) => {
                        images_described += 1;
                        chunks.push(chunk);
                    }
                    Err(e) => {
                        images_skipped += 1;
                        warn!(file = %img.display(), error = %e, "skipping image");
                    }
                }
            }
        }
        None if !sources.images.is_empty() => {
            images_skipped = sources.images.len();
            warn!(images = images_skipped, "no image describer configured, skipping screenshots");
        }
        None => {}
    }

    if chunks.is_empty() {
        bail!("no chunks generated, aborting");
    }
    let total = chunks.len();
    info!(chunks = total, "generating embeddings");
    let embedded = embed_chunks(embedder, chunks, settings.embedding.batch_size)?;

    info!("building index");
    let summary = IndexBuilder::new(settings.index_dir())
        .with_ann_min_rows(settings.index.ann_min_rows)
        .build(&embedded)
        .await?;
    let stats = index_stats_by_kind(&settings.index_dir()).await?;
    let report = IngestReport {
        markdown_files: sources.markdowns.len(),
        images_described,
        images_skipped,
        chunks: summary.rows,
        ann_index: summary.ann_index,
        stats,
        elapsed: start.elapsed(),
    };
    for line in format_report(&report).lines() {
        info!("{line}");
    }
    Ok(report)
}

pub fn format_report(report: &IngestReport) -> String {
    let rule = "-".repeat(50);
    let mut out = format!("{rule}\nINGESTION COMPLETE\n{rule}\n");
    for s in &report.stats {
        let _ = writeln!(out, "  {:<30} {:<18} {:>5} chunks", s.collection, s.kind.as_str(), s.total);
    }
    let _ = writeln!(out, "  {:<30} {:<18} {:>5} chunks", "TOTAL", "", report.chunks);
    if report.images_skipped > 0 {
        let _ = writeln!(out, "  images skipped: {}", report.images_skipped);
    }
    let _ = writeln!(out, "  total time: {:.1}s", report.elapsed.as_secs_f64());
    out.push_str(&rule);
    out
}

/// Text for `docsearch-ingest --stats`.
pub async fn stats_text(index_dir: &Path) -> Result<String> {
    if !index_dir.exists() {
        return Ok("Index not found. Run docsearch-ingest first.".to_string());
    }
    let stats = index_stats(index_dir).await?;
    if stats.is_empty() {
        return Ok("Index is empty.".to_string());
    }
    let rule = "-".repeat(40);
    let mut out = format!("\nCurrent index statistics:\n{rule}\n");
    for s in &stats {
        let _ = writeln!(out, "  {:<28} {:>5} chunks", s.collection, s.total);
    }
    let total: usize = stats.iter().map(|s| s.total).sum();
    let _ = writeln!(out, "  {:<28} {:>5} chunks", "TOTAL", total);
    let _ = writeln!(out, "\n  Path: {}", index_dir.display());
    let _ = writeln!(out, "  Size: {:.1} MB", store_size_bytes(index_dir) as f64 / 1024.0 / 1024.0);
    out.push_str(&rule);
    Ok(out)
}
