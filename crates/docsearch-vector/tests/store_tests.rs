use std::sync::Arc;

use arrow_array::RecordBatch;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use tempfile::TempDir;

use docsearch_core::traits::Embedder;
use docsearch_core::{ChunkKind, ChunkRecord, EMBEDDING_DIM};
use docsearch_embed::{embed_chunks, FakeEmbedder};
use docsearch_vector::schema::{EMBEDDINGS_TABLE, EMBEDDING_COLUMN};
use docsearch_vector::search::INDEX_NOT_FOUND_MESSAGE;
use docsearch_vector::table::{embedding_column, int64_column, open_db};
use docsearch_vector::{
    decode_embedding, index_stats, index_stats_by_kind, store_size_bytes, BuildError, CollectionCount, IndexBuilder,
    QueryEngine, QueryError, SearchOutcome,
};

/// Unit vector at angle `theta` from the first axis, in the plane of the first two.
fn at_angle(theta: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[0] = theta.cos();
    v[1] = theta.sin();
    v
}

/// Always answers with the first axis, so stored vectors rank by angle.
struct AxisEmbedder;

impl Embedder for AxisEmbedder {
    fn dim(&self) -> usize { EMBEDDING_DIM }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| at_angle(0.0)).collect())
    }
}

struct BrokenEmbedder;

impl Embedder for BrokenEmbedder {
    fn dim(&self) -> usize { EMBEDDING_DIM }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> { anyhow::bail!("model unavailable") }
}

/// `(collection, kind)` per record, laid out at increasing angles in that order.
fn corpus(layout: &[(&str, usize)]) -> Vec<ChunkRecord> {
    let mut out = Vec::new();
    for (collection, count) in layout {
        for _ in 0..*count {
            let n = out.len();
            let kind = if n % 5 == 4 { ChunkKind::ImageDescription } else { ChunkKind::Markdown };
            out.push(
                ChunkRecord::new(format!("{collection} passage {n}"), format!("doc{n}.md"), *collection, 0, kind)
                    .with_embedding(at_angle(0.01 * (n + 1) as f32)),
            );
        }
    }
    out
}

async fn build(dir: &std::path::Path, records: &[ChunkRecord]) {
    IndexBuilder::new(dir).with_progress(false).build(records).await.expect("build index");
}

#[tokio::test]
async fn filtered_search_returns_only_matching_collection_without_padding() {
    let tmp = TempDir::new().unwrap();
    let index_dir = tmp.path().join("index");
    build(&index_dir, &corpus(&[("general", 10), ("billing", 2), ("general", 40)])).await;

    let engine = QueryEngine::new(&index_dir, Arc::new(AxisEmbedder));
    let outcome = engine.search("login error", Some("billing"), 3).await.unwrap();

    let hits = outcome.hits();
    assert_eq!(hits.len(), 2, "two billing chunks exist, never padded to three");
    assert!(hits.iter().all(|h| h.collection == "billing"));
    assert!(hits[0].distance <= hits[1].distance);

    let text = engine.search_docs("login error", Some("billing"), 3).await;
    assert!(text.contains("### [1] doc10.md - billing"));
    assert!(text.contains("### [2] doc11.md - billing"));
    assert!(!text.contains("[3]"));
}

#[tokio::test]
async fn unfiltered_search_ranks_by_ascending_distance() {
    let tmp = TempDir::new().unwrap();
    let index_dir = tmp.path().join("index");
    build(&index_dir, &corpus(&[("general", 8), ("hr", 4)])).await;

    let engine = QueryEngine::new(&index_dir, Arc::new(AxisEmbedder));
    let outcome = engine.search("anything", None, 3).await.unwrap();

    let files: Vec<_> = outcome.hits().iter().map(|h| h.source_file.as_str()).collect();
    assert_eq!(files, vec!["doc0.md", "doc1.md", "doc2.md"]);
    for pair in outcome.hits().windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
    let first = &outcome.hits()[0];
    assert!((first.distance - (1.0 - 0.01f32.cos())).abs() < 1e-4);
    assert!(first.similarity() > 99.0);
}

#[tokio::test]
async fn sparse_collection_beyond_overfetch_yields_no_results() {
    let tmp = TempDir::new().unwrap();
    let index_dir = tmp.path().join("index");
    build(&index_dir, &corpus(&[("general", 20), ("hr", 1)])).await;

    let engine = QueryEngine::new(&index_dir, Arc::new(AxisEmbedder)).with_overfetch_factor(10);
    let outcome = engine.search("vacation policy", Some("hr"), 1).await.unwrap();
    assert_eq!(
        outcome,
        SearchOutcome::NoResults { query: "vacation policy".into(), collection: Some("hr".into()) }
    );

    let wide = QueryEngine::new(&index_dir, Arc::new(AxisEmbedder)).with_overfetch_factor(25);
    assert_eq!(wide.search("vacation policy", Some("hr"), 1).await.unwrap().hits().len(), 1);
}

#[tokio::test]
async fn missing_store_is_reported_not_raised() {
    let tmp = TempDir::new().unwrap();
    let index_dir = tmp.path().join("never-built");
    let engine = QueryEngine::new(&index_dir, Arc::new(AxisEmbedder));

    assert!(matches!(engine.search("q", None, 5).await, Err(QueryError::IndexNotFound(_))));
    assert_eq!(engine.search_docs("q", None, 5).await, INDEX_NOT_FOUND_MESSAGE);
    assert_eq!(engine.list_collections().await, INDEX_NOT_FOUND_MESSAGE);
    assert!(index_stats(&index_dir).await.unwrap().is_empty());
}

#[tokio::test]
async fn embedding_failure_becomes_message() {
    let tmp = TempDir::new().unwrap();
    let index_dir = tmp.path().join("index");
    build(&index_dir, &corpus(&[("general", 3)])).await;

    let engine = QueryEngine::new(&index_dir, Arc::new(BrokenEmbedder));
    let text = engine.search_docs("q", None, 5).await;
    assert!(text.starts_with("Error processing the query"), "{text}");
    assert!(text.contains("model unavailable"));
}

#[tokio::test]
async fn rebuild_replaces_store_and_is_repeatable() {
    let tmp = TempDir::new().unwrap();
    let index_dir = tmp.path().join("data").join("index");
    let records = corpus(&[("billing", 3), ("hr", 2), ("general", 6)]);

    build(&index_dir, &records).await;
    let first = index_stats(&index_dir).await.unwrap();
    build(&index_dir, &records).await;
    let second = index_stats(&index_dir).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        first,
        vec![
            CollectionCount { collection: "billing".into(), total: 3 },
            CollectionCount { collection: "general".into(), total: 6 },
            CollectionCount { collection: "hr".into(), total: 2 },
        ]
    );
    assert!(!tmp.path().join("data").join("index.building").exists());
    assert!(!tmp.path().join("data").join("index.old").exists());
    assert!(store_size_bytes(&index_dir) > 0);

    build(&index_dir, &corpus(&[("hr", 1)])).await;
    assert_eq!(index_stats(&index_dir).await.unwrap(), vec![CollectionCount { collection: "hr".into(), total: 1 }]);
}

#[tokio::test]
async fn stats_split_by_kind() {
    let tmp = TempDir::new().unwrap();
    let index_dir = tmp.path().join("index");
    build(&index_dir, &corpus(&[("billing", 5)])).await;

    let by_kind = index_stats_by_kind(&index_dir).await.unwrap();
    assert_eq!(by_kind.len(), 2);
    assert_eq!((by_kind[0].kind, by_kind[0].total), (ChunkKind::Markdown, 4));
    assert_eq!((by_kind[1].kind, by_kind[1].total), (ChunkKind::ImageDescription, 1));

    let engine = QueryEngine::new(&index_dir, Arc::new(AxisEmbedder));
    let listing = engine.list_collections().await;
    assert!(listing.contains("- **billing**: 5 indexed chunks"));
}

#[tokio::test]
async fn invalid_records_abort_before_touching_disk() {
    let tmp = TempDir::new().unwrap();
    let index_dir = tmp.path().join("index");
    let builder = IndexBuilder::new(&index_dir).with_progress(false);

    assert!(matches!(builder.build(&[]).await, Err(BuildError::Empty)));

    let mut records = corpus(&[("billing", 2)]);
    records[1].embedding = Some(vec![0.5; EMBEDDING_DIM + 1]);
    assert!(matches!(
        builder.build(&records).await,
        Err(BuildError::DimensionMismatch { position: 1, actual, .. }) if actual == EMBEDDING_DIM + 1
    ));
    records[1].embedding = None;
    assert!(matches!(builder.build(&records).await, Err(BuildError::MissingEmbedding { position: 1, .. })));

    assert!(!index_dir.exists());
    assert!(!tmp.path().join("index.building").exists());
}

#[tokio::test]
async fn stored_embeddings_decode_to_the_input() {
    let tmp = TempDir::new().unwrap();
    let index_dir = tmp.path().join("index");
    let records = corpus(&[("billing", 3)]);
    build(&index_dir, &records).await;

    let conn = open_db(&index_dir).await.unwrap();
    let table = conn.open_table(EMBEDDINGS_TABLE).execute().await.unwrap();
    let batches: Vec<RecordBatch> = table.query().only_if("id = 2").execute().await.unwrap().try_collect().await.unwrap();

    assert_eq!(batches.iter().map(RecordBatch::num_rows).sum::<usize>(), 1);
    let batch = batches.iter().find(|b| b.num_rows() == 1).unwrap();
    assert_eq!(int64_column(batch, "id").unwrap().value(0), 2);
    let column = embedding_column(batch, EMBEDDING_COLUMN).unwrap();
    assert_eq!(Some(decode_embedding(column, 0)), records[1].embedding);
}

#[tokio::test]
async fn fake_embedder_end_to_end_finds_identical_text() {
    let tmp = TempDir::new().unwrap();
    let index_dir = tmp.path().join("index");
    let texts = ["how to resend an invoice", "approving vacation requests", "login error after password reset"];
    let records: Vec<ChunkRecord> = texts
        .iter()
        .enumerate()
        .map(|(i, t)| ChunkRecord::new(*t, format!("page{i}.md"), "docs", 0, ChunkKind::Markdown))
        .collect();
    let embedder = Arc::new(FakeEmbedder::default());
    let records = embed_chunks(embedder.as_ref(), records, 2).unwrap();
    build(&index_dir, &records).await;

    let engine = QueryEngine::new(&index_dir, embedder);
    let outcome = engine.search("login error after password reset", None, 1).await.unwrap();

    assert_eq!(outcome.hits()[0].source_file, "page2.md");
    assert!(outcome.hits()[0].distance.abs() < 1e-4);
}

/// Trains the IVF_PQ index; slow, run with `cargo test -p docsearch-vector -- --ignored`.
#[ignore]
#[tokio::test]
async fn large_store_gets_ann_index() {
    let tmp = TempDir::new().unwrap();
    let index_dir = tmp.path().join("index");
    let records: Vec<ChunkRecord> = (0..600)
        .map(|n| {
            let mut v = vec![0.0f32; EMBEDDING_DIM];
            v[n % EMBEDDING_DIM] = 1.0;
            v[(n * 7 + 3) % EMBEDDING_DIM] += 0.5;
            ChunkRecord::new(format!("passage {n}"), format!("doc{n}.md"), "bulk", 0, ChunkKind::Markdown).with_embedding(v)
        })
        .collect();

    let summary = IndexBuilder::new(&index_dir).with_progress(false).with_ann_min_rows(500).build(&records).await.unwrap();
    assert!(summary.ann_index);
    assert_eq!(summary.rows, 600);

    let engine = QueryEngine::new(&index_dir, Arc::new(AxisEmbedder));
    assert_eq!(engine.search("q", None, 5).await.unwrap().hits().len(), 5);
}
