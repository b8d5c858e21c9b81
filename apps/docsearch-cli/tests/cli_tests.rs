use async_trait::async_trait;
use rmcp::handler::server::wrapper::Parameters;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use docsearch_cli::ingest::{format_report, run_ingest, stats_text};
use docsearch_cli::server::{DocsService, SearchDocsRequest};
use docsearch_core::config::Settings;
use docsearch_core::tokens::WordCounter;
use docsearch_core::traits::ImageDescriber;
use docsearch_core::ChunkKind;
use docsearch_embed::FakeEmbedder;
use docsearch_vector::QueryEngine;

struct ScreenReader;

#[async_trait]
impl ImageDescriber for ScreenReader {
    async fn describe(&self, image: &[u8], _mime_type: &str) -> anyhow::Result<String> {
        if image.starts_with(b"broken") {
            anyhow::bail!("vision API timeout");
        }
        Ok("Invoice screen with a Resend button and a status column.".to_string())
    }
}

fn corpus(tmp: &TempDir) -> Settings {
    let docs = tmp.path().join("docs");
    fs::create_dir_all(docs.join("billing/images")).unwrap();
    fs::create_dir_all(docs.join("hr")).unwrap();
    fs::write(
        docs.join("billing/invoices.md"),
        "# Invoices\n\nTo resend an invoice open the invoice list and click Resend.\n\n## Errors\n\nA login error means the session expired.",
    )
    .unwrap();
    fs::write(docs.join("billing/images/invoice-list.png"), b"\x89PNG fake").unwrap();
    fs::write(docs.join("billing/images/corrupt.png"), b"broken").unwrap();
    fs::write(docs.join("hr/leave.md"), "# Leave\n\nVacation requests are approved by the team lead.").unwrap();

    let mut settings = Settings::default();
    settings.paths.docs_dir = docs.to_string_lossy().into_owned();
    settings.paths.index_dir = tmp.path().join("data/index").to_string_lossy().into_owned();
    settings.embedding.use_fake = true;
    settings
}

fn tool_text(result: &rmcp::model::CallToolResult) -> String {
    let json = serde_json::to_value(result).unwrap();
    json["content"][0]["text"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn ingest_builds_index_and_skips_failing_images() {
    let tmp = TempDir::new().unwrap();
    let settings = corpus(&tmp);
    let counter = WordCounter::default();
    let embedder = FakeEmbedder::default();

    let report = run_ingest(&settings, &counter, &embedder, Some(&ScreenReader), None).await.unwrap();

    assert_eq!(report.markdown_files, 2);
    assert_eq!(report.images_described, 1);
    assert_eq!(report.images_skipped, 1);
    assert_eq!(report.chunks, 3);
    assert!(!report.ann_index);
    let billing_images = report
        .stats
        .iter()
        .find(|s| s.collection == "billing" && s.kind == ChunkKind::ImageDescription)
        .map(|s| s.total);
    assert_eq!(billing_images, Some(1));
    assert!(format_report(&report).contains("TOTAL"));

    let stats = stats_text(&settings.index_dir()).await.unwrap();
    assert!(stats.contains("billing"));
    assert!(stats.contains("Size:"));
}

#[tokio::test]
async fn ingest_without_describer_skips_images_and_filters_collection() {
    let tmp = TempDir::new().unwrap();
    let settings = corpus(&tmp);
    let counter = WordCounter::default();
    let embedder = FakeEmbedder::default();

    let report = run_ingest(&settings, &counter, &embedder, None, Some("hr")).await.unwrap();
    assert_eq!(report.markdown_files, 1);
    assert_eq!(report.images_skipped, 0);
    assert_eq!(report.stats.len(), 1);
    assert_eq!(report.stats[0].collection, "hr");

    let report = run_ingest(&settings, &counter, &embedder, None, Some("billing")).await.unwrap();
    assert_eq!(report.images_skipped, 2);
    assert_eq!(report.images_described, 0);
    assert!(report.stats.iter().all(|s| s.collection == "billing"));
}

#[tokio::test]
async fn ingest_aborts_on_empty_corpus() {
    let tmp = TempDir::new().unwrap();
    let mut settings = Settings::default();
    fs::create_dir_all(tmp.path().join("docs/empty")).unwrap();
    settings.paths.docs_dir = tmp.path().join("docs").to_string_lossy().into_owned();
    settings.paths.index_dir = tmp.path().join("index").to_string_lossy().into_owned();

    let counter = WordCounter::default();
    let result = run_ingest(&settings, &counter, &FakeEmbedder::default(), None, None).await;
    assert!(result.is_err());
    assert!(!tmp.path().join("index").exists());
    assert_eq!(stats_text(&settings.index_dir()).await.unwrap(), "Index not found. Run docsearch-ingest first.");
}

#[tokio::test]
async fn ingest_rejects_embedder_of_wrong_width() {
    let tmp = TempDir::new().unwrap();
    let settings = corpus(&tmp);
    let counter = WordCounter::default();

    let err = run_ingest(&settings, &counter, &FakeEmbedder::new(768), None, None).await.unwrap_err();
    assert!(err.to_string().contains("768-dim"), "{err}");
    assert!(!settings.index_dir().exists());
}

#[tokio::test]
async fn mcp_tools_answer_with_text() {
    let tmp = TempDir::new().unwrap();
    let settings = corpus(&tmp);
    let counter = WordCounter::default();
    let embedder = Arc::new(FakeEmbedder::default());
    run_ingest(&settings, &counter, embedder.as_ref(), Some(&ScreenReader), None).await.unwrap();

    let engine = QueryEngine::new(settings.index_dir(), embedder);
    let service = DocsService::new(Arc::new(engine), &settings.search);

    let request = SearchDocsRequest { query: "resend invoice".into(), collection: Some("billing".into()), top_k: None };
    let text = tool_text(&service.search_docs(Parameters(request)).await.unwrap());
    assert!(text.starts_with("## Results for: resend invoice"), "{text}");
    assert!(!text.contains("- hr ("));

    let request = SearchDocsRequest { query: "x".into(), collection: None, top_k: Some(21) };
    assert!(service.search_docs(Parameters(request)).await.is_err());
    let request = SearchDocsRequest { query: "x".into(), collection: None, top_k: Some(0) };
    assert!(service.search_docs(Parameters(request)).await.is_err());

    let listing = tool_text(&service.list_collections().await.unwrap());
    assert!(listing.contains("- **billing**: 2 indexed chunks"), "{listing}");
    assert!(listing.contains("- **hr**: 1 indexed chunks"));
}

#[tokio::test]
async fn mcp_tools_report_missing_index() {
    let tmp = TempDir::new().unwrap();
    let engine = QueryEngine::new(tmp.path().join("absent"), Arc::new(FakeEmbedder::default()));
    let service = DocsService::new(Arc::new(engine), &Settings::default().search);

    let request = SearchDocsRequest { query: "anything".into(), collection: None, top_k: Some(3) };
    let text = tool_text(&service.search_docs(Parameters(request)).await.unwrap());
    assert!(text.contains("index not found"), "{text}");
    assert!(tool_text(&service.list_collections().await.unwrap()).contains("index not found"));
}
