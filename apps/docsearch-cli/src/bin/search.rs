use anyhow::Result;
use clap::Parser;

use docsearch_cli::init_tracing;
use docsearch_core::config::Config;
use docsearch_embed::get_default_embedder;
use docsearch_vector::QueryEngine;

/// Query the documentation index from the command line.
#[derive(Debug, Parser)]
#[command(name = "docsearch-search", version)]
struct Args {
    /// Question or search terms
    query: String,

    /// Only return chunks from this collection
    #[arg(long)]
    collection: Option<String>,

    /// Number of results (defaults to search.default_top_k)
    #[arg(long = "top-k")]
    top_k: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let settings = Config::load()?.settings()?;

    let embedder = get_default_embedder(&settings)?;
    let engine = QueryEngine::new(settings.index_dir(), embedder).with_overfetch_factor(settings.search.overfetch_factor);
    let top_k = args.top_k.unwrap_or(settings.search.default_top_k);
    println!("{}", engine.search_docs(&args.query, args.collection.as_deref(), top_k).await);
    Ok(())
}
