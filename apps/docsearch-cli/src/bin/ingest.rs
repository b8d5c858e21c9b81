use anyhow::Result;
use clap::Parser;
use tracing::warn;

use docsearch_cli::ingest::{run_ingest, stats_text};
use docsearch_cli::init_tracing;
use docsearch_core::config::Config;
use docsearch_core::traits::ImageDescriber;
use docsearch_embed::{get_default_embedder, token_counter};
use docsearch_vision::OpenAiDescriber;

/// Rebuild the documentation search index.
#[derive(Debug, Parser)]
#[command(name = "docsearch-ingest", version)]
struct Args {
    /// Only ingest this collection (the rebuilt index holds only its chunks)
    #[arg(long)]
    collection: Option<String>,

    /// Print statistics of the current index and exit
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let settings = Config::load()?.settings()?;

    if args.stats {
        println!("{}", stats_text(&settings.index_dir()).await?);
        return Ok(());
    }

    let counter = token_counter(&settings)?;
    let embedder = get_default_embedder(&settings)?;
    let describer = if settings.vision.enabled {
        match OpenAiDescriber::from_env(&settings.vision) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(error = %e, "image descriptions disabled");
                None
            }
        }
    } else {
        None
    };

    run_ingest(
        &settings,
        counter.as_ref(),
        embedder.as_ref(),
        describer.as_ref().map(|d| d as &dyn ImageDescriber),
        args.collection.as_deref(),
    )
    .await?;
    Ok(())
}
