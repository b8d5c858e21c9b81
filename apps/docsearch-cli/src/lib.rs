//! Entry-point glue for the docsearch binaries: the ingestion pipeline, the
//! MCP service and logging setup.
pub mod ingest;
pub mod server;

use tracing_subscriber::EnvFilter;

/// Installs a `RUST_LOG`-filtered subscriber (default `info`) writing to
/// stderr. Stdout belongs to MCP frames and command output.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}
