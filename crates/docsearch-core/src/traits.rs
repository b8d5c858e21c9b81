//! Seams between the core pipeline and the models it drives.
//!
//! Handles are created once by the process entry point and passed in by
//! reference, so nothing here holds global state.

use async_trait::async_trait;

/// Turns text into fixed-length vectors. The same implementation must serve
/// both passages at ingest time and queries at search time.
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder returns.
    fn dim(&self) -> usize;
    /// One vector per input, in input order.
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Measures string length in model tokens.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Produces a textual description of a screenshot.
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe(&self, image: &[u8], mime_type: &str) -> anyhow::Result<String>;
}
