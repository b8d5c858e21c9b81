//! Screenshot descriptions for the search index.
//!
//! Each supported image becomes one `image_description` chunk whose text is a
//! vision model's description of the screen.
use std::path::Path;
use thiserror::Error;
use tracing::info;

use docsearch_core::sources::{image_collection, image_mime_type};
use docsearch_core::traits::ImageDescriber;
use docsearch_core::{ChunkKind, ChunkRecord};

pub mod openai;

pub use openai::OpenAiDescriber;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("unsupported image format '{0}', expected png, jpg, jpeg, webp or gif")]
    UnsupportedImage(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("describing {file} failed: {message}")]
    Describe { file: String, message: String },

    #[error("empty description for {0}")]
    EmptyDescription(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Describes one screenshot and wraps the answer as a chunk (`chunk_index` 0).
///
/// The collection is the folder containing the image's `images/` folder.
pub async fn describe_image(describer: &dyn ImageDescriber, path: &Path) -> Result<ChunkRecord, VisionError> {
    let mime_type = image_mime_type(path).ok_or_else(|| {
        VisionError::UnsupportedImage(path.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_default())
    })?;
    let file = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let collection = image_collection(path);
    info!(file = %file, collection = %collection, "describing image");

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| VisionError::Io { path: path.display().to_string(), source })?;
    let description = describer
        .describe(&bytes, mime_type)
        .await
        .map_err(|e| VisionError::Describe { file: file.clone(), message: format!("{e:#}") })?;
    let text = description.trim();
    if text.is_empty() {
        return Err(VisionError::EmptyDescription(file));
    }
    info!(file = %file, chars = text.chars().count(), "description generated");

    Ok(ChunkRecord::new(text, file, collection, 0, ChunkKind::ImageDescription))
}
