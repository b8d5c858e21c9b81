//! Domain types shared by the chunker, the embedding stage and the vector store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Dimensionality of every embedding stored in one index.
pub const EMBEDDING_DIM: usize = 384;

/// Where a chunk's text came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Markdown,
    ImageDescription,
}

impl ChunkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::ImageDescription => "image_description",
        }
    }

    /// Short label used when rendering search results.
    pub fn label(self) -> &'static str {
        match self {
            Self::Markdown => "Document",
            Self::ImageDescription => "Image",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ChunkKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markdown" => Ok(Self::Markdown),
            "image_description" => Ok(Self::ImageDescription),
            other => Err(Error::Operation(format!("unknown chunk type '{other}'"))),
        }
    }
}

/// The unit flowing through the whole pipeline.
///
/// - `text`: trimmed passage, header-prefixed when the chunker carried a section header
/// - `source_file`: file name of the originating document or screenshot
/// - `collection`: logical grouping (the document's parent folder)
/// - `chunk_index`: 0-based, contiguous position within `source_file`
/// - `embedding`: attached by the embedding stage, `None` before it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub text: String,
    pub source_file: String,
    pub collection: String,
    pub chunk_index: usize,
    pub kind: ChunkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl ChunkRecord {
    pub fn new(
        text: impl Into<String>,
        source_file: impl Into<String>,
        collection: impl Into<String>,
        chunk_index: usize,
        kind: ChunkKind,
    ) -> Self {
        Self {
            text: text.into(),
            source_file: source_file.into(),
            collection: collection.into(),
            chunk_index,
            kind,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}
