//! Arrow layout of the two store tables and the embedding codec.
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array};
use arrow_schema::{ArrowError, DataType, Field, Schema};
use std::sync::Arc;

use docsearch_core::EMBEDDING_DIM;

pub const CHUNKS_TABLE: &str = "chunks";
pub const EMBEDDINGS_TABLE: &str = "embeddings";
pub const EMBEDDING_COLUMN: &str = "embedding";

pub fn chunks_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Int64, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("source_file", DataType::Utf8, false),
		Field::new("collection", DataType::Utf8, false),
		Field::new("chunk_index", DataType::Int32, false),
		Field::new("type", DataType::Utf8, false),
	]))
}

fn embedding_type() -> DataType {
	DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), EMBEDDING_DIM as i32)
}

pub fn embeddings_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Int64, false),
		Field::new(EMBEDDING_COLUMN, embedding_type(), false),
	]))
}

/// Packs vectors into one `FixedSizeList<Float32, 384>` column: a single
/// contiguous f32 buffer, row after row. Every vector must be 384 long.
pub fn encode_embeddings(vectors: &[&[f32]]) -> Result<FixedSizeListArray, ArrowError> {
	let mut flat = Vec::with_capacity(vectors.len() * EMBEDDING_DIM);
	for (row, v) in vectors.iter().enumerate() {
		if v.len() != EMBEDDING_DIM {
			return Err(ArrowError::InvalidArgumentError(format!(
				"embedding at row {row} has {} values, expected {EMBEDDING_DIM}",
				v.len()
			)));
		}
		flat.extend_from_slice(v);
	}
	let field = Arc::new(Field::new("item", DataType::Float32, true));
	FixedSizeListArray::try_new(field, EMBEDDING_DIM as i32, Arc::new(Float32Array::from(flat)), None)
}

/// Reads row `row` back out of an embedding column.
pub fn decode_embedding(column: &FixedSizeListArray, row: usize) -> Vec<f32> {
	let values = column.value(row);
	values.as_primitive::<Float32Type>().values().to_vec()
}
