//! LanceDB connection and column access helpers.
//!
//! Stores are local directories; a connection is opened per operation and
//! dropped when it completes.
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, Int64Array, RecordBatch, StringArray};
use lancedb::{connect, Connection};
use std::path::Path;

use crate::schema::{CHUNKS_TABLE, EMBEDDINGS_TABLE};

pub async fn open_db(path: &Path) -> lancedb::Result<Connection> {
    connect(path.to_string_lossy().as_ref()).execute().await
}

pub async fn table_exists(conn: &Connection, name: &str) -> lancedb::Result<bool> {
    Ok(conn.table_names().execute().await?.iter().any(|t| t == name))
}

/// True when `path` holds a published store with both tables.
pub async fn store_exists(path: &Path) -> lancedb::Result<bool> {
    if !path.is_dir() {
        return Ok(false);
    }
    let conn = open_db(path).await?;
    Ok(table_exists(&conn, CHUNKS_TABLE).await? && table_exists(&conn, EMBEDDINGS_TABLE).await?)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, String> {
    batch
        .column_by_name(name)
        .ok_or_else(|| format!("column '{name}' missing"))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| format!("column '{name}' has unexpected type"))
}

pub fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, String> { column(batch, name) }

pub fn int64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array, String> { column(batch, name) }

pub fn int32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array, String> { column(batch, name) }

pub fn float32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float32Array, String> { column(batch, name) }

pub fn embedding_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a FixedSizeListArray, String> {
    column(batch, name)
}
