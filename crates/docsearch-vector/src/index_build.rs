//! IVF_PQ index training for large stores.
//!
//! Small stores are searched by exact flat scan; once the row count reaches
//! `index.ann_min_rows` the builder trains a cosine IVF_PQ index on the
//! embedding column before publishing.
use lancedb::index::{vector::IvfPqIndexBuilder, Index};
use lancedb::{Connection, DistanceType};
use tracing::info;

use crate::schema::{EMBEDDINGS_TABLE, EMBEDDING_COLUMN};

pub const INDEX_NAME: &str = "embedding_ivfpq";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfPqParams {
    pub nlist: usize,
    pub m: usize,
    pub nbits: usize,
}

pub fn compute_ivfpq_params(rows: usize, dim: usize) -> IvfPqParams {
    let sqrt_n = (rows as f64).sqrt() as usize;
    let mut nlist = sqrt_n.clamp(1, 4096);
    // partitions must stay below the row count for tiny tables
    if rows > 1 {
        nlist = nlist.min(rows - 1);
    } else {
        nlist = 1;
    }
    let preferred = if dim >= 1024 { 32 } else { 16 };
    let m = [preferred, 8, 4, 2, 1].into_iter().find(|m| dim % m == 0).unwrap_or(1);
    IvfPqParams { nlist, m, nbits: 8 }
}

pub async fn build_ivfpq_index(conn: &Connection, params: &IvfPqParams) -> lancedb::Result<()> {
    let table = conn.open_table(EMBEDDINGS_TABLE).execute().await?;
    info!(nlist = params.nlist, m = params.m, "training IVF_PQ index");
    table
        .create_index(
            &[EMBEDDING_COLUMN],
            Index::IvfPq(
                IvfPqIndexBuilder::default()
                    .distance_type(DistanceType::Cosine)
                    .num_partitions(params.nlist as u32)
                    .num_sub_vectors(params.m as u32)
                    .num_bits(params.nbits as u32),
            ),
        )
        .name(INDEX_NAME.to_string())
        .execute()
        .await
}
