//! Vector storage and nearest-neighbour retrieval.
//!
//! Records pair an id and a payload with an embedding vector. The
//! [`FlatIndex`] keeps every record in memory, optionally backed by an
//! append-only [`MmapRecordStore`], and answers queries with an exact scan
//! ranked by a [`RankingPolicy`].
//!
//! # Architecture
//! - `types`: validated newtypes and [`VectorError`]
//! - `similarity`: cosine and Euclidean scoring plus the ranking policies
//! - `record`: [`VectorRecord`], its [`Payload`] and scored [`Ranked`] results
//! - `storage` / `metadata`: the on-disk record file and its model sidecar
//! - `index`: the [`VectorIndex`] trait and the brute-force [`FlatIndex`]

mod index;
mod metadata;
mod record;
mod similarity;
mod storage;
mod types;

pub use index::{FlatIndex, InsertError, QueryError, VectorIndex};
pub use metadata::{METADATA_FILE, StoreMetadata};
pub use record::{Payload, Ranked, VectorRecord};
pub use similarity::{
    DEFAULT_MAX_DISTANCE, RankingPolicy, cosine_similarity, distance_for_similarity,
    euclidean_distance,
};
pub use storage::{MmapRecordStore, RECORDS_FILE, RecordStore, StoreError};
pub use types::{RecordId, VectorDimension, VectorError, ensure_finite};
