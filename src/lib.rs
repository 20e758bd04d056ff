//! Describe, embed and search an image collection with natural language.
//!
//! Images are captioned by a multimodal model, the captions are embedded,
//! and the vectors are kept in a flat, persisted index. Free-text queries
//! are embedded into the same space and answered by nearest-neighbour
//! search.

pub mod config;
pub mod display;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod providers;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use error::{AppError, AppResult};
pub use pipeline::{
    IngestError, IngestOptions, IngestReport, IngestionPipeline, QueryEngine, QueryMatch,
    QueryObserver, QueryOutcome, SearchError, TracingObserver,
};
pub use providers::{CaptionGenerator, CollaboratorError, EmbeddingGenerator, EmbeddingPurpose};
pub use vector::{
    FlatIndex, InsertError, Payload, QueryError, Ranked, RankingPolicy, RecordId, StoreError,
    VectorIndex, VectorRecord,
};
