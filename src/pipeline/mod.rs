//! Ingestion and query flows built on the vector index and the providers.

pub mod ingest;
pub mod query;
pub mod source;

pub use ingest::{IngestError, IngestOptions, IngestReport, IngestionPipeline, SkippedItem};
pub use query::{
    NoopObserver, QueryEngine, QueryMatch, QueryObserver, QueryOutcome, SearchError,
    TracingObserver,
};
pub use source::{IMAGE_EXTENSIONS, expand_sources, mime_for, record_id_for};
