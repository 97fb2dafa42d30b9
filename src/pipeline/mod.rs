// Contact pipeline: ingestion and processing stages

pub mod ingestion;
pub mod processing;

pub use ingestion::{ingest, IngestCache, TabularIngestor};
