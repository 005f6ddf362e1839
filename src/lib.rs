#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Scoring configuration types.
pub mod config;
/// Centralized constants used across methods, the scorer, and the store.
pub mod constants;
/// Document and result record types.
pub mod data;
/// Embedding model, vocabulary lookup, and auxiliary weight tables.
pub mod vocab;
/// Scoring methods and per-token feature extraction.
pub mod methods;
/// Per-document vector assembly, including the truncated SVD.
pub mod aggregate;
/// Streaming scorer driving extraction and assembly.
pub mod scorer;
/// Folding of per-field results into one record per document.
pub mod merge;
/// Grouped matrix store for scored datasets.
pub mod store;
/// Document source traits and built-in sources.
pub mod source;
/// End-to-end score, merge, and persist passes.
pub mod pipeline;
/// Command-line runner shared by the bundled binary.
pub mod apps;
/// Shared type aliases.
pub mod types;

mod errors;

pub use config::{EmbeddingConfig, ScoringConfig, StoreConfig};
pub use data::{Document, MergedRecord, PosMetadata, ResultRecord};
pub use errors::ScoringError;
pub use merge::merge_records;
pub use methods::{MethodContext, MethodParams, ScoringMethod, TokenFeatures};
pub use pipeline::{MethodSummary, ScoringPipeline, run_scoring};
pub use scorer::StreamScorer;
pub use source::{
    DocumentSource, InMemoryDocuments, JsonlDocumentSource, JsonlSourceConfig, directory_sources,
};
pub use store::{DatasetInfo, GroupedStore, StoredMatrix};
pub use types::{DatasetId, DatasetName, PosTag, RecordId, SourceId, Vector, Word};
pub use vocab::{EmbeddingModel, IdfTable, ReducedVectorTable, VocabularyIndex};
