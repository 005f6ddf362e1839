use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::methods::ScoringMethod;
use crate::types::{DatasetName, RecordId, SourceId};

/// Error type for configuration, scoring, and persistence failures.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("embedding artifact '{}' is unavailable: {reason}", path.display())]
    EmbeddingUnavailable { path: PathBuf, reason: String },
    #[error("document '{id}' is malformed: {details}")]
    Data { id: RecordId, details: String },
    #[error("method {method} produced an invalid vector: {details}")]
    NumericInvariant {
        method: ScoringMethod,
        details: String,
    },
    #[error("method {0} has no assembly rule")]
    MethodNotImplemented(ScoringMethod),
    #[error("method {method} failed for dataset '{dataset}', sizes differ {shapes:?}")]
    ShapeMismatch {
        method: ScoringMethod,
        dataset: DatasetName,
        shapes: BTreeSet<usize>,
    },
    #[error("grouped store failure: {0}")]
    Store(String),
    #[error("document source '{source_id}' failed: {reason}")]
    Source { source_id: SourceId, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}
