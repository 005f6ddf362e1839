//! Document suppliers.
//!
//! A `DocumentSource` yields the document stream for one logical dataset. The
//! scorer re-opens every source once per scoring method, so `documents` must
//! return the same sequence on every call.

use std::sync::Arc;

use crate::data::Document;
use crate::errors::ScoringError;
use crate::types::SourceId;

/// JSON-lines file sources.
pub mod jsonl;

pub use jsonl::{JsonlDocumentSource, JsonlSourceConfig, directory_sources};

/// Boxed document stream returned by `DocumentSource::documents`.
pub type DocumentStream<'a> = Box<dyn Iterator<Item = Result<Document, ScoringError>> + Send + 'a>;

/// Scorer-facing document supplier.
pub trait DocumentSource: Send + Sync {
    /// Stable source identifier used in logs and errors.
    fn id(&self) -> &str;

    /// Open the document stream from the beginning.
    fn documents(&self) -> Result<DocumentStream<'_>, ScoringError>;

    /// Exact document count when known without reading the stream.
    fn reported_document_count(&self) -> Option<usize> {
        None
    }
}

/// In-memory document source for tests and small corpora.
pub struct InMemoryDocuments {
    id: SourceId,
    documents: Arc<Vec<Document>>,
}

impl InMemoryDocuments {
    /// Create an in-memory source from prebuilt documents.
    pub fn new(id: impl Into<SourceId>, documents: Vec<Document>) -> Self {
        Self {
            id: id.into(),
            documents: Arc::new(documents),
        }
    }
}

impl DocumentSource for InMemoryDocuments {
    fn id(&self) -> &str {
        &self.id
    }

    fn documents(&self) -> Result<DocumentStream<'_>, ScoringError> {
        Ok(Box::new(self.documents.iter().cloned().map(Ok)))
    }

    fn reported_document_count(&self) -> Option<usize> {
        Some(self.documents.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_source_replays_the_same_stream() {
        let source = InMemoryDocuments::new(
            "memory",
            vec![
                Document::new("cat dog", "1", "titles"),
                Document::new("dog", "2", "titles"),
            ],
        );
        let first: Vec<Document> = source.documents().unwrap().map(Result::unwrap).collect();
        let second: Vec<Document> = source.documents().unwrap().map(Result::unwrap).collect();
        assert_eq!(first, second);
        assert_eq!(source.reported_document_count(), Some(2));
        assert_eq!(source.id(), "memory");
    }
}
