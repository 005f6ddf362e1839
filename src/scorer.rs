//! Drives extraction and assembly over the document stream, one method at a time.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::aggregate::assemble;
use crate::constants::scorer::{PROGRESS_MIN_DOCUMENTS, PROGRESS_REPORT_MS};
use crate::data::{Document, ResultRecord};
use crate::errors::ScoringError;
use crate::methods::{MethodContext, ScoringMethod, extract};
use crate::source::DocumentSource;

/// Scores every document of every source under one method per pass.
#[derive(Clone, Debug)]
pub struct StreamScorer {
    ctx: MethodContext,
    parallel: bool,
}

impl StreamScorer {
    pub fn new(ctx: MethodContext) -> Self {
        Self {
            ctx,
            parallel: false,
        }
    }

    /// Score on the rayon pool. Output order still follows the stream.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn context(&self) -> &MethodContext {
        &self.ctx
    }

    /// Fail before any document is read when `method` cannot complete a pass.
    pub fn check_method(&self, method: ScoringMethod) -> Result<(), ScoringError> {
        if !method.is_assembled() {
            return Err(ScoringError::MethodNotImplemented(method));
        }
        self.ctx.check_method(method)
    }

    /// Score one document. A pure function of `(doc, method, vocabulary)`.
    pub fn score_document(
        &self,
        doc: &Document,
        method: ScoringMethod,
    ) -> Result<ResultRecord, ScoringError> {
        let features = extract(doc, method, &self.ctx)?;
        let vector = assemble(method, &features, self.ctx.vocab.dim(), &self.ctx.params)?;
        Ok(ResultRecord {
            vector,
            id: doc.id.clone(),
            source_dataset: doc.source_dataset.clone(),
            extra_fields: doc.extra_fields.clone(),
        })
    }

    /// Score every document of every source, in source order then stream order.
    pub fn score_sources<S>(
        &self,
        sources: &[S],
        method: ScoringMethod,
    ) -> Result<Vec<ResultRecord>, ScoringError>
    where
        S: AsRef<dyn DocumentSource>,
    {
        self.check_method(method)?;
        info!(method = %method, sources = sources.len(), "scoring documents");
        let started = Instant::now();
        let mut results = Vec::new();
        for source in sources {
            let source = source.as_ref();
            let scored = if self.parallel {
                self.score_parallel(source, method)?
            } else {
                self.score_sequential(source, method)?
            };
            debug!(source = source.id(), documents = scored.len(), "scored source");
            results.extend(scored);
        }
        info!(
            method = %method,
            documents = results.len(),
            elapsed_s = started.elapsed().as_secs_f64(),
            "scoring done"
        );
        Ok(results)
    }

    fn score_sequential(
        &self,
        source: &dyn DocumentSource,
        method: ScoringMethod,
    ) -> Result<Vec<ResultRecord>, ScoringError> {
        let report_every = Duration::from_millis(PROGRESS_REPORT_MS);
        let started = Instant::now();
        let mut last_report = started;
        let mut results = Vec::with_capacity(source.reported_document_count().unwrap_or(0));
        for doc in source.documents()? {
            results.push(self.score_document(&doc?, method)?);
            if results.len() >= PROGRESS_MIN_DOCUMENTS && last_report.elapsed() >= report_every {
                info!(
                    method = %method,
                    source = source.id(),
                    scored = results.len(),
                    expected = source.reported_document_count(),
                    elapsed_s = started.elapsed().as_secs_f64(),
                    "scoring progress"
                );
                last_report = Instant::now();
            }
        }
        Ok(results)
    }

    fn score_parallel(
        &self,
        source: &dyn DocumentSource,
        method: ScoringMethod,
    ) -> Result<Vec<ResultRecord>, ScoringError> {
        let documents = source.documents()?.collect::<Result<Vec<_>, _>>()?;
        documents
            .par_iter()
            .map(|doc| self.score_document(doc, method))
            .collect()
    }
}
