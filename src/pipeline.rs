//! Score, merge, and persist: one full pass per configured method.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::ScoringConfig;
use crate::errors::ScoringError;
use crate::merge::merge_records;
use crate::methods::{MethodContext, ScoringMethod};
use crate::scorer::StreamScorer;
use crate::source::DocumentSource;
use crate::store::{DatasetInfo, GroupedStore};
use crate::vocab::VocabularyIndex;

/// What one method pass wrote.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodSummary {
    pub method: ScoringMethod,
    /// Result records produced before merging.
    pub documents: usize,
    /// Records left after merging fields that share `(id, source_dataset)`.
    pub merged: usize,
    /// One entry per dataset written, in first-seen order.
    pub datasets: Vec<DatasetInfo>,
}

/// Runs every configured method over the same sources into one store.
#[derive(Clone, Debug)]
pub struct ScoringPipeline {
    scorer: StreamScorer,
    methods: Vec<ScoringMethod>,
}

impl ScoringPipeline {
    pub fn new(ctx: MethodContext, methods: Vec<ScoringMethod>) -> Self {
        Self {
            scorer: StreamScorer::new(ctx),
            methods,
        }
    }

    /// Load the embedding named by `config` and build the pipeline it describes.
    pub fn from_config(config: &ScoringConfig) -> Result<Self, ScoringError> {
        let embedding_path = config.embedding.path();
        let vocab = VocabularyIndex::load(&embedding_path)?;
        info!(
            path = %embedding_path.display(),
            words = vocab.len(),
            dim = vocab.dim(),
            "loaded embedding"
        );
        let ctx = MethodContext::new(Arc::new(vocab), config.method_params());
        Ok(Self::new(ctx, config.methods.clone()).with_parallel(config.parallel))
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.scorer = self.scorer.with_parallel(parallel);
        self
    }

    pub fn methods(&self) -> &[ScoringMethod] {
        &self.methods
    }

    pub fn scorer(&self) -> &StreamScorer {
        &self.scorer
    }

    /// Run every method in order. Every method is checked before the first
    /// pass so an unusable method never leaves earlier passes half-applied.
    pub fn run<S>(
        &self,
        sources: &[S],
        store: &GroupedStore,
    ) -> Result<Vec<MethodSummary>, ScoringError>
    where
        S: AsRef<dyn DocumentSource>,
    {
        for &method in &self.methods {
            self.scorer.check_method(method)?;
        }
        if sources.is_empty() {
            warn!("no document sources configured");
        }
        let mut summaries = Vec::with_capacity(self.methods.len());
        for &method in &self.methods {
            summaries.push(self.run_method(method, sources, store)?);
        }
        Ok(summaries)
    }

    fn run_method<S>(
        &self,
        method: ScoringMethod,
        sources: &[S],
        store: &GroupedStore,
    ) -> Result<MethodSummary, ScoringError>
    where
        S: AsRef<dyn DocumentSource>,
    {
        let started = Instant::now();
        let results = self.scorer.score_sources(sources, method)?;
        let documents = results.len();
        let merged = merge_records(results);
        let merged_count = merged.len();
        let datasets = store.write_group(method, &merged)?;
        info!(
            method = %method,
            documents,
            merged = merged_count,
            datasets = datasets.len(),
            elapsed_s = started.elapsed().as_secs_f64(),
            "method pass complete"
        );
        Ok(MethodSummary {
            method,
            documents,
            merged: merged_count,
            datasets,
        })
    }
}

/// Build the pipeline from `config` and run it into the store it names.
pub fn run_scoring<S>(
    config: &ScoringConfig,
    sources: &[S],
) -> Result<Vec<MethodSummary>, ScoringError>
where
    S: AsRef<dyn DocumentSource>,
{
    let pipeline = ScoringPipeline::from_config(config)?;
    let store = GroupedStore::open(config.document_scores.path())?;
    pipeline.run(sources, &store)
}
