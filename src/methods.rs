//! Scoring methods and per-document weight/vector extraction.
//!
//! Extraction turns one document into the token features its method needs;
//! `aggregate` then assembles those features into the document vector.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::constants::methods::{DEFAULT_POS_TAGS, DEFAULT_SVD_RANK};
use crate::data::Document;
use crate::errors::ScoringError;
use crate::types::{PosTag, Word};
use crate::vocab::{IdfTable, ReducedVectorTable, VocabularyIndex};

/// Document scoring method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoringMethod {
    /// Unit-normalized sum over distinct tokens.
    #[serde(rename = "unique")]
    Unique,
    /// Unit-normalized sum weighted by local counts.
    #[serde(rename = "simple")]
    Simple,
    /// IDF times local count (no assembly rule).
    #[serde(rename = "TF_IDF")]
    TfIdf,
    /// Top singular vectors and values of the weighted token matrix.
    #[serde(rename = "svd_stack")]
    SvdStack,
    /// IDF-weighted reduced vectors (no assembly rule).
    #[serde(rename = "kSVD")]
    KSvd,
    /// Per-tag mean vectors concatenated in tag order.
    #[serde(rename = "pos_split")]
    PosSplit,
}

impl ScoringMethod {
    /// Every method, in configuration-name order.
    pub const ALL: [ScoringMethod; 6] = [
        ScoringMethod::Unique,
        ScoringMethod::Simple,
        ScoringMethod::TfIdf,
        ScoringMethod::SvdStack,
        ScoringMethod::KSvd,
        ScoringMethod::PosSplit,
    ];

    /// Configuration name, also used as the store group name.
    pub fn as_str(self) -> &'static str {
        match self {
            ScoringMethod::Unique => "unique",
            ScoringMethod::Simple => "simple",
            ScoringMethod::TfIdf => "TF_IDF",
            ScoringMethod::SvdStack => "svd_stack",
            ScoringMethod::KSvd => "kSVD",
            ScoringMethod::PosSplit => "pos_split",
        }
    }

    /// Whether an assembly rule exists for this method.
    pub fn is_assembled(self) -> bool {
        !matches!(self, ScoringMethod::TfIdf | ScoringMethod::KSvd)
    }

    /// Output vector length for word dimension `dim`, or `None` when unassembled.
    pub fn output_dim(self, dim: usize, params: &MethodParams) -> Option<usize> {
        match self {
            ScoringMethod::Unique | ScoringMethod::Simple => Some(dim),
            ScoringMethod::SvdStack => Some(params.svd_rank * dim + params.svd_rank),
            ScoringMethod::PosSplit => Some(params.pos_tags.len() * dim),
            ScoringMethod::TfIdf | ScoringMethod::KSvd => None,
        }
    }
}

impl fmt::Display for ScoringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoringMethod {
    type Err = ScoringError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ScoringMethod::ALL
            .into_iter()
            .find(|method| method.as_str() == value)
            .ok_or_else(|| ScoringError::Configuration(format!("UNKNOWN w2v method '{value}'")))
    }
}

/// Method hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodParams {
    /// Singular vectors/values kept by `svd_stack`.
    pub svd_rank: usize,
    /// Tags averaged by `pos_split`, in output order.
    pub pos_tags: Vec<PosTag>,
}

impl Default for MethodParams {
    fn default() -> Self {
        Self {
            svd_rank: DEFAULT_SVD_RANK,
            pos_tags: DEFAULT_POS_TAGS.iter().map(|tag| tag.to_string()).collect(),
        }
    }
}

/// Everything extraction reads besides the document itself. Shared across workers.
#[derive(Clone, Debug)]
pub struct MethodContext {
    pub vocab: Arc<VocabularyIndex>,
    pub params: MethodParams,
    pub idf: Option<Arc<IdfTable>>,
    pub reduced: Option<Arc<ReducedVectorTable>>,
}

impl MethodContext {
    pub fn new(vocab: Arc<VocabularyIndex>, params: MethodParams) -> Self {
        Self {
            vocab,
            params,
            idf: None,
            reduced: None,
        }
    }

    pub fn with_idf(mut self, idf: Arc<IdfTable>) -> Self {
        self.idf = Some(idf);
        self
    }

    pub fn with_reduced_vectors(mut self, reduced: Arc<ReducedVectorTable>) -> Self {
        self.reduced = Some(reduced);
        self
    }

    /// Reject methods whose injected tables are missing, before any document is scored.
    pub fn check_method(&self, method: ScoringMethod) -> Result<(), ScoringError> {
        match method {
            ScoringMethod::TfIdf if self.idf.is_none() => Err(ScoringError::Configuration(
                "TF_IDF requires an IDF table".into(),
            )),
            ScoringMethod::KSvd if self.idf.is_none() || self.reduced.is_none() => {
                Err(ScoringError::Configuration(
                    "kSVD requires an IDF table and a reduced vector table".into(),
                ))
            }
            ScoringMethod::SvdStack if self.params.svd_rank == 0 => Err(
                ScoringError::Configuration("svd_stack rank must be positive".into()),
            ),
            ScoringMethod::PosSplit if self.params.pos_tags.is_empty() => Err(
                ScoringError::Configuration("pos_split needs at least one tag".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// Distinct valid tokens with one weight and one vector each.
#[derive(Clone, Debug)]
pub struct WeightedTokens {
    /// Distinct valid tokens in first-occurrence order.
    pub tokens: Vec<Word>,
    pub weights: Vec<f64>,
    /// One row per token.
    pub vectors: Array2<f32>,
}

/// Per-tag vector sums and contribution counts for `pos_split`.
#[derive(Clone, Debug)]
pub struct PosBuckets {
    pub tags: Vec<PosTag>,
    /// One row per tag.
    pub sums: Array2<f64>,
    pub counts: Vec<usize>,
}

/// Token features extracted from one document.
#[derive(Clone, Debug)]
pub enum TokenFeatures {
    /// The document has no vocabulary-recognized tokens.
    Empty,
    Weighted(WeightedTokens),
    PosBuckets(PosBuckets),
}

/// Extract the token features `method` needs from `doc`.
pub fn extract(
    doc: &Document,
    method: ScoringMethod,
    ctx: &MethodContext,
) -> Result<TokenFeatures, ScoringError> {
    let vocab = &*ctx.vocab;
    let mut local_counts: IndexMap<&str, usize> = IndexMap::new();
    for token in doc.tokens().filter(|token| vocab.contains(token)) {
        *local_counts.entry(token).or_insert(0) += 1;
    }
    // Tag metadata must decode even when no token is valid.
    let pos_meta = match method {
        ScoringMethod::PosSplit => Some(doc.pos_metadata()?),
        _ => None,
    };
    if local_counts.is_empty() {
        return Ok(TokenFeatures::Empty);
    }

    match method {
        ScoringMethod::Unique => weighted(vocab.dim(), &local_counts, |_, _| Ok(1.0), |word| {
            embedding_row(vocab, word)
        }),
        ScoringMethod::Simple | ScoringMethod::SvdStack => weighted(
            vocab.dim(),
            &local_counts,
            |_, count| Ok(count as f64),
            |word| embedding_row(vocab, word),
        ),
        ScoringMethod::TfIdf => {
            let idf = require_idf(ctx)?;
            weighted(
                vocab.dim(),
                &local_counts,
                |word, count| idf_weight(idf, word, count),
                |word| embedding_row(vocab, word),
            )
        }
        ScoringMethod::KSvd => {
            let idf = require_idf(ctx)?;
            let reduced = ctx.reduced.as_deref().ok_or_else(|| {
                ScoringError::Configuration("kSVD requires a reduced vector table".into())
            })?;
            weighted(
                reduced.dim(),
                &local_counts,
                |word, count| idf_weight(idf, word, count),
                |word| {
                    let idx = vocab.index(word).ok_or_else(|| missing_word(word))?;
                    reduced.row(idx).ok_or_else(|| {
                        ScoringError::Configuration(format!(
                            "reduced vector table has no row {idx} for '{word}'"
                        ))
                    })
                },
            )
        }
        ScoringMethod::PosSplit => {
            let doc_tags = pos_meta.as_ref().map_or(&[][..], |meta| meta.tags.as_slice());
            Ok(pos_buckets(doc, doc_tags, &ctx.params.pos_tags, vocab))
        }
    }
}

fn weighted<'a>(
    dim: usize,
    local_counts: &IndexMap<&str, usize>,
    weight_of: impl Fn(&str, usize) -> Result<f64, ScoringError>,
    vector_of: impl Fn(&str) -> Result<ArrayView1<'a, f32>, ScoringError>,
) -> Result<TokenFeatures, ScoringError> {
    let mut tokens = Vec::with_capacity(local_counts.len());
    let mut weights = Vec::with_capacity(local_counts.len());
    let mut vectors = Array2::zeros((local_counts.len(), dim));
    for (row, (&word, &count)) in local_counts.iter().enumerate() {
        weights.push(weight_of(word, count)?);
        let vector = vector_of(word)?;
        if vector.len() != dim {
            return Err(ScoringError::Configuration(format!(
                "vector for '{word}' has {} components, expected {dim}",
                vector.len()
            )));
        }
        vectors.row_mut(row).assign(&vector);
        tokens.push(word.to_string());
    }
    Ok(TokenFeatures::Weighted(WeightedTokens {
        tokens,
        weights,
        vectors,
    }))
}

/// Every occurrence of a valid token carrying a known tag contributes to that tag.
fn pos_buckets(
    doc: &Document,
    doc_tags: &[PosTag],
    tags: &[PosTag],
    vocab: &VocabularyIndex,
) -> TokenFeatures {
    let dim = vocab.dim();
    let mut sums = Array2::<f64>::zeros((tags.len(), dim));
    let mut counts = vec![0usize; tags.len()];
    for (token, tag) in doc.tokens().zip(doc_tags) {
        let Some(slot) = tags.iter().position(|known| known == tag) else {
            continue;
        };
        let Some(vector) = vocab.vector(token) else {
            continue;
        };
        let mut row = sums.row_mut(slot);
        row.zip_mut_with(&vector, |acc, value| *acc += f64::from(*value));
        counts[slot] += 1;
    }
    TokenFeatures::PosBuckets(PosBuckets {
        tags: tags.to_vec(),
        sums,
        counts,
    })
}

fn embedding_row<'a>(
    vocab: &'a VocabularyIndex,
    word: &str,
) -> Result<ArrayView1<'a, f32>, ScoringError> {
    vocab.vector(word).ok_or_else(|| missing_word(word))
}

fn require_idf(ctx: &MethodContext) -> Result<&IdfTable, ScoringError> {
    ctx.idf
        .as_deref()
        .ok_or_else(|| ScoringError::Configuration("method requires an IDF table".into()))
}

fn idf_weight(idf: &IdfTable, word: &str, count: usize) -> Result<f64, ScoringError> {
    idf.get(word)
        .map(|weight| weight * count as f64)
        .ok_or_else(|| ScoringError::Configuration(format!("IDF table has no entry for '{word}'")))
}

fn missing_word(word: &str) -> ScoringError {
    ScoringError::Configuration(format!("'{word}' vanished from the vocabulary"))
}
