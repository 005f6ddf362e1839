//! Read-only embedding table and the auxiliary per-word tables some methods need.
//!
//! `EmbeddingModel` owns the raw artifact (words, vectors, frequencies).
//! `VocabularyIndex` is the lookup view the scorer shares across workers.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView1};
use tracing::info;

use crate::constants::embedding::{EMBEDDING_RECORD_VERSION, WORD2VEC_TEXT_EXTENSIONS};
use crate::constants::store::BITCODE_PREFIX;
use crate::errors::ScoringError;
use crate::types::Word;

/// Trained word vectors, vocabulary, and per-word corpus frequencies.
#[derive(Clone, Debug)]
pub struct EmbeddingModel {
    words: Vec<Word>,
    vectors: Array2<f32>,
    counts: Vec<u64>,
}

/// Wire form of an embedding artifact.
#[derive(Clone, Debug, bitcode::Encode, bitcode::Decode)]
struct PersistedEmbedding {
    words: Vec<Word>,
    dim: u64,
    values: Vec<f32>,
    counts: Vec<u64>,
}

impl EmbeddingModel {
    /// Build a model from parallel word/vector/count lists.
    pub fn from_parts(
        words: Vec<Word>,
        vectors: Vec<Vec<f32>>,
        counts: Vec<u64>,
    ) -> Result<Self, ScoringError> {
        if words.len() != vectors.len() || words.len() != counts.len() {
            return Err(ScoringError::Configuration(format!(
                "embedding parts disagree: {} words, {} vectors, {} counts",
                words.len(),
                vectors.len(),
                counts.len()
            )));
        }
        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        let mut values = Vec::with_capacity(words.len() * dim);
        for (word, vector) in words.iter().zip(&vectors) {
            if vector.len() != dim {
                return Err(ScoringError::Configuration(format!(
                    "embedding vector for '{word}' has {} components, expected {dim}",
                    vector.len()
                )));
            }
            values.extend_from_slice(vector);
        }
        let vectors = Array2::from_shape_vec((words.len(), dim), values)
            .map_err(|err| ScoringError::Configuration(err.to_string()))?;
        Ok(Self {
            words,
            vectors,
            counts,
        })
    }

    /// Load an artifact, importing word2vec text for `.txt`/`.vec` paths.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScoringError> {
        let path = path.as_ref();
        let is_text = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| WORD2VEC_TEXT_EXTENSIONS.contains(&ext));
        let model = if is_text {
            Self::load_word2vec_text(path)?
        } else {
            Self::load_artifact(path)?
        };
        info!(
            path = %path.display(),
            vocab = model.len(),
            dim = model.dim(),
            "loaded embedding model"
        );
        Ok(model)
    }

    /// Write the model as a versioned bitcode artifact.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ScoringError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let persisted = PersistedEmbedding {
            words: self.words.clone(),
            dim: self.dim() as u64,
            values: self.vectors.iter().copied().collect(),
            counts: self.counts.clone(),
        };
        let payload = bitcode::encode(&persisted);
        let mut buf = Vec::with_capacity(2 + payload.len());
        buf.push(EMBEDDING_RECORD_VERSION);
        buf.push(BITCODE_PREFIX);
        buf.extend_from_slice(&payload);
        fs::write(path, buf)?;
        Ok(())
    }

    fn load_artifact(path: &Path) -> Result<Self, ScoringError> {
        let bytes = fs::read(path).map_err(|err| unavailable(path, err.to_string()))?;
        if bytes.len() < 2 {
            return Err(unavailable(path, "artifact is truncated".into()));
        }
        if bytes[0] != EMBEDDING_RECORD_VERSION {
            return Err(unavailable(
                path,
                format!(
                    "artifact version mismatch (expected {EMBEDDING_RECORD_VERSION}, found {})",
                    bytes[0]
                ),
            ));
        }
        if bytes[1] != BITCODE_PREFIX {
            return Err(unavailable(
                path,
                "bitcode payload missing expected prefix".into(),
            ));
        }
        let persisted: PersistedEmbedding = bitcode::decode(&bytes[2..])
            .map_err(|err| unavailable(path, format!("corrupt artifact: {err}")))?;
        let rows = persisted.words.len();
        let dim = persisted.dim as usize;
        let vectors = Array2::from_shape_vec((rows, dim), persisted.values)
            .map_err(|err| unavailable(path, format!("corrupt artifact: {err}")))?;
        if persisted.counts.len() != rows {
            return Err(unavailable(path, "frequency table length mismatch".into()));
        }
        Ok(Self {
            words: persisted.words,
            vectors,
            counts: persisted.counts,
        })
    }

    /// Import the word2vec text format: a `"<vocab> <dim>"` header, then one word per line.
    fn load_word2vec_text(path: &Path) -> Result<Self, ScoringError> {
        let file = fs::File::open(path).map_err(|err| unavailable(path, err.to_string()))?;
        let mut lines = BufReader::new(file).lines();
        let header = lines
            .next()
            .transpose()?
            .ok_or_else(|| unavailable(path, "missing header line".into()))?;
        let mut parts = header.split_whitespace();
        let declared: usize = parse_header_field(path, parts.next())?;
        let dim: usize = parse_header_field(path, parts.next())?;

        let mut words = Vec::with_capacity(declared);
        let mut vectors = Vec::with_capacity(declared);
        for (line_no, line) in lines.enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let vector = fields
                .map(str::parse::<f32>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| unavailable(path, format!("line {}: {err}", line_no + 2)))?;
            if vector.len() != dim {
                return Err(unavailable(
                    path,
                    format!(
                        "line {}: expected {dim} components, found {}",
                        line_no + 2,
                        vector.len()
                    ),
                ));
            }
            words.push(word.to_string());
            vectors.push(vector);
        }
        if words.len() != declared {
            return Err(unavailable(
                path,
                format!("header declares {declared} words, found {}", words.len()),
            ));
        }
        let counts = vec![0; words.len()];
        Self::from_parts(words, vectors, counts)
    }

    /// Vector dimension `D`.
    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    /// Vocabulary size.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True when the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words in vocabulary-index order.
    pub fn words(&self) -> &[Word] {
        &self.words
    }
}

fn parse_header_field(path: &Path, field: Option<&str>) -> Result<usize, ScoringError> {
    field
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| unavailable(path, "malformed header, expected '<vocab> <dim>'".into()))
}

fn unavailable(path: &Path, reason: String) -> ScoringError {
    ScoringError::EmbeddingUnavailable {
        path: path.to_path_buf(),
        reason,
    }
}

/// Lookup view over an `EmbeddingModel`. Immutable once built.
#[derive(Debug)]
pub struct VocabularyIndex {
    model: EmbeddingModel,
    word_to_index: HashMap<Word, usize>,
}

impl VocabularyIndex {
    /// Index every word in `model`; duplicate words are rejected.
    pub fn new(model: EmbeddingModel) -> Result<Self, ScoringError> {
        let mut word_to_index = HashMap::with_capacity(model.len());
        for (idx, word) in model.words.iter().enumerate() {
            if word_to_index.insert(word.clone(), idx).is_some() {
                return Err(ScoringError::Configuration(format!(
                    "embedding vocabulary contains '{word}' more than once"
                )));
            }
        }
        Ok(Self {
            model,
            word_to_index,
        })
    }

    /// Load the artifact at `path` and index it.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ScoringError> {
        let path = path.into();
        Self::new(EmbeddingModel::load(&path)?)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.word_to_index.contains_key(word)
    }

    pub fn index(&self, word: &str) -> Option<usize> {
        self.word_to_index.get(word).copied()
    }

    pub fn vector(&self, word: &str) -> Option<ArrayView1<'_, f32>> {
        self.index(word).map(|idx| self.model.vectors.row(idx))
    }

    pub fn frequency(&self, word: &str) -> Option<u64> {
        self.index(word).map(|idx| self.model.counts[idx])
    }

    /// Vector dimension `D`.
    pub fn dim(&self) -> usize {
        self.model.dim()
    }

    pub fn len(&self) -> usize {
        self.model.len()
    }

    pub fn is_empty(&self) -> bool {
        self.model.is_empty()
    }
}

/// Externally supplied inverse-document-frequency weights.
#[derive(Clone, Debug, Default)]
pub struct IdfTable {
    weights: HashMap<Word, f64>,
}

impl IdfTable {
    pub fn new(weights: HashMap<Word, f64>) -> Self {
        Self { weights }
    }

    pub fn get(&self, word: &str) -> Option<f64> {
        self.weights.get(word).copied()
    }
}

impl FromIterator<(Word, f64)> for IdfTable {
    fn from_iter<T: IntoIterator<Item = (Word, f64)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Precomputed reduced-dimension word vectors keyed by vocabulary index (`kSVD`).
#[derive(Clone, Debug)]
pub struct ReducedVectorTable {
    vectors: Array2<f32>,
}

impl ReducedVectorTable {
    pub fn new(vectors: Array2<f32>) -> Self {
        Self { vectors }
    }

    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn row(&self, idx: usize) -> Option<ArrayView1<'_, f32>> {
        (idx < self.vectors.nrows()).then(|| self.vectors.row(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn toy_model() -> EmbeddingModel {
        EmbeddingModel::from_parts(
            vec!["cat".into(), "dog".into()],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![7, 3],
        )
        .unwrap()
    }

    #[test]
    fn index_exposes_vectors_indices_and_frequencies() {
        let vocab = VocabularyIndex::new(toy_model()).unwrap();
        assert!(vocab.contains("cat"));
        assert!(!vocab.contains("bird"));
        assert_eq!(vocab.index("dog"), Some(1));
        assert_eq!(vocab.frequency("cat"), Some(7));
        assert_eq!(vocab.vector("dog").unwrap().to_vec(), vec![0.0, 1.0]);
        assert_eq!(vocab.dim(), 2);
        assert_eq!(vocab.len(), 2);
    }

    #[test]
    fn duplicate_words_are_rejected() {
        let model = EmbeddingModel::from_parts(
            vec!["cat".into(), "cat".into()],
            vec![vec![1.0], vec![2.0]],
            vec![1, 1],
        )
        .unwrap();
        let err = VocabularyIndex::new(model).unwrap_err();
        assert!(matches!(err, ScoringError::Configuration(msg) if msg.contains("more than once")));
    }

    #[test]
    fn ragged_vectors_are_rejected() {
        let err = EmbeddingModel::from_parts(
            vec!["a".into(), "b".into()],
            vec![vec![1.0, 2.0], vec![3.0]],
            vec![0, 0],
        )
        .unwrap_err();
        assert!(matches!(err, ScoringError::Configuration(_)));
    }

    #[test]
    fn artifact_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("w2v.bin");
        toy_model().save(&path).unwrap();

        let vocab = VocabularyIndex::load(&path).unwrap();
        assert_eq!(vocab.vector("cat").unwrap().to_vec(), vec![1.0, 0.0]);
        assert_eq!(vocab.frequency("dog"), Some(3));
    }

    #[test]
    fn missing_artifact_is_unavailable() {
        let dir = tempdir().unwrap();
        let err = VocabularyIndex::load(dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, ScoringError::EmbeddingUnavailable { .. }));
    }

    #[test]
    fn corrupt_artifact_reports_prefix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("w2v.bin");
        fs::write(&path, [EMBEDDING_RECORD_VERSION, 0x00, 0x01]).unwrap();
        let err = EmbeddingModel::load(&path).unwrap_err();
        assert!(matches!(
            err,
            ScoringError::EmbeddingUnavailable { reason, .. } if reason.contains("missing expected prefix")
        ));
    }

    #[test]
    fn word2vec_text_is_imported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "2 3").unwrap();
        writeln!(file, "red 0.5 0.25 -1").unwrap();
        writeln!(file, "run 1 2 3").unwrap();
        drop(file);

        let vocab = VocabularyIndex::load(&path).unwrap();
        assert_eq!(vocab.dim(), 3);
        assert_eq!(vocab.vector("red").unwrap().to_vec(), vec![0.5, 0.25, -1.0]);
        assert_eq!(vocab.frequency("run"), Some(0));
    }

    #[test]
    fn word2vec_text_rejects_short_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.vec");
        fs::write(&path, "1 3\nred 0.5 0.25\n").unwrap();
        let err = EmbeddingModel::load(&path).unwrap_err();
        assert!(matches!(
            err,
            ScoringError::EmbeddingUnavailable { reason, .. } if reason.contains("expected 3 components")
        ));
    }

    #[test]
    fn reduced_table_bounds_checks_rows() {
        let table = ReducedVectorTable::new(Array2::zeros((2, 4)));
        assert_eq!(table.dim(), 4);
        assert!(table.row(1).is_some());
        assert!(table.row(2).is_none());
    }
}
