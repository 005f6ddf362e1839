use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::embedding::DEFAULT_EMBEDDING_FILENAME;
use crate::constants::methods::{DEFAULT_POS_TAGS, DEFAULT_SVD_RANK};
use crate::constants::store::{DEFAULT_STORE_DIR, DEFAULT_STORE_FILENAME};
use crate::errors::ScoringError;
use crate::methods::{MethodParams, ScoringMethod};
use crate::types::PosTag;

/// Location of the embedding artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Directory holding the artifact.
    pub output_data_directory: PathBuf,
    /// Artifact filename inside `output_data_directory`.
    pub f_db: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            output_data_directory: PathBuf::from(DEFAULT_STORE_DIR),
            f_db: DEFAULT_EMBEDDING_FILENAME.to_string(),
        }
    }
}

impl EmbeddingConfig {
    pub fn path(&self) -> PathBuf {
        self.output_data_directory.join(&self.f_db)
    }
}

/// Location of the grouped output store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the store file.
    pub output_data_directory: PathBuf,
    /// Store filename inside `output_data_directory`.
    pub f_db: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            output_data_directory: PathBuf::from(DEFAULT_STORE_DIR),
            f_db: DEFAULT_STORE_FILENAME.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn path(&self) -> PathBuf {
        self.output_data_directory.join(&self.f_db)
    }
}

/// Top-level scoring configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Methods to run, strictly one after another.
    pub methods: Vec<ScoringMethod>,
    pub embedding: EmbeddingConfig,
    pub document_scores: StoreConfig,
    /// Singular vectors/values kept by `svd_stack`.
    pub svd_rank: usize,
    /// Tags averaged by `pos_split`, in output order.
    pub pos_tags: Vec<PosTag>,
    /// Score documents on the rayon pool instead of sequentially.
    pub parallel: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            methods: vec![ScoringMethod::Unique],
            embedding: EmbeddingConfig::default(),
            document_scores: StoreConfig::default(),
            svd_rank: DEFAULT_SVD_RANK,
            pos_tags: DEFAULT_POS_TAGS.iter().map(|tag| tag.to_string()).collect(),
            parallel: false,
        }
    }
}

impl ScoringConfig {
    /// Load a JSON config file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ScoringError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            ScoringError::Configuration(format!("cannot read '{}': {err}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ScoringError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| ScoringError::Configuration(format!("invalid config: {err}")))?;
        config.validated()
    }

    /// Reject configurations no scoring pass could run with.
    pub fn validated(self) -> Result<Self, ScoringError> {
        if self.methods.is_empty() {
            return Err(ScoringError::Configuration(
                "at least one method must be configured".into(),
            ));
        }
        if self.svd_rank == 0 {
            return Err(ScoringError::Configuration(
                "svd_rank must be positive".into(),
            ));
        }
        if self.pos_tags.is_empty() {
            return Err(ScoringError::Configuration(
                "pos_tags must not be empty".into(),
            ));
        }
        Ok(self)
    }

    pub fn with_methods(mut self, methods: Vec<ScoringMethod>) -> Self {
        self.methods = methods;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn method_params(&self) -> MethodParams {
        MethodParams {
            svd_rank: self.svd_rank,
            pos_tags: self.pos_tags.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_config_fills_defaults_and_composes_paths() {
        let config = ScoringConfig::from_json_str(
            r#"{
                "methods": ["unique", "svd_stack"],
                "embedding": {"output_data_directory": "emb", "f_db": "w2v.bin"},
                "document_scores": {"output_data_directory": "out"}
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.methods,
            vec![ScoringMethod::Unique, ScoringMethod::SvdStack]
        );
        assert_eq!(config.embedding.path(), PathBuf::from("emb").join("w2v.bin"));
        assert_eq!(
            config.document_scores.path(),
            PathBuf::from("out").join(DEFAULT_STORE_FILENAME)
        );
        assert_eq!(config.svd_rank, 2);
        assert_eq!(config.method_params().pos_tags, vec!["N", "ADJ", "V"]);
    }

    #[test]
    fn unknown_method_is_a_configuration_error() {
        let err = ScoringConfig::from_json_str(r#"{"methods": ["bag_of_words"]}"#).unwrap_err();
        assert!(matches!(err, ScoringError::Configuration(msg) if msg.contains("bag_of_words")));
    }

    #[test]
    fn degenerate_settings_are_rejected() {
        for raw in [r#"{"methods": []}"#, r#"{"svd_rank": 0}"#, r#"{"pos_tags": []}"#] {
            assert!(matches!(
                ScoringConfig::from_json_str(raw),
                Err(ScoringError::Configuration(_))
            ));
        }
    }
}
