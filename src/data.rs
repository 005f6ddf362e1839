use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::methods::POS_METADATA_KEY;
use crate::errors::ScoringError;
pub use crate::types::{DatasetId, PosTag, RecordId, Vector};

/// One unit of the document stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Whitespace-tokenizable text.
    pub text: String,
    /// Identifier shared by all fields of the same logical document.
    pub id: RecordId,
    /// Serialized per-token metadata; only `pos_split` reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    /// Logical table/file the document came from.
    pub source_dataset: DatasetId,
    /// Opaque values carried through to the result record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_fields: Vec<Value>,
}

impl Document {
    /// Create a document with no metadata or extra fields.
    pub fn new(
        text: impl Into<String>,
        id: impl Into<RecordId>,
        source_dataset: impl Into<DatasetId>,
    ) -> Self {
        Self {
            text: text.into(),
            id: id.into(),
            metadata: None,
            source_dataset: source_dataset.into(),
            extra_fields: Vec::new(),
        }
    }

    /// Attach serialized metadata.
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Attach pass-through fields.
    pub fn with_extra_fields(mut self, extra_fields: Vec<Value>) -> Self {
        self.extra_fields = extra_fields;
        self
    }

    /// Raw whitespace tokens.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.text.split_whitespace()
    }

    /// Decode the part-of-speech metadata, failing when it is absent or malformed.
    pub fn pos_metadata(&self) -> Result<PosMetadata, ScoringError> {
        let raw = self.metadata.as_deref().ok_or_else(|| ScoringError::Data {
            id: self.id.clone(),
            details: "part-of-speech metadata is missing".into(),
        })?;
        PosMetadata::parse(raw).map_err(|details| ScoringError::Data {
            id: self.id.clone(),
            details,
        })
    }
}

/// Per-token part-of-speech tags aligned with the whitespace tokens of a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosMetadata {
    #[serde(rename = "POS")]
    pub tags: Vec<PosTag>,
}

impl PosMetadata {
    /// Parse a JSON object holding a `"POS"` array.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(raw).map_err(|err| format!("metadata is not valid JSON: {err}"))?;
        let tags = value
            .get(POS_METADATA_KEY)
            .ok_or_else(|| format!("metadata has no '{POS_METADATA_KEY}' key"))?;
        let tags = tags
            .as_array()
            .ok_or_else(|| format!("metadata '{POS_METADATA_KEY}' is not a list"))?
            .iter()
            .map(|tag| {
                tag.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("metadata '{POS_METADATA_KEY}' holds a non-string tag"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tags })
    }
}

/// Output of scoring one document under one method.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub vector: Vector,
    pub id: RecordId,
    pub source_dataset: DatasetId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_fields: Vec<Value>,
}

/// Concatenation of every `ResultRecord` sharing one `(id, source_dataset)` key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub id: RecordId,
    pub source_dataset: DatasetId,
    pub vector: Vector,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pos_metadata_parses_tag_list() {
        let doc = Document::new("run red", "1", "titles").with_metadata(r#"{"POS": ["V", "ADJ"]}"#);
        let meta = doc.pos_metadata().unwrap();
        assert_eq!(meta.tags, vec!["V".to_string(), "ADJ".to_string()]);
    }

    #[test]
    fn missing_pos_metadata_is_a_data_error() {
        let doc = Document::new("run red", "9", "titles");
        let err = doc.pos_metadata().unwrap_err();
        assert!(matches!(err, ScoringError::Data { id, .. } if id == "9"));
    }

    #[test]
    fn malformed_pos_metadata_is_a_data_error() {
        for raw in ["not json", r#"{"tags": []}"#, r#"{"POS": "V"}"#, r#"{"POS": [1]}"#] {
            let doc = Document::new("run", "2", "titles").with_metadata(raw);
            assert!(
                matches!(doc.pos_metadata(), Err(ScoringError::Data { .. })),
                "expected data error for {raw}"
            );
        }
    }

    #[test]
    fn documents_decode_from_json_with_defaults() {
        let doc: Document =
            serde_json::from_str(r#"{"text":"a b","id":"3","source_dataset":"x.jsonl"}"#).unwrap();
        assert_eq!(doc.metadata, None);
        assert!(doc.extra_fields.is_empty());
        assert_eq!(doc.tokens().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
