use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::constants::source::JSONL_EXTENSION;
use crate::data::Document;
use crate::errors::ScoringError;
use crate::source::{DocumentSource, DocumentStream};
use crate::types::{RecordId, SourceId};

/// Configuration for a JSON-lines document file.
#[derive(Clone, Debug)]
pub struct JsonlSourceConfig {
    /// File to read; also the `source_dataset` of every document.
    pub path: PathBuf,
    /// Key holding the document id (string or number).
    pub id_field: String,
    /// Keys holding text; each yields one document sharing the row id.
    pub text_fields: Vec<String>,
    /// Keys holding per-token metadata (string, or an object serialized as JSON).
    ///
    /// Either one key shared by every text field, or one key per text field in
    /// the same order. Tag lists align with one field's tokens, so several text
    /// fields scored with `pos_split` need one key each.
    pub meta_fields: Vec<String>,
}

impl JsonlSourceConfig {
    /// Config reading `{"id", "text", "meta"}` rows from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            id_field: "id".to_string(),
            text_fields: vec!["text".to_string()],
            meta_fields: vec!["meta".to_string()],
        }
    }

    /// Read several parallel text fields per row (for example title and body).
    pub fn with_text_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn with_meta_field(mut self, field: impl Into<String>) -> Self {
        self.meta_fields = vec![field.into()];
        self
    }

    /// Read metadata from one key per text field, paired by position.
    pub fn with_meta_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    fn meta_field_for(&self, text_idx: usize) -> Option<&str> {
        match self.meta_fields.as_slice() {
            [shared] => Some(shared.as_str()),
            fields => fields.get(text_idx).map(String::as_str),
        }
    }
}

/// Document source over a JSON-lines file, one JSON object per line.
///
/// Blank lines are skipped. A missing or `null` text field scores as an empty
/// document so row alignment across fields is preserved. The text field name is
/// carried as the document's only extra field.
pub struct JsonlDocumentSource {
    config: JsonlSourceConfig,
    id: SourceId,
}

impl JsonlDocumentSource {
    pub fn new(config: JsonlSourceConfig) -> Self {
        let id = config.path.to_string_lossy().into_owned();
        Self { config, id }
    }

    fn failure(&self, reason: String) -> ScoringError {
        ScoringError::Source {
            source_id: self.id.clone(),
            reason,
        }
    }

    fn parse_line(&self, line: &str, line_no: usize) -> Result<Vec<Document>, ScoringError> {
        let row: Map<String, Value> = serde_json::from_str(line)
            .map_err(|err| self.failure(format!("line {line_no}: {err}")))?;
        let id = match row.get(&self.config.id_field) {
            Some(Value::String(id)) => RecordId::from(id.as_str()),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(self.failure(format!(
                    "line {line_no}: '{}' must be a string or number",
                    self.config.id_field
                )));
            }
        };
        let mut documents = Vec::with_capacity(self.config.text_fields.len());
        for (text_idx, field) in self.config.text_fields.iter().enumerate() {
            let metadata = match self
                .config
                .meta_field_for(text_idx)
                .and_then(|key| row.get(key))
            {
                None | Some(Value::Null) => None,
                Some(Value::String(raw)) => Some(raw.clone()),
                Some(other) => Some(other.to_string()),
            };
            let text = match row.get(field) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(text)) => text.clone(),
                Some(_) => {
                    return Err(self.failure(format!(
                        "line {line_no}: text field '{field}' is not a string"
                    )));
                }
            };
            documents.push(Document {
                text,
                id: id.clone(),
                metadata,
                source_dataset: self.id.clone(),
                extra_fields: vec![Value::String(field.clone())],
            });
        }
        Ok(documents)
    }
}

impl DocumentSource for JsonlDocumentSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn documents(&self) -> Result<DocumentStream<'_>, ScoringError> {
        let meta_count = self.config.meta_fields.len();
        if meta_count > 1 && meta_count != self.config.text_fields.len() {
            return Err(self.failure(format!(
                "{meta_count} metadata fields cannot pair with {} text fields",
                self.config.text_fields.len()
            )));
        }
        let file = File::open(&self.config.path)
            .map_err(|err| self.failure(format!("open failed: {err}")))?;
        let lines = BufReader::new(file).lines().enumerate();
        Ok(Box::new(lines.flat_map(move |(idx, line)| {
            let parsed = match line {
                Err(err) => Err(self.failure(format!("line {}: {err}", idx + 1))),
                Ok(line) if line.trim().is_empty() => Ok(Vec::new()),
                Ok(line) => self.parse_line(&line, idx + 1),
            };
            match parsed {
                Ok(documents) => documents.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(err) => vec![Err(err)],
            }
        })))
    }
}

/// One source per `*.jsonl` file under `root`, in file-name order.
pub fn directory_sources(
    root: impl AsRef<Path>,
    template: &JsonlSourceConfig,
) -> Result<Vec<JsonlDocumentSource>, ScoringError> {
    let root = root.as_ref();
    let mut sources = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|err| ScoringError::Source {
            source_id: root.to_string_lossy().into_owned(),
            reason: format!("directory walk failed: {err}"),
        })?;
        let path = entry.path();
        let is_jsonl = entry.file_type().is_file()
            && path
                .extension()
                .is_some_and(|ext| ext == JSONL_EXTENSION);
        if !is_jsonl {
            continue;
        }
        let mut config = template.clone();
        config.path = path.to_path_buf();
        sources.push(JsonlDocumentSource::new(config));
    }
    debug!(root = %root.display(), sources = sources.len(), "indexed document files");
    Ok(sources)
}
