//! Hierarchical matrix store: `/<method>/<dataset>` -> 2-D `f32` matrix.
//!
//! Backed by a single simd-r-drive file. Rewriting a key appends a newer
//! record, so reads always see the latest matrix and replaced rows never leak.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ndarray::Array2;
use simd_r_drive::storage_engine::DataStore;
use simd_r_drive::storage_engine::traits::{DataStoreReader, DataStoreWriter};
use tracing::info;

use crate::constants::store::{
    BITCODE_PREFIX, DEFAULT_STORE_DIR, DEFAULT_STORE_FILENAME, GROUP_INDEX_PREFIX, GROUPS_KEY,
    LISTING_RECORD_VERSION, MATRIX_PREFIX, MATRIX_RECORD_VERSION, META_KEY, STORE_VERSION,
};
use crate::data::MergedRecord;
use crate::errors::ScoringError;
use crate::methods::ScoringMethod;
use crate::types::DatasetName;

/// Shape and timestamp of one persisted matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetInfo {
    pub method: String,
    pub name: DatasetName,
    pub rows: usize,
    pub cols: usize,
    pub written_at: DateTime<Utc>,
}

/// A matrix read back from the store.
#[derive(Clone, Debug)]
pub struct StoredMatrix {
    pub info: DatasetInfo,
    pub values: Array2<f32>,
}

#[derive(Clone, Copy, Debug, bitcode::Encode, bitcode::Decode)]
/// Versioned metadata header stored in the store file.
struct StoreMeta {
    version: u8,
}

#[derive(Clone, Debug, bitcode::Encode, bitcode::Decode)]
struct PersistedMatrix {
    rows: u64,
    cols: u64,
    written_at_ms: i64,
    values: Vec<f32>,
}

#[derive(Clone, Debug, Default, bitcode::Encode, bitcode::Decode)]
struct PersistedListing {
    names: Vec<String>,
}

/// A shape-checked matrix ready to be written.
struct PreparedMatrix {
    info: DatasetInfo,
    persisted: PersistedMatrix,
}

impl PreparedMatrix {
    fn new<R: AsRef<[f32]>>(
        method: ScoringMethod,
        name: &str,
        rows: &[R],
    ) -> Result<Self, ScoringError> {
        let shapes: BTreeSet<usize> = rows.iter().map(|row| row.as_ref().len()).collect();
        if shapes.len() > 1 {
            return Err(ScoringError::ShapeMismatch {
                method,
                dataset: name.to_string(),
                shapes,
            });
        }
        let cols = shapes.first().copied().unwrap_or(0);
        let mut values = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            values.extend_from_slice(row.as_ref());
        }
        let written_at = Utc::now();
        Ok(Self {
            info: DatasetInfo {
                method: method.as_str().to_string(),
                name: name.to_string(),
                rows: rows.len(),
                cols,
                written_at: timestamp(written_at.timestamp_millis()),
            },
            persisted: PersistedMatrix {
                rows: rows.len() as u64,
                cols: cols as u64,
                written_at_ms: written_at.timestamp_millis(),
                values,
            },
        })
    }
}

/// File-backed grouped store for document vectors.
pub struct GroupedStore {
    store: DataStore,
    path: PathBuf,
}

impl fmt::Debug for GroupedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupedStore")
            .field("path", &self.path)
            .finish()
    }
}

impl GroupedStore {
    /// Open (or create) the store at `path`. A directory path gets the default filename.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, ScoringError> {
        let path = coerce_store_path(path.into());
        ensure_parent_dir(&path)?;
        let store = DataStore::open(path.as_path()).map_err(map_store_err)?;
        let store = Self { store, path };
        store.verify_metadata()?;
        Ok(store)
    }

    /// Default store file path under the crate's default output directory.
    pub fn default_path() -> PathBuf {
        Self::default_path_in_dir(DEFAULT_STORE_DIR)
    }

    /// Default store file path inside a custom directory.
    pub fn default_path_in_dir<P: AsRef<Path>>(dir: P) -> PathBuf {
        dir.as_ref().join(DEFAULT_STORE_FILENAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn verify_metadata(&self) -> Result<(), ScoringError> {
        match read_bytes(&self.store, META_KEY)? {
            Some(bytes) => {
                let meta: StoreMeta = bitcode::decode(&decode_bitcode_payload(&bytes)?)
                    .map_err(|err| {
                        ScoringError::Store(format!("failed to decode store metadata: {err}"))
                    })?;
                if meta.version != STORE_VERSION {
                    return Err(ScoringError::Store(format!(
                        "store version mismatch (expected {}, found {})",
                        STORE_VERSION, meta.version
                    )));
                }
            }
            None => {
                let meta = StoreMeta {
                    version: STORE_VERSION,
                };
                let payload = encode_bitcode_payload(&bitcode::encode(&meta));
                write_bytes(&self.store, META_KEY, &payload)?;
            }
        }
        Ok(())
    }

    /// Partition merged records by source dataset and write one matrix per partition.
    ///
    /// Every partition is shape-checked before anything is written and all of
    /// them land in one batch, so a failed call leaves the store unchanged.
    /// Distinct source datasets that reduce to the same name are rejected.
    pub fn write_group(
        &self,
        method: ScoringMethod,
        records: &[MergedRecord],
    ) -> Result<Vec<DatasetInfo>, ScoringError> {
        let mut partitions: IndexMap<DatasetName, (&str, Vec<&[f32]>)> = IndexMap::new();
        for record in records {
            let name = dataset_name(&record.source_dataset);
            let (source, rows) = partitions
                .entry(name.clone())
                .or_insert_with(|| (record.source_dataset.as_str(), Vec::new()));
            if *source != record.source_dataset {
                return Err(ScoringError::Store(format!(
                    "datasets '{source}' and '{}' both map to '{name}'",
                    record.source_dataset
                )));
            }
            rows.push(record.vector.as_slice());
        }
        let matrices = partitions
            .iter()
            .map(|(name, (_, rows))| PreparedMatrix::new(method, name, rows))
            .collect::<Result<Vec<_>, _>>()?;
        self.commit(method, matrices)
    }

    /// Stack `rows` into a matrix and write it under `/<method>/<name>`, replacing any prior one.
    pub fn write_matrix<R: AsRef<[f32]>>(
        &self,
        method: ScoringMethod,
        name: &str,
        rows: &[R],
    ) -> Result<DatasetInfo, ScoringError> {
        let matrix = PreparedMatrix::new(method, name, rows)?;
        self.commit(method, vec![matrix])?
            .pop()
            .ok_or_else(|| ScoringError::Store(format!("matrix '{name}' was not written")))
    }

    /// Write `matrices` and the listings that name them in a single batch.
    fn commit(
        &self,
        method: ScoringMethod,
        matrices: Vec<PreparedMatrix>,
    ) -> Result<Vec<DatasetInfo>, ScoringError> {
        if matrices.is_empty() {
            return Ok(Vec::new());
        }
        let group = method.as_str();
        let index_key = group_index_key(group);
        let mut listing = self.read_listing(&index_key)?;
        let mut listing_changed = false;
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(matrices.len() + 2);
        for matrix in &matrices {
            entries.push((
                matrix_key(group, &matrix.info.name),
                encode_versioned(MATRIX_RECORD_VERSION, &bitcode::encode(&matrix.persisted)),
            ));
            if !listing.names.contains(&matrix.info.name) {
                listing.names.push(matrix.info.name.clone());
                listing_changed = true;
            }
        }
        if listing_changed {
            entries.push((
                index_key,
                encode_versioned(LISTING_RECORD_VERSION, &bitcode::encode(&listing)),
            ));
        }
        if let Some(groups) = self.listing_with(GROUPS_KEY, group)? {
            entries.push((GROUPS_KEY.to_vec(), groups));
        }
        let entry_refs: Vec<(&[u8], &[u8])> = entries
            .iter()
            .map(|(key, value)| (key.as_slice(), value.as_slice()))
            .collect();
        self.store
            .batch_write(&entry_refs)
            .map_err(|err| ScoringError::Store(format!("matrix write failed: {err}")))?;

        for matrix in &matrices {
            info!(
                method = group,
                dataset = matrix.info.name.as_str(),
                rows = matrix.info.rows,
                cols = matrix.info.cols,
                "saved scored documents"
            );
        }
        Ok(matrices.into_iter().map(|matrix| matrix.info).collect())
    }

    /// Read the matrix stored under `/<method>/<name>`.
    pub fn read_matrix(
        &self,
        method: ScoringMethod,
        name: &str,
    ) -> Result<Option<StoredMatrix>, ScoringError> {
        let group = method.as_str();
        let Some(bytes) = read_bytes(&self.store, &matrix_key(group, name))? else {
            return Ok(None);
        };
        let raw = decode_versioned(MATRIX_RECORD_VERSION, &bytes, "matrix")?;
        let persisted: PersistedMatrix = bitcode::decode(&raw)
            .map_err(|err| ScoringError::Store(format!("corrupt matrix record: {err}")))?;
        let rows = persisted.rows as usize;
        let cols = persisted.cols as usize;
        let values = Array2::from_shape_vec((rows, cols), persisted.values)
            .map_err(|err| ScoringError::Store(format!("corrupt matrix record: {err}")))?;
        Ok(Some(StoredMatrix {
            info: DatasetInfo {
                method: group.to_string(),
                name: name.to_string(),
                rows,
                cols,
                written_at: timestamp(persisted.written_at_ms),
            },
            values,
        }))
    }

    /// Dataset names written under `method`, in first-write order.
    pub fn datasets(&self, method: ScoringMethod) -> Result<Vec<DatasetName>, ScoringError> {
        Ok(self
            .read_listing(&group_index_key(method.as_str()))?
            .names)
    }

    /// Method groups present in the store, in first-write order.
    pub fn methods(&self) -> Result<Vec<String>, ScoringError> {
        Ok(self.read_listing(GROUPS_KEY)?.names)
    }

    fn read_listing(&self, key: &[u8]) -> Result<PersistedListing, ScoringError> {
        match read_bytes(&self.store, key)? {
            None => Ok(PersistedListing::default()),
            Some(bytes) => {
                let raw = decode_versioned(LISTING_RECORD_VERSION, &bytes, "listing")?;
                bitcode::decode(&raw)
                    .map_err(|err| ScoringError::Store(format!("corrupt listing record: {err}")))
            }
        }
    }

    /// Encoded listing with `name` appended, or `None` when already listed.
    fn listing_with(&self, key: &[u8], name: &str) -> Result<Option<Vec<u8>>, ScoringError> {
        let mut listing = self.read_listing(key)?;
        if listing.names.iter().any(|existing| existing == name) {
            return Ok(None);
        }
        listing.names.push(name.to_string());
        Ok(Some(encode_versioned(
            LISTING_RECORD_VERSION,
            &bitcode::encode(&listing),
        )))
    }
}

/// Store-friendly name for a source dataset: basename without its final extension.
pub fn dataset_name(source: &str) -> DatasetName {
    Path::new(source)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| source.to_string())
}

fn timestamp(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn matrix_key(group: &str, name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(MATRIX_PREFIX.len() + group.len() + name.len() + 2);
    key.extend_from_slice(MATRIX_PREFIX);
    key.push(b'/');
    key.extend_from_slice(group.as_bytes());
    key.push(b'/');
    key.extend_from_slice(name.as_bytes());
    key
}

fn group_index_key(group: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(GROUP_INDEX_PREFIX.len() + group.len());
    key.extend_from_slice(GROUP_INDEX_PREFIX);
    key.extend_from_slice(group.as_bytes());
    key
}

fn encode_versioned(version: u8, bytes: &[u8]) -> Vec<u8> {
    let payload = encode_bitcode_payload(bytes);
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(version);
    buf.extend_from_slice(&payload);
    buf
}

fn decode_versioned(version: u8, bytes: &[u8], what: &str) -> Result<Vec<u8>, ScoringError> {
    if bytes.first().copied() != Some(version) {
        return Err(ScoringError::Store(format!(
            "{what} record version mismatch"
        )));
    }
    decode_bitcode_payload(&bytes[1..])
}

fn encode_bitcode_payload(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push(BITCODE_PREFIX);
    out.extend_from_slice(bytes);
    out
}

fn decode_bitcode_payload(bytes: &[u8]) -> Result<Vec<u8>, ScoringError> {
    if bytes.first().copied() != Some(BITCODE_PREFIX) {
        return Err(ScoringError::Store(
            "bitcode payload missing expected prefix".into(),
        ));
    }
    Ok(bytes[1..].to_vec())
}

fn read_bytes(store: &DataStore, key: &[u8]) -> Result<Option<Vec<u8>>, ScoringError> {
    store
        .read(key)
        .map_err(map_store_err)?
        .map(|entry| Ok(entry.as_ref().to_vec()))
        .transpose()
}

fn write_bytes(store: &DataStore, key: &[u8], payload: &[u8]) -> Result<(), ScoringError> {
    store.write(key, payload).map_err(map_store_err)?;
    Ok(())
}

fn coerce_store_path(path: PathBuf) -> PathBuf {
    if path.is_dir() {
        return path.join(DEFAULT_STORE_FILENAME);
    }
    path
}

fn ensure_parent_dir(path: &Path) -> Result<(), ScoringError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn map_store_err(err: io::Error) -> ScoringError {
    ScoringError::Store(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn merged(id: &str, dataset: &str, vector: Vec<f32>) -> MergedRecord {
        MergedRecord {
            id: id.to_string(),
            source_dataset: dataset.to_string(),
            vector,
        }
    }

    #[test]
    fn dataset_names_strip_directories_and_extension() {
        assert_eq!(dataset_name("data/abstracts.sqlite"), "abstracts");
        assert_eq!(dataset_name("/tmp/a.b.jsonl"), "a.b");
        assert_eq!(dataset_name("titles"), "titles");
    }

    #[test]
    fn matrices_round_trip_bit_identically() {
        let dir = tempdir().unwrap();
        let store = GroupedStore::open(dir.path().join("scores.bin")).unwrap();
        let rows = vec![vec![0.1f32, -2.5, 3.0], vec![f32::MIN_POSITIVE, 0.0, 1e-7]];
        let info = store
            .write_matrix(ScoringMethod::Unique, "abstracts", &rows)
            .unwrap();
        assert_eq!((info.rows, info.cols), (2, 3));

        let stored = store
            .read_matrix(ScoringMethod::Unique, "abstracts")
            .unwrap()
            .unwrap();
        assert_eq!(stored.values.dim(), (2, 3));
        let bits: Vec<u32> = stored.values.iter().map(|v| v.to_bits()).collect();
        let expected: Vec<u32> = rows.iter().flatten().map(|v| v.to_bits()).collect();
        assert_eq!(bits, expected);
    }

    #[test]
    fn rewriting_a_key_fully_replaces_it() {
        let dir = tempdir().unwrap();
        let store = GroupedStore::open(dir.path().join("scores.bin")).unwrap();
        store
            .write_matrix(ScoringMethod::Simple, "t", &vec![vec![1.0f32, 2.0]; 5])
            .unwrap();
        store
            .write_matrix(ScoringMethod::Simple, "t", &[vec![9.0f32, 8.0, 7.0]])
            .unwrap();

        let stored = store.read_matrix(ScoringMethod::Simple, "t").unwrap().unwrap();
        assert_eq!(stored.values.dim(), (1, 3));
        assert_eq!(stored.values.row(0).to_vec(), vec![9.0, 8.0, 7.0]);
        assert_eq!(store.datasets(ScoringMethod::Simple).unwrap(), vec!["t"]);
    }

    #[test]
    fn ragged_rows_fail_and_write_nothing() {
        let dir = tempdir().unwrap();
        let store = GroupedStore::open(dir.path().join("scores.bin")).unwrap();
        let err = store
            .write_matrix(
                ScoringMethod::SvdStack,
                "abstracts",
                &[vec![1.0f32, 2.0], vec![1.0]],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ScoringError::ShapeMismatch { ref dataset, ref shapes, .. }
                if dataset == "abstracts" && shapes.len() == 2
        ));
        assert!(err.to_string().contains("abstracts"));
        assert!(
            store
                .read_matrix(ScoringMethod::SvdStack, "abstracts")
                .unwrap()
                .is_none()
        );
        assert!(store.datasets(ScoringMethod::SvdStack).unwrap().is_empty());
    }

    #[test]
    fn ragged_rewrite_keeps_the_previous_matrix() {
        let dir = tempdir().unwrap();
        let store = GroupedStore::open(dir.path().join("scores.bin")).unwrap();
        store
            .write_matrix(ScoringMethod::Unique, "t", &[vec![1.0f32]])
            .unwrap();
        assert!(
            store
                .write_matrix(ScoringMethod::Unique, "t", &[vec![1.0f32], vec![1.0, 2.0]])
                .is_err()
        );
        let stored = store.read_matrix(ScoringMethod::Unique, "t").unwrap().unwrap();
        assert_eq!(stored.values.dim(), (1, 1));
    }

    #[test]
    fn write_group_partitions_by_dataset_name() {
        let dir = tempdir().unwrap();
        let store = GroupedStore::open(dir.path()).unwrap();
        let infos = store
            .write_group(
                ScoringMethod::PosSplit,
                &[
                    merged("1", "data/titles.jsonl", vec![1.0, 2.0]),
                    merged("1", "data/bodies.jsonl", vec![3.0]),
                    merged("2", "data/titles.jsonl", vec![4.0, 5.0]),
                ],
            )
            .unwrap();
        let shapes: Vec<(&str, usize, usize)> = infos
            .iter()
            .map(|info| (info.name.as_str(), info.rows, info.cols))
            .collect();
        assert_eq!(shapes, vec![("titles", 2, 2), ("bodies", 1, 1)]);
        assert_eq!(
            store.datasets(ScoringMethod::PosSplit).unwrap(),
            vec!["titles", "bodies"]
        );
        assert_eq!(store.methods().unwrap(), vec!["pos_split"]);
        assert!(dir.path().join(DEFAULT_STORE_FILENAME).is_file());
    }

    #[test]
    fn ragged_partition_aborts_the_whole_group() {
        let dir = tempdir().unwrap();
        let store = GroupedStore::open(dir.path().join("scores.bin")).unwrap();
        let err = store
            .write_group(
                ScoringMethod::Unique,
                &[
                    merged("1", "ok.jsonl", vec![1.0, 2.0]),
                    merged("1", "bad.jsonl", vec![1.0]),
                    merged("2", "bad.jsonl", vec![1.0, 2.0]),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, ScoringError::ShapeMismatch { ref dataset, .. } if dataset == "bad"));
        assert!(store.read_matrix(ScoringMethod::Unique, "ok").unwrap().is_none());
        assert!(store.datasets(ScoringMethod::Unique).unwrap().is_empty());
        assert!(store.methods().unwrap().is_empty());
    }

    #[test]
    fn colliding_dataset_names_are_rejected() {
        let dir = tempdir().unwrap();
        let store = GroupedStore::open(dir.path().join("scores.bin")).unwrap();
        let err = store
            .write_group(
                ScoringMethod::Simple,
                &[
                    merged("1", "dir1/titles.jsonl", vec![1.0]),
                    merged("1", "dir2/titles.jsonl", vec![2.0]),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, ScoringError::Store(ref msg) if msg.contains("both map to 'titles'")));
        assert!(store.read_matrix(ScoringMethod::Simple, "titles").unwrap().is_none());
    }

    #[test]
    fn store_reopens_with_prior_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scores.bin");
        let store = GroupedStore::open(&path).unwrap();
        store
            .write_matrix(ScoringMethod::Unique, "t", &[vec![0.5f32, 0.5]])
            .unwrap();
        drop(store);

        let reopened = GroupedStore::open(&path).unwrap();
        let stored = reopened
            .read_matrix(ScoringMethod::Unique, "t")
            .unwrap()
            .unwrap();
        assert_eq!(stored.values.row(0).to_vec(), vec![0.5, 0.5]);
        assert_eq!(reopened.methods().unwrap(), vec!["unique"]);
    }

    #[test]
    fn bitcode_payload_requires_prefix() {
        let err = decode_bitcode_payload(&[0x00, 0x01]).unwrap_err();
        assert!(
            matches!(err, ScoringError::Store(msg) if msg.contains("missing expected prefix"))
        );
        let err = decode_versioned(MATRIX_RECORD_VERSION, &[0xFF], "matrix").unwrap_err();
        assert!(matches!(err, ScoringError::Store(msg) if msg.contains("version mismatch")));
    }
}
