use indexmap::IndexMap;

use crate::data::{MergedRecord, ResultRecord};
use crate::types::{DatasetId, RecordId};

/// Fold result records sharing `(id, source_dataset)` into one concatenated vector.
///
/// Groups appear in first-seen order; member vectors are concatenated in the
/// order they were produced.
pub fn merge_records<I>(records: I) -> Vec<MergedRecord>
where
    I: IntoIterator<Item = ResultRecord>,
{
    let mut groups: IndexMap<(RecordId, DatasetId), Vec<f32>> = IndexMap::new();
    for record in records {
        groups
            .entry((record.id, record.source_dataset))
            .or_default()
            .extend(record.vector);
    }
    groups
        .into_iter()
        .map(|((id, source_dataset), vector)| MergedRecord {
            id,
            source_dataset,
            vector,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, dataset: &str, vector: Vec<f32>) -> ResultRecord {
        ResultRecord {
            vector,
            id: id.to_string(),
            source_dataset: dataset.to_string(),
            extra_fields: Vec::new(),
        }
    }

    #[test]
    fn fields_sharing_a_key_are_concatenated_in_order() {
        let merged = merge_records(vec![
            record("5", "titles", vec![1.0, 2.0]),
            record("5", "titles", vec![3.0, 4.0]),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].vector, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn same_id_in_different_datasets_stays_separate() {
        let merged = merge_records(vec![
            record("1", "a", vec![1.0]),
            record("2", "a", vec![2.0]),
            record("1", "b", vec![3.0]),
            record("1", "a", vec![4.0]),
        ]);
        let keys: Vec<(&str, &str)> = merged
            .iter()
            .map(|m| (m.id.as_str(), m.source_dataset.as_str()))
            .collect();
        assert_eq!(keys, vec![("1", "a"), ("2", "a"), ("1", "b")]);
        assert_eq!(merged[0].vector, vec![1.0, 4.0]);
        assert_eq!(merged[2].vector, vec![3.0]);
    }

    #[test]
    fn empty_input_merges_to_nothing() {
        assert!(merge_records(Vec::new()).is_empty());
    }
}
