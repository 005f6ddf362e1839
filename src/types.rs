/// Document identifier shared by every field of a split document.
/// Examples: `5`, `abstracts::000123`
pub type RecordId = String;
/// Logical table/file a document came from.
/// Examples: `data/abstracts.sqlite`, `titles`
pub type DatasetId = String;
/// Store-friendly dataset name derived from a `DatasetId`.
/// Example: `abstracts`
pub type DatasetName = String;
/// Vocabulary word.
/// Examples: `cat`, `protein`
pub type Word = String;
/// Part-of-speech tag attached to one raw token.
/// Examples: `N`, `ADJ`, `V`
pub type PosTag = String;
/// Identifier for a document supplier.
/// Example: `data/abstracts.jsonl`
pub type SourceId = String;
/// Dense document or word vector.
pub type Vector = Vec<f32>;
