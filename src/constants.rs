/// Constants used by the scoring methods.
pub mod methods {
    /// Number of singular vectors/values kept by `svd_stack`.
    pub const DEFAULT_SVD_RANK: usize = 2;
    /// Tags averaged by `pos_split`, in output order.
    pub const DEFAULT_POS_TAGS: [&str; 3] = ["N", "ADJ", "V"];
    /// Metadata key holding the per-token tag list.
    pub const POS_METADATA_KEY: &str = "POS";
    /// Relative tolerance for the unit-norm postcondition.
    pub const UNIT_NORM_TOLERANCE: f64 = 1e-5;
    /// Max Jacobi sweeps used by the symmetric eigen solver.
    pub const JACOBI_MAX_SWEEPS: usize = 64;
    /// Off-diagonal magnitude treated as converged by the eigen solver.
    pub const JACOBI_EPSILON: f64 = 1e-12;
    /// Singular values at or below this (relative to the largest) count as rank-deficient.
    ///
    /// Singular values come from Gram-matrix eigenvalues, whose noise floor is
    /// about `sqrt(eps) * sigma_1`; the cutoff sits well above it.
    pub const SINGULAR_VALUE_CUTOFF: f64 = 1e-6;
}

/// Constants used by the embedding artifact.
pub mod embedding {
    /// Version tag for bitcode-encoded embedding artifacts.
    pub const EMBEDDING_RECORD_VERSION: u8 = 1;
    /// File extensions imported as word2vec text.
    pub const WORD2VEC_TEXT_EXTENSIONS: [&str; 2] = ["txt", "vec"];
    /// Default embedding artifact filename.
    pub const DEFAULT_EMBEDDING_FILENAME: &str = "w2v.bin";
}

/// Constants used by grouped-store persistence and wire encoding.
pub mod store {
    /// Key used for store global metadata.
    pub const META_KEY: &[u8] = b"__meta__";
    /// Key holding the list of method groups.
    pub const GROUPS_KEY: &[u8] = b"__groups__";
    /// Key prefix for per-method dataset listings.
    pub const GROUP_INDEX_PREFIX: &[u8] = b"group:";
    /// Key prefix for persisted matrices (`matrix:/<method>/<dataset>`).
    pub const MATRIX_PREFIX: &[u8] = b"matrix:";
    /// Version tag for persisted matrix records.
    pub const MATRIX_RECORD_VERSION: u8 = 1;
    /// Version tag for persisted listing records.
    pub const LISTING_RECORD_VERSION: u8 = 1;
    /// Prefix marker for bitcode-encoded payloads.
    pub const BITCODE_PREFIX: u8 = b'B';
    /// Version tag for store metadata compatibility checks.
    pub const STORE_VERSION: u8 = 1;
    /// Default directory for persisted store files.
    pub const DEFAULT_STORE_DIR: &str = "data_output";
    /// Default filename for persisted store files.
    pub const DEFAULT_STORE_FILENAME: &str = "document_scores.bin";
}

/// Constants used by the document stream scorer.
pub mod scorer {
    /// Minimum interval between progress log lines, in milliseconds.
    pub const PROGRESS_REPORT_MS: u64 = 750;
    /// Passes at least this large log progress.
    pub const PROGRESS_MIN_DOCUMENTS: usize = 1_024;
}

/// Constants used by the command-line runner.
pub mod logging {
    /// Log filter used when `RUST_LOG` is unset or invalid.
    pub const DEFAULT_LOG_FILTER: &str = "info";
}

/// Constants used by document sources.
pub mod source {
    /// File extension picked up by directory sources.
    pub const JSONL_EXTENSION: &str = "jsonl";
}
