//src/error.rs

use thiserror::Error;

use crate::types::TaxonId;

/// Errors that abort a run.
///
/// Per-hit and per-row problems (blacklisted taxa, malformed rows, queries
/// without surviving hits) are logged and skipped instead.
#[derive(Debug, Error)]
pub enum LcaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("column '{column}' is not among the column names")]
    MissingColumn { column: String },

    #[error("line {line}: invalid value '{value}': {reason}")]
    InvalidValue {
        line: usize,
        value: String,
        reason: String,
    },

    /// The number of hits seen for a query differs from the number announced for it.
    #[error("query '{query_id}': expected {expected} hit(s), observed {observed}")]
    GroupSizeMismatch {
        query_id: String,
        expected: usize,
        observed: usize,
    },

    #[error("expected {expected} record(s) but processed {processed}")]
    RecordCountMismatch { expected: usize, processed: usize },

    #[error("query '{query_id}' appears more than once")]
    DuplicateQueryId { query_id: String },

    #[error("no count given for query '{query_id}'")]
    MissingCount { query_id: String },

    #[error("cannot resolve the LCA of an empty taxon set")]
    EmptyTaxonSet,

    #[error("taxon {taxon} is not in the lineage tree")]
    UnknownNode { taxon: TaxonId },
}

pub type Result<T> = std::result::Result<T, LcaError>;
