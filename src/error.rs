use thiserror::Error;

/// Errors returned by the segmentation pipeline.
///
/// Every variant names the offending input (column, record index or
/// parameter) so the caller can act on it.
#[derive(Debug, Error)]
pub enum Error {
    /// Input matrix or record slice is empty.
    #[error("empty input")]
    EmptyInput,

    /// A categorical value has no entry in the category map.
    #[error("unknown category {value:?} in column `{column}` (record {record})")]
    UnknownCategory {
        /// Column holding the value.
        column: &'static str,
        /// The unmapped value.
        value: String,
        /// Record index.
        record: usize,
    },

    /// A feature column has zero variance and cannot be standardized.
    #[error("feature `{column}` is constant (every record is {value}); remove it before standardizing")]
    DegenerateFeature {
        /// Column name.
        column: String,
        /// The value shared by every record.
        value: f64,
    },

    /// A required value is missing (or not a finite number).
    #[error("record {record} is missing a value for `{column}`")]
    IncompleteRecord {
        /// Record index.
        record: usize,
        /// Column name.
        column: String,
    },

    /// Requested reduction dimensionality exceeds the effective rank of the data.
    #[error("cannot extract {requested} components: effective rank of the data is {rank}")]
    InsufficientRank {
        /// Requested number of components.
        requested: usize,
        /// Effective rank found.
        rank: usize,
    },

    /// Bottleneck-network loss became NaN or infinite.
    #[error("training diverged in epoch {epoch}: loss is {loss}")]
    TrainingDivergence {
        /// 1-based epoch in which the loss went non-finite.
        epoch: usize,
        /// The offending loss value.
        loss: f64,
    },

    /// Requested cluster count is incompatible with the dataset.
    #[error("invalid cluster count: requested {requested}, but dataset has {n_items} items")]
    InvalidClusterCount {
        /// Requested number of clusters.
        requested: usize,
        /// Number of items in the dataset.
        n_items: usize,
    },

    /// Matrix width does not match what the model was fitted on.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimensionality.
        expected: usize,
        /// Found dimensionality.
        found: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Human-readable explanation.
        message: &'static str,
    },
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
