//! Error types for the cellfreq library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum CellFreqError {
    #[error("Schema error in table '{table}': {reason}")]
    Schema { table: String, reason: String },

    #[error("Invalid criterion for column '{column}': {reason}")]
    InvalidCriterion { column: String, reason: String },

    #[error("Missing column '{column}' for sample '{sample_id}'")]
    MissingColumn { sample_id: String, column: String },

    #[error("Insufficient data: group '{group}' has {size} observation(s), at least {required} required")]
    InsufficientData {
        group: String,
        size: usize,
        required: usize,
    },

    #[error("Store unavailable at '{path}': {reason}")]
    StoreUnavailable { path: String, reason: String },

    #[error("Sample '{sample_id}': cell counts sum to {sum} but total_count is {total}")]
    InconsistentTotal {
        sample_id: String,
        sum: u64,
        total: u64,
    },

    #[error("Invalid value '{value}' at row {row}, column '{column}'")]
    InvalidValue {
        value: String,
        row: usize,
        column: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CellFreqError {
    pub(crate) fn schema(table: &str, reason: impl Into<String>) -> Self {
        Self::Schema {
            table: table.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_criterion(column: &str, reason: impl Into<String>) -> Self {
        Self::InvalidCriterion {
            column: column.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, CellFreqError>;
