use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("CSV file not found: {0}")]
    CsvNotFound(PathBuf),

    #[error("CSV must have 'source' and 'log_message' columns")]
    MissingColumns { missing: Vec<String> },

    #[error("{labels} labels for {rows} rows")]
    RowCountMismatch { rows: usize, labels: usize },

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
