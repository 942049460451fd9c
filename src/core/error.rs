//! Error types for the fallible surfaces around the diagram pipeline
//!
//! The pipeline itself (extraction, layout, routing) never fails; these cover
//! schema edits, configuration loading and scheduler lifecycle.

/// Errors raised when editing a schema snapshot
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SchemaError {
    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Table '{0}' already exists")]
    DuplicateTable(String),

    #[error("Table name cannot be empty")]
    EmptyTableName,

    #[error("Column index {index} out of range (table has {len} columns)")]
    ColumnIndexOutOfRange { index: usize, len: usize },

    #[error("Note '{0}' not found")]
    NoteNotFound(String),

    #[error("Invalid schema JSON: {0}")]
    InvalidJson(String),
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        SchemaError::InvalidJson(err.to_string())
    }
}

/// Errors raised by the edge refresh scheduler
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Refresh scheduler requires a running Tokio runtime")]
    NoRuntime,

    #[error("Refresh scheduler has been disposed")]
    Disposed,
}

/// Errors raised while loading diagram configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a diagram session
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DiagramError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Node '{0}' not found")]
    NodeNotFound(String),
}
