use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Opening, committing or reloading the on-disk index failed. Durability
    /// can no longer be assumed, callers must treat this as fatal.
    #[error("Storage failure during {operation}: {message}")]
    Storage { operation: &'static str, message: String },

    #[error("Query planning failed: {0}")]
    QueryPlanning(String),

    #[error("Index is closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn storage(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Storage { operation, message: err.to_string() }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
