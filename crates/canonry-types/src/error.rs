use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid handle string: {0}")]
    InvalidHandle(String),

    #[error("invalid field count: expected {expected}, got {actual}")]
    InvalidFieldCount { expected: usize, actual: usize },
}
