//! Error types for sparse matrix and similarity search operations.

use thiserror::Error;

/// Errors raised by the matrix engine, the search engines and the text readers.
///
/// All of them are fatal to the computation that produced them: no partial
/// result is returned alongside an error.
#[derive(Debug, Error)]
pub enum FindSimError {
    /// A required row/column view (or its values) is not present.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A buffer could not be allocated or grown.
    #[error("allocation of {len} elements failed for {what}")]
    Allocation { what: &'static str, len: usize },

    /// Dimension/nnz mismatch between matrices, or malformed indices.
    #[error("inconsistent input: {0}")]
    InconsistentInput(String),

    /// Invalid user supplied parameter (k, eps, norm, ...).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// I/O error while reading or writing a matrix file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed content in a matrix file.
    #[error("parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },
}

pub type Result<T> = std::result::Result<T, FindSimError>;
