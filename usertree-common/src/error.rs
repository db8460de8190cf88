//! Common error types for usertree

use thiserror::Error;

/// Common result type for usertree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the usertree crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Uploaded file extension is not one of csv/txt/tsv/json
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// Parsed payload contained no records
    #[error("No valid data found in the file")]
    NoDataFound,

    /// Payload could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// A single record has the wrong shape or is missing a required field
    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    /// Password hashing or hash decoding failed
    #[error("Credential error: {0}")]
    Credential(String),

    /// Two-pass import aborted; the transaction was rolled back
    #[error("Import failed: {0}")]
    ImportFailed(String),
}
