//! Common error types for revdup

use thiserror::Error;

/// Common result type for revdup operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the record model, quality model and configuration
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record or settings (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Entrytype outside the supported set
    #[error("Unknown entrytype: {0}")]
    UnknownEntryType(String),

    /// Not enough masterdata to derive a colrev_id
    #[error("Not enough data to identify record: {0}")]
    NotEnoughData(String),
}
