//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid coordinate '{coordinate}': {reason}")]
    InvalidCoordinate { coordinate: String, reason: String },

    #[error("Invalid metadata: {message}")]
    InvalidMetadata { message: String },

    #[error("Failed to parse metadata XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Metadata is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Invalid timestamp '{value}': {source}")]
    InvalidTimestamp {
        value: String,
        source: chrono::ParseError,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;
