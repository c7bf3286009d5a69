//! Error types for the extraction crate.

use thiserror::Error;

/// Errors that can occur during discovery and extraction.
///
/// Configuration variants are raised before any record is emitted.
/// Failures of a single message never surface here; they are logged and
/// the message is skipped.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to decode GRIB data: {0}")]
    Decode(#[from] grib2_parser::Grib2Error),

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No paths configured")]
    NoPaths,

    #[error("Invalid path pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Field '{field}' is part of every {mode} record and cannot be excluded")]
    ReservedField { field: String, mode: &'static str },

    #[error("Primary key '{key}' is not in the schema of stream '{stream}'")]
    InvalidPrimaryKey { stream: String, key: String },

    #[error("Stream '{0}' has no schema assigned")]
    SchemaNotAssigned(String),
}

impl ExtractionError {
    /// True for errors caused by the configuration document rather than
    /// by the data being read.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigParse(_)
                | Self::InvalidConfig(_)
                | Self::NoPaths
                | Self::InvalidPattern { .. }
                | Self::ReservedField { .. }
                | Self::InvalidPrimaryKey { .. }
        )
    }
}

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;
