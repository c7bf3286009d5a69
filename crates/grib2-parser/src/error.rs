//! Error types for GRIB2 decoding.

use thiserror::Error;

/// Errors raised while splitting or decoding GRIB2 data.
#[derive(Debug, Error)]
pub enum Grib2Error {
    #[error("Failed to read GRIB file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid GRIB format: {0}")]
    InvalidFormat(String),

    #[error("Invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("Message is missing section {0}")]
    MissingSection(u8),

    #[error("Unsupported GRIB edition {0}")]
    UnsupportedEdition(u8),

    #[error("Unsupported template {section}.{template}")]
    UnsupportedTemplate { section: u8, template: u16 },

    #[error("Truncated message at offset {offset}: needs {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Unpacking failed: {0}")]
    UnpackingError(String),
}

impl Grib2Error {
    /// Shorthand for a section that is too short for its declared template.
    pub(crate) fn short_section(section: u8) -> Self {
        Grib2Error::InvalidSection {
            section,
            reason: "Not enough data".to_string(),
        }
    }
}
