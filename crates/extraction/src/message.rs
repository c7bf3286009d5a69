//! Source abstraction: decoded messages and the files that yield them.

use thiserror::Error;

use crate::value::Value;
use crate::Result;

/// Attribute keys understood by the extraction pipeline.
pub mod keys {
    pub const SHORT_NAME: &str = "shortName";
    pub const TYPE_OF_LEVEL: &str = "typeOfLevel";
    pub const LEVEL: &str = "level";
    pub const VALID_DATE: &str = "validDate";
    pub const DATA_DATE: &str = "dataDate";
    pub const DATA_TIME: &str = "dataTime";
    pub const PERTURBATION_NUMBER: &str = "perturbationNumber";
    pub const STEP: &str = "step";
    pub const EDITION: &str = "edition";
    pub const CENTRE: &str = "centre";
    pub const DATA_TYPE: &str = "dataType";
    pub const GRID_TYPE: &str = "gridType";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
    pub const VALUE: &str = "value";
    pub const DATA: &str = "data";
}

/// Why a message's grid could not be produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Grid geometry not supported: {0}")]
    Unsupported(String),

    #[error("Inconsistent grid geometry: {0}")]
    Inconsistent(String),

    #[error("Failed to decode grid values: {0}")]
    Decode(String),

    #[error("Data representation template 5.{0} not supported")]
    UnsupportedPacking(u16),
}

/// Grid returned by a message's extraction capability.
///
/// Arrays are flattened in row-major order; element `i` of each array
/// describes the same point. `None` marks a masked value.
#[derive(Debug, Clone, PartialEq)]
pub enum GridData {
    Field {
        lats: Vec<f64>,
        lons: Vec<f64>,
        values: Vec<Option<f64>>,
        /// (rows, columns)
        shape: (usize, usize),
    },
    /// A single value; only the first element of each coordinate array
    /// is meaningful.
    Scalar {
        lats: Vec<f64>,
        lons: Vec<f64>,
        value: Option<f64>,
    },
}

/// One decoded unit of a source file.
pub trait GribMessage {
    /// Attribute by key, `None` when the message does not carry it.
    fn attribute(&self, key: &str) -> Option<Value>;

    /// Coordinates and values of the message's grid.
    fn grid(&self) -> std::result::Result<GridData, GridError>;
}

/// Messages yielded by one pass over a source.
pub type MessageIter<'a, M> = Box<dyn Iterator<Item = Result<M>> + 'a>;

/// An openable, re-readable sequence of messages.
///
/// Every call to [`open`](Self::open) starts a fresh pass; the underlying
/// handle is released when the returned iterator is dropped. Errors from
/// `open` are fatal for the pass, errors yielded by the iterator concern a
/// single message.
pub trait MessageSource {
    type Message: GribMessage;

    fn open(&self) -> Result<MessageIter<'_, Self::Message>>;

    /// Human-readable identity for logs (usually the file path).
    fn describe(&self) -> String;
}
