//! GRIB grid extraction and record normalization.
//!
//! Reads the messages of GRIB files and turns their grids into flat
//! records under a schema declared before any record is emitted.
//!
//! # Architecture
//!
//! - [`GridReconciler`] flattens one message's grid into point triples
//! - [`resolve_timestamp`] derives a message's valid time
//! - [`shaper`] builds long rows (one per point and variable) or a pivot
//!   table keyed by latitude, longitude and time
//! - [`schema`] declares the long schema and infers pivot schemas
//! - [`grouping`] splits a file into one stream per attribute tuple
//! - [`discovery`] expands configured paths into [`StreamDefinition`]s
//!
//! Message decoding sits behind the [`GribMessage`] and [`MessageSource`]
//! traits; [`Grib2Source`] is the file-backed implementation.

pub mod config;
pub mod discovery;
pub mod error;
mod grib2;
pub mod grid;
pub mod grouping;
pub mod message;
pub mod schema;
pub mod shaper;
pub mod stream;
mod timestamp;
pub mod value;
mod variable;

#[cfg(test)]
mod test_support;

// Re-exports
pub use config::{OutputMode, ParameterEntry, PathConfig, TapConfig};
pub use discovery::discover;
pub use error::{ExtractionError, Result};
pub use grib2::{decompress_gzip, Grib2Field, Grib2Source};
pub use grid::{GridOutcome, GridReconciler, Point, Points, SkipReason};
pub use grouping::{GroupFilter, MessageGroup};
pub use message::{GribMessage, GridData, GridError, MessageSource};
pub use schema::{FieldType, Property, Schema};
pub use stream::{StreamDefinition, StreamOptions};
pub use timestamp::resolve_timestamp;
pub use value::{Record, Value};
pub use variable::{message_variable_name, variable_name};
