//! GRIB2 decoder (WMO FM 92 GRIB Edition 2).
//!
//! Splits a byte buffer into GRIB messages, each message into its fields
//! (a message may repeat sections 2-7), and exposes every field as a
//! [`Grib2Message`] with its identification, grid, product and packing
//! metadata plus the decoded grid values.
//!
//! Supported subset:
//! - Grid definition template 3.0 (regular latitude/longitude)
//! - Product definition templates 4.0, 4.1, 4.2, 4.8, 4.11, 4.12
//! - Data representation template 5.0 (simple packing), with bitmaps
//! - Templates 5.2, 5.3, 5.41 and 5.200 through the `grib` crate
//!
//! Anything else is still read and iterated, but decoding the grid of such a
//! field reports [`Grib2Error::UnsupportedTemplate`].

mod error;
mod message;
mod reader;
pub mod sections;
pub mod tables;
pub mod unpacking;

pub use error::Grib2Error;
pub use message::Grib2Message;
pub use reader::Grib2Reader;
pub use tables::{Grib2Tables, LevelType};
pub use unpacking::{unpack_external, unpack_simple, SimplePacking, EXTERNAL_PACKINGS};
