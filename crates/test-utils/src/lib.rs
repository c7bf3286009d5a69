//! Shared test utilities for the tap-grib workspace.
//!
//! - [`Grib2Builder`] encodes synthetic GRIB2 messages, so decoder and
//!   end-to-end tests need no external data files
//! - [`fixtures`] writes those messages (plain or gzipped) and
//!   configuration documents into temporary directories
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod builder;
pub mod fixtures;

pub use builder::*;
pub use fixtures::*;

/// Assert two numbers are within `epsilon` of each other, comparing as f64.
///
/// Decoded GRIB values carry packing error, so exact comparison is only
/// meaningful for values representable at the message's decimal scale.
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left = $left as f64;
        let right = $right as f64;
        let tolerance = $epsilon as f64;
        if (left - right).abs() > tolerance {
            panic!(
                "values differ by more than {}: left = {}, right = {}",
                tolerance, left, right
            );
        }
    }};
}
