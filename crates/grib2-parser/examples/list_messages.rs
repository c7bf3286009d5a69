//! List the fields of a GRIB2 file.
//!
//! ```text
//! cargo run -p grib2-parser --example list_messages -- path/to/file.grib2
//! ```

use std::sync::Arc;

use grib2_parser::{Grib2Reader, Grib2Tables};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let grib_path = std::env::args()
        .nth(1)
        .ok_or("usage: list_messages <file.grib2>")?;

    let reader = Grib2Reader::open(&grib_path, Arc::new(Grib2Tables::standard()))?;
    let mut field_count = 0;

    for message in reader {
        match message {
            Ok(msg) => {
                field_count += 1;
                println!(
                    "Field {}: {} on {:?} {:?} valid {:?} (grid: {:?}, {})",
                    field_count,
                    msg.parameter(),
                    msg.level_type(),
                    msg.level(),
                    msg.valid_time(),
                    msg.grid_dims(),
                    msg.grid_type()
                );
            }
            Err(e) => println!("Field {}: ERROR - {}", field_count + 1, e),
        }
    }

    println!("\nTotal fields read: {}", field_count);
    Ok(())
}
