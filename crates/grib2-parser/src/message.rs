//! One decoded GRIB2 field.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use crate::sections::{
    DataRepresentation, DataSection, GridDefinition, Identification, Indicator, LatLonGrid,
    ProductDefinition,
};
use crate::tables::{centre_name, data_type_name, grid_type_name, Grib2Tables};
use crate::unpacking::{unpack_external, unpack_simple, EXTERNAL_PACKINGS};
use crate::Grib2Error;

/// A single field of a GRIB2 message.
///
/// A GRIB message holding several fields (repeated sections 2-7) yields one
/// `Grib2Message` per field; sections that are not repeated are shared.
#[derive(Debug, Clone)]
pub struct Grib2Message {
    pub indicator: Indicator,
    pub identification: Identification,
    pub grid_definition: GridDefinition,
    pub product_definition: ProductDefinition,
    pub data_representation: DataRepresentation,
    /// Bitmap in effect for this field, if any
    pub bitmap: Option<Bytes>,
    pub data_section: DataSection,
    /// Position of the field inside its GRIB message (0-based)
    pub field_index: usize,
    /// The complete GRIB message the field was read from
    raw: Bytes,
    tables: Arc<Grib2Tables>,
}

impl Grib2Message {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        indicator: Indicator,
        identification: Identification,
        grid_definition: GridDefinition,
        product_definition: ProductDefinition,
        data_representation: DataRepresentation,
        bitmap: Option<Bytes>,
        data_section: DataSection,
        raw: Bytes,
        field_index: usize,
        tables: Arc<Grib2Tables>,
    ) -> Self {
        Self {
            indicator,
            identification,
            grid_definition,
            product_definition,
            data_representation,
            bitmap,
            data_section,
            field_index,
            raw,
            tables,
        }
    }

    /// Parameter short name from the lookup tables.
    pub fn parameter(&self) -> String {
        self.tables.get_parameter_name(
            self.indicator.discipline,
            self.product_definition.parameter_category,
            self.product_definition.parameter_number,
        )
    }

    /// Name of the first fixed surface type, if the product has one.
    pub fn level_type(&self) -> Option<String> {
        self.product_definition
            .first_surface
            .map(|surface| self.tables.get_level_name(surface.surface_type))
    }

    /// Value of the first fixed surface in the level type's display unit.
    pub fn level(&self) -> Option<f64> {
        let surface = self.product_definition.first_surface?;
        let value = surface.value()?;
        let divisor = self
            .tables
            .get_level_type(surface.surface_type)
            .map(|level| level.divisor)
            .unwrap_or(1.0);
        Some(value / divisor)
    }

    /// Grid dimensions as (rows, columns), i.e. (Nj, Ni).
    pub fn grid_dims(&self) -> (usize, usize) {
        match &self.grid_definition.lat_lon {
            Some(grid) => (grid.nj as usize, grid.ni as usize),
            None => (1, self.grid_definition.num_data_points as usize),
        }
    }

    /// Number of grid points, including points masked by the bitmap.
    pub fn num_points(&self) -> usize {
        self.grid_definition.num_data_points as usize
    }

    /// ecCodes style grid type name (`regular_ll`, `lambert`, ...).
    pub fn grid_type(&self) -> &'static str {
        grid_type_name(self.grid_definition.template)
    }

    /// ecCodes style data type (`an`, `fc`, `pf`, ...).
    pub fn data_type(&self) -> String {
        data_type_name(self.identification.data_type)
    }

    /// Originating centre abbreviation.
    pub fn centre(&self) -> String {
        centre_name(self.identification.center)
    }

    /// Ensemble perturbation number, for ensemble product templates.
    pub fn perturbation_number(&self) -> Option<u8> {
        self.product_definition
            .ensemble
            .map(|ensemble| ensemble.perturbation_number)
    }

    /// Forecast lead time as a duration.
    pub fn forecast_step(&self) -> Option<Duration> {
        let amount = self.product_definition.forecast_time? as i64;
        let step = match self.product_definition.time_range_unit? {
            0 => Duration::minutes(amount),
            1 => Duration::hours(amount),
            2 => Duration::days(amount),
            10 => Duration::hours(amount * 3),
            11 => Duration::hours(amount * 6),
            12 => Duration::hours(amount * 12),
            13 => Duration::seconds(amount),
            _ => return None,
        };
        Some(step)
    }

    /// Valid time: reference time plus forecast step.
    pub fn valid_time(&self) -> Option<DateTime<Utc>> {
        let reference = self.identification.reference_time;
        match self.forecast_step() {
            Some(step) => reference.checked_add_signed(step),
            None if self.product_definition.forecast_time.is_none() => Some(reference),
            None => None,
        }
    }

    /// Reference date encoded as YYYYMMDD.
    pub fn data_date(&self) -> u32 {
        let reference = self.identification.reference_time;
        reference.year() as u32 * 10_000 + reference.month() * 100 + reference.day()
    }

    /// Reference time of day encoded as HHMM.
    pub fn data_time(&self) -> u32 {
        let reference = self.identification.reference_time;
        reference.hour() * 100 + reference.minute()
    }

    /// Decode the field values, one per grid point in scanning order.
    ///
    /// Points excluded by the bitmap are `None`. Simple packing is decoded
    /// here; the packings in [`EXTERNAL_PACKINGS`] go through the `grib`
    /// crate.
    pub fn unpack_data(&self) -> Result<Vec<Option<f32>>, Grib2Error> {
        self.check_data_extent()?;

        let representation = &self.data_representation;
        match (representation.template, &representation.packing) {
            (0, Some(packing)) => {
                let values = unpack_simple(
                    &self.data_section.data,
                    self.num_points(),
                    packing,
                    self.bitmap.as_deref(),
                )?;

                let present = values.iter().filter(|v| v.is_some()).count();
                if present != representation.num_packed_values as usize {
                    return Err(Grib2Error::UnpackingError(format!(
                        "Expected {} packed values, bitmap leaves {}",
                        representation.num_packed_values, present
                    )));
                }
                Ok(values)
            }
            (template, _) if EXTERNAL_PACKINGS.contains(&template) => {
                let values = unpack_external(&self.raw, self.field_index)?;
                if values.len() != self.num_points() {
                    return Err(Grib2Error::UnpackingError(format!(
                        "Decoded {} values for {} grid points",
                        values.len(),
                        self.num_points()
                    )));
                }
                Ok(values)
            }
            (template, _) => Err(Grib2Error::UnsupportedTemplate {
                section: 5,
                template,
            }),
        }
    }

    /// Reject a field whose declared size is not backed by the bitmap and
    /// data sections actually present. Runs before anything is allocated
    /// for the grid.
    fn check_data_extent(&self) -> Result<(), Grib2Error> {
        let points = self.num_points();
        let representation = &self.data_representation;
        let packed = representation.num_packed_values as usize;

        match &self.bitmap {
            Some(bitmap) if bitmap.len().saturating_mul(8) < points => {
                return Err(Grib2Error::UnpackingError(format!(
                    "Bitmap covers {} points, grid declares {}",
                    bitmap.len() * 8,
                    points
                )))
            }
            Some(_) if packed > points => {
                return Err(Grib2Error::UnpackingError(format!(
                    "{} packed values for {} grid points",
                    packed, points
                )))
            }
            None if packed != points => {
                return Err(Grib2Error::UnpackingError(format!(
                    "Grid declares {} points but {} values are packed",
                    points, packed
                )))
            }
            _ => {}
        }

        if let (0, Some(packing)) = (representation.template, &representation.packing) {
            let needed = packed as u64 * packing.bits_per_value as u64;
            let available = self.data_section.data.len() as u64 * 8;
            if needed > available {
                return Err(Grib2Error::UnpackingError(format!(
                    "{} values of {} bits need {} bits, data section holds {}",
                    packed, packing.bits_per_value, needed, available
                )));
            }
        }
        Ok(())
    }

    /// Latitude and longitude of every grid point, in the same order as
    /// [`unpack_data`](Self::unpack_data).
    pub fn lat_lons(&self) -> Result<(Vec<f64>, Vec<f64>), Grib2Error> {
        self.check_data_extent()?;

        let grid = self
            .grid_definition
            .lat_lon
            .as_ref()
            .ok_or(Grib2Error::UnsupportedTemplate {
                section: 3,
                template: self.grid_definition.template,
            })?;

        if grid.ni == u32::MAX || grid.nj == u32::MAX {
            return Err(Grib2Error::InvalidSection {
                section: 3,
                reason: "Quasi-regular grids are not supported".to_string(),
            });
        }

        let (ni, nj) = (grid.ni as usize, grid.nj as usize);
        if ni.checked_mul(nj) != Some(self.num_points()) {
            return Err(Grib2Error::InvalidSection {
                section: 3,
                reason: format!(
                    "Grid is {}x{} but declares {} points",
                    ni,
                    nj,
                    self.num_points()
                ),
            });
        }

        Ok(lat_lon_points(grid))
    }
}

/// Generate coordinates for a regular lat/lon grid following its scanning mode.
fn lat_lon_points(grid: &LatLonGrid) -> (Vec<f64>, Vec<f64>) {
    let (ni, nj) = (grid.ni as usize, grid.nj as usize);

    // Scanning mode flags (Flag Table 3.4)
    let i_negative = grid.scanning_mode & 0x80 != 0;
    let j_positive = grid.scanning_mode & 0x40 != 0;
    let j_consecutive = grid.scanning_mode & 0x20 != 0;

    let di = grid
        .i_increment
        .unwrap_or_else(|| span(grid.first_longitude, grid.last_longitude, ni));
    let dj = grid
        .j_increment
        .unwrap_or_else(|| span(grid.first_latitude, grid.last_latitude, nj));
    let di = if i_negative { -di } else { di };
    let dj = if j_positive { dj } else { -dj };

    let mut lats = Vec::with_capacity(ni * nj);
    let mut lons = Vec::with_capacity(ni * nj);

    let mut push = |i: usize, j: usize| {
        lats.push(grid.first_latitude + j as f64 * dj);
        lons.push(grid.first_longitude + i as f64 * di);
    };

    if j_consecutive {
        for i in 0..ni {
            for j in 0..nj {
                push(i, j);
            }
        }
    } else {
        for j in 0..nj {
            for i in 0..ni {
                push(i, j);
            }
        }
    }

    (lats, lons)
}

/// Spacing between first and last coordinate when no increment is encoded.
fn span(first: f64, last: f64, count: usize) -> f64 {
    if count < 2 {
        0.0
    } else {
        (last - first).abs() / (count - 1) as f64
    }
}
