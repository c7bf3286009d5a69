//! GRIB2 section parsing.
//!
//! Every parser here receives the complete bytes of one section, including
//! its 5-byte header (4-byte length + section number), so octet offsets in
//! the comments match the WMO tables minus one.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use nom::bytes::complete::{tag, take};
use nom::number::complete::{be_f32, be_u16, be_u32, be_u64, be_u8};
use nom::sequence::tuple;
use nom::IResult;

use crate::unpacking::SimplePacking;
use crate::Grib2Error;

type Input<'a> = &'a [u8];

/// All-ones marks a missing value in GRIB2 unsigned fields.
pub const MISSING_U32: u32 = u32::MAX;

/// Product templates whose first 25 octets follow template 4.0
/// (parameter, generating process, forecast time, fixed surfaces).
const HORIZONTAL_LEVEL_TEMPLATES: [u16; 6] = [0, 1, 2, 8, 11, 12];

/// Product templates that carry individual ensemble member information.
const ENSEMBLE_TEMPLATES: [u16; 2] = [1, 11];

/// Section 0: Indicator Section (16 bytes)
#[derive(Debug, Clone)]
pub struct Indicator {
    pub discipline: u8,
    pub edition: u8,
    pub message_length: u64,
}

/// Section 1: Identification Section
#[derive(Debug, Clone)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub table_version: u8,
    pub local_table_version: u8,
    pub significance_of_reference_time: u8,
    pub reference_time: DateTime<Utc>,
    pub production_status: u8,
    pub data_type: u8,
}

/// Section 3: Grid Definition Section
#[derive(Debug, Clone)]
pub struct GridDefinition {
    /// Grid definition template number (3.N)
    pub template: u16,
    /// Number of points in the grid, including bitmapped-out points
    pub num_data_points: u32,
    /// Decoded template 3.0, if that is the template in use
    pub lat_lon: Option<LatLonGrid>,
}

/// Template 3.0: regular latitude/longitude grid, in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct LatLonGrid {
    pub earth_shape: u8,
    pub ni: u32,
    pub nj: u32,
    pub first_latitude: f64,
    pub first_longitude: f64,
    pub last_latitude: f64,
    pub last_longitude: f64,
    pub i_increment: Option<f64>,
    pub j_increment: Option<f64>,
    pub scanning_mode: u8,
}

/// Fixed surface of a product definition (type, scale factor, scaled value).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedSurface {
    pub surface_type: u8,
    pub scale_factor: i8,
    pub scaled_value: u32,
    scale_missing: bool,
}

impl FixedSurface {
    fn new(surface_type: u8, raw_scale: u8, scaled_value: u32) -> Option<Self> {
        (surface_type != 255).then(|| FixedSurface {
            surface_type,
            scale_factor: decode_signed_u8(raw_scale),
            scaled_value,
            scale_missing: raw_scale == 255,
        })
    }

    /// Physical value of the surface (scaled_value * 10^-scale_factor).
    pub fn value(&self) -> Option<f64> {
        if self.scaled_value == MISSING_U32 {
            return None;
        }
        if self.scale_missing {
            return Some(self.scaled_value as f64);
        }
        Some(self.scaled_value as f64 / 10f64.powi(self.scale_factor as i32))
    }
}

/// Ensemble member description (templates 4.1 and 4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsembleInfo {
    pub ensemble_type: u8,
    pub perturbation_number: u8,
    pub members: u8,
}

/// Section 4: Product Definition Section
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub template: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub generating_process: Option<u8>,
    pub time_range_unit: Option<u8>,
    pub forecast_time: Option<i32>,
    pub first_surface: Option<FixedSurface>,
    pub second_surface: Option<FixedSurface>,
    pub ensemble: Option<EnsembleInfo>,
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone)]
pub struct DataRepresentation {
    /// Number of packed values (points present in the bitmap)
    pub num_packed_values: u32,
    pub template: u16,
    /// Packing parameters shared by the simple-packing family of templates
    pub packing: Option<SimplePacking>,
    pub original_data_type: u8,
}

/// Section 6: Bitmap Section
#[derive(Debug, Clone)]
pub enum Bitmap {
    /// Bitmap bytes follow (indicator 0)
    Present(Bytes),
    /// A bitmap defined earlier in the same message applies (indicator 254)
    Previous,
    /// Predetermined bitmap (indicators 1-253)
    Predefined(u8),
    /// No bitmap applies (indicator 255)
    Absent,
}

/// Section 7: Data Section
#[derive(Debug, Clone)]
pub struct DataSection {
    pub data: Bytes,
}

// ===== Parsing Functions =====

/// Parse Section 0 (Indicator) from the start of a message.
pub fn parse_indicator(data: &[u8]) -> Result<Indicator, Grib2Error> {
    let parsed: IResult<Input, Indicator> = indicator(data);
    let (_, indicator) = parsed
        .map_err(|_| Grib2Error::InvalidFormat("Missing GRIB indicator section".to_string()))?;

    if indicator.edition != 2 {
        return Err(Grib2Error::UnsupportedEdition(indicator.edition));
    }

    Ok(indicator)
}

fn indicator(input: Input) -> IResult<Input, Indicator> {
    let (input, _) = tag(&b"GRIB"[..])(input)?;
    let (input, (_reserved, discipline, edition, message_length)) =
        tuple((be_u16, be_u8, be_u8, be_u64))(input)?;

    Ok((
        input,
        Indicator {
            discipline,
            edition,
            message_length,
        },
    ))
}

/// Read a section header at the start of `data`: (section length, section number).
pub fn read_section_header(data: &[u8]) -> Option<(usize, u8)> {
    let parsed: IResult<Input, (u32, u8)> = tuple((be_u32, be_u8))(data);
    parsed
        .ok()
        .map(|(_, (length, number))| (length as usize, number))
}

/// Parse Section 1 (Identification)
pub fn parse_identification(section: &[u8]) -> Result<Identification, Grib2Error> {
    let body = section.get(5..).ok_or_else(|| Grib2Error::short_section(1))?;

    let parsed: IResult<Input, _> = tuple((
        be_u16, be_u16, be_u8, be_u8, be_u8, be_u16, be_u8, be_u8, be_u8, be_u8, be_u8, be_u8,
        be_u8,
    ))(body);
    let (
        _,
        (
            center,
            sub_center,
            table_version,
            local_table_version,
            significance_of_reference_time,
            year,
            month,
            day,
            hour,
            minute,
            second,
            production_status,
            data_type,
        ),
    ) = parsed.map_err(|_| Grib2Error::short_section(1))?;

    let reference_time = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: 1,
            reason: format!(
                "Invalid date: {}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ),
        })?;

    Ok(Identification {
        center,
        sub_center,
        table_version,
        local_table_version,
        significance_of_reference_time,
        reference_time: DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc),
        production_status,
        data_type,
    })
}

/// Parse Section 3 (Grid Definition)
pub fn parse_grid_definition(section: &[u8]) -> Result<GridDefinition, Grib2Error> {
    let body = section.get(5..).ok_or_else(|| Grib2Error::short_section(3))?;

    // Octet 6: source, 7-10: number of points, 11: optional list octets,
    // 12: optional list interpretation, 13-14: template number
    let parsed: IResult<Input, (u8, u32, u8, u8, u16)> =
        tuple((be_u8, be_u32, be_u8, be_u8, be_u16))(body);
    let (template_data, (_source, num_data_points, _list_octets, _list_meaning, template)) =
        parsed.map_err(|_| Grib2Error::short_section(3))?;

    let lat_lon = if template == 0 {
        let parsed: IResult<Input, LatLonGrid> = lat_lon_template(template_data);
        let (_, grid) = parsed.map_err(|_| Grib2Error::InvalidSection {
            section: 3,
            reason: format!(
                "Template 3.0 needs at least 58 bytes, got {}",
                template_data.len()
            ),
        })?;
        Some(grid)
    } else {
        None
    };

    Ok(GridDefinition {
        template,
        num_data_points,
        lat_lon,
    })
}

fn lat_lon_template(input: Input) -> IResult<Input, LatLonGrid> {
    let (input, earth_shape) = be_u8(input)?;
    // Radius and axes of the earth model, unused for coordinate generation
    let (input, _) = take(15usize)(input)?;
    let (input, (ni, nj, basic_angle, subdivisions)) =
        tuple((be_u32, be_u32, be_u32, be_u32))(input)?;
    let (input, la1) = take(4usize)(input)?;
    let (input, lo1) = take(4usize)(input)?;
    let (input, _resolution_flags) = be_u8(input)?;
    let (input, la2) = take(4usize)(input)?;
    let (input, lo2) = take(4usize)(input)?;
    let (input, (di, dj, scanning_mode)) = tuple((be_u32, be_u32, be_u8))(input)?;

    // Angles are in microdegrees unless a basic angle is given
    let unit = if basic_angle == 0 || basic_angle == MISSING_U32 || subdivisions == 0 {
        1e-6
    } else {
        basic_angle as f64 / subdivisions as f64
    };
    let angle = |raw: &[u8]| decode_grib2_signed(raw) as f64 * unit;
    let increment = |raw: u32| (raw != MISSING_U32).then(|| raw as f64 * unit);

    Ok((
        input,
        LatLonGrid {
            earth_shape,
            ni,
            nj,
            first_latitude: angle(la1),
            first_longitude: angle(lo1),
            last_latitude: angle(la2),
            last_longitude: angle(lo2),
            i_increment: increment(di),
            j_increment: increment(dj),
            scanning_mode,
        },
    ))
}

/// Parse Section 4 (Product Definition)
pub fn parse_product_definition(section: &[u8]) -> Result<ProductDefinition, Grib2Error> {
    let body = section.get(5..).ok_or_else(|| Grib2Error::short_section(4))?;

    // Octets 6-7: coordinate values after template, 8-9: template number,
    // 10: parameter category, 11: parameter number
    let parsed: IResult<Input, (u16, u16, u8, u8)> = tuple((be_u16, be_u16, be_u8, be_u8))(body);
    let (rest, (_coordinate_values, template, parameter_category, parameter_number)) =
        parsed.map_err(|_| Grib2Error::short_section(4))?;

    let mut product = ProductDefinition {
        template,
        parameter_category,
        parameter_number,
        generating_process: None,
        time_range_unit: None,
        forecast_time: None,
        first_surface: None,
        second_surface: None,
        ensemble: None,
    };

    if !HORIZONTAL_LEVEL_TEMPLATES.contains(&template) {
        return Ok(product);
    }

    let parsed: IResult<Input, _> = horizontal_level(rest);
    let (rest, (generating_process, unit, forecast_time, first, second)) =
        parsed.map_err(|_| Grib2Error::InvalidSection {
            section: 4,
            reason: format!("Template 4.{} is truncated", template),
        })?;

    product.generating_process = Some(generating_process);
    product.time_range_unit = Some(unit);
    product.forecast_time = Some(forecast_time);
    product.first_surface = first;
    product.second_surface = second;

    if ENSEMBLE_TEMPLATES.contains(&template) {
        let parsed: IResult<Input, (u8, u8, u8)> = tuple((be_u8, be_u8, be_u8))(rest);
        let (_, (ensemble_type, perturbation_number, members)) =
            parsed.map_err(|_| Grib2Error::InvalidSection {
                section: 4,
                reason: format!("Template 4.{} is missing ensemble information", template),
            })?;
        product.ensemble = Some(EnsembleInfo {
            ensemble_type,
            perturbation_number,
            members,
        });
    }

    Ok(product)
}

type HorizontalLevel = (u8, u8, i32, Option<FixedSurface>, Option<FixedSurface>);

fn horizontal_level(input: Input) -> IResult<Input, HorizontalLevel> {
    // Generating process type, background process, process identifier
    let (input, (generating_process, _background, _process_id)) =
        tuple((be_u8, be_u8, be_u8))(input)?;
    // Observational cutoff hours/minutes
    let (input, _) = take(3usize)(input)?;
    let (input, unit) = be_u8(input)?;
    let (input, forecast_time) = take(4usize)(input)?;
    let (input, (type1, scale1, value1, type2, scale2, value2)) =
        tuple((be_u8, be_u8, be_u32, be_u8, be_u8, be_u32))(input)?;

    Ok((
        input,
        (
            generating_process,
            unit,
            decode_grib2_signed(forecast_time),
            FixedSurface::new(type1, scale1, value1),
            FixedSurface::new(type2, scale2, value2),
        ),
    ))
}

/// Parse Section 5 (Data Representation)
pub fn parse_data_representation(section: &[u8]) -> Result<DataRepresentation, Grib2Error> {
    let body = section.get(5..).ok_or_else(|| Grib2Error::short_section(5))?;

    let parsed: IResult<Input, (u32, u16)> = tuple((be_u32, be_u16))(body);
    let (template_data, (num_packed_values, template)) =
        parsed.map_err(|_| Grib2Error::short_section(5))?;

    // Reference value, binary scale, decimal scale, bits per value and
    // original field type lead every simple-packing derived template.
    let parsed: IResult<Input, (f32, u16, u16, u8, u8)> =
        tuple((be_f32, be_u16, be_u16, be_u8, be_u8))(template_data);

    let (packing, original_data_type) = match parsed {
        Ok((_, (reference_value, raw_binary, raw_decimal, bits_per_value, original))) => (
            Some(SimplePacking {
                reference_value,
                binary_scale_factor: decode_signed_u16(raw_binary),
                decimal_scale_factor: decode_signed_u16(raw_decimal),
                bits_per_value,
            }),
            original,
        ),
        Err(_) => (None, 0),
    };

    Ok(DataRepresentation {
        num_packed_values,
        template,
        packing,
        original_data_type,
    })
}

/// Parse Section 6 (Bitmap)
pub fn parse_bitmap(section: &Bytes) -> Result<Bitmap, Grib2Error> {
    let indicator = *section.get(5).ok_or_else(|| Grib2Error::short_section(6))?;

    Ok(match indicator {
        0 => Bitmap::Present(section.slice(6..)),
        254 => Bitmap::Previous,
        255 => Bitmap::Absent,
        other => Bitmap::Predefined(other),
    })
}

/// Parse Section 7 (Data)
pub fn parse_data_section(section: &Bytes) -> Result<DataSection, Grib2Error> {
    if section.len() < 5 {
        return Err(Grib2Error::short_section(7));
    }

    Ok(DataSection {
        data: section.slice(5..),
    })
}

// ===== Helper Functions =====

/// Decode a 4-byte GRIB2 sign-magnitude integer (MSB is the sign bit).
///
/// Returns 0 for slices that are not exactly 4 bytes long.
pub fn decode_grib2_signed(bytes: &[u8]) -> i32 {
    let Ok(raw) = <[u8; 4]>::try_from(bytes) else {
        return 0;
    };
    let raw = u32::from_be_bytes(raw);
    let magnitude = (raw & 0x7FFF_FFFF) as i32;
    if raw & 0x8000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Decode a 2-byte GRIB2 sign-magnitude integer.
pub fn decode_signed_u16(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Decode a 1-byte GRIB2 sign-magnitude integer.
pub fn decode_signed_u8(raw: u8) -> i8 {
    let magnitude = (raw & 0x7F) as i8;
    if raw & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}
