//! Unit tests for GRIB2 section parsing functions.
//!
//! Sections are cut out of messages produced by the synthetic encoder.

use bytes::Bytes;
use grib2_parser::sections::{
    decode_grib2_signed, parse_bitmap, parse_data_representation, parse_grid_definition,
    parse_identification, parse_product_definition, read_section_header, Bitmap,
};
use test_utils::{assert_approx_eq, Grib2Builder};

/// Split a single-field message into its numbered sections.
fn sections(message: &[u8]) -> Vec<(u8, Bytes)> {
    let message = Bytes::copy_from_slice(message);
    let mut offset = 16;
    let mut out = Vec::new();
    while &message[offset..offset + 4] != b"7777" {
        let (length, number) = read_section_header(&message[offset..]).unwrap();
        out.push((number, message.slice(offset..offset + length)));
        offset += length;
    }
    out
}

fn section(message: &[u8], number: u8) -> Bytes {
    sections(message)
        .into_iter()
        .find(|(n, _)| *n == number)
        .map(|(_, bytes)| bytes)
        .unwrap_or_else(|| panic!("section {} not found", number))
}

// ============================================================================
// decode_grib2_signed tests
// ============================================================================

#[test]
fn test_decode_grib2_signed_positive() {
    assert_eq!(decode_grib2_signed(&[0x00, 0x00, 0x03, 0xE8]), 1000);
    assert_eq!(decode_grib2_signed(&90_000_000_u32.to_be_bytes()), 90_000_000);
}

#[test]
fn test_decode_grib2_signed_negative() {
    // Sign-magnitude: MSB=1 means negative
    assert_eq!(decode_grib2_signed(&[0x80, 0x00, 0x00, 0x01]), -1);
    let with_sign = 90_000_000_u32 | 0x8000_0000;
    assert_eq!(decode_grib2_signed(&with_sign.to_be_bytes()), -90_000_000);
}

#[test]
fn test_decode_grib2_signed_wrong_length() {
    assert_eq!(decode_grib2_signed(&[0x00, 0x01]), 0);
    assert_eq!(decode_grib2_signed(&[0x00, 0x00, 0x00, 0x00, 0x01]), 0);
}

// ============================================================================
// Section parsers
// ============================================================================

#[test]
fn test_section_order() {
    let message = Grib2Builder::new().build();
    let numbers: Vec<u8> = sections(&message).iter().map(|(n, _)| *n).collect();
    assert_eq!(numbers, vec![1, 3, 4, 5, 6, 7]);
}

#[test]
fn test_parse_identification() {
    let message = Grib2Builder::new()
        .with_centre(7)
        .with_data_type(1)
        .with_reference_time(2024, 2, 29, 18, 30)
        .build();
    let id = parse_identification(&section(&message, 1)).unwrap();

    assert_eq!(id.center, 7);
    assert_eq!(id.data_type, 1);
    assert_eq!(id.reference_time.to_rfc3339(), "2024-02-29T18:30:00+00:00");
}

#[test]
fn test_parse_identification_invalid_date() {
    let message = Grib2Builder::new()
        .with_reference_time(2023, 2, 30, 0, 0)
        .build();
    assert!(parse_identification(&section(&message, 1)).is_err());
}

#[test]
fn test_parse_grid_definition_negative_coordinates() {
    let message = Grib2Builder::new()
        .with_grid(4, 3, -10.5, -75.25, 0.25, 0.5)
        .build();
    let grid = parse_grid_definition(&section(&message, 3)).unwrap();

    assert_eq!(grid.template, 0);
    assert_eq!(grid.num_data_points, 12);
    let lat_lon = grid.lat_lon.unwrap();
    assert_eq!((lat_lon.ni, lat_lon.nj), (4, 3));
    assert_approx_eq!(lat_lon.first_latitude, -10.5, 1e-9);
    assert_approx_eq!(lat_lon.first_longitude, -75.25, 1e-9);
    assert_approx_eq!(lat_lon.last_latitude, -11.5, 1e-9);
    assert_approx_eq!(lat_lon.last_longitude, -74.5, 1e-9);
    assert_approx_eq!(lat_lon.i_increment.unwrap(), 0.25, 1e-9);
}

#[test]
fn test_parse_grid_definition_other_template() {
    let message = Grib2Builder::new().with_grid_template(30).build();
    let grid = parse_grid_definition(&section(&message, 3)).unwrap();

    assert_eq!(grid.template, 30);
    assert!(grid.lat_lon.is_none());
}

#[test]
fn test_parse_product_definition() {
    let message = Grib2Builder::new()
        .with_parameter(0, 2, 2)
        .with_scaled_level(103, 1, 25)
        .with_forecast(1, 12)
        .build();
    let product = parse_product_definition(&section(&message, 4)).unwrap();

    assert_eq!(product.template, 0);
    assert_eq!((product.parameter_category, product.parameter_number), (2, 2));
    assert_eq!(product.time_range_unit, Some(1));
    assert_eq!(product.forecast_time, Some(12));
    let surface = product.first_surface.unwrap();
    assert_eq!(surface.surface_type, 103);
    assert_eq!(surface.value(), Some(2.5));
    assert!(product.second_surface.is_none());
    assert!(product.ensemble.is_none());
}

#[test]
fn test_parse_product_definition_ensemble() {
    let message = Grib2Builder::new().with_ensemble(7, 20).build();
    let product = parse_product_definition(&section(&message, 4)).unwrap();

    assert_eq!(product.template, 1);
    let ensemble = product.ensemble.unwrap();
    assert_eq!(ensemble.perturbation_number, 7);
    assert_eq!(ensemble.members, 20);
}

#[test]
fn test_parse_product_definition_without_level() {
    let message = Grib2Builder::new().without_level().build();
    let product = parse_product_definition(&section(&message, 4)).unwrap();
    assert!(product.first_surface.is_none());
}

#[test]
fn test_parse_data_representation() {
    let message = Grib2Builder::new()
        .with_grid(2, 1, 0.0, 0.0, 1.0, 1.0)
        .with_values(vec![5.0, 7.5])
        .build();
    let representation = parse_data_representation(&section(&message, 5)).unwrap();

    assert_eq!(representation.template, 0);
    assert_eq!(representation.num_packed_values, 2);
    let packing = representation.packing.unwrap();
    assert_eq!(packing.reference_value, 500.0);
    assert_eq!(packing.decimal_scale_factor, 2);
    assert_eq!(packing.bits_per_value, 8);
}

#[test]
fn test_parse_bitmap_from_masked_field() {
    let message = Grib2Builder::new()
        .with_grid(3, 1, 0.0, 0.0, 1.0, 1.0)
        .with_masked_values(vec![Some(1.0), None, Some(2.0)])
        .build();

    match parse_bitmap(&section(&message, 6)).unwrap() {
        Bitmap::Present(bits) => assert_eq!(bits.as_ref(), &[0b1010_0000]),
        other => panic!("unexpected bitmap {:?}", other),
    }
}

#[test]
fn test_parse_bitmap_absent_for_full_field() {
    let message = Grib2Builder::new().build();
    assert!(matches!(
        parse_bitmap(&section(&message, 6)).unwrap(),
        Bitmap::Absent
    ));
}
