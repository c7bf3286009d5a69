//! GRIB2 data unpacking algorithms.
//!
//! Simple packing (template 5.0) is decoded in place. Complex packing,
//! PNG and run-length packed fields are handed to the `grib` crate.
//! JPEG2000 (template 5.40) is not decoded.

use std::io::Cursor;

use crate::Grib2Error;

/// Data representation templates decoded by [`unpack_external`]: complex
/// packing (5.2), complex packing with spatial differencing (5.3), PNG
/// (5.41) and run length (5.200).
pub const EXTERNAL_PACKINGS: [u16; 4] = [2, 3, 41, 200];

/// Simple packing parameters from section 5.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplePacking {
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
}

impl SimplePacking {
    /// Apply the unpacking formula:
    /// value = (reference_value + packed_value * 2^binary_scale) * 10^(-decimal_scale)
    fn decode(&self, packed_value: u32) -> f32 {
        let binary_scale = 2f64.powi(self.binary_scale_factor as i32);
        let decimal_scale = 10f64.powi(self.decimal_scale_factor as i32);
        ((self.reference_value as f64 + packed_value as f64 * binary_scale) / decimal_scale) as f32
    }
}

/// Unpack simple packed GRIB2 data.
///
/// `num_points` is the number of grid points. With a bitmap, only points
/// whose bit is set have a packed value in `packed_data`; the others come
/// back as `None`.
pub fn unpack_simple(
    packed_data: &[u8],
    num_points: usize,
    packing: &SimplePacking,
    bitmap: Option<&[u8]>,
) -> Result<Vec<Option<f32>>, Grib2Error> {
    let bits_per_value = packing.bits_per_value as usize;
    let mut values = Vec::with_capacity(num_points);
    let mut bit_position = 0;

    for i in 0..num_points {
        let present = match bitmap {
            Some(bm) => {
                // 1 bit per grid point, MSB first; 1 = value present
                let byte = bm.get(i / 8).ok_or_else(|| {
                    Grib2Error::UnpackingError(format!(
                        "Bitmap too short for {} points",
                        num_points
                    ))
                })?;
                (byte >> (7 - (i % 8))) & 1 == 1
            }
            None => true,
        };

        if !present {
            values.push(None);
            continue;
        }

        if bits_per_value == 0 {
            // Constant field: every present value is the reference value
            values.push(Some(packing.decode(0)));
            continue;
        }

        let packed_value = extract_bits(packed_data, bit_position, bits_per_value)
            .map_err(|e| Grib2Error::UnpackingError(format!("Failed to extract bits: {}", e)))?;
        bit_position += bits_per_value;

        values.push(Some(packing.decode(packed_value)));
    }

    Ok(values)
}

/// Decode field `field_index` of a complete GRIB2 message with the `grib`
/// crate. Points masked by the bitmap or flagged missing by the packing
/// come back as `None`.
pub fn unpack_external(message: &[u8], field_index: usize) -> Result<Vec<Option<f32>>, Grib2Error> {
    let grib_file = grib::from_reader(Cursor::new(message))
        .map_err(|e| Grib2Error::UnpackingError(format!("Failed to read message: {}", e)))?;

    let Some((_, submessage)) = grib_file.iter().nth(field_index) else {
        return Err(Grib2Error::UnpackingError(format!(
            "Message has no field {}",
            field_index
        )));
    };

    let decoder = grib::Grib2SubmessageDecoder::from(submessage)
        .map_err(|e| Grib2Error::UnpackingError(format!("Failed to create decoder: {}", e)))?;
    let values: Vec<Option<f32>> = decoder
        .dispatch()
        .map_err(|e| Grib2Error::UnpackingError(format!("Failed to decode values: {}", e)))?
        .map(|value| if value.is_nan() { None } else { Some(value) })
        .collect();

    Ok(values)
}

/// Extract bits from a byte array
/// Returns the bits as a 32-bit unsigned integer
fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> Result<u32, String> {
    if num_bits > 32 || num_bits == 0 {
        return Err(format!("Invalid number of bits: {}", num_bits));
    }

    let mut result = 0u32;

    for i in 0..num_bits {
        let absolute_bit = start_bit + i;
        let byte_idx = absolute_bit / 8;
        let bit_idx = 7 - (absolute_bit % 8); // MSB first

        let byte = data
            .get(byte_idx)
            .ok_or_else(|| "Not enough data to extract bits".to_string())?;

        result = (result << 1) | ((byte >> bit_idx) & 1) as u32;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packing(bits: u8) -> SimplePacking {
        SimplePacking {
            reference_value: 0.0,
            binary_scale_factor: 0,
            decimal_scale_factor: 0,
            bits_per_value: bits,
        }
    }

    #[test]
    fn test_extract_bits() {
        // Test with simple byte: 0b10110101
        let data = vec![0b10110101];

        // Extract first 2 bits (should be 0b10 = 2)
        assert_eq!(extract_bits(&data, 0, 2).unwrap(), 0b10);

        // Extract bits 2-4 (should be 0b11 = 3)
        assert_eq!(extract_bits(&data, 2, 2).unwrap(), 0b11);

        // Extract all 8 bits
        assert_eq!(extract_bits(&data, 0, 8).unwrap(), 0b10110101);

        // Past the end
        assert!(extract_bits(&data, 4, 8).is_err());
    }

    #[test]
    fn test_simple_unpacking() {
        let packed = vec![100, 200];
        let values = unpack_simple(&packed, 2, &packing(8), None).unwrap();

        assert_eq!(values, vec![Some(100.0), Some(200.0)]);
    }

    #[test]
    fn test_scaled_unpacking() {
        // R = 500, D = 2 -> (500 + x) / 100
        let packing = SimplePacking {
            reference_value: 500.0,
            binary_scale_factor: 0,
            decimal_scale_factor: 2,
            bits_per_value: 8,
        };
        let values = unpack_simple(&[0, 250], 2, &packing, None).unwrap();

        assert_eq!(values, vec![Some(5.0), Some(7.5)]);
    }

    #[test]
    fn test_bitmap_skips_packed_values() {
        // Points 0 and 2 present, 1 and 3 missing; only two packed values
        let bitmap = [0b1010_0000];
        let values = unpack_simple(&[7, 9], 4, &packing(8), Some(&bitmap)).unwrap();

        assert_eq!(values, vec![Some(7.0), None, Some(9.0), None]);
    }

    #[test]
    fn test_constant_field() {
        let packing = SimplePacking {
            reference_value: 288.0,
            ..packing(0)
        };
        let values = unpack_simple(&[], 3, &packing, None).unwrap();

        assert_eq!(values, vec![Some(288.0); 3]);
    }

    #[test]
    fn test_short_bitmap_is_an_error() {
        let result = unpack_simple(&[1, 2], 16, &packing(8), Some(&[0xFF]));
        assert!(result.is_err());
    }
}
