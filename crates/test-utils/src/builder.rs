//! Synthetic GRIB2 encoder.
//!
//! Produces small, structurally valid GRIB2 messages for tests: a regular
//! lat/lon grid (template 3.0), an analysis/forecast or ensemble product
//! (templates 4.0/4.1), simple (template 5.0) or complex (template 5.2)
//! packing and an optional bitmap for masked points.

/// Values per group in complex packed fields.
const COMPLEX_GROUP_LENGTH: usize = 4;

/// Build a GRIB2 message with the specified parameters.
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    centre: u16,
    data_type: u8,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    // Grid definition
    grid_template: u16,
    ni: u32,
    nj: u32,
    la1: f64,
    lo1: f64,
    di: f64,
    dj: f64,
    scanning_mode: u8,
    declared_grid: Option<(u32, u32)>,
    // Product definition
    param_category: u8,
    param_number: u8,
    level: Option<(u8, u8, u32)>,
    time_unit: u8,
    forecast_time: u32,
    ensemble: Option<(u8, u8)>,
    // Data representation
    packing_template: u16,
    decimal_scale: i16,
    values: Vec<Option<f64>>,
}

impl Default for Grib2Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Grib2Builder {
    /// One-point surface temperature analysis at (10, 20), 2023-06-01 00:00.
    pub fn new() -> Self {
        Self {
            discipline: 0,
            centre: 98,
            data_type: 0,
            year: 2023,
            month: 6,
            day: 1,
            hour: 0,
            minute: 0,
            grid_template: 0,
            ni: 1,
            nj: 1,
            la1: 10.0,
            lo1: 20.0,
            di: 1.0,
            dj: 1.0,
            scanning_mode: 0,
            declared_grid: None,
            param_category: 0,
            param_number: 0,
            level: Some((1, 0, 0)),
            time_unit: 1,
            forecast_time: 0,
            ensemble: None,
            packing_template: 0,
            decimal_scale: 2,
            values: vec![Some(0.0)],
        }
    }

    pub fn with_reference_time(mut self, year: u16, month: u8, day: u8, hour: u8, minute: u8) -> Self {
        self.year = year;
        self.month = month;
        self.day = day;
        self.hour = hour;
        self.minute = minute;
        self
    }

    /// Regular grid of `ni` columns by `nj` rows starting at (`la1`, `lo1`),
    /// scanning west to east and north to south. Values reset to zero.
    pub fn with_grid(mut self, ni: u32, nj: u32, la1: f64, lo1: f64, di: f64, dj: f64) -> Self {
        self.ni = ni;
        self.nj = nj;
        self.la1 = la1;
        self.lo1 = lo1;
        self.di = di;
        self.dj = dj;
        self.values = vec![Some(0.0); (ni * nj) as usize];
        self
    }

    pub fn with_scanning_mode(mut self, scanning_mode: u8) -> Self {
        self.scanning_mode = scanning_mode;
        self
    }

    /// Declare `ni` x `nj` points in section 3 without changing the encoded
    /// values, producing a grid larger than its data.
    pub fn with_declared_grid(mut self, ni: u32, nj: u32) -> Self {
        self.declared_grid = Some((ni, nj));
        self
    }

    /// Declare a grid definition template other than 3.0. The template body
    /// is still written in the 3.0 layout.
    pub fn with_grid_template(mut self, template: u16) -> Self {
        self.grid_template = template;
        self
    }

    pub fn with_parameter(mut self, discipline: u8, category: u8, number: u8) -> Self {
        self.discipline = discipline;
        self.param_category = category;
        self.param_number = number;
        self
    }

    pub fn with_level(mut self, level_type: u8, value: u32) -> Self {
        self.level = Some((level_type, 0, value));
        self
    }

    /// Level encoded as `value * 10^-scale`.
    pub fn with_scaled_level(mut self, level_type: u8, scale: u8, value: u32) -> Self {
        self.level = Some((level_type, scale, value));
        self
    }

    pub fn without_level(mut self) -> Self {
        self.level = None;
        self
    }

    /// Forecast time in units of Code Table 4.4 (1 = hour, 0 = minute).
    pub fn with_forecast(mut self, unit: u8, amount: u32) -> Self {
        self.time_unit = unit;
        self.forecast_time = amount;
        self
    }

    /// Switch to product template 4.1 with the given member.
    pub fn with_ensemble(mut self, perturbation_number: u8, members: u8) -> Self {
        self.ensemble = Some((perturbation_number, members));
        self
    }

    pub fn with_data_type(mut self, data_type: u8) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_centre(mut self, centre: u16) -> Self {
        self.centre = centre;
        self
    }

    /// Encode values with complex packing (template 5.2), in groups of
    /// four consecutive values.
    pub fn with_complex_packing(mut self) -> Self {
        self.packing_template = 2;
        self
    }

    /// Declare a data representation template other than 5.0 or 5.2. The
    /// template body is still written in the 5.0 layout.
    pub fn with_packing_template(mut self, template: u16) -> Self {
        self.packing_template = template;
        self
    }

    pub fn with_decimal_scale(mut self, decimal_scale: i16) -> Self {
        self.decimal_scale = decimal_scale;
        self
    }

    pub fn with_values(mut self, values: Vec<f64>) -> Self {
        self.values = values.into_iter().map(Some).collect();
        self
    }

    /// Values with `None` for points masked by the bitmap.
    pub fn with_masked_values(mut self, values: Vec<Option<f64>>) -> Self {
        self.values = values;
        self
    }

    pub fn with_constant_value(mut self, value: f64) -> Self {
        self.values = vec![Some(value); (self.ni * self.nj) as usize];
        self
    }

    pub fn with_gradient(mut self, min_val: f64, max_val: f64) -> Self {
        let n = (self.ni * self.nj) as usize;
        self.values = (0..n)
            .map(|i| Some(min_val + (max_val - min_val) * (i as f64 / n as f64)))
            .collect();
        self
    }

    /// Build the complete GRIB2 message bytes.
    pub fn build(&self) -> Vec<u8> {
        Self::build_multi_field(std::slice::from_ref(self))
    }

    /// Build one GRIB2 message holding several fields. Sections 0 and 1
    /// come from the first builder; sections 3 to 7 are repeated per field.
    /// A field whose mask equals the previous field's mask refers back to
    /// it (bitmap indicator 254).
    pub fn build_multi_field(fields: &[Grib2Builder]) -> Vec<u8> {
        let first = fields.first().expect("at least one field");

        let mut body = first.build_section1();
        let mut previous_mask: Option<Vec<bool>> = None;
        for field in fields {
            body.extend(field.build_section3());
            body.extend(field.build_section4());
            body.extend(field.build_section5());

            let mask = field.mask();
            let reuse = mask.iter().any(|present| !present) && previous_mask.as_ref() == Some(&mask);
            body.extend(if reuse {
                section(6, &[254])
            } else {
                field.build_section6()
            });
            previous_mask = Some(mask);

            body.extend(field.build_section7());
        }

        let message_length = 16 + body.len() + 4;
        let mut message = Vec::with_capacity(message_length);
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0]); // Reserved
        message.push(first.discipline);
        message.push(2); // Edition 2
        message.extend_from_slice(&(message_length as u64).to_be_bytes());
        message.extend(body);
        message.extend_from_slice(b"7777");
        message
    }

    fn mask(&self) -> Vec<bool> {
        self.values.iter().map(|v| v.is_some()).collect()
    }

    fn build_section1(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.centre.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes()); // Sub-centre
        body.push(2); // Master table version
        body.push(1); // Local table version
        body.push(1); // Significance of reference time: start of forecast
        body.extend_from_slice(&self.year.to_be_bytes());
        body.extend_from_slice(&[self.month, self.day, self.hour, self.minute, 0]);
        body.push(0); // Production status: operational
        body.push(self.data_type);
        section(1, &body)
    }

    fn build_section3(&self) -> Vec<u8> {
        let (declared_ni, declared_nj) = self.declared_grid.unwrap_or((self.ni, self.nj));

        let mut body = Vec::new();
        body.push(0); // Source of grid definition
        body.extend_from_slice(&declared_ni.saturating_mul(declared_nj).to_be_bytes());
        body.push(0); // Octets for optional list
        body.push(0); // Interpretation of list
        body.extend_from_slice(&self.grid_template.to_be_bytes());

        // Template 3.0 (58 bytes)
        body.push(6); // Shape of the earth
        body.extend_from_slice(&[0u8; 15]); // Radius and axes
        body.extend_from_slice(&declared_ni.to_be_bytes());
        body.extend_from_slice(&declared_nj.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes()); // Basic angle
        body.extend_from_slice(&u32::MAX.to_be_bytes()); // Subdivisions

        let i_sign = if self.scanning_mode & 0x80 != 0 { -1.0 } else { 1.0 };
        let j_sign = if self.scanning_mode & 0x40 != 0 { 1.0 } else { -1.0 };
        let la2 = self.la1 + j_sign * self.dj * (self.nj.saturating_sub(1)) as f64;
        let lo2 = self.lo1 + i_sign * self.di * (self.ni.saturating_sub(1)) as f64;

        body.extend_from_slice(&encode_signed(micro(self.la1)));
        body.extend_from_slice(&encode_signed(micro(self.lo1)));
        body.push(0x30); // Resolution and component flags
        body.extend_from_slice(&encode_signed(micro(la2)));
        body.extend_from_slice(&encode_signed(micro(lo2)));
        body.extend_from_slice(&(micro(self.di) as u32).to_be_bytes());
        body.extend_from_slice(&(micro(self.dj) as u32).to_be_bytes());
        body.push(self.scanning_mode);
        section(3, &body)
    }

    fn build_section4(&self) -> Vec<u8> {
        let template: u16 = if self.ensemble.is_some() { 1 } else { 0 };

        let mut body = Vec::new();
        body.extend_from_slice(&0u16.to_be_bytes()); // Coordinate values
        body.extend_from_slice(&template.to_be_bytes());
        body.push(self.param_category);
        body.push(self.param_number);
        body.push(if self.ensemble.is_some() { 4 } else { 2 }); // Generating process
        body.push(0); // Background process
        body.push(0); // Process identifier
        body.extend_from_slice(&[0, 0, 0]); // Cutoff hours and minutes
        body.push(self.time_unit);
        body.extend_from_slice(&self.forecast_time.to_be_bytes());

        let (level_type, scale, value) = self.level.unwrap_or((255, 0, 0));
        body.push(level_type);
        body.push(scale);
        body.extend_from_slice(&value.to_be_bytes());
        body.push(255); // No second surface
        body.push(0);
        body.extend_from_slice(&0u32.to_be_bytes());

        if let Some((perturbation_number, members)) = self.ensemble {
            body.push(3); // Positively perturbed forecast
            body.push(perturbation_number);
            body.push(members);
        }
        section(4, &body)
    }

    fn build_section5(&self) -> Vec<u8> {
        let packed = self.pack();

        let mut body = Vec::new();
        body.extend_from_slice(&(packed.count as u32).to_be_bytes());
        body.extend_from_slice(&self.packing_template.to_be_bytes());
        body.extend_from_slice(&packed.reference.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes()); // Binary scale factor
        body.extend_from_slice(&encode_signed_u16(packed.decimal_scale).to_be_bytes());
        body.push(packed.bits);
        body.push(0); // Original field type: floating point
        body.extend(packed.template_tail);
        section(5, &body)
    }

    fn build_section6(&self) -> Vec<u8> {
        let mask = self.mask();
        if mask.iter().all(|present| *present) {
            return section(6, &[255]);
        }

        let mut body = vec![0u8]; // Bitmap follows
        body.extend(pack_bits(mask.iter().map(|present| *present as u32), 1));
        section(6, &body)
    }

    fn build_section7(&self) -> Vec<u8> {
        section(7, &self.pack().data)
    }

    fn pack(&self) -> Packed {
        if self.packing_template == 2 {
            return self.pack_complex();
        }

        let present: Vec<f64> = self.values.iter().flatten().copied().collect();
        let count = present.len();

        let min = present.iter().copied().fold(f64::INFINITY, f64::min);
        let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if present.is_empty() || min == max {
            // Constant field: no packed data, every value is the reference
            return Packed {
                count,
                reference: if present.is_empty() { 0.0 } else { min as f32 },
                decimal_scale: 0,
                bits: 0,
                template_tail: Vec::new(),
                data: Vec::new(),
            };
        }

        let factor = 10f64.powi(self.decimal_scale as i32);
        let scaled: Vec<i64> = present.iter().map(|v| (v * factor).round() as i64).collect();
        let reference = scaled.iter().copied().min().unwrap_or(0);
        let range = scaled.iter().copied().max().unwrap_or(0) - reference;
        let bits = (64 - (range as u64).leading_zeros()).max(1);
        assert!(bits <= 32, "value range too wide for simple packing");

        Packed {
            count,
            reference: reference as f32,
            decimal_scale: self.decimal_scale,
            bits: bits as u8,
            template_tail: Vec::new(),
            data: pack_bits(scaled.iter().map(|v| (v - reference) as u32), bits as usize),
        }
    }

    /// Complex packing without spatial differencing: every group stores
    /// its minimum as reference and its offsets at the group's width.
    fn pack_complex(&self) -> Packed {
        let factor = 10f64.powi(self.decimal_scale as i32);
        let scaled: Vec<i64> = self
            .values
            .iter()
            .flatten()
            .map(|v| (v * factor).round() as i64)
            .collect();
        let reference = scaled.iter().copied().min().unwrap_or(0);
        let offsets: Vec<u32> = scaled.iter().map(|v| (v - reference) as u32).collect();

        let groups: Vec<&[u32]> = offsets.chunks(COMPLEX_GROUP_LENGTH).collect();
        let group_refs: Vec<u32> = groups
            .iter()
            .map(|group| group.iter().copied().min().unwrap_or(0))
            .collect();
        let group_widths: Vec<u32> = groups
            .iter()
            .zip(&group_refs)
            .map(|(group, group_ref)| {
                bit_width(group.iter().map(|v| v - group_ref).max().unwrap_or(0))
            })
            .collect();

        let ref_bits = bit_width(group_refs.iter().copied().max().unwrap_or(0)).max(1);
        let width_bits = bit_width(group_widths.iter().copied().max().unwrap_or(0)).max(1);

        let mut data = BitWriter::default();
        for group_ref in &group_refs {
            data.push(*group_ref, ref_bits as usize);
        }
        data.align();
        for width in &group_widths {
            data.push(*width, width_bits as usize);
        }
        data.align();
        for _ in &groups {
            data.push(0, 1); // Scaled group length: every group is full
        }
        data.align();
        for ((group, group_ref), width) in groups.iter().zip(&group_refs).zip(&group_widths) {
            for value in group.iter() {
                data.push(value - group_ref, *width as usize);
            }
        }

        let last_length = groups.last().map_or(0, |group| group.len()) as u32;
        let mut tail = Vec::new();
        tail.push(1); // Group splitting method: general
        tail.push(0); // No explicit missing values
        tail.extend_from_slice(&u32::MAX.to_be_bytes()); // Primary missing substitute
        tail.extend_from_slice(&u32::MAX.to_be_bytes()); // Secondary missing substitute
        tail.extend_from_slice(&(groups.len() as u32).to_be_bytes());
        tail.push(0); // Reference for group widths
        tail.push(width_bits as u8);
        tail.extend_from_slice(&(COMPLEX_GROUP_LENGTH as u32).to_be_bytes());
        tail.push(1); // Length increment
        tail.extend_from_slice(&last_length.to_be_bytes());
        tail.push(1); // Bits for scaled group lengths

        Packed {
            count: scaled.len(),
            reference: reference as f32,
            decimal_scale: self.decimal_scale,
            bits: ref_bits as u8,
            template_tail: tail,
            data: data.finish(),
        }
    }
}

struct Packed {
    count: usize,
    reference: f32,
    decimal_scale: i16,
    bits: u8,
    /// Template octets following the simple-packing fields
    template_tail: Vec<u8>,
    data: Vec<u8>,
}

/// A minimal GRIB edition 1 message (24-bit length, edition byte 1) with a
/// zero-filled body.
pub fn grib1_message(body_len: usize) -> Vec<u8> {
    let total = 8 + body_len + 4;
    let mut message = b"GRIB".to_vec();
    message.extend_from_slice(&(total as u32).to_be_bytes()[1..]);
    message.push(1);
    message.extend(std::iter::repeat(0u8).take(body_len));
    message.extend_from_slice(b"7777");
    message
}

fn section(number: u8, body: &[u8]) -> Vec<u8> {
    let mut section = Vec::with_capacity(5 + body.len());
    section.extend_from_slice(&((5 + body.len()) as u32).to_be_bytes());
    section.push(number);
    section.extend_from_slice(body);
    section
}

fn micro(degrees: f64) -> i32 {
    (degrees * 1e6).round() as i32
}

/// GRIB2 sign-magnitude encoding of a 4-byte integer.
fn encode_signed(value: i32) -> [u8; 4] {
    let magnitude = value.unsigned_abs() & 0x7FFF_FFFF;
    let raw = if value < 0 { magnitude | 0x8000_0000 } else { magnitude };
    raw.to_be_bytes()
}

fn encode_signed_u16(value: i16) -> u16 {
    let magnitude = value.unsigned_abs() & 0x7FFF;
    if value < 0 {
        magnitude | 0x8000
    } else {
        magnitude
    }
}

/// Pack values MSB first using `bits` bits each, padding the last byte.
fn pack_bits(values: impl Iterator<Item = u32>, bits: usize) -> Vec<u8> {
    let mut writer = BitWriter::default();
    for value in values {
        writer.push(value, bits);
    }
    writer.finish()
}

/// Number of bits needed to store `value`.
fn bit_width(value: u32) -> u32 {
    32 - value.leading_zeros()
}

/// MSB-first bit stream.
#[derive(Default)]
struct BitWriter {
    out: Vec<u8>,
    accumulator: u64,
    filled: usize,
}

impl BitWriter {
    fn push(&mut self, value: u32, bits: usize) {
        if bits == 0 {
            return;
        }
        self.accumulator = (self.accumulator << bits) | (value as u64 & ((1u64 << bits) - 1));
        self.filled += bits;
        while self.filled >= 8 {
            self.filled -= 8;
            self.out.push((self.accumulator >> self.filled) as u8);
        }
    }

    /// Pad with zero bits to the next octet.
    fn align(&mut self) {
        if self.filled > 0 {
            self.push(0, 8 - self.filled);
        }
    }

    fn finish(mut self) -> Vec<u8> {
        self.align();
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_framing() {
        let message = Grib2Builder::new().build();

        assert_eq!(&message[..4], b"GRIB");
        assert_eq!(message[7], 2);
        let length = u64::from_be_bytes(message[8..16].try_into().unwrap());
        assert_eq!(length as usize, message.len());
        assert_eq!(&message[message.len() - 4..], b"7777");
    }

    #[test]
    fn test_sign_magnitude() {
        assert_eq!(encode_signed(5), [0, 0, 0, 5]);
        assert_eq!(encode_signed(-5), [0x80, 0, 0, 5]);
        assert_eq!(encode_signed_u16(-2), 0x8002);
    }

    #[test]
    fn test_pack_bits() {
        assert_eq!(pack_bits([1u32, 0, 1].into_iter(), 1), vec![0b1010_0000]);
        assert_eq!(pack_bits([0u32, 250].into_iter(), 8), vec![0, 250]);
        assert_eq!(pack_bits([0xFu32, 0x1].into_iter(), 4), vec![0xF1]);
    }

    #[test]
    fn test_complex_packing_layout() {
        // Offsets [0, 25, 50, 875] and [900, 950] in two groups
        let message = Grib2Builder::new()
            .with_grid(3, 2, 50.0, 0.0, 0.5, 0.5)
            .with_values(vec![271.5, 271.75, 272.0, 280.25, 280.5, 281.0])
            .with_complex_packing();
        let packed = message.pack();

        assert_eq!(packed.count, 6);
        assert_eq!(packed.reference, 27150.0);
        assert_eq!(packed.bits, 10);
        assert_eq!(packed.template_tail.len(), 26);
        assert_eq!(&packed.template_tail[10..14], &2u32.to_be_bytes());
        // refs (2 x 10 bits), widths (2 x 4 bits), lengths (2 x 1 bit),
        // then 4 x 10 + 2 x 6 value bits
        assert_eq!(packed.data.len(), 3 + 1 + 1 + 7);
        assert_eq!(&packed.data[..3], &[0b0000_0000, 0b0011_1000, 0b0100_0000]);
        assert_eq!(packed.data[3], 0b1010_0110);

        let section5 = message.build_section5();
        assert_eq!(section5.len(), 47);
    }

    #[test]
    fn test_declared_grid_overrides_section3() {
        let section3 = Grib2Builder::new().with_declared_grid(65535, 65535).build_section3();

        assert_eq!(&section3[6..10], &4_294_836_225u32.to_be_bytes());
        assert_eq!(&section3[30..34], &65535u32.to_be_bytes());
    }

    #[test]
    fn test_grib1_message_length() {
        let message = grib1_message(20);
        assert_eq!(message.len(), 32);
        assert_eq!(&message[4..7], &[0, 0, 32]);
        assert_eq!(message[7], 1);
    }
}
