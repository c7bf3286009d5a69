//! Helpers writing GRIB files and configuration documents for tests.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::Grib2Builder;

/// Temporary directory removed when dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("tap_grib_")
        .tempdir()
        .expect("Failed to create temporary test directory")
}

/// Write the concatenation of `messages` to `dir/name`.
pub fn write_grib_file(dir: &Path, name: &str, messages: &[Vec<u8>]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, messages.concat()).expect("Failed to write GRIB test file");
    path
}

/// Write the concatenation of `messages` to `dir/name`, gzip compressed.
pub fn write_gzip_grib_file(dir: &Path, name: &str, messages: &[Vec<u8>]) -> PathBuf {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&messages.concat())
        .expect("Failed to compress GRIB test data");
    let compressed = encoder.finish().expect("Failed to finish gzip stream");

    let path = dir.join(name);
    fs::write(&path, compressed).expect("Failed to write gzip test file");
    path
}

/// Write a text document (configuration, paths list) to `dir/name`.
pub fn write_text_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("Failed to write text test file");
    path
}

/// Two single-point messages at (10, 20): surface temperature 5.0 at
/// 2023-06-01 00:00 and 2 m temperature 7.5 six hours later.
pub fn two_parameter_messages() -> Vec<Vec<u8>> {
    vec![
        Grib2Builder::new().with_values(vec![5.0]).build(),
        Grib2Builder::new()
            .with_level(103, 2)
            .with_reference_time(2023, 6, 1, 6, 0)
            .with_values(vec![7.5])
            .build(),
    ]
}

/// A 3x2 temperature field on isobaric 850 hPa with the centre point of
/// the first row masked.
pub fn masked_isobaric_message() -> Vec<u8> {
    Grib2Builder::new()
        .with_grid(3, 2, 50.0, 0.0, 0.5, 0.5)
        .with_level(100, 85_000)
        .with_masked_values(vec![
            Some(271.5),
            None,
            Some(272.25),
            Some(270.0),
            Some(270.5),
            Some(271.0),
        ])
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_write_grib_file_concatenates() {
        let dir = crate::temp_test_dir();
        let messages = two_parameter_messages();
        let path = write_grib_file(dir.path(), "two.grib2", &messages);

        let written = fs::read(path).unwrap();
        assert_eq!(written.len(), messages[0].len() + messages[1].len());
        assert_eq!(&written[..4], b"GRIB");
    }

    #[test]
    fn test_gzip_file_round_trips() {
        let dir = crate::temp_test_dir();
        let messages = vec![masked_isobaric_message()];
        let path = write_gzip_grib_file(dir.path(), "masked.grib2.gz", &messages);

        let compressed = fs::read(path).unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);

        let mut decoded = Vec::new();
        GzDecoder::new(&compressed[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, messages[0]);
    }
}
