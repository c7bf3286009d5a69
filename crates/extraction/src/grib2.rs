//! File-backed message source over the GRIB2 decoder.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use grib2_parser::{Grib2Error, Grib2Message, Grib2Reader, Grib2Tables};

use crate::message::{keys, GribMessage, GridData, GridError, MessageIter, MessageSource};
use crate::value::Value;
use crate::{ExtractionError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decompress gzip-compressed GRIB2 data.
pub fn decompress_gzip(data: &[u8]) -> Result<Bytes> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| ExtractionError::Decompression(e.to_string()))?;
    Ok(Bytes::from(decompressed))
}

/// A GRIB file on disk, plain or gzip-compressed.
///
/// Every call to [`open`](MessageSource::open) reads the file again, so a
/// source can be scanned for groups and schemas and then extracted.
#[derive(Debug, Clone)]
pub struct Grib2Source {
    path: PathBuf,
    tables: Arc<Grib2Tables>,
}

impl Grib2Source {
    pub fn new(path: impl Into<PathBuf>, tables: Arc<Grib2Tables>) -> Self {
        Self {
            path: path.into(),
            tables,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Bytes> {
        let raw = std::fs::read(&self.path)?;
        if raw.starts_with(&GZIP_MAGIC) {
            let data = decompress_gzip(&raw)?;
            debug!(
                path = %self.path.display(),
                compressed = raw.len(),
                decompressed = data.len(),
                "Decompressed gzip GRIB file"
            );
            return Ok(data);
        }
        Ok(Bytes::from(raw))
    }
}

impl MessageSource for Grib2Source {
    type Message = Grib2Field;

    fn open(&self) -> Result<MessageIter<'_, Grib2Field>> {
        let reader = Grib2Reader::new(self.read()?, Arc::clone(&self.tables));
        Ok(Box::new(reader.map(|message| {
            message.map(Grib2Field::from).map_err(ExtractionError::from)
        })))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// One decoded GRIB2 field seen through ecCodes-style attribute keys.
#[derive(Debug, Clone)]
pub struct Grib2Field {
    message: Grib2Message,
}

impl Grib2Field {
    pub fn message(&self) -> &Grib2Message {
        &self.message
    }
}

impl From<Grib2Message> for Grib2Field {
    fn from(message: Grib2Message) -> Self {
        Self { message }
    }
}

impl GribMessage for Grib2Field {
    fn attribute(&self, key: &str) -> Option<Value> {
        let msg = &self.message;
        match key {
            keys::SHORT_NAME => Some(Value::Text(msg.parameter())),
            keys::TYPE_OF_LEVEL => msg.level_type().map(Value::Text),
            keys::LEVEL => msg.level().map(Value::Float),
            keys::VALID_DATE => msg.valid_time().map(Value::Timestamp),
            keys::DATA_DATE => Some(Value::Int(msg.data_date() as i64)),
            keys::DATA_TIME => Some(Value::Int(msg.data_time() as i64)),
            keys::PERTURBATION_NUMBER | "number" => {
                msg.perturbation_number().map(|n| Value::Int(n as i64))
            }
            keys::STEP => msg
                .forecast_step()
                .map(|step| Value::Float(step.num_minutes() as f64 / 60.0)),
            keys::EDITION => Some(Value::Int(msg.indicator.edition as i64)),
            keys::CENTRE => Some(Value::Text(msg.centre())),
            keys::DATA_TYPE => Some(Value::Text(msg.data_type())),
            keys::GRID_TYPE => Some(Value::Text(msg.grid_type().to_string())),
            "discipline" => Some(Value::Int(msg.indicator.discipline as i64)),
            "parameterCategory" => Some(Value::Int(
                msg.product_definition.parameter_category as i64,
            )),
            "parameterNumber" => Some(Value::Int(msg.product_definition.parameter_number as i64)),
            "numberOfDataPoints" => Some(Value::Int(msg.num_points() as i64)),
            "Ni" => msg
                .grid_definition
                .lat_lon
                .as_ref()
                .map(|grid| Value::Int(grid.ni as i64)),
            "Nj" => msg
                .grid_definition
                .lat_lon
                .as_ref()
                .map(|grid| Value::Int(grid.nj as i64)),
            _ => None,
        }
    }

    fn grid(&self) -> std::result::Result<GridData, GridError> {
        // Values first: a field whose data cannot back its declared grid
        // is rejected before coordinates are generated.
        let values = self
            .message
            .unpack_data()
            .map_err(grid_error)?
            .into_iter()
            .map(|value| value.map(f64::from))
            .collect();
        let (lats, lons) = self.message.lat_lons().map_err(grid_error)?;

        Ok(GridData::Field {
            lats,
            lons,
            values,
            shape: self.message.grid_dims(),
        })
    }
}

fn grid_error(error: Grib2Error) -> GridError {
    match error {
        Grib2Error::UnsupportedTemplate { section: 3, .. } => {
            GridError::Unsupported(format!("{}", error))
        }
        Grib2Error::UnsupportedTemplate {
            section: 5,
            template,
        } => GridError::UnsupportedPacking(template),
        Grib2Error::UnsupportedTemplate { .. } => GridError::Decode(error.to_string()),
        Grib2Error::InvalidSection { .. } => GridError::Inconsistent(error.to_string()),
        other => GridError::Decode(other.to_string()),
    }
}
