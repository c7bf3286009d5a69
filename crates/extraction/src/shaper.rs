//! Record shaping: long rows and the pivot table.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::message::{keys, GribMessage};
use crate::schema::Schema;
use crate::value::{Record, Value};

/// Rows held by a pivot table before it is flushed.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Output shape of a stream, fixed when the stream is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// One record per point per message.
    Long,
    /// One record per (latitude, longitude, time), one column per variable.
    Pivot { batch_size: usize },
}

/// Long-format field to message attribute.
const LONG_ATTRIBUTES: [(&str, &str); 9] = [
    ("level_type", keys::TYPE_OF_LEVEL),
    ("level", keys::LEVEL),
    ("name", keys::SHORT_NAME),
    ("ensemble", keys::PERTURBATION_NUMBER),
    ("forecast_step", keys::STEP),
    ("edition", keys::EDITION),
    ("centre", keys::CENTRE),
    ("data_type", keys::DATA_TYPE),
    ("grid_type", keys::GRID_TYPE),
];

/// Attributes shared by every long-format row of one message.
#[derive(Debug, Clone, Default)]
pub struct MessageMetadata {
    fields: HashMap<&'static str, Value>,
}

impl MessageMetadata {
    pub fn from_message(message: &impl GribMessage) -> Self {
        let fields = LONG_ATTRIBUTES
            .iter()
            .filter_map(|(field, key)| message.attribute(key).map(|value| (*field, value)))
            .collect();
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// One long-format record holding exactly the schema's fields. Metadata is
/// converted to the declared field type; values without such a reading
/// become null.
pub fn long_record(
    schema: &Schema,
    metadata: &MessageMetadata,
    timestamp: Option<DateTime<Utc>>,
    lat: f64,
    lon: f64,
    value: f64,
) -> Record {
    Record::from_schema(schema, |property| match property.name.as_str() {
        "datetime" => timestamp.map(Value::Timestamp),
        "lat" => Some(Value::Float(lat)),
        "lon" => Some(Value::Float(lon)),
        "value" => Some(Value::Float(value)),
        field => metadata
            .get(field)
            .and_then(|v| property.field_type.coerce(v)),
    })
}

/// Identity of a pivot row. Coordinates are compared bitwise, with
/// negative zero folded into zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PivotKey {
    lat: u64,
    lon: u64,
    ts: DateTime<Utc>,
}

impl PivotKey {
    fn new(lat: f64, lon: f64, ts: DateTime<Utc>) -> Self {
        Self {
            lat: (lat + 0.0).to_bits(),
            lon: (lon + 0.0).to_bits(),
            ts,
        }
    }
}

/// In-memory wide table keyed by (latitude, longitude, time).
///
/// Rows are kept in creation order. Once the table holds `batch_size`
/// rows it is flushed; a key seen again after its row was flushed starts
/// a new row.
#[derive(Debug)]
pub struct PivotTable {
    index: HashMap<PivotKey, usize>,
    rows: Vec<Record>,
    batch_size: usize,
    batches: usize,
}

impl PivotTable {
    pub fn new(batch_size: usize) -> Self {
        Self {
            index: HashMap::new(),
            rows: Vec::new(),
            batch_size: batch_size.max(1),
            batches: 0,
        }
    }

    /// Set `column` to `value` on the row for (lat, lon, ts), creating the
    /// row if needed. Returns the flushed rows when the table is full.
    pub fn insert(
        &mut self,
        lat: f64,
        lon: f64,
        ts: DateTime<Utc>,
        column: &str,
        value: f64,
    ) -> Option<Vec<Record>> {
        let key = PivotKey::new(lat, lon, ts);
        let row = match self.index.get(&key) {
            Some(&row) => row,
            None => {
                let mut record = Record::new();
                record.insert("latitude", Some(Value::Float(lat)));
                record.insert("longitude", Some(Value::Float(lon)));
                record.insert("ts", Some(Value::Timestamp(ts)));
                self.rows.push(record);
                self.index.insert(key, self.rows.len() - 1);
                self.rows.len() - 1
            }
        };
        self.rows[row].insert(column, Some(Value::Float(value)));

        (self.rows.len() >= self.batch_size).then(|| self.flush())
    }

    /// Emit every held row and clear the table.
    pub fn flush(&mut self) -> Vec<Record> {
        self.index.clear();
        if !self.rows.is_empty() {
            self.batches += 1;
        }
        std::mem::take(&mut self.rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of non-empty batches flushed so far.
    pub fn batches(&self) -> usize {
        self.batches
    }
}
