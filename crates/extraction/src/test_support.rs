//! In-memory messages and sources for unit tests.

use std::cell::Cell;
use std::collections::HashMap;

use grib2_parser::Grib2Error;

use crate::message::{GribMessage, GridData, GridError, MessageIter, MessageSource};
use crate::value::Value;
use crate::{ExtractionError, Result};

#[derive(Debug, Clone)]
pub struct StubMessage {
    attributes: HashMap<String, Value>,
    grid: std::result::Result<GridData, GridError>,
}

impl StubMessage {
    /// A message with only a short name and no grid.
    pub fn new(short_name: &str) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert("shortName".to_string(), Value::from(short_name));
        Self {
            attributes,
            grid: Err(GridError::Unsupported("stub without grid".to_string())),
        }
    }

    /// A one-point message dated 2023-06-01 00:00 through `dataDate`.
    pub fn point(short_name: &str, lat: f64, lon: f64, value: Option<f64>) -> Self {
        Self::new(short_name)
            .with("dataDate", 20230601i64)
            .with("dataTime", 0i64)
            .with_grid(Ok(GridData::Field {
                lats: vec![lat],
                lons: vec![lon],
                values: vec![value],
                shape: (1, 1),
            }))
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn without(mut self, key: &str) -> Self {
        self.attributes.remove(key);
        self
    }

    pub fn with_grid(mut self, grid: std::result::Result<GridData, GridError>) -> Self {
        self.grid = grid;
        self
    }

    /// A row-major field with one value per (lat, lon) pair.
    pub fn with_field(self, lats: &[f64], lons: &[f64], values: Vec<Option<f64>>) -> Self {
        let mut all_lats = Vec::new();
        let mut all_lons = Vec::new();
        for lat in lats {
            for lon in lons {
                all_lats.push(*lat);
                all_lons.push(*lon);
            }
        }
        self.with_grid(Ok(GridData::Field {
            lats: all_lats,
            lons: all_lons,
            values,
            shape: (lats.len(), lons.len()),
        }))
    }
}

impl GribMessage for StubMessage {
    fn attribute(&self, key: &str) -> Option<Value> {
        self.attributes.get(key).cloned()
    }

    fn grid(&self) -> std::result::Result<GridData, GridError> {
        self.grid.clone()
    }
}

/// Entry of a [`MemorySource`]: a message, or an unreadable one.
#[derive(Debug, Clone)]
pub enum Entry {
    Message(StubMessage),
    Unreadable(String),
}

/// Source replaying a fixed list of messages, counting its passes.
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: Vec<Entry>,
    opened: Cell<usize>,
}

impl MemorySource {
    pub fn new(messages: Vec<StubMessage>) -> Self {
        Self::with_entries(messages.into_iter().map(Entry::Message).collect())
    }

    pub fn with_entries(entries: Vec<Entry>) -> Self {
        Self {
            entries,
            opened: Cell::new(0),
        }
    }

    pub fn passes(&self) -> usize {
        self.opened.get()
    }
}

impl MessageSource for MemorySource {
    type Message = StubMessage;

    fn open(&self) -> Result<MessageIter<'_, StubMessage>> {
        self.opened.set(self.opened.get() + 1);
        Ok(Box::new(self.entries.iter().map(|entry| match entry {
            Entry::Message(message) => Ok(message.clone()),
            Entry::Unreadable(reason) => Err(ExtractionError::Decode(Grib2Error::InvalidFormat(
                reason.clone(),
            ))),
        })))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
