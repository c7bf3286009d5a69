//! Stream schemas.
//!
//! Long-format streams share one statically declared property list.
//! Pivot-format streams infer theirs from a scan of the stream's messages:
//! the three identity columns plus one column per distinct variable.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::grid::GridReconciler;
use crate::grouping::GroupFilter;
use crate::message::{GribMessage, MessageSource};
use crate::value::Value;
use crate::variable::message_variable_name;
use crate::Result;

/// Long-format fields, in declaration order.
pub const LONG_FIELDS: [(&str, FieldType, bool); 13] = [
    ("datetime", FieldType::DateTime, true),
    ("lat", FieldType::Number, false),
    ("lon", FieldType::Number, false),
    ("level_type", FieldType::String, true),
    ("level", FieldType::Number, true),
    ("name", FieldType::String, false),
    ("ensemble", FieldType::Integer, true),
    ("forecast_step", FieldType::Number, true),
    ("edition", FieldType::Integer, true),
    ("centre", FieldType::String, true),
    ("data_type", FieldType::String, true),
    ("grid_type", FieldType::String, true),
    ("value", FieldType::Number, false),
];

/// Long-format fields that cannot be excluded.
pub const LONG_RESERVED: [&str; 5] = ["datetime", "lat", "lon", "name", "value"];

/// Pivot-format identity columns.
pub const PIVOT_IDENTITY: [&str; 3] = ["latitude", "longitude", "ts"];

/// Field types of the declared schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Boolean,
    Integer,
    Number,
    String,
    DateTime,
}

impl FieldType {
    /// Type of a column from one sample value. Anything unrecognised, and
    /// a missing sample, is a string.
    pub fn infer(sample: Option<&Value>) -> Self {
        match sample {
            Some(Value::Bool(_)) => FieldType::Boolean,
            Some(Value::Int(_)) => FieldType::Integer,
            Some(Value::Float(_)) => FieldType::Number,
            Some(Value::Timestamp(_)) => FieldType::DateTime,
            Some(Value::Text(_)) | None => FieldType::String,
        }
    }

    /// Convert a value to this type, `None` when it has no such reading.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match self {
            FieldType::Boolean => match value {
                Value::Bool(b) => Some(Value::Bool(*b)),
                _ => None,
            },
            FieldType::Integer => value.as_i64().map(Value::Int),
            FieldType::Number => value.as_f64().map(Value::Float),
            FieldType::String => Some(Value::Text(value.to_string())),
            FieldType::DateTime => value.as_timestamp().map(Value::Timestamp),
        }
    }

    fn json_type(&self) -> &'static str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::String | FieldType::DateTime => "string",
        }
    }
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

impl Property {
    pub fn new(name: impl Into<String>, field_type: FieldType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable,
        }
    }
}

/// Ordered list of declared fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    properties: Vec<Property>,
}

impl Schema {
    pub fn new(properties: Vec<Property>) -> Self {
        Self { properties }
    }

    /// The long-format schema without the excluded fields.
    pub fn long(excluded: &BTreeSet<String>) -> Self {
        Self::new(
            LONG_FIELDS
                .iter()
                .filter(|(name, _, _)| !excluded.contains(*name))
                .map(|(name, field_type, nullable)| Property::new(*name, *field_type, *nullable))
                .collect(),
        )
    }

    /// Pivot identity columns followed by one nullable column per variable.
    pub fn pivot<'a>(variables: impl IntoIterator<Item = (&'a str, FieldType)>) -> Self {
        let mut properties = vec![
            Property::new("latitude", FieldType::Number, false),
            Property::new("longitude", FieldType::Number, false),
            Property::new("ts", FieldType::DateTime, false),
        ];
        properties.extend(
            variables
                .into_iter()
                .map(|(name, field_type)| Property::new(name, field_type, true)),
        );
        Self::new(properties)
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// JSON Schema document describing a record.
    pub fn to_json_schema(&self) -> serde_json::Value {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .properties
            .iter()
            .map(|property| {
                let json_type = if property.nullable {
                    json!([property.field_type.json_type(), "null"])
                } else {
                    json!(property.field_type.json_type())
                };
                let mut definition = json!({ "type": json_type });
                if property.field_type == FieldType::DateTime {
                    definition["format"] = json!("date-time");
                }
                (property.name.clone(), definition)
            })
            .collect();

        json!({
            "type": "object",
            "properties": properties,
        })
    }
}

/// Infer a pivot schema by scanning every message of `source` that passes
/// `filter`. Variables in `excluded` are left out. Each variable is typed
/// from the first unmasked value found for it.
pub fn infer_pivot_schema<S: MessageSource>(
    source: &S,
    filter: &GroupFilter,
    excluded: &BTreeSet<String>,
) -> Result<Schema> {
    let mut order: Vec<String> = Vec::new();
    let mut samples: HashMap<String, Option<Value>> = HashMap::new();
    let mut unreadable = 0usize;

    for (index, message) in source.open()?.enumerate() {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!(source = %source.describe(), message = index, error = %e, "Unreadable message during schema scan");
                unreadable += 1;
                continue;
            }
        };
        if !filter.matches(&message) {
            continue;
        }
        let Some(variable) = message_variable_name(&message) else {
            continue;
        };
        if excluded.contains(&variable) {
            continue;
        }

        let sample = samples.entry(variable.clone()).or_insert_with(|| {
            order.push(variable.clone());
            None
        });
        if sample.is_none() {
            *sample = sample_value(&message);
        }
    }

    debug!(
        source = %source.describe(),
        variables = order.len(),
        unreadable,
        "Inferred pivot schema"
    );

    Ok(Schema::pivot(order.iter().map(|name| {
        let sample = samples.get(name).and_then(Option::as_ref);
        (name.as_str(), FieldType::infer(sample))
    })))
}

fn sample_value(message: &impl GribMessage) -> Option<Value> {
    GridReconciler::reconcile(message)
        .into_points()
        .iter()
        .find_map(|point| point.unmasked_value())
        .map(Value::Float)
}
