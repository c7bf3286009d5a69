//! Stream definitions and record emission.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::grid::{GridOutcome, GridReconciler, Points, SkipReason};
use crate::grouping::GroupFilter;
use crate::message::{GridError, MessageIter, MessageSource};
use crate::schema::{infer_pivot_schema, Schema, LONG_RESERVED, PIVOT_IDENTITY};
use crate::shaper::{long_record, MessageMetadata, PivotTable, Shape, DEFAULT_BATCH_SIZE};
use crate::timestamp::resolve_timestamp;
use crate::value::Record;
use crate::variable::message_variable_name;
use crate::{ExtractionError, Result};

/// Default primary keys of long-format streams.
pub const LONG_PRIMARY_KEYS: [&str; 4] = ["datetime", "lat", "lon", "name"];

/// Lazy sequence of records of one stream.
pub type RecordIter<'a> = Box<dyn Iterator<Item = Record> + 'a>;

/// Per-stream settings fixed at discovery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    pub shape: Shape,
    /// Schema fields (long) or variables (pivot) left out of the output.
    pub excluded: BTreeSet<String>,
    /// Overrides the shape's default primary keys.
    pub primary_keys: Option<Vec<String>>,
    pub filter: GroupFilter,
}

impl StreamOptions {
    pub fn long() -> Self {
        Self {
            shape: Shape::Long,
            excluded: BTreeSet::new(),
            primary_keys: None,
            filter: GroupFilter::all(),
        }
    }

    pub fn pivot() -> Self {
        Self {
            shape: Shape::Pivot {
                batch_size: DEFAULT_BATCH_SIZE,
            },
            ..Self::long()
        }
    }

    pub fn with_excluded<I, T>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.excluded = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_primary_keys(mut self, keys: Vec<String>) -> Self {
        self.primary_keys = Some(keys);
        self
    }

    pub fn with_filter(mut self, filter: GroupFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        if let Shape::Pivot { .. } = self.shape {
            self.shape = Shape::Pivot { batch_size };
        }
        self
    }

    /// Reject exclusions of identity fields and empty pivot batches.
    pub fn validate(&self) -> Result<()> {
        let (reserved, mode): (&[&str], &'static str) = match self.shape {
            Shape::Long => (&LONG_RESERVED[..], "long"),
            Shape::Pivot { batch_size } => {
                if batch_size == 0 {
                    return Err(ExtractionError::InvalidConfig(
                        "batch_size must be greater than 0".to_string(),
                    ));
                }
                (&PIVOT_IDENTITY[..], "pivot")
            }
        };

        if let Some(field) = reserved.iter().find(|f| self.excluded.contains(**f)) {
            return Err(ExtractionError::ReservedField {
                field: field.to_string(),
                mode,
            });
        }
        Ok(())
    }

    /// Primary keys in effect.
    pub fn effective_primary_keys(&self) -> Vec<String> {
        match (&self.primary_keys, self.shape) {
            (Some(keys), _) => keys.clone(),
            (None, Shape::Long) => LONG_PRIMARY_KEYS.iter().map(|s| s.to_string()).collect(),
            (None, Shape::Pivot { .. }) => PIVOT_IDENTITY.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// One logical output table: a named, filtered view over one source.
#[derive(Debug)]
pub struct StreamDefinition<S> {
    name: String,
    source: Arc<S>,
    options: StreamOptions,
    primary_keys: Vec<String>,
    schema: Option<Schema>,
}

impl<S: MessageSource> StreamDefinition<S> {
    /// Define a stream. Options are validated here, before any extraction;
    /// long-format streams receive their static schema immediately.
    pub fn new(name: impl Into<String>, source: Arc<S>, options: StreamOptions) -> Result<Self> {
        options.validate()?;

        let mut stream = Self {
            name: name.into(),
            source,
            primary_keys: options.effective_primary_keys(),
            options,
            schema: None,
        };
        if stream.options.shape == Shape::Long {
            stream.assign_schema(Schema::long(&stream.options.excluded))?;
        }
        Ok(stream)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn shape(&self) -> Shape {
        self.options.shape
    }

    pub fn filter(&self) -> &GroupFilter {
        &self.options.filter
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Set the declared schema, checking that every primary key is in it.
    pub fn assign_schema(&mut self, schema: Schema) -> Result<()> {
        if let Some(key) = self.primary_keys.iter().find(|key| !schema.contains(key)) {
            return Err(ExtractionError::InvalidPrimaryKey {
                stream: self.name.clone(),
                key: key.clone(),
            });
        }
        self.schema = Some(schema);
        Ok(())
    }

    /// Declared schema, inferring it with a scan of the source for pivot
    /// streams that have none yet.
    pub fn resolve_schema(&mut self) -> Result<&Schema> {
        if self.schema.is_none() {
            let schema = match self.options.shape {
                Shape::Long => Schema::long(&self.options.excluded),
                Shape::Pivot { .. } => infer_pivot_schema(
                    self.source.as_ref(),
                    &self.options.filter,
                    &self.options.excluded,
                )?,
            };
            self.assign_schema(schema)?;
        }
        self.schema
            .as_ref()
            .ok_or_else(|| ExtractionError::SchemaNotAssigned(self.name.clone()))
    }

    /// Records of this stream, read lazily in a fresh pass over the source.
    ///
    /// Fails with [`ExtractionError::SchemaNotAssigned`] if no schema was
    /// declared, and with the source's error if it cannot be opened.
    /// Messages that cannot be read or reconciled are logged and skipped.
    pub fn records<'a>(&'a self) -> Result<RecordIter<'a>>
    where
        S::Message: 'a,
    {
        let schema = self
            .schema
            .as_ref()
            .ok_or_else(|| ExtractionError::SchemaNotAssigned(self.name.clone()))?;
        let messages = self.source.open()?;

        info!(
            stream = %self.name,
            source = %self.source.describe(),
            shape = ?self.options.shape,
            "Streaming records"
        );

        Ok(match self.options.shape {
            Shape::Long => Box::new(LongRecords {
                stream: self,
                schema,
                messages,
                current: None,
                stats: StreamStats::default(),
                exhausted: false,
                reported: false,
            }),
            Shape::Pivot { batch_size } => Box::new(PivotRecords {
                stream: self,
                schema,
                messages,
                table: PivotTable::new(batch_size),
                pending: VecDeque::new(),
                dropped_columns: HashSet::new(),
                stats: StreamStats::default(),
                exhausted: false,
                reported: false,
            }),
        })
    }

    /// Variable name of an admitted message: it passes the group filter,
    /// has a short name and, for pivot streams, is not an excluded
    /// variable. Long streams exclude columns, not variables.
    fn admit(&self, index: usize, message: &S::Message, stats: &mut StreamStats) -> Option<String> {
        if !self.options.filter.matches(message) {
            return None;
        }
        let Some(variable) = message_variable_name(message) else {
            debug!(stream = %self.name, message = index, "Skipping message without short name");
            stats.skipped += 1;
            return None;
        };
        let pivot = matches!(self.options.shape, Shape::Pivot { .. });
        if pivot && self.options.excluded.contains(&variable) {
            return None;
        }
        Some(variable)
    }

    fn reconcile(&self, index: usize, message: &S::Message, stats: &mut StreamStats) -> Option<Points> {
        match GridReconciler::reconcile(message) {
            GridOutcome::Grid(points) => Some(points),
            GridOutcome::Skipped(SkipReason::NoGrid(GridError::UnsupportedPacking(template))) => {
                if stats.unsupported_packings.insert(template) {
                    warn!(
                        stream = %self.name,
                        message = index,
                        template,
                        "Skipping messages with unsupported data packing"
                    );
                } else {
                    debug!(stream = %self.name, message = index, template, "Skipping message");
                }
                stats.skipped += 1;
                None
            }
            GridOutcome::Skipped(reason) => {
                debug!(stream = %self.name, message = index, reason = %reason, "Skipping message");
                stats.skipped += 1;
                None
            }
        }
    }

    fn report(&self, stats: &StreamStats, batches: Option<usize>) {
        info!(
            stream = %self.name,
            messages = stats.messages,
            skipped = stats.skipped,
            unreadable = stats.unreadable,
            masked_points = stats.masked,
            records = stats.records,
            unsupported_packings = ?stats.unsupported_packings,
            batches = ?batches,
            "Finished stream"
        );
    }
}

#[derive(Debug, Default, Clone)]
struct StreamStats {
    messages: usize,
    skipped: usize,
    unreadable: usize,
    masked: usize,
    records: usize,
    /// Packing templates already reported as unsupported
    unsupported_packings: BTreeSet<u16>,
}

/// Points of the current message still to be emitted as long rows.
struct LongCursor {
    metadata: MessageMetadata,
    timestamp: Option<DateTime<Utc>>,
    points: Points,
    next: usize,
}

struct LongRecords<'a, S: MessageSource> {
    stream: &'a StreamDefinition<S>,
    schema: &'a Schema,
    messages: MessageIter<'a, S::Message>,
    current: Option<LongCursor>,
    stats: StreamStats,
    exhausted: bool,
    reported: bool,
}

impl<S: MessageSource> LongRecords<'_, S> {
    fn start_message(&mut self, message: Result<S::Message>) {
        let index = self.stats.messages;
        self.stats.messages += 1;

        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!(stream = %self.stream.name, message = index, error = %e, "Unreadable message");
                self.stats.unreadable += 1;
                return;
            }
        };
        if self.stream.admit(index, &message, &mut self.stats).is_none() {
            return;
        }
        let Some(points) = self.stream.reconcile(index, &message, &mut self.stats) else {
            return;
        };

        self.current = Some(LongCursor {
            metadata: MessageMetadata::from_message(&message),
            timestamp: resolve_timestamp(&message),
            points,
            next: 0,
        });
    }
}

impl<S: MessageSource> Iterator for LongRecords<'_, S> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            if let Some(cursor) = self.current.as_mut() {
                while let Some(point) = cursor.points.get(cursor.next) {
                    cursor.next += 1;
                    match point.unmasked_value() {
                        Some(value) => {
                            self.stats.records += 1;
                            return Some(long_record(
                                self.schema,
                                &cursor.metadata,
                                cursor.timestamp,
                                point.lat,
                                point.lon,
                                value,
                            ));
                        }
                        None => self.stats.masked += 1,
                    }
                }
                self.current = None;
            }

            if self.exhausted {
                if !self.reported {
                    self.reported = true;
                    self.stream.report(&self.stats, None);
                }
                return None;
            }

            match self.messages.next() {
                Some(message) => self.start_message(message),
                None => self.exhausted = true,
            }
        }
    }
}

struct PivotRecords<'a, S: MessageSource> {
    stream: &'a StreamDefinition<S>,
    schema: &'a Schema,
    messages: MessageIter<'a, S::Message>,
    table: PivotTable,
    pending: VecDeque<Record>,
    dropped_columns: HashSet<String>,
    stats: StreamStats,
    exhausted: bool,
    reported: bool,
}

impl<S: MessageSource> PivotRecords<'_, S> {
    fn accumulate(&mut self, message: Result<S::Message>) {
        let index = self.stats.messages;
        self.stats.messages += 1;

        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!(stream = %self.stream.name, message = index, error = %e, "Unreadable message");
                self.stats.unreadable += 1;
                return;
            }
        };
        let Some(variable) = self.stream.admit(index, &message, &mut self.stats) else {
            return;
        };
        let Some(ts) = resolve_timestamp(&message) else {
            debug!(stream = %self.stream.name, message = index, variable = %variable, "Skipping message without valid time");
            self.stats.skipped += 1;
            return;
        };
        if !self.schema.contains(&variable) {
            if self.dropped_columns.insert(variable.clone()) {
                warn!(stream = %self.stream.name, column = %variable, "Dropping column missing from declared schema");
            }
            self.stats.skipped += 1;
            return;
        }
        let Some(points) = self.stream.reconcile(index, &message, &mut self.stats) else {
            return;
        };

        for point in points.iter() {
            let Some(value) = point.unmasked_value() else {
                self.stats.masked += 1;
                continue;
            };
            if let Some(batch) = self.table.insert(point.lat, point.lon, ts, &variable, value) {
                debug!(stream = %self.stream.name, rows = batch.len(), "Flushed pivot batch");
                self.pending.extend(batch);
            }
        }
    }
}

impl<S: MessageSource> Iterator for PivotRecords<'_, S> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                self.stats.records += 1;
                return Some(record);
            }

            if self.exhausted {
                if !self.reported {
                    self.reported = true;
                    self.stream.report(&self.stats, Some(self.table.batches()));
                }
                return None;
            }

            match self.messages.next() {
                Some(message) => self.accumulate(message),
                None => {
                    self.exhausted = true;
                    self.pending.extend(self.table.flush());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{GridData, GridError};
    use crate::schema::FieldType;
    use crate::test_support::{Entry, MemorySource, StubMessage};
    use crate::value::Value;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap()
    }

    /// Messages A and B: one point at (10, 20) on 2023-06-01 00:00.
    fn two_messages() -> Arc<MemorySource> {
        Arc::new(MemorySource::new(vec![
            StubMessage::point("t", 10.0, 20.0, Some(5.0)).with("typeOfLevel", "sfc"),
            StubMessage::point("u", 10.0, 20.0, Some(7.5)),
        ]))
    }

    fn pivot_stream(source: Arc<MemorySource>, options: StreamOptions) -> StreamDefinition<MemorySource> {
        let mut stream = StreamDefinition::new("test", source, options).unwrap();
        stream.resolve_schema().unwrap();
        stream
    }

    fn assert_records_match_schema(stream: &StreamDefinition<MemorySource>, records: &[Record]) {
        let schema = stream.schema().unwrap();
        for record in records {
            for key in record.keys() {
                assert!(schema.contains(key), "field {} not in schema", key);
            }
        }
    }

    #[test]
    fn test_long_end_to_end() {
        let stream = StreamDefinition::new("test", two_messages(), StreamOptions::long()).unwrap();
        let records: Vec<Record> = stream.records().unwrap().collect();

        assert_eq!(records.len(), 2);
        let t = &records[0];
        assert_eq!(t.get("datetime"), Some(&Value::Timestamp(ts())));
        assert_eq!(t.get("lat"), Some(&Value::Float(10.0)));
        assert_eq!(t.get("lon"), Some(&Value::Float(20.0)));
        assert_eq!(t.get("level_type"), Some(&Value::from("sfc")));
        assert!(t.contains("level"));
        assert_eq!(t.get("level"), None);
        assert_eq!(t.get("name"), Some(&Value::from("t")));
        assert_eq!(t.get("value"), Some(&Value::Float(5.0)));

        let u = &records[1];
        assert_eq!(u.get("name"), Some(&Value::from("u")));
        assert_eq!(u.get("level_type"), None);
        assert_eq!(u.get("value"), Some(&Value::Float(7.5)));

        assert_records_match_schema(&stream, &records);
    }

    #[test]
    fn test_pivot_end_to_end() {
        let stream = pivot_stream(two_messages(), StreamOptions::pivot());
        let records: Vec<Record> = stream.records().unwrap().collect();

        assert_eq!(records.len(), 1);
        let row = &records[0];
        assert_eq!(row.get("latitude"), Some(&Value::Float(10.0)));
        assert_eq!(row.get("longitude"), Some(&Value::Float(20.0)));
        assert_eq!(row.get("ts"), Some(&Value::Timestamp(ts())));
        assert_eq!(row.get("sfc_t"), Some(&Value::Float(5.0)));
        assert_eq!(row.get("u"), Some(&Value::Float(7.5)));
        assert_eq!(row.len(), 5);

        assert_records_match_schema(&stream, &records);
    }

    #[test]
    fn test_reserved_ignore_field_rejected_at_construction() {
        let source = two_messages();
        let err = StreamDefinition::new(
            "test",
            Arc::clone(&source),
            StreamOptions::long().with_excluded(["lon"]),
        )
        .unwrap_err();

        assert!(matches!(err, ExtractionError::ReservedField { ref field, .. } if field == "lon"));
        assert_eq!(source.passes(), 0);

        let err = StreamDefinition::new("test", source, StreamOptions::pivot().with_excluded(["ts"]))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::ReservedField { .. }));
    }

    #[test]
    fn test_ignored_long_fields_are_absent() {
        let stream = StreamDefinition::new(
            "test",
            two_messages(),
            StreamOptions::long().with_excluded(["centre", "edition", "level_type"]),
        )
        .unwrap();
        let records: Vec<Record> = stream.records().unwrap().collect();

        for record in &records {
            assert!(!record.contains("centre"));
            assert!(!record.contains("edition"));
            assert!(!record.contains("level_type"));
        }
        assert!(!stream.schema().unwrap().contains("centre"));
        assert_records_match_schema(&stream, &records);
    }

    #[test]
    fn test_long_ignore_fields_name_columns_not_variables() {
        let source = Arc::new(MemorySource::new(vec![
            StubMessage::point("centre", 10.0, 20.0, Some(1.0)),
            StubMessage::point("t", 10.0, 20.0, Some(2.0)),
        ]));
        let stream =
            StreamDefinition::new("test", source, StreamOptions::long().with_excluded(["centre"])).unwrap();
        let records: Vec<Record> = stream.records().unwrap().collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("name"), Some(&Value::from("centre")));
        assert_eq!(records[0].get("value"), Some(&Value::Float(1.0)));
        assert!(records.iter().all(|record| !record.contains("centre")));
    }

    #[test]
    fn test_primary_key_must_be_in_schema() {
        let err = StreamDefinition::new(
            "test",
            two_messages(),
            StreamOptions::long()
                .with_excluded(["centre"])
                .with_primary_keys(vec!["centre".to_string()]),
        )
        .unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidPrimaryKey { .. }));

        let mut stream = StreamDefinition::new(
            "test",
            two_messages(),
            StreamOptions::pivot().with_primary_keys(vec!["latitude".to_string(), "v".to_string()]),
        )
        .unwrap();
        assert!(matches!(
            stream.resolve_schema(),
            Err(ExtractionError::InvalidPrimaryKey { .. })
        ));
    }

    #[test]
    fn test_default_primary_keys() {
        let long = StreamDefinition::new("a", two_messages(), StreamOptions::long()).unwrap();
        assert_eq!(long.primary_keys(), &["datetime", "lat", "lon", "name"]);

        let pivot = pivot_stream(two_messages(), StreamOptions::pivot());
        assert_eq!(pivot.primary_keys(), &["latitude", "longitude", "ts"]);
    }

    #[test]
    fn test_records_without_schema_fail() {
        let stream = StreamDefinition::new("unresolved", two_messages(), StreamOptions::pivot()).unwrap();

        assert!(matches!(
            stream.records().err(),
            Some(ExtractionError::SchemaNotAssigned(name)) if name == "unresolved"
        ));
    }

    #[test]
    fn test_masked_points_never_emitted() {
        let source = Arc::new(MemorySource::new(vec![StubMessage::new("t")
            .with("dataDate", 20230601i64)
            .with_field(
                &[10.0, 9.0],
                &[20.0, 21.0],
                vec![Some(1.0), None, Some(f64::NAN), Some(4.0)],
            )]));

        let long = StreamDefinition::new("long", Arc::clone(&source), StreamOptions::long()).unwrap();
        let values: Vec<Value> = long
            .records()
            .unwrap()
            .map(|r| r.get("value").cloned().unwrap())
            .collect();
        assert_eq!(values, vec![Value::Float(1.0), Value::Float(4.0)]);

        let pivot = pivot_stream(source, StreamOptions::pivot());
        let rows: Vec<Record> = pivot.records().unwrap().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.get("t").is_some()));
    }

    #[test]
    fn test_missing_timestamp() {
        let source = Arc::new(MemorySource::new(vec![
            StubMessage::point("t", 10.0, 20.0, Some(5.0)).without("dataDate"),
            StubMessage::point("u", 10.0, 20.0, Some(7.5)),
        ]));

        // Long mode keeps the record with a null datetime
        let long = StreamDefinition::new("long", Arc::clone(&source), StreamOptions::long()).unwrap();
        let records: Vec<Record> = long.records().unwrap().collect();
        assert_eq!(records.len(), 2);
        assert!(records[0].contains("datetime"));
        assert_eq!(records[0].get("datetime"), None);

        // Pivot mode leaves the message out of the table
        let pivot = pivot_stream(source, StreamOptions::pivot());
        let rows: Vec<Record> = pivot.records().unwrap().collect();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].contains("t"));
        assert_eq!(rows[0].get("u"), Some(&Value::Float(7.5)));
    }

    #[test]
    fn test_unsupported_packing_skipped() {
        let source = Arc::new(MemorySource::new(vec![
            StubMessage::new("t").with_grid(Err(GridError::UnsupportedPacking(40))),
            StubMessage::point("t", 10.0, 20.0, Some(1.0)),
            StubMessage::new("u").with_grid(Err(GridError::UnsupportedPacking(40))),
        ]));

        let long = StreamDefinition::new("long", Arc::clone(&source), StreamOptions::long()).unwrap();
        let records: Vec<Record> = long.records().unwrap().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("value"), Some(&Value::Float(1.0)));

        let pivot = pivot_stream(source, StreamOptions::pivot());
        let rows: Vec<Record> = pivot.records().unwrap().collect();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].contains("u"));
    }

    #[test]
    fn test_bad_messages_do_not_abort_extraction() {
        let source = Arc::new(MemorySource::with_entries(vec![
            Entry::Message(StubMessage::point("t", 10.0, 20.0, Some(1.0))),
            Entry::Unreadable("truncated section".to_string()),
            Entry::Message(
                StubMessage::new("x").with_grid(Err(GridError::Unsupported("spectral".to_string()))),
            ),
            Entry::Message(StubMessage::point("t", 11.0, 20.0, Some(2.0)).without("shortName")),
            Entry::Message(StubMessage::point("t", 12.0, 20.0, Some(3.0))),
        ]));

        let stream = StreamDefinition::new("test", source, StreamOptions::long()).unwrap();
        let lats: Vec<Value> = stream
            .records()
            .unwrap()
            .map(|r| r.get("lat").cloned().unwrap())
            .collect();
        assert_eq!(lats, vec![Value::Float(10.0), Value::Float(12.0)]);
    }

    #[test]
    fn test_group_filter_applies() {
        let source = Arc::new(MemorySource::new(vec![
            StubMessage::point("t", 10.0, 20.0, Some(1.0)).with("perturbationNumber", 1i64),
            StubMessage::point("t", 10.0, 20.0, Some(2.0)).with("perturbationNumber", 2i64),
        ]));
        let filter = GroupFilter::new(vec![(
            "perturbationNumber".to_string(),
            Some("2".to_string()),
        )]);

        let stream = StreamDefinition::new("member_2", source, StreamOptions::long().with_filter(filter))
            .unwrap();
        let records: Vec<Record> = stream.records().unwrap().collect();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("ensemble"), Some(&Value::Int(2)));
        assert_eq!(records[0].get("value"), Some(&Value::Float(2.0)));
    }

    #[test]
    fn test_skipped_variables_excluded_from_pivot() {
        let stream = pivot_stream(two_messages(), StreamOptions::pivot().with_excluded(["u"]));

        assert!(!stream.schema().unwrap().contains("u"));
        let rows: Vec<Record> = stream.records().unwrap().collect();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].contains("u"));
    }

    #[test]
    fn test_pivot_batches_cover_every_key_once() {
        let n = 12_001;
        let lons: Vec<f64> = (0..n).map(|i| i as f64 * 0.01).collect();
        let source = Arc::new(MemorySource::new(vec![StubMessage::new("t")
            .with("dataDate", 20230601i64)
            .with_field(&[0.0], &lons, vec![Some(1.0); n])]));

        let stream = pivot_stream(source, StreamOptions::pivot());
        let rows: Vec<Record> = stream.records().unwrap().collect();

        assert_eq!(rows.len(), n);
        let distinct: HashSet<String> = rows
            .iter()
            .map(|row| row.get("longitude").unwrap().to_string())
            .collect();
        assert_eq!(distinct.len(), n);
    }

    #[test]
    fn test_pivot_batch_count() {
        let mut table = PivotTable::new(DEFAULT_BATCH_SIZE);
        let mut batches = 0;
        for i in 0..12_001 {
            if table.insert(i as f64, 0.0, ts(), "t", 1.0).is_some() {
                batches += 1;
            }
        }
        if !table.flush().is_empty() {
            batches += 1;
        }
        assert_eq!(batches, 3);
        assert_eq!(table.batches(), 3);
    }

    #[test]
    fn test_pivot_revisit_after_flush_duplicates_key() {
        let source = Arc::new(MemorySource::new(vec![
            StubMessage::new("t")
                .with("dataDate", 20230601i64)
                .with_field(&[10.0], &[20.0, 21.0], vec![Some(1.0), Some(2.0)]),
            StubMessage::point("u", 10.0, 20.0, Some(3.0)),
        ]));

        let stream = pivot_stream(source, StreamOptions::pivot().with_batch_size(2));
        let rows: Vec<Record> = stream.records().unwrap().collect();

        assert_eq!(rows.len(), 3);
        let at_origin: Vec<&Record> = rows
            .iter()
            .filter(|row| row.get("longitude") == Some(&Value::Float(20.0)))
            .collect();
        assert_eq!(at_origin.len(), 2);
        assert_eq!(at_origin[0].get("t"), Some(&Value::Float(1.0)));
        assert!(!at_origin[0].contains("u"));
        assert_eq!(at_origin[1].get("u"), Some(&Value::Float(3.0)));
        assert!(!at_origin[1].contains("t"));
    }

    #[test]
    fn test_pivot_drops_columns_missing_from_schema() {
        let source = two_messages();
        let mut stream = StreamDefinition::new("test", source, StreamOptions::pivot()).unwrap();
        stream
            .assign_schema(Schema::pivot([("u", FieldType::Number)]))
            .unwrap();

        let rows: Vec<Record> = stream.records().unwrap().collect();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].contains("sfc_t"));
        assert_records_match_schema(&stream, &rows);
    }

    #[test]
    fn test_each_records_call_is_a_fresh_pass() {
        let source = two_messages();
        let stream = StreamDefinition::new("test", Arc::clone(&source), StreamOptions::long()).unwrap();

        assert_eq!(stream.records().unwrap().count(), 2);
        assert_eq!(stream.records().unwrap().count(), 2);
        assert_eq!(source.passes(), 2);
    }

    #[test]
    fn test_records_are_lazy() {
        let source = two_messages();
        let stream = StreamDefinition::new("test", Arc::clone(&source), StreamOptions::long()).unwrap();

        let mut records = stream.records().unwrap();
        assert_eq!(source.passes(), 1);
        assert!(records.next().is_some());
    }

    #[test]
    fn test_scalar_fallback_message() {
        let source = Arc::new(MemorySource::new(vec![StubMessage::new("t")
            .with("dataDate", 20230601i64)
            .with_grid(Err(GridError::Unsupported("station".to_string())))
            .with("latitude", 45.0)
            .with("longitude", 7.0)
            .with("value", 3.5)]));

        let stream = StreamDefinition::new("test", source, StreamOptions::long()).unwrap();
        let records: Vec<Record> = stream.records().unwrap().collect();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("lat"), Some(&Value::Float(45.0)));
        assert_eq!(records[0].get("value"), Some(&Value::Float(3.5)));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = StreamDefinition::new("test", two_messages(), StreamOptions::pivot().with_batch_size(0))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidConfig(_)));
    }

    #[test]
    fn test_scalar_grid_data() {
        let source = Arc::new(MemorySource::new(vec![StubMessage::new("t")
            .with("dataDate", 20230601i64)
            .with_grid(Ok(GridData::Scalar {
                lats: vec![1.0],
                lons: vec![2.0],
                value: Some(3.0),
            }))]));
        let stream = pivot_stream(source, StreamOptions::pivot());
        let rows: Vec<Record> = stream.records().unwrap().collect();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("t"), Some(&Value::Float(3.0)));
    }
}
