//! JSON output: the discovery catalog and SCHEMA/RECORD lines.

use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use extraction::{MessageSource, Record, StreamDefinition};

/// One line of extraction output.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
enum OutputLine<'a> {
    Schema {
        stream: &'a str,
        schema: JsonValue,
        key_properties: &'a [String],
    },
    Record {
        stream: &'a str,
        record: &'a Record,
    },
}

/// Catalog document listing every stream with its schema and keys.
pub fn catalog<S: MessageSource>(streams: &[StreamDefinition<S>]) -> JsonValue {
    let entries: Vec<JsonValue> = streams
        .iter()
        .map(|stream| {
            json!({
                "tap_stream_id": stream.name(),
                "stream": stream.name(),
                "schema": stream.schema().map(|s| s.to_json_schema()),
                "key_properties": stream.primary_keys(),
            })
        })
        .collect();
    json!({ "streams": entries })
}

pub fn write_catalog<W: Write, S: MessageSource>(out: &mut W, streams: &[StreamDefinition<S>]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, &catalog(streams)).context("Failed to write catalog")?;
    writeln!(out)?;
    Ok(())
}

/// Write one SCHEMA line followed by one RECORD line per record. Returns
/// the number of records written.
pub fn write_stream<W: Write, S: MessageSource>(out: &mut W, stream: &StreamDefinition<S>) -> Result<usize> {
    let schema = stream
        .schema()
        .with_context(|| format!("Stream '{}' has no schema", stream.name()))?;

    write_line(
        out,
        &OutputLine::Schema {
            stream: stream.name(),
            schema: schema.to_json_schema(),
            key_properties: stream.primary_keys(),
        },
    )?;

    let mut count = 0;
    for record in stream.records()? {
        write_line(
            out,
            &OutputLine::Record {
                stream: stream.name(),
                record: &record,
            },
        )?;
        count += 1;
    }
    Ok(count)
}

fn write_line<W: Write>(out: &mut W, message: &OutputLine<'_>) -> Result<()> {
    serde_json::to_writer(&mut *out, message)?;
    out.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use extraction::{discover, TapConfig};
    use test_utils::{two_parameter_messages, write_grib_file};

    fn lines(buffer: &[u8]) -> Vec<JsonValue> {
        String::from_utf8_lossy(buffer)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn config(dir: &std::path::Path, options: &str) -> TapConfig {
        write_grib_file(dir, "sample.grib2", &two_parameter_messages());
        TapConfig::from_yaml_str(&format!(
            "paths:\n  - path: {}/sample.grib2\n{}",
            dir.display(),
            options
        ))
        .unwrap()
    }

    #[test]
    fn test_catalog_lists_streams() {
        let dir = tempfile::tempdir().unwrap();
        let streams = discover(&config(dir.path(), "")).unwrap();

        let catalog = catalog(&streams);
        let entry = &catalog["streams"][0];
        assert_eq!(entry["tap_stream_id"], "sample");
        assert_eq!(entry["key_properties"], json!(["datetime", "lat", "lon", "name"]));
        assert_eq!(entry["schema"]["properties"]["lat"]["type"], "number");
        assert_eq!(
            entry["schema"]["properties"]["datetime"]["format"],
            "date-time"
        );
    }

    #[test]
    fn test_write_stream_long() {
        let dir = tempfile::tempdir().unwrap();
        let streams = discover(&config(dir.path(), "")).unwrap();

        let mut buffer = Vec::new();
        let count = write_stream(&mut buffer, &streams[0]).unwrap();
        assert_eq!(count, 2);

        let lines = lines(&buffer);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["type"], "SCHEMA");
        assert_eq!(lines[0]["stream"], "sample");
        assert_eq!(lines[1]["type"], "RECORD");
        assert_eq!(lines[1]["record"]["datetime"], "2023-06-01T00:00:00Z");
        assert_eq!(lines[1]["record"]["value"], 5.0);
        assert_eq!(lines[1]["record"]["ensemble"], JsonValue::Null);
        assert_eq!(lines[2]["record"]["level"], 2.0);
    }

    #[test]
    fn test_write_stream_pivot() {
        let dir = tempfile::tempdir().unwrap();
        let streams = discover(&config(dir.path(), "    mode: pivot\n")).unwrap();

        let mut buffer = Vec::new();
        write_stream(&mut buffer, &streams[0]).unwrap();

        let lines = lines(&buffer);
        assert_eq!(lines[0]["key_properties"], json!(["latitude", "longitude", "ts"]));
        assert_eq!(lines[1]["record"]["surface_t"], 5.0);
        assert_eq!(lines[1]["record"]["ts"], "2023-06-01T00:00:00Z");
        assert_eq!(lines[2]["record"]["heightAboveGround_2_t"], 7.5);
    }
}
