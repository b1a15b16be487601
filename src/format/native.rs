//! Native serialized row format.
//!
//! One JSON document per dataset: column metadata (type and display flags)
//! travels with the schema, rows are name-to-value mappings. Datasets
//! written in this format read back exactly.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::format::{kept_columns, open_input};
use crate::record::{TabularRecord, Value};
use crate::schema::{ColumnType, Schema};

#[derive(Debug, Serialize, Deserialize)]
struct NativeColumn {
    name: String,
    #[serde(rename = "type")]
    data_type: ColumnType,
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    formula: bool,
    #[serde(default)]
    hyperlink: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct NativeDataset {
    #[serde(default)]
    name: Option<String>,
    columns: Vec<NativeColumn>,
    rows: Vec<JsonMap<String, JsonValue>>,
}

/// Read a native-serialized dataset into a record bound to `schema`.
///
/// Row keys are matched case-insensitively against the schema; keys without
/// a schema counterpart are ignored. The embedded column metadata is not
/// needed on read — the target schema is authoritative.
pub fn read_native(path: &Path, schema: &Schema) -> Result<TabularRecord> {
    let reader = open_input(path)?;
    let doc: NativeDataset =
        serde_json::from_reader(reader).map_err(|e| Error::format(path, e))?;

    let mut record = schema.new_record();
    for (index, row) in doc.rows.iter().enumerate() {
        let values: Vec<(&str, Value)> = row
            .iter()
            .filter(|(name, _)| schema.position(name).is_some())
            .map(|(name, value)| (name.as_str(), json_to_value(value)))
            .collect();
        record
            .append_row(values)
            .map_err(|e| Error::format(path, format!("row {}: {}", index + 1, e)))?;
    }
    Ok(record)
}

/// Write a record as one native-serialized dataset document.
pub fn write_native(record: &TabularRecord, path: &Path, skip_empty_columns: bool) -> Result<()> {
    let kept = kept_columns(record, skip_empty_columns);
    let schema = record.schema();

    let columns: Vec<NativeColumn> = kept
        .iter()
        .filter_map(|&i| schema.column_at(i))
        .map(|spec| NativeColumn {
            name: spec.name.clone(),
            data_type: spec.data_type,
            hidden: spec.hidden,
            formula: spec.formula,
            hyperlink: spec.hyperlink,
        })
        .collect();

    let rows: Vec<JsonMap<String, JsonValue>> = record
        .rows()
        .iter()
        .map(|row| {
            kept.iter()
                .filter_map(|&i| {
                    schema
                        .column_at(i)
                        .map(|spec| (spec.name.clone(), value_to_json(&row[i])))
                })
                .collect()
        })
        .collect();

    let doc = NativeDataset {
        name: schema.name().map(|n| n.to_string()),
        columns,
        rows,
    };
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &doc)
        .map_err(|e| Error::format(path, e))?;
    Ok(())
}

fn json_to_value(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Text(b.to_string()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Int(i) => JsonValue::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Text(t) => JsonValue::String(t.clone()),
    }
}
