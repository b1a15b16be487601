//! Comma- and tab-delimited text adapter.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::{Error, Result};
use crate::format::{assemble_row, header_mapping, kept_columns, open_input, positional_mapping};
use crate::record::{TabularRecord, Value};
use crate::schema::Schema;

/// Read a delimited file into a fresh record bound to `schema`.
///
/// With `first_row_names` the first row supplies column names, matched
/// case-insensitively; otherwise file columns map positionally onto the
/// schema's declared order.
pub fn read_delimited(
    path: &Path,
    delimiter: u8,
    schema: &Schema,
    first_row_names: bool,
) -> Result<TabularRecord> {
    let reader = open_input(path)?;
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut record = schema.new_record();
    let mut mapping: Option<Vec<Option<usize>>> = None;

    for (index, row) in csv_reader.records().enumerate() {
        let row = row.map_err(|e| Error::format(path, format!("row {}: {}", index + 1, e)))?;
        if index == 0 && first_row_names {
            mapping = Some(header_mapping(schema, row.iter()));
            continue;
        }
        let mapping = mapping.get_or_insert_with(|| positional_mapping(schema, row.len()));
        let cells: Vec<Value> = row.iter().map(Value::text).collect();
        let assembled = assemble_row(schema, mapping, cells, path, index + 1)?;
        record.push_row_unchecked(assembled);
    }
    Ok(record)
}

/// Write a record as delimited text: one header row, then data rows in
/// declared column order. Formula and hyperlink columns are written as
/// plain values.
pub fn write_delimited(
    record: &TabularRecord,
    path: &Path,
    delimiter: u8,
    skip_empty_columns: bool,
) -> Result<()> {
    let kept = kept_columns(record, skip_empty_columns);
    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(BufWriter::new(file));

    let schema = record.schema();
    writer
        .write_record(kept.iter().map(|&i| {
            schema
                .column_at(i)
                .map(|c| c.name.as_str())
                .unwrap_or_default()
        }))
        .map_err(|e| Error::format(path, e))?;

    for row in record.rows() {
        writer
            .write_record(kept.iter().map(|&i| row[i].to_string()))
            .map_err(|e| Error::format(path, e))?;
    }
    writer.flush()?;
    Ok(())
}
