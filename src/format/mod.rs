//! Format adapters: move rows between tabular records and external files.
//!
//! Four representations are supported: spreadsheet workbooks, comma- and
//! tab-delimited text (gzip-transparent on input), and the native serialized
//! row format. Reading targets a schema; writing preserves the record's
//! declared column order in every format.

pub mod delimited;
pub mod excel;
pub mod native;

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use ahash::AHashMap;
use flate2::read::GzDecoder;

use crate::error::{Error, Result};
use crate::record::{TabularRecord, Value};
use crate::schema::Schema;

pub use excel::ExcelWriter;

/// External file representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Excel,
    Csv,
    Tsv,
    Native,
}

/// Fixed extension-group order for directory ingestion.
pub const DIRECTORY_INGEST_ORDER: [Format; 4] =
    [Format::Native, Format::Csv, Format::Tsv, Format::Excel];

impl Format {
    /// Infer the format from a file extension; `.gz` is looked through.
    pub fn from_extension(path: &Path) -> Option<Format> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        if name.ends_with(".xlsx") {
            Some(Format::Excel)
        } else if name.ends_with(".csv") {
            Some(Format::Csv)
        } else if name.ends_with(".tsv") {
            Some(Format::Tsv)
        } else if name.ends_with(".json") {
            Some(Format::Native)
        } else {
            None
        }
    }

    /// Canonical output file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Excel => "xlsx",
            Format::Csv => "csv",
            Format::Tsv => "tsv",
            Format::Native => "json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Excel => "excel",
            Format::Csv => "csv",
            Format::Tsv => "tsv",
            Format::Native => "native",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "excel" | "xlsx" => Ok(Format::Excel),
            "csv" => Ok(Format::Csv),
            "tsv" => Ok(Format::Tsv),
            "native" | "json" | "datacache" => Ok(Format::Native),
            other => Err(Error::format(other, "unknown format")),
        }
    }
}

/// Read one file into a fresh record bound to `schema`.
pub fn read_file(
    path: &Path,
    format: Format,
    schema: &Schema,
    first_row_names: bool,
) -> Result<TabularRecord> {
    match format {
        Format::Csv => delimited::read_delimited(path, b',', schema, first_row_names),
        Format::Tsv => delimited::read_delimited(path, b'\t', schema, first_row_names),
        Format::Excel => excel::read_excel(path, schema, first_row_names),
        Format::Native => native::read_native(path, schema),
    }
}

/// Write one record to a single-dataset file.
pub fn write_file(
    record: &TabularRecord,
    path: &Path,
    format: Format,
    skip_empty_columns: bool,
) -> Result<()> {
    match format {
        Format::Csv => delimited::write_delimited(record, path, b',', skip_empty_columns),
        Format::Tsv => delimited::write_delimited(record, path, b'\t', skip_empty_columns),
        Format::Excel => {
            let sheet = record
                .schema()
                .name()
                .unwrap_or("data")
                .to_lowercase();
            excel::write_excel(record, path, &sheet, skip_empty_columns)
        }
        Format::Native => native::write_native(record, path, skip_empty_columns),
    }
}

/// Buffered reader that looks through gzip compression by extension.
pub(crate) fn open_input(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    if path.to_string_lossy().ends_with(".gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Map file columns onto schema positions by header name.
///
/// Matching is case-insensitive; file columns without a schema counterpart
/// map to `None` and are ignored on read.
pub(crate) fn header_mapping<I, S>(schema: &Schema, header: I) -> Vec<Option<usize>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let positions: AHashMap<String, usize> = schema
        .column_order()
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_string(), i))
        .collect();
    header
        .into_iter()
        .map(|name| positions.get(&name.as_ref().trim().to_uppercase()).copied())
        .collect()
}

/// Map file columns onto schema positions by declaration order.
pub(crate) fn positional_mapping(schema: &Schema, file_columns: usize) -> Vec<Option<usize>> {
    (0..file_columns)
        .map(|i| if i < schema.len() { Some(i) } else { None })
        .collect()
}

/// Coerce mapped cells into a schema-shaped row.
pub(crate) fn assemble_row(
    schema: &Schema,
    mapping: &[Option<usize>],
    cells: Vec<Value>,
    location: &Path,
    row_number: usize,
) -> Result<Vec<Value>> {
    let mut row = vec![Value::Null; schema.len()];
    for (cell, target) in cells.into_iter().zip(mapping.iter()) {
        if let Some(index) = *target {
            let spec = schema.column_at(index).unwrap_or_else(|| {
                unreachable!("column mapping outside the schema")
            });
            row[index] = cell.coerce(spec.data_type).map_err(|detail| {
                Error::format(
                    location,
                    format!("row {}, column {}: {}", row_number, spec.name, detail),
                )
            })?;
        }
    }
    Ok(row)
}

/// Indices of columns kept on output, honoring skip-empty-columns.
pub(crate) fn kept_columns(record: &TabularRecord, skip_empty_columns: bool) -> Vec<usize> {
    (0..record.schema().len())
        .filter(|&i| !skip_empty_columns || !record.column_is_empty(i))
        .collect()
}
