//! Spreadsheet adapter: workbook reading and composite workbook writing.
//!
//! Reading takes the first worksheet of a workbook; date-formatted cells
//! arrive at their underlying serial value and are coerced per the declared
//! column type. Writing renders formula/hyperlink columns as real formulas,
//! hides hidden columns, and supports appending successive datasets as
//! additional sheets of one workbook.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::Workbook;

use crate::error::{Error, Result};
use crate::format::{assemble_row, header_mapping, kept_columns, positional_mapping};
use crate::record::{TabularRecord, Value};
use crate::schema::Schema;

/// Sheet name used for the copied documentation page.
pub const README_SHEET: &str = "README";

/// Read the first worksheet of a workbook into a record bound to `schema`.
pub fn read_excel(path: &Path, schema: &Schema, first_row_names: bool) -> Result<TabularRecord> {
    let mut workbook = open_workbook_auto(path).map_err(|e| Error::format(path, e))?;
    let first_sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::format(path, "workbook has no sheets"))?;
    let range = workbook
        .worksheet_range(&first_sheet)
        .map_err(|e| Error::format(path, e))?;

    let mut record = schema.new_record();
    let mut mapping: Option<Vec<Option<usize>>> = None;

    for (index, row) in range.rows().enumerate() {
        if index == 0 && first_row_names {
            mapping = Some(header_mapping(schema, row.iter().map(header_text)));
            continue;
        }
        let mapping = mapping.get_or_insert_with(|| positional_mapping(schema, row.len()));
        let cells: Vec<Value> = row.iter().map(cell_value).collect();
        let assembled = assemble_row(schema, mapping, cells, path, index + 1)?;
        record.push_row_unchecked(assembled);
    }
    Ok(record)
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::Float(f) => Value::Float(*f),
        Data::Int(i) => Value::Int(*i),
        Data::Bool(b) => Value::Text(b.to_string()),
        // Date cells carry their underlying serial value.
        Data::DateTime(dt) => Value::Float(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Text(s.clone()),
    }
}

/// Accumulates datasets as sheets of one workbook, saved once at the end.
pub struct ExcelWriter {
    workbook: Workbook,
}

impl Default for ExcelWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ExcelWriter {
    pub fn new() -> Self {
        ExcelWriter {
            workbook: Workbook::new(),
        }
    }

    /// Append one record as a named sheet.
    pub fn add_sheet(
        &mut self,
        name: &str,
        record: &TabularRecord,
        skip_empty_columns: bool,
    ) -> Result<()> {
        let kept = kept_columns(record, skip_empty_columns);
        let schema = record.schema();
        let worksheet = self.workbook.add_worksheet();
        worksheet.set_name(name).map_err(|e| Error::format(name, e))?;

        for (out_col, &i) in kept.iter().enumerate() {
            let spec = schema.column_at(i).unwrap_or_else(|| {
                unreachable!("kept column outside the schema")
            });
            let col = out_col as u16;
            worksheet
                .write_string(0, col, spec.name.as_str())
                .map_err(|e| Error::format(name, e))?;
            if spec.hidden {
                worksheet
                    .set_column_hidden(col)
                    .map_err(|e| Error::format(name, e))?;
            }
        }

        for (row_index, row) in record.rows().iter().enumerate() {
            let out_row = (row_index + 1) as u32;
            for (out_col, &i) in kept.iter().enumerate() {
                let spec = schema.column_at(i).unwrap_or_else(|| {
                    unreachable!("kept column outside the schema")
                });
                let col = out_col as u16;
                match &row[i] {
                    Value::Null => {}
                    Value::Int(v) => {
                        worksheet
                            .write_number(out_row, col, *v as f64)
                            .map_err(|e| Error::format(name, e))?;
                    }
                    Value::Float(v) => {
                        worksheet
                            .write_number(out_row, col, *v)
                            .map_err(|e| Error::format(name, e))?;
                    }
                    Value::Text(t) => {
                        if spec.formula || spec.hyperlink {
                            worksheet
                                .write_formula(out_row, col, format!("={}", t).as_str())
                                .map_err(|e| Error::format(name, e))?;
                        } else {
                            worksheet
                                .write_string(out_row, col, t.as_str())
                                .map_err(|e| Error::format(name, e))?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Copy the documentation page (a sheet named `readme`, matched
    /// case-insensitively) from a template workbook, cell values only.
    ///
    /// Returns whether a page was copied; a missing template or sheet is
    /// not an error.
    pub fn copy_readme(&mut self, template: &Path) -> Result<bool> {
        if !template.is_file() {
            return Ok(false);
        }
        let mut source = open_workbook_auto(template).map_err(|e| Error::format(template, e))?;
        let sheet_name = match source
            .sheet_names()
            .iter()
            .find(|n| n.eq_ignore_ascii_case("readme"))
            .cloned()
        {
            Some(name) => name,
            None => return Ok(false),
        };
        let range = source
            .worksheet_range(&sheet_name)
            .map_err(|e| Error::format(template, e))?;

        let worksheet = self.workbook.add_worksheet();
        worksheet
            .set_name(README_SHEET)
            .map_err(|e| Error::format(template, e))?;
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        for (cell_row, cell_col, cell) in range.used_cells() {
            let row = (start_row as usize + cell_row) as u32;
            let col = (start_col as usize + cell_col) as u16;
            match cell {
                Data::Empty | Data::Error(_) => {}
                Data::String(s) => {
                    worksheet
                        .write_string(row, col, s.as_str())
                        .map_err(|e| Error::format(template, e))?;
                }
                Data::Float(f) => {
                    worksheet
                        .write_number(row, col, *f)
                        .map_err(|e| Error::format(template, e))?;
                }
                Data::Int(i) => {
                    worksheet
                        .write_number(row, col, *i as f64)
                        .map_err(|e| Error::format(template, e))?;
                }
                Data::Bool(b) => {
                    worksheet
                        .write_boolean(row, col, *b)
                        .map_err(|e| Error::format(template, e))?;
                }
                Data::DateTime(dt) => {
                    worksheet
                        .write_number(row, col, dt.as_f64())
                        .map_err(|e| Error::format(template, e))?;
                }
                Data::DateTimeIso(s) | Data::DurationIso(s) => {
                    worksheet
                        .write_string(row, col, s.as_str())
                        .map_err(|e| Error::format(template, e))?;
                }
            }
        }
        worksheet.autofit();
        Ok(true)
    }

    /// Write the accumulated workbook. An unwritable destination is fatal.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.workbook.save(path).map_err(|e| Error::format(path, e))
    }
}

/// Write a single record as a one-sheet workbook.
pub fn write_excel(
    record: &TabularRecord,
    path: &Path,
    sheet_name: &str,
    skip_empty_columns: bool,
) -> Result<()> {
    let mut writer = ExcelWriter::new();
    writer.add_sheet(sheet_name, record, skip_empty_columns)?;
    writer.save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use crate::schema::{Catalog, USER_INPUT, USER_INPUT_RAW};
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_round_trip() {
        let catalog = Catalog::builtin().unwrap();
        let schema = catalog.lookup(USER_INPUT_RAW).unwrap();
        let mut record = schema.new_record();
        record
            .append_row(vec![
                ("INPUTID", Value::Int(1)),
                ("CHR", Value::text("1")),
                ("BP1", Value::Int(1000)),
                ("BP2", Value::Int(2000)),
                ("GENENAME", Value::text("GENE1")),
                ("SNPID", Value::text("rs1")),
                ("PVALUE", Value::Float(0.01)),
            ])
            .unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("round_trip.xlsx");
        write_excel(&record, &path, "user_input", false).unwrap();

        let back = read_excel(&path, schema, true).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.rows()[0][0], Value::Int(1));
        assert_eq!(back.rows()[0][1], Value::Text("1".to_string()));
        assert_eq!(back.rows()[0][6], Value::Float(0.01));
    }

    #[test]
    fn test_formula_column_written_as_formula() {
        let catalog = Catalog::builtin().unwrap();
        let schema = catalog.lookup(USER_INPUT).unwrap();
        let mut record = schema.new_record();
        record
            .append_row(vec![
                ("INPUTID", Value::Int(1)),
                ("CHR", Value::text("1")),
                ("UCSC_LINK", Value::text("HYPERLINK(\"http://example.org\",\"ucsc\")")),
            ])
            .unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("formula.xlsx");
        // Writing must accept the formula column without error.
        write_excel(&record, &path, "user_input", false).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_copy_readme_missing_template() {
        let dir = TempDir::new().unwrap();
        let mut writer = ExcelWriter::new();
        let copied = writer
            .copy_readme(&dir.path().join("documentation.xlsx"))
            .unwrap();
        assert!(!copied);
    }

    #[test]
    fn test_copy_readme_from_template() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("documentation.xlsx");
        {
            let mut workbook = Workbook::new();
            let sheet = workbook.add_worksheet();
            sheet.set_name("readme").unwrap();
            sheet.write_string(0, 0, "About this workbook").unwrap();
            workbook.save(&template).unwrap();
        }

        let mut writer = ExcelWriter::new();
        assert!(writer.copy_readme(&template).unwrap());
        let out = dir.path().join("out.xlsx");
        writer.save(&out).unwrap();

        let mut back = open_workbook_auto(&out).unwrap();
        assert_eq!(back.sheet_names(), vec![README_SHEET.to_string()]);
        let range = back.worksheet_range(README_SHEET).unwrap();
        assert_eq!(
            range.get_value((0, 0)),
            Some(&Data::String("About this workbook".to_string()))
        );
    }
}
