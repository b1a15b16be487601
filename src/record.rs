//! In-memory tabular records: a schema copy plus an ordered row sequence.
//!
//! Records are the unit of data crossing the store boundary. They are always
//! created from a schema copy and discarded once persisted or written out.

use std::fmt;

use crate::error::{Error, Result};
use crate::schema::{ColumnType, Schema};

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Coerce this value to the declared column type.
    ///
    /// Lossless widenings are accepted (integer into double, whole double
    /// into integer, numeric text into either); anything else is a mismatch.
    /// Empty text coerces to null for the numeric types, matching how blank
    /// spreadsheet and delimited cells arrive.
    pub fn coerce(self, target: ColumnType) -> std::result::Result<Value, String> {
        match (self, target) {
            (Value::Null, _) => Ok(Value::Null),

            (v @ Value::Int(_), ColumnType::Integer) => Ok(v),
            (Value::Float(f), ColumnType::Integer) => {
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    Ok(Value::Int(f as i64))
                } else {
                    Err(format!("cannot store {} in an integer column", f))
                }
            }
            (Value::Text(t), ColumnType::Integer) => {
                let t = t.trim();
                if t.is_empty() {
                    return Ok(Value::Null);
                }
                if let Ok(i) = t.parse::<i64>() {
                    return Ok(Value::Int(i));
                }
                match t.parse::<f64>() {
                    Ok(f) if f.fract() == 0.0 => Ok(Value::Int(f as i64)),
                    _ => Err(format!("cannot parse {:?} as integer", t)),
                }
            }

            (Value::Float(f), ColumnType::Double) => Ok(Value::Float(f)),
            (Value::Int(i), ColumnType::Double) => Ok(Value::Float(i as f64)),
            (Value::Text(t), ColumnType::Double) => {
                let t = t.trim();
                if t.is_empty() {
                    return Ok(Value::Null);
                }
                t.parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| format!("cannot parse {:?} as double", t))
            }

            (v @ Value::Text(_), ColumnType::Varchar) => Ok(v),
            // Numeric cells land in text columns as their shortest exact
            // rendering (a chromosome read as 1.0 becomes "1").
            (Value::Int(i), ColumnType::Varchar) => Ok(Value::Text(i.to_string())),
            (Value::Float(f), ColumnType::Varchar) => {
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    Ok(Value::Text((f as i64).to_string()))
                } else {
                    Ok(Value::Text(f.to_string()))
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => {
                if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                    write!(f, "{}", *v as i64)
                } else {
                    write!(f, "{}", v)
                }
            }
            Value::Text(t) => write!(f, "{}", t),
        }
    }
}

/// A schema copy plus an ordered sequence of typed rows.
#[derive(Debug, Clone)]
pub struct TabularRecord {
    schema: Schema,
    rows: Vec<Vec<Value>>,
}

impl TabularRecord {
    /// Instantiate an empty record bound to a deep copy of `schema`.
    pub fn new(schema: &Schema) -> Self {
        TabularRecord {
            schema: schema.clone(),
            rows: Vec::new(),
        }
    }

    /// Assemble a record from already-typed parts (store reads).
    pub(crate) fn from_parts(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        TabularRecord { schema, rows }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A fresh working copy: same schema, zero rows.
    pub fn copy(&self) -> Self {
        TabularRecord::new(&self.schema)
    }

    /// Column names in declaration order.
    pub fn column_order(&self) -> Vec<&str> {
        self.schema.column_order()
    }

    /// Append one row from named values.
    ///
    /// Every key must name a declared column (case-insensitively); every
    /// value must coerce to the declared type. Columns not named stay null.
    pub fn append_row<'a, I>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        let mut row = vec![Value::Null; self.schema.len()];
        for (name, value) in values {
            let index = self
                .schema
                .position(name)
                .ok_or_else(|| Error::type_mismatch(name, "not a declared column"))?;
            let spec = self.schema.column_at(index).unwrap_or_else(|| {
                unreachable!("position() returned an index outside the schema")
            });
            row[index] = value
                .coerce(spec.data_type)
                .map_err(|detail| Error::type_mismatch(&spec.name, detail))?;
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append one already-typed row without re-validation (store reads).
    pub(crate) fn push_row_unchecked(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    /// True when the column at `index` is null in every row.
    pub fn column_is_empty(&self, index: usize) -> bool {
        self.rows.iter().all(|row| row[index].is_null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Catalog, ColumnSpec, USER_INPUT_RAW};

    fn user_input_record() -> TabularRecord {
        Catalog::builtin().unwrap().new_record(USER_INPUT_RAW).unwrap()
    }

    #[test]
    fn test_append_row_named_values() {
        let mut record = user_input_record();
        record
            .append_row(vec![
                ("inputid", Value::Int(1)),
                ("CHR", Value::text("1")),
                ("bp1", Value::Int(1000)),
                ("BP2", Value::Int(2000)),
                ("snpid", Value::text("rs1")),
                ("pvalue", Value::Float(0.01)),
            ])
            .unwrap();

        assert_eq!(record.len(), 1);
        let row = &record.rows()[0];
        assert_eq!(row[0], Value::Int(1));
        assert_eq!(row[1], Value::Text("1".to_string()));
        // GENENAME was not supplied
        assert_eq!(row[4], Value::Null);
    }

    #[test]
    fn test_append_row_unknown_column() {
        let mut record = user_input_record();
        let err = record
            .append_row(vec![("NOT_A_COLUMN", Value::Int(1))])
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_append_row_type_mismatch() {
        let mut record = user_input_record();
        let err = record
            .append_row(vec![("BP1", Value::text("not a number"))])
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_coercions() {
        assert_eq!(
            Value::Float(3.0).coerce(ColumnType::Integer).unwrap(),
            Value::Int(3)
        );
        assert!(Value::Float(3.5).coerce(ColumnType::Integer).is_err());
        assert_eq!(
            Value::Int(3).coerce(ColumnType::Double).unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(
            Value::text("42").coerce(ColumnType::Integer).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            Value::text("0.5").coerce(ColumnType::Double).unwrap(),
            Value::Float(0.5)
        );
        assert_eq!(
            Value::Float(1.0).coerce(ColumnType::Varchar).unwrap(),
            Value::Text("1".to_string())
        );
        // Blank cells in numeric columns are nulls, not errors.
        assert_eq!(
            Value::text("  ").coerce(ColumnType::Integer).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_copy_clears_rows() {
        let mut record = user_input_record();
        record
            .append_row(vec![("INPUTID", Value::Int(1))])
            .unwrap();
        let copy = record.copy();
        assert_eq!(copy.len(), 0);
        assert_eq!(copy.column_order(), record.column_order());
        // The original keeps its rows.
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_column_is_empty() {
        let schema = Schema::with_columns(
            Some("T"),
            vec![
                ColumnSpec::new("A", ColumnType::Integer),
                ColumnSpec::new("B", ColumnType::Varchar),
            ],
        )
        .unwrap();
        let mut record = schema.new_record();
        record.append_row(vec![("A", Value::Int(1))]).unwrap();
        record.append_row(vec![("A", Value::Int(2))]).unwrap();
        assert!(!record.column_is_empty(0));
        assert!(record.column_is_empty(1));
    }
}
