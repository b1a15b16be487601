//! Embedded persistent data store.
//!
//! One SQLite connection per run, opened before any table work and shut
//! down at the end. Commits are explicit: the pipeline checkpoints after
//! each stage, so a crash leaves the store at the last completed stage
//! rather than inside a half-built one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Error, Result};
use crate::query::{group_digits, quote_ident, Query};
use crate::record::{TabularRecord, Value};
use crate::schema::{ColumnSpec, ColumnType, Schema};

/// Database file created inside the store location directory.
const STORE_FILE: &str = "RegionAnnotator.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

/// Definition of a table's rows: either materialized record rows or a
/// declarative query over existing datasets.
pub enum TableSource<'a> {
    Rows(&'a TabularRecord),
    Query(&'a Query),
}

pub struct DataStore {
    location: PathBuf,
    cache_size_kb: i64,
    timeout_ms: u64,
    state: ConnectionState,
    conn: Option<Connection>,
}

impl DataStore {
    /// Prepare a store rooted at `location` (a directory). No connection is
    /// made until [`connect`](Self::connect).
    pub fn new(location: &Path, cache_size_kb: i64, timeout_ms: u64) -> Self {
        DataStore {
            location: location.to_path_buf(),
            cache_size_kb,
            timeout_ms,
            state: ConnectionState::Closed,
            conn: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Open the embedded connection and begin the first transaction.
    pub fn connect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Open {
            return Ok(());
        }
        self.state = ConnectionState::Connecting;
        std::fs::create_dir_all(&self.location)?;
        let path = self.location.join(STORE_FILE);
        let conn = Connection::open(&path)
            .map_err(|e| Error::Connection(format!("{}: {}", path.display(), e)))?;
        conn.busy_timeout(Duration::from_millis(self.timeout_ms))
            .map_err(|e| Error::Connection(e.to_string()))?;
        // Negative cache_size is interpreted by the engine as KiB.
        conn.pragma_update(None, "cache_size", -self.cache_size_kb)
            .map_err(|e| Error::Connection(e.to_string()))?;
        conn.create_scalar_function(
            "GROUP_DIGITS",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let n: Option<i64> = ctx.get(0)?;
                Ok(n.map(group_digits))
            },
        )
        .map_err(|e| Error::Connection(e.to_string()))?;
        conn.execute_batch("BEGIN")
            .map_err(|e| Error::Connection(e.to_string()))?;
        debug!(path = %path.display(), "store connected");
        self.conn = Some(conn);
        self.state = ConnectionState::Open;
        Ok(())
    }

    /// Final commit and connection release.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.execute_batch("COMMIT").map_err(map_sql_err)?;
            conn.close()
                .map_err(|(_, e)| Error::Connection(e.to_string()))?;
        }
        self.state = ConnectionState::Closed;
        Ok(())
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(Error::NotConnected)
    }

    /// Make everything since the last commit durable and start a new
    /// transaction.
    pub fn commit(&self) -> Result<()> {
        self.conn()?
            .execute_batch("COMMIT; BEGIN")
            .map_err(map_sql_err)
    }

    /// Materialize a table from the given row source.
    ///
    /// With `overwrite` the existing dataset (table or stale view) under the
    /// same name is dropped first; without it an existing table is a
    /// [`Error::DuplicateDataset`].
    pub fn create_table(&self, name: &str, source: TableSource, overwrite: bool) -> Result<()> {
        let conn = self.conn()?;
        match self.dataset_kind(name)? {
            Some(_) if !overwrite => return Err(Error::DuplicateDataset(name.to_string())),
            Some(kind) => {
                conn.execute_batch(&format!("DROP {} {}", kind, quote_ident(name)))
                    .map_err(map_sql_err)?;
            }
            None => {}
        }

        match source {
            TableSource::Rows(record) => {
                let schema = record.schema();
                let columns: Vec<String> = schema
                    .columns()
                    .map(|c| format!("{} {}", quote_ident(&c.name), c.data_type.sql_name()))
                    .collect();
                let temporary = if schema.temporary { "TEMPORARY " } else { "" };
                let ddl = format!(
                    "CREATE {}TABLE {} ({})",
                    temporary,
                    quote_ident(name),
                    columns.join(", ")
                );
                conn.execute_batch(&ddl).map_err(map_sql_err)?;
                self.insert_rows(name, record)?;
            }
            TableSource::Query(query) => {
                let ddl = format!("CREATE TABLE {} AS {}", quote_ident(name), query.to_sql());
                conn.execute_batch(&ddl).map_err(map_sql_err)?;
            }
        }
        Ok(())
    }

    /// Append a record's rows to an existing table.
    pub fn insert_rows(&self, name: &str, record: &TabularRecord) -> Result<()> {
        let conn = self.conn()?;
        let ncols = record.schema().len();
        let placeholders: Vec<String> = (1..=ncols).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} VALUES ({})",
            quote_ident(name),
            placeholders.join(", ")
        );
        let mut stmt = conn.prepare(&sql).map_err(map_sql_err)?;
        for row in record.rows() {
            stmt.execute(rusqlite::params_from_iter(row.iter().map(to_sql_value)))
                .map_err(map_sql_err)?;
        }
        Ok(())
    }

    /// Register a named, non-materialized computation; replaced if present.
    pub fn create_view(&self, name: &str, query: &Query) -> Result<()> {
        let conn = self.conn()?;
        if let Some(kind) = self.dataset_kind(name)? {
            conn.execute_batch(&format!("DROP {} {}", kind, quote_ident(name)))
                .map_err(map_sql_err)?;
        }
        let ddl = format!("CREATE VIEW {} AS {}", quote_ident(name), query.to_sql());
        conn.execute_batch(&ddl).map_err(map_sql_err)
    }

    /// Build a lookup structure over one column. Advisory: the caller
    /// decides whether a failure is fatal.
    pub fn create_index(&self, dataset: &str, column: &str) -> Result<()> {
        let conn = self.conn()?;
        let index_name = format!("IX_{}_{}", sanitize(dataset), sanitize(column));
        let ddl = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(&index_name),
            quote_ident(dataset),
            quote_ident(column)
        );
        conn.execute_batch(&ddl).map_err(map_sql_err)
    }

    /// Whether a persisted table with this name exists.
    pub fn has_dataset(&self, name: &str) -> Result<bool> {
        Ok(matches!(self.dataset_kind(name)?.as_deref(), Some("TABLE")))
    }

    fn dataset_kind(&self, name: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let kind: Option<String> = conn
            .query_row(
                "SELECT type FROM sqlite_master WHERE name = ?1 AND type IN ('table', 'view')",
                [name],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sql_err)?;
        Ok(kind.map(|k| k.to_uppercase()))
    }

    /// Names of all persisted tables (views excluded), deterministically
    /// ordered.
    pub fn list_datasets(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .map_err(map_sql_err)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(map_sql_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(map_sql_err)?;
        Ok(names)
    }

    /// Read a stored dataset (table or view) back into a record.
    ///
    /// The stored column order is preserved. Per-column display flags and
    /// declared types come from the `style` template where a column name
    /// matches; remaining columns are typed from their stored values.
    pub fn fetch(&self, name: &str, style: Option<&Schema>) -> Result<TabularRecord> {
        let conn = self.conn()?;
        let sql = format!("SELECT * FROM {}", quote_ident(name));
        let mut stmt = conn.prepare(&sql).map_err(map_sql_err)?;
        let ncols = stmt.column_count();
        let names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|n| n.to_uppercase())
            .collect();

        let mut data: Vec<Vec<Value>> = Vec::new();
        let mut rows = stmt.query([]).map_err(map_sql_err)?;
        while let Some(row) = rows.next().map_err(map_sql_err)? {
            let mut out = Vec::with_capacity(ncols);
            for i in 0..ncols {
                let value = match row.get_ref(i).map_err(map_sql_err)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(v) => Value::Int(v),
                    ValueRef::Real(v) => Value::Float(v),
                    ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(_) => Value::Null,
                };
                out.push(value);
            }
            data.push(out);
        }

        let specs: Vec<ColumnSpec> = names
            .iter()
            .enumerate()
            .map(|(i, column)| {
                if let Some(spec) = style.and_then(|s| s.column(column)) {
                    spec.clone()
                } else {
                    ColumnSpec::new(column, infer_type(&data, i))
                }
            })
            .collect();
        let schema = Schema::with_columns(Some(name), specs)?;
        Ok(TabularRecord::from_parts(schema, data))
    }
}

/// Type of a fetched column, from its first non-null value.
fn infer_type(rows: &[Vec<Value>], index: usize) -> ColumnType {
    for row in rows {
        match row[index] {
            Value::Int(_) => return ColumnType::Integer,
            Value::Float(_) => return ColumnType::Double,
            Value::Text(_) => return ColumnType::Varchar,
            Value::Null => continue,
        }
    }
    ColumnType::Varchar
}

fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Int(i) => rusqlite::types::Value::Integer(*i),
        Value::Float(f) => rusqlite::types::Value::Real(*f),
        Value::Text(t) => rusqlite::types::Value::Text(t.clone()),
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn map_sql_err(e: rusqlite::Error) -> Error {
    let message = e.to_string();
    if message.contains("no such table") || message.contains("no such view") {
        Error::DatasetNotFound(message)
    } else {
        Error::Query(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Catalog, USER_INPUT_RAW};
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> DataStore {
        let mut store = DataStore::new(dir.path(), 2000, 1000);
        store.connect().unwrap();
        store
    }

    fn sample_record() -> TabularRecord {
        let catalog = Catalog::builtin().unwrap();
        let mut record = catalog.new_record(USER_INPUT_RAW).unwrap();
        record
            .append_row(vec![
                ("INPUTID", Value::Int(1)),
                ("CHR", Value::text("1")),
                ("BP1", Value::Int(1000)),
                ("BP2", Value::Int(2000)),
                ("SNPID", Value::text("rs1")),
                ("PVALUE", Value::Float(0.01)),
            ])
            .unwrap();
        record
    }

    #[test]
    fn test_requires_connection() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path(), 2000, 1000);
        assert!(matches!(store.commit(), Err(Error::NotConnected)));
        assert!(matches!(store.list_datasets(), Err(Error::NotConnected)));
    }

    #[test]
    fn test_create_list_fetch() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let record = sample_record();
        store
            .create_table(USER_INPUT_RAW, TableSource::Rows(&record), false)
            .unwrap();
        store.commit().unwrap();

        assert_eq!(store.list_datasets().unwrap(), vec![USER_INPUT_RAW.to_string()]);

        let fetched = store.fetch(USER_INPUT_RAW, Some(record.schema())).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched.column_order(), record.column_order());
        assert_eq!(fetched.rows()[0][0], Value::Int(1));
        assert_eq!(fetched.rows()[0][1], Value::Text("1".to_string()));
        assert_eq!(fetched.rows()[0][4], Value::Null);
    }

    #[test]
    fn test_duplicate_dataset_without_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let record = sample_record();
        store
            .create_table("T", TableSource::Rows(&record), false)
            .unwrap();
        let err = store
            .create_table("T", TableSource::Rows(&record), false)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateDataset(_)));
    }

    #[test]
    fn test_overwrite_replaces() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let record = sample_record();
        store
            .create_table("T", TableSource::Rows(&record), false)
            .unwrap();
        let mut two_rows = record.clone();
        two_rows
            .append_row(vec![("INPUTID", Value::Int(2))])
            .unwrap();
        store
            .create_table("T", TableSource::Rows(&two_rows), true)
            .unwrap();
        assert_eq!(store.fetch("T", None).unwrap().len(), 2);
    }

    #[test]
    fn test_view_recomputes_on_read() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let record = sample_record();
        store
            .create_table("BASE", TableSource::Rows(&record), false)
            .unwrap();
        let query = Query::new().from("BASE", "b");
        store.create_view("V", &query).unwrap();
        store.commit().unwrap();

        assert_eq!(store.fetch("V", None).unwrap().len(), 1);
        store.insert_rows("BASE", &record).unwrap();
        assert_eq!(store.fetch("V", None).unwrap().len(), 2);
        // Views are not listed as datasets.
        assert_eq!(store.list_datasets().unwrap(), vec!["BASE".to_string()]);
    }

    #[test]
    fn test_create_table_from_query() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let record = sample_record();
        store
            .create_table("BASE", TableSource::Rows(&record), false)
            .unwrap();
        let query = Query::new()
            .select("b.INPUTID")
            .select("b.CHR")
            .from("BASE", "b")
            .filter("b.BP1 >= 1000");
        store
            .create_table("DERIVED", TableSource::Query(&query), false)
            .unwrap();
        let fetched = store.fetch("DERIVED", None).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched.column_order(), vec!["INPUTID", "CHR"]);
    }

    #[test]
    fn test_index_on_missing_dataset_surfaces() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.create_index("NOT_THERE", "CHR").is_err());
    }

    #[test]
    fn test_fetch_missing_dataset() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(matches!(
            store.fetch("NOT_THERE", None),
            Err(Error::DatasetNotFound(_))
        ));
    }

    #[test]
    fn test_shutdown_closes() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        assert_eq!(store.state(), ConnectionState::Open);
        store.shutdown().unwrap();
        assert_eq!(store.state(), ConnectionState::Closed);
        assert!(matches!(store.commit(), Err(Error::NotConnected)));
    }

    #[test]
    fn test_group_digits_function_registered() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let grouped: String = store
            .conn()
            .unwrap()
            .query_row("SELECT GROUP_DIGITS(1234567)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(grouped, "1,234,567");
    }
}
