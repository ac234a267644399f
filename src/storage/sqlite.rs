//! SQLite sink: one database per solver, one transaction per batch.

use super::{poisoned, RowSink};
use crate::error::Result;
use crate::namespace::Value;
use crate::tables::TableDescriptor;
use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Int(i) => ToSqlOutput::from(*i),
            Value::Real(r) => ToSqlOutput::from(*r),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Number of rows stored in `table`.
    pub fn count(&self, table: &str) -> Result<i64> {
        let conn = self.conn.lock().map_err(|_| poisoned())?;
        let n = conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |r| r.get(0))?;
        Ok(n)
    }
}

fn create_sql(table: &TableDescriptor) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("\"{}\" {}", c.name, c.ty.sql_type()))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
        table.name,
        columns.join(", ")
    )
}

fn insert_sql(table: &TableDescriptor) -> String {
    let placeholders: Vec<String> = (1..=table.columns.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO \"{}\" VALUES ({})",
        table.name,
        placeholders.join(", ")
    )
}

impl RowSink for SqliteSink {
    fn write_rows(&self, table: &TableDescriptor, rows: &[Vec<Value>]) -> Result<()> {
        let mut conn = self.conn.lock().map_err(|_| poisoned())?;
        let tx = conn.transaction()?;
        tx.execute_batch(&create_sql(table))?;
        {
            let mut stmt = tx.prepare(&insert_sql(table))?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        debug!(table = %table.name, rows = rows.len(), "rows stored");
        Ok(())
    }
}
