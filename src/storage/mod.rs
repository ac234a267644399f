//! Row sinks. Each call to [`RowSink::write_rows`] delivers one batch that
//! lands whole or not at all, and batches never interleave.

mod sqlite;

pub use sqlite::SqliteSink;

use crate::error::{Error, Result};
use crate::namespace::Value;
use crate::tables::TableDescriptor;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub trait RowSink: Send + Sync {
    /// Create `table` if needed and append `rows` as one batch.
    fn write_rows(&self, table: &TableDescriptor, rows: &[Vec<Value>]) -> Result<()>;
}

fn poisoned() -> Error {
    Error::Io(std::io::Error::other("sink lock poisoned"))
}

/// Keeps every batch in memory; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: Mutex<BTreeMap<String, Vec<Vec<Value>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, table: &str) -> Vec<Vec<Value>> {
        self.tables
            .lock()
            .map(|t| t.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables
            .lock()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl RowSink for MemorySink {
    fn write_rows(&self, table: &TableDescriptor, rows: &[Vec<Value>]) -> Result<()> {
        if let Some(bad) = rows.iter().find(|r| r.len() != table.columns.len()) {
            return Err(Error::config(format!(
                "table '{}': row of {} values for {} columns",
                table.name,
                bad.len(),
                table.columns.len()
            )));
        }
        let mut tables = self.tables.lock().map_err(|_| poisoned())?;
        tables
            .entry(table.name.clone())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(())
    }
}
