//! In-memory table backend
//!
//! Backs dev runs and the test suites. Rows are dense vectors aligned to the
//! table's header order; the write-call counter lets tests observe the band
//! batching of the row store.

use super::TableBackend;
use crate::error::{EngineError, EngineResult};
use crate::model::{CellValue, RowValues};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

struct MemoryTable {
    headers: Vec<String>,
    rows: RwLock<Vec<Vec<CellValue>>>,
}

/// In-memory [`TableBackend`]
#[derive(Default)]
pub struct MemoryBackend {
    tables: DashMap<String, MemoryTable>,
    write_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a table with the given column vocabulary
    pub fn create_table(&self, name: &str, headers: &[&str]) {
        self.tables.insert(
            name.to_string(),
            MemoryTable {
                headers: headers.iter().map(|h| h.to_string()).collect(),
                rows: RwLock::new(Vec::new()),
            },
        );
    }

    /// Seed a row directly, bypassing locks; test setup only
    pub fn seed_row(&self, table: &str, values: &RowValues) {
        if let Some(t) = self.tables.get(table) {
            let dense = t
                .headers
                .iter()
                .map(|col| values.get(col).cloned().unwrap_or(CellValue::Empty))
                .collect();
            t.rows.write().push(dense);
        }
    }

    /// Number of band writes issued against this backend
    pub fn write_call_count(&self) -> usize {
        self.write_calls.load(Ordering::Relaxed)
    }

    fn with_table<T>(
        &self,
        table: &str,
        f: impl FnOnce(&MemoryTable) -> EngineResult<T>,
    ) -> EngineResult<T> {
        match self.tables.get(table) {
            Some(t) => f(&t),
            None => Err(EngineError::TableNotFound(table.to_string())),
        }
    }
}

#[async_trait]
impl TableBackend for MemoryBackend {
    async fn headers(&self, table: &str) -> EngineResult<Vec<String>> {
        self.with_table(table, |t| Ok(t.headers.clone()))
    }

    async fn ensure_table(&self, table: &str, headers: &[&str]) -> EngineResult<()> {
        if !self.tables.contains_key(table) {
            self.create_table(table, headers);
        }
        Ok(())
    }

    async fn row_count(&self, table: &str) -> EngineResult<usize> {
        self.with_table(table, |t| Ok(t.rows.read().len()))
    }

    async fn read_row(&self, table: &str, row: usize) -> EngineResult<RowValues> {
        self.with_table(table, |t| {
            let rows = t.rows.read();
            let dense = rows.get(row).ok_or(EngineError::RowNotFound {
                table: table.to_string(),
                row,
            })?;
            Ok(t.headers
                .iter()
                .cloned()
                .zip(dense.iter().cloned())
                .collect())
        })
    }

    async fn write_cells(
        &self,
        table: &str,
        row: usize,
        start_col: usize,
        values: &[CellValue],
    ) -> EngineResult<()> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        self.with_table(table, |t| {
            if start_col + values.len() > t.headers.len() {
                return Err(EngineError::Store(format!(
                    "band write past row end in {}",
                    table
                )));
            }
            let mut rows = t.rows.write();
            let dense = rows.get_mut(row).ok_or(EngineError::RowNotFound {
                table: table.to_string(),
                row,
            })?;
            for (offset, value) in values.iter().enumerate() {
                dense[start_col + offset] = value.clone();
            }
            Ok(())
        })
    }

    async fn append_row(&self, table: &str, values: &RowValues) -> EngineResult<usize> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        self.with_table(table, |t| {
            let dense = t
                .headers
                .iter()
                .map(|col| values.get(col).cloned().unwrap_or(CellValue::Empty))
                .collect();
            let mut rows = t.rows.write();
            rows.push(dense);
            Ok(rows.len() - 1)
        })
    }

    async fn delete_row(&self, table: &str, row: usize) -> EngineResult<()> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        self.with_table(table, |t| {
            let mut rows = t.rows.write();
            if row >= rows.len() {
                return Err(EngineError::RowNotFound {
                    table: table.to_string(),
                    row,
                });
            }
            rows.remove(row);
            Ok(())
        })
    }
}
