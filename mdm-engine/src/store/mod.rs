//! Tabular row store
//!
//! Abstracts the external tabular backing store behind [`TableBackend`] and
//! layers short-lived read caches, merge/overwrite upserts and batched cell
//! writes on top. Every mutation is gated by a row-granular lease lock unless
//! the caller asserts it already holds a compatible one.

mod memory;

pub use memory::MemoryBackend;

use crate::constants;
use crate::error::{EngineError, EngineResult};
use crate::locks::LockManager;
use crate::model::{CellValue, RowValues};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Raw access to named tables of rows with named columns
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Column vocabulary of a table, in column order
    async fn headers(&self, table: &str) -> EngineResult<Vec<String>>;

    /// Create the table with the given vocabulary if it does not exist yet
    async fn ensure_table(&self, table: &str, headers: &[&str]) -> EngineResult<()>;

    /// Number of data rows
    async fn row_count(&self, table: &str) -> EngineResult<usize>;

    /// Read one row as a column map
    async fn read_row(&self, table: &str, row: usize) -> EngineResult<RowValues>;

    /// Write a contiguous band of cells starting at `start_col`
    async fn write_cells(
        &self,
        table: &str,
        row: usize,
        start_col: usize,
        values: &[CellValue],
    ) -> EngineResult<()>;

    /// Append a row; returns its index
    async fn append_row(&self, table: &str, values: &RowValues) -> EngineResult<usize>;

    /// Remove a row, shifting later rows up
    async fn delete_row(&self, table: &str, row: usize) -> EngineResult<()>;
}

/// Whether a mutating call should take the row lock itself or trust the
/// caller's already-held lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    /// Take the per-row lock internally
    Internal,
    /// The caller asserts it holds a compatible lock
    CallerHeld,
}

struct CachedHeaders {
    headers: Arc<Vec<String>>,
}

struct CachedRow {
    values: RowValues,
    read_at: Instant,
}

/// Row store with read caches over a [`TableBackend`]
#[derive(Clone)]
pub struct RowStore {
    inner: Arc<RowStoreInner>,
}

struct RowStoreInner {
    backend: Arc<dyn TableBackend>,
    locks: LockManager,
    header_cache: DashMap<String, CachedHeaders>,
    row_cache: DashMap<(String, usize), CachedRow>,
    row_cache_ttl: Duration,
}

impl RowStore {
    pub fn new(backend: Arc<dyn TableBackend>, locks: LockManager) -> Self {
        Self {
            inner: Arc::new(RowStoreInner {
                backend,
                locks,
                header_cache: DashMap::new(),
                row_cache: DashMap::new(),
                row_cache_ttl: Duration::from_secs(constants::ROW_CACHE_TTL_SECONDS),
            }),
        }
    }

    /// Column vocabulary, cached until a write invalidates it
    pub async fn read_headers(&self, table: &str) -> EngineResult<Arc<Vec<String>>> {
        if let Some(cached) = self.inner.header_cache.get(table) {
            return Ok(Arc::clone(&cached.headers));
        }
        let headers = Arc::new(self.inner.backend.headers(table).await?);
        self.inner.header_cache.insert(
            table.to_string(),
            CachedHeaders {
                headers: Arc::clone(&headers),
            },
        );
        Ok(headers)
    }

    /// Number of data rows (uncached)
    pub async fn row_count(&self, table: &str) -> EngineResult<usize> {
        self.inner.backend.row_count(table).await
    }

    /// Create a table with the given vocabulary if absent
    pub async fn ensure_table(&self, table: &str, headers: &[&str]) -> EngineResult<()> {
        self.inner.backend.ensure_table(table, headers).await
    }

    /// Read a row through the short-lived cache
    pub async fn read_row(&self, table: &str, row: usize) -> EngineResult<RowValues> {
        let key = (table.to_string(), row);
        if let Some(cached) = self.inner.row_cache.get(&key) {
            if cached.read_at.elapsed() < self.inner.row_cache_ttl {
                return Ok(cached.values.clone());
            }
        }
        let values = self.inner.backend.read_row(table, row).await?;
        self.inner.row_cache.insert(
            key,
            CachedRow {
                values: values.clone(),
                read_at: Instant::now(),
            },
        );
        Ok(values)
    }

    /// Read a row bypassing the cache. Locked sections re-read through this
    /// so their decisions never rest on a caller's stale snapshot.
    pub async fn read_row_fresh(&self, table: &str, row: usize) -> EngineResult<RowValues> {
        self.invalidate_row(table, row);
        self.read_row(table, row).await
    }

    /// Index of the row whose primary key column equals `key_value`, if any
    pub async fn find_row(&self, table: &str, key_value: &str) -> EngineResult<Option<usize>> {
        self.find_row_by(table, crate::model::REQUEST_NUMBER, key_value)
            .await
    }

    /// Index of the first row whose `column` equals `key_value`, if any
    pub async fn find_row_by(
        &self,
        table: &str,
        column: &str,
        key_value: &str,
    ) -> EngineResult<Option<usize>> {
        let headers = self.read_headers(table).await?;
        let key_col = column_index(&headers, table, column)?;
        let count = self.inner.backend.row_count(table).await?;
        for row in 0..count {
            let values = self.inner.backend.read_row(table, row).await?;
            let cell = values
                .get(&headers[key_col])
                .cloned()
                .unwrap_or(CellValue::Empty);
            if cell.as_text() == Some(key_value) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    /// Append a row under the table's append lock; returns its index
    pub async fn append_row(&self, table: &str, values: &RowValues) -> EngineResult<usize> {
        let store = self.clone();
        let table_owned = table.to_string();
        let values = values.clone();
        let append_key = format!("row:{}:append", table);
        self.inner
            .locks
            .with_key_lock(&append_key, "append", 1, move |_lease| async move {
                let row = store.inner.backend.append_row(&table_owned, &values).await?;
                store.invalidate_row(&table_owned, row);
                Ok(row)
            })
            .await
    }

    /// Insert or update the row keyed by the primary key column of `values`.
    ///
    /// With `overwrite` every cell is replaced; without it, existing cell
    /// values win wherever the incoming cell is empty. Appends when no row
    /// carries the key.
    pub async fn upsert_row(
        &self,
        table: &str,
        values: &RowValues,
        overwrite: bool,
    ) -> EngineResult<usize> {
        let key_value = values
            .get(crate::model::REQUEST_NUMBER)
            .and_then(|v| v.as_text())
            .map(str::to_string);

        let Some(key) = key_value else {
            return self.append_row(table, values).await;
        };

        // Operations on one request number serialize on its key lock, so a
        // concurrent upsert cannot append a duplicate row between the lookup
        // and the write.
        let request_lock = crate::locks::request_key(table, &key);
        let store = self.clone();
        let table_owned = table.to_string();
        let values = values.clone();
        self.inner
            .locks
            .with_key_lock(&request_lock, "upsert", 1, move |_lease| async move {
                match store.find_row(&table_owned, &key).await? {
                    Some(row) => {
                        let locks = store.locks().clone();
                        let writer = store.clone();
                        let table_inner = table_owned.clone();
                        locks
                            .with_row_lock(&table_owned, row, "upsert", move |_lease| async move {
                                let merged = if overwrite {
                                    values
                                } else {
                                    let mut current =
                                        writer.inner.backend.read_row(&table_inner, row).await?;
                                    for (col, value) in values {
                                        if !value.is_empty() {
                                            current.insert(col, value);
                                        }
                                    }
                                    current
                                };
                                writer.write_full_row(&table_inner, row, &merged).await?;
                                Ok(row)
                            })
                            .await
                    }
                    None => store.append_row(&table_owned, &values).await,
                }
            })
            .await
    }

    /// Write one cell
    pub async fn set_cell(
        &self,
        table: &str,
        row: usize,
        column: &str,
        value: CellValue,
        scope: LockScope,
    ) -> EngineResult<()> {
        self.set_cells(table, row, &[(column, value)], scope).await
    }

    /// Write several cells of one row. Column updates whose indices form a
    /// contiguous run are batched into a single band write.
    pub async fn set_cells(
        &self,
        table: &str,
        row: usize,
        updates: &[(&str, CellValue)],
        scope: LockScope,
    ) -> EngineResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        match scope {
            LockScope::CallerHeld => self.set_cells_unlocked(table, row, updates).await,
            LockScope::Internal => {
                let store = self.clone();
                let table_owned = table.to_string();
                let updates: Vec<(String, CellValue)> = updates
                    .iter()
                    .map(|(c, v)| (c.to_string(), v.clone()))
                    .collect();
                self.inner
                    .locks
                    .with_row_lock(table, row, "set-cells", move |_lease| async move {
                        let borrowed: Vec<(&str, CellValue)> = updates
                            .iter()
                            .map(|(c, v)| (c.as_str(), v.clone()))
                            .collect();
                        store.set_cells_unlocked(&table_owned, row, &borrowed).await
                    })
                    .await
            }
        }
    }

    async fn set_cells_unlocked(
        &self,
        table: &str,
        row: usize,
        updates: &[(&str, CellValue)],
    ) -> EngineResult<()> {
        let headers = self.read_headers(table).await?;
        let mut indexed: Vec<(usize, CellValue)> = Vec::with_capacity(updates.len());
        for (column, value) in updates {
            indexed.push((column_index(&headers, table, column)?, value.clone()));
        }
        indexed.sort_by_key(|(idx, _)| *idx);

        // Contiguous runs collapse into one band write each.
        let mut run_start = 0;
        while run_start < indexed.len() {
            let mut run_end = run_start + 1;
            while run_end < indexed.len()
                && indexed[run_end].0 == indexed[run_end - 1].0 + 1
            {
                run_end += 1;
            }
            let band: Vec<CellValue> = indexed[run_start..run_end]
                .iter()
                .map(|(_, v)| v.clone())
                .collect();
            self.inner
                .backend
                .write_cells(table, row, indexed[run_start].0, &band)
                .await?;
            run_start = run_end;
        }

        self.invalidate_row(table, row);
        Ok(())
    }

    /// Clear the half-open column band `[start_col, end_col)` of a row
    pub async fn clear_range(
        &self,
        table: &str,
        row: usize,
        start_col: &str,
        end_col_exclusive: Option<&str>,
        scope: LockScope,
    ) -> EngineResult<()> {
        let headers = self.read_headers(table).await?;
        let start = column_index(&headers, table, start_col)?;
        let end = match end_col_exclusive {
            Some(col) => column_index(&headers, table, col)?,
            None => headers.len(),
        };
        if end <= start {
            return Ok(());
        }
        let updates: Vec<(&str, CellValue)> = headers[start..end]
            .iter()
            .map(|col| (col.as_str(), CellValue::Empty))
            .collect();
        self.set_cells(table, row, &updates, scope).await
    }

    /// Remove a row; later rows shift up
    pub async fn delete_row(&self, table: &str, row: usize) -> EngineResult<()> {
        self.inner.backend.delete_row(table, row).await?;
        // Index shift invalidates everything cached for this table.
        self.invalidate_table(table);
        Ok(())
    }

    /// Drop the cache entry for one row
    pub fn invalidate_row(&self, table: &str, row: usize) {
        self.inner.row_cache.remove(&(table.to_string(), row));
    }

    /// Drop every cache entry for a table
    pub fn invalidate_table(&self, table: &str) {
        self.inner.row_cache.retain(|(t, _), _| t != table);
        self.inner.header_cache.remove(table);
    }

    /// The lock manager gating this store's mutations
    pub fn locks(&self) -> &LockManager {
        &self.inner.locks
    }

    async fn write_full_row(&self, table: &str, row: usize, values: &RowValues) -> EngineResult<()> {
        let headers = self.read_headers(table).await?;
        let band: Vec<CellValue> = headers
            .iter()
            .map(|col| values.get(col).cloned().unwrap_or(CellValue::Empty))
            .collect();
        self.inner.backend.write_cells(table, row, 0, &band).await?;
        self.invalidate_row(table, row);
        Ok(())
    }
}

fn column_index(headers: &[String], table: &str, column: &str) -> EngineResult<usize> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| EngineError::ColumnNotFound {
            table: table.to_string(),
            column: column.to_string(),
        })
}
