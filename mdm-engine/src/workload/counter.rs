//! Request-number counter
//!
//! Per-prefix serialized counter reconciled across three sources on every
//! draw: the persistent property store, the tracker table and the in-memory
//! cache. The next value is the maximum of the three plus one, and all three
//! are advanced to it. A write failure falls back to a wall-clock-derived
//! number so submission is never blocked.

use crate::constants;
use crate::error::EngineResult;
use crate::locks::LockManager;
use crate::model::{CellValue, RowValues};
use crate::store::{LockScope, RowStore};
use crate::timebase::Clock;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tracker table holding the per-prefix current values
pub const TRACKER_TABLE: &str = "Request Tracker";

/// Tracker table columns
pub mod tracker_cols {
    pub const PREFIX: &str = "Prefix";
    pub const CURRENT: &str = "Current";
}

/// Durable key-value store for counter persistence
pub trait PropertyStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> EngineResult<()>;
}

/// In-memory [`PropertyStore`] with injectable write failures for tests
#[derive(Default)]
pub struct MemoryPropertyStore {
    map: DashMap<String, String>,
    fail_writes: AtomicBool,
}

impl MemoryPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }
}

impl PropertyStore for MemoryPropertyStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).map(|v| v.clone())
    }

    fn set(&self, key: &str, value: &str) -> EngineResult<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(crate::error::EngineError::Store(
                "property store write failed".to_string(),
            ));
        }
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Per-prefix request number source
#[derive(Clone)]
pub struct RequestNumberCounter {
    inner: Arc<CounterInner>,
}

struct CounterInner {
    store: RowStore,
    properties: Arc<dyn PropertyStore>,
    locks: LockManager,
    clock: Arc<dyn Clock>,
    cache: DashMap<String, i64>,
}

impl RequestNumberCounter {
    pub fn new(
        store: RowStore,
        properties: Arc<dyn PropertyStore>,
        locks: LockManager,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(CounterInner {
                store,
                properties,
                locks,
                clock,
                cache: DashMap::new(),
            }),
        }
    }

    /// Draw the next request number for `(abbreviation, business unit)`,
    /// formatted as `<abbr>/MDM/<business unit>/<5-digit counter>`.
    pub async fn next(&self, abbreviation: &str, business_unit: &str) -> String {
        let prefix = format!("{}/MDM/{}", abbreviation, business_unit);
        let value = self.next_value(&prefix).await;
        format!("{}/{:05}", prefix, value)
    }

    async fn next_value(&self, prefix: &str) -> i64 {
        let key = format!("reqnum:{}", prefix);
        let counter = self.clone();
        let prefix_owned = prefix.to_string();
        let result: EngineResult<i64> = self
            .inner
            .locks
            .with_key_lock(&key, "request-number", 0, move |_lease| async move {
                counter.draw_reconciled(&prefix_owned).await
            })
            .await;

        match result {
            Ok(value) => value,
            Err(err) => {
                let fallback =
                    self.inner.clock.now().timestamp() % constants::FALLBACK_NUMBER_MODULUS;
                tracing::warn!(
                    prefix,
                    %err,
                    fallback,
                    "request number write failed, using wall-clock fallback"
                );
                fallback
            }
        }
    }

    async fn draw_reconciled(&self, prefix: &str) -> EngineResult<i64> {
        let property_key = format!("reqnum:{}", prefix);
        let persisted: i64 = self
            .inner
            .properties
            .get(&property_key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let tracker_row = self
            .inner
            .store
            .find_row_by(TRACKER_TABLE, tracker_cols::PREFIX, prefix)
            .await?;
        let tracked: i64 = match tracker_row {
            Some(row) => self
                .inner
                .store
                .read_row_fresh(TRACKER_TABLE, row)
                .await?
                .get(tracker_cols::CURRENT)
                .and_then(|v| v.as_integer())
                .unwrap_or(0),
            None => 0,
        };

        let cached: i64 = self
            .inner
            .cache
            .get(prefix)
            .map(|v| *v)
            .unwrap_or(0);

        if cached != 0 && (cached != persisted || cached != tracked) {
            tracing::debug!(prefix, cached, persisted, tracked, "counter cache mismatch");
            self.inner.cache.remove(prefix);
        }

        let next = persisted.max(tracked).max(cached) + 1;

        // Advance all three sources before handing the value out.
        self.inner
            .properties
            .set(&property_key, &next.to_string())?;
        match tracker_row {
            Some(row) => {
                self.inner
                    .store
                    .set_cell(
                        TRACKER_TABLE,
                        row,
                        tracker_cols::CURRENT,
                        CellValue::from(next),
                        LockScope::Internal,
                    )
                    .await?;
            }
            None => {
                let mut values = RowValues::new();
                values.insert(tracker_cols::PREFIX.to_string(), CellValue::from(prefix));
                values.insert(tracker_cols::CURRENT.to_string(), CellValue::from(next));
                self.inner.store.append_row(TRACKER_TABLE, &values).await?;
            }
        }
        self.inner.cache.insert(prefix.to_string(), next);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBackend, TableBackend};
    use crate::timebase::SystemClock;

    fn counter_with(backend: Arc<MemoryBackend>) -> (RequestNumberCounter, Arc<MemoryPropertyStore>) {
        backend.create_table(TRACKER_TABLE, &[tracker_cols::PREFIX, tracker_cols::CURRENT]);
        let locks = LockManager::new(Arc::new(SystemClock));
        let store = RowStore::new(backend as Arc<dyn TableBackend>, locks.clone());
        let properties = Arc::new(MemoryPropertyStore::new());
        (
            RequestNumberCounter::new(
                store,
                Arc::clone(&properties) as Arc<dyn PropertyStore>,
                locks,
                Arc::new(SystemClock),
            ),
            properties,
        )
    }

    #[tokio::test]
    async fn numbers_are_monotonic_and_formatted() {
        let (counter, _) = counter_with(Arc::new(MemoryBackend::new()));
        let first = counter.next("BOM", "Retail Unit Alpha").await;
        let second = counter.next("BOM", "Retail Unit Alpha").await;
        assert_eq!(first, "BOM/MDM/Retail Unit Alpha/00001");
        assert_eq!(second, "BOM/MDM/Retail Unit Alpha/00002");
    }

    #[tokio::test]
    async fn prefixes_count_independently() {
        let (counter, _) = counter_with(Arc::new(MemoryBackend::new()));
        counter.next("BOM", "BU-A").await;
        let other = counter.next("PRC", "BU-A").await;
        assert_eq!(other, "PRC/MDM/BU-A/00001");
    }

    #[tokio::test]
    async fn reconciles_across_sources() {
        let backend = Arc::new(MemoryBackend::new());
        backend.create_table(TRACKER_TABLE, &[tracker_cols::PREFIX, tracker_cols::CURRENT]);
        let mut row = RowValues::new();
        row.insert(
            tracker_cols::PREFIX.to_string(),
            CellValue::from("BOM/MDM/BU-A"),
        );
        row.insert(tracker_cols::CURRENT.to_string(), CellValue::from(41_i64));
        backend.seed_row(TRACKER_TABLE, &row);

        let locks = LockManager::new(Arc::new(SystemClock));
        let store = RowStore::new(Arc::clone(&backend) as Arc<dyn TableBackend>, locks.clone());
        let properties = Arc::new(MemoryPropertyStore::new());
        properties.set("reqnum:BOM/MDM/BU-A", "40").unwrap();
        let counter = RequestNumberCounter::new(
            store,
            Arc::clone(&properties) as Arc<dyn PropertyStore>,
            locks,
            Arc::new(SystemClock),
        );

        assert_eq!(counter.next("BOM", "BU-A").await, "BOM/MDM/BU-A/00042");
        assert_eq!(
            properties.get("reqnum:BOM/MDM/BU-A").as_deref(),
            Some("42")
        );
    }

    #[tokio::test]
    async fn write_failure_falls_back_to_wall_clock() {
        let backend = Arc::new(MemoryBackend::new());
        let (counter, properties) = counter_with(Arc::clone(&backend));
        properties.fail_writes(true);
        let number = counter.next("BOM", "BU-A").await;
        let suffix: i64 = number.rsplit('/').next().unwrap().parse().unwrap();
        assert!(suffix < constants::FALLBACK_NUMBER_MODULUS);
        // later draws recover once writes succeed again
        properties.fail_writes(false);
        assert_eq!(counter.next("BOM", "BU-A").await, "BOM/MDM/BU-A/00001");
    }
}
