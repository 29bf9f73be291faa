//! Key-granular lease locks
//!
//! A distributed-style lock service over string keys: leases with heartbeat,
//! takeover of stale holders, and ownership-checked release. Single-writer
//! semantics hold per key while a live lock exists; a holder that stops
//! heartbeating is taken over after the stale threshold, which is the
//! designed recovery path for crashed holders.

use crate::constants;
use crate::error::{EngineError, EngineResult};
use crate::timebase::Clock;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// State stored per held key
#[derive(Debug, Clone)]
pub struct LockRecord {
    /// Unique id of the holder
    pub holder_id: Uuid,
    /// Operation label, for takeover logs
    pub operation: String,
    /// Acquisition priority; lower retries faster
    pub priority: u8,
    /// When the lock was acquired
    pub acquired_at: DateTime<Utc>,
    /// Last heartbeat instant
    pub last_heartbeat: DateTime<Utc>,
    /// Lease expiry
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    /// A record is live iff the lease has not expired and the holder has
    /// heartbeat within the stale threshold.
    fn is_live(&self, now: DateTime<Utc>, stale_threshold: ChronoDuration) -> bool {
        now <= self.expires_at && now - self.last_heartbeat <= stale_threshold
    }
}

/// Proof of lock ownership returned by [`LockManager::acquire`]
#[derive(Debug, Clone)]
pub struct LockHandle {
    /// Holder id stored in the lock record
    pub holder_id: Uuid,
    /// Locked key
    pub key: String,
    /// Lease expiry at acquisition
    pub expires_at: DateTime<Utc>,
}

/// Lease lock manager
///
/// Cheap to clone; all clones share the same lock table.
#[derive(Clone)]
pub struct LockManager {
    inner: Arc<LockManagerInner>,
}

struct LockManagerInner {
    locks: DashMap<String, LockRecord>,
    /// Short-lived guard held only across the compare-and-swap window of an
    /// acquire, never across a caller's critical section.
    guard: Mutex<()>,
    clock: Arc<dyn Clock>,
    lease: ChronoDuration,
    stale_threshold: ChronoDuration,
    default_wait: Duration,
}

impl LockManager {
    /// Create a manager with the default lease timings
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_timings(
            clock,
            Duration::from_millis(constants::LEASE_MS),
            Duration::from_millis(constants::STALE_THRESHOLD_MS),
            Duration::from_millis(constants::DEFAULT_LOCK_WAIT_MS),
        )
    }

    /// Create a manager with explicit timings
    pub fn with_timings(
        clock: Arc<dyn Clock>,
        lease: Duration,
        stale_threshold: Duration,
        default_wait: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(LockManagerInner {
                locks: DashMap::new(),
                guard: Mutex::new(()),
                clock,
                lease: ChronoDuration::from_std(lease).unwrap_or(ChronoDuration::seconds(300)),
                stale_threshold: ChronoDuration::from_std(stale_threshold)
                    .unwrap_or(ChronoDuration::seconds(8)),
                default_wait,
            }),
        }
    }

    /// Try to take the lock on `key`, waiting up to `max_wait`.
    ///
    /// Returns `None` on timeout; callers treat that as a transient failure.
    /// A stale or expired record is taken over rather than waited out.
    pub async fn acquire(
        &self,
        key: &str,
        operation: &str,
        priority: u8,
        max_wait: Duration,
    ) -> Option<LockHandle> {
        let deadline = Instant::now() + max_wait;
        let mut attempt: u32 = 0;

        loop {
            if let Some(handle) = self.try_acquire(key, operation, priority) {
                return Some(handle);
            }
            let backoff = self.backoff(priority, attempt);
            attempt = attempt.saturating_add(1);
            if Instant::now() + backoff > deadline {
                tracing::debug!(key, operation, "lock acquire timed out");
                return None;
            }
            tokio::time::sleep(backoff).await;
        }
    }

    /// Single compare-and-swap attempt under the process-wide guard
    fn try_acquire(&self, key: &str, operation: &str, priority: u8) -> Option<LockHandle> {
        let _guard = self.inner.guard.lock();
        let now = self.inner.clock.now();

        if let Some(existing) = self.inner.locks.get(key) {
            if existing.is_live(now, self.inner.stale_threshold) {
                return None;
            }
            tracing::warn!(
                key,
                stale_holder = %existing.holder_id,
                stale_operation = %existing.operation,
                new_operation = operation,
                "taking over stale lock"
            );
        }

        let record = LockRecord {
            holder_id: Uuid::new_v4(),
            operation: operation.to_string(),
            priority,
            acquired_at: now,
            last_heartbeat: now,
            expires_at: now + self.inner.lease,
        };
        let handle = LockHandle {
            holder_id: record.holder_id,
            key: key.to_string(),
            expires_at: record.expires_at,
        };
        self.inner.locks.insert(key.to_string(), record);
        Some(handle)
    }

    /// Extend the lease iff the record is still owned by `handle`.
    ///
    /// Returns false when the record is gone or owned by someone else; the
    /// caller's critical section is then no longer protected.
    pub fn heartbeat(&self, handle: &LockHandle) -> bool {
        let now = self.inner.clock.now();
        match self.inner.locks.get_mut(&handle.key) {
            Some(mut record) if record.holder_id == handle.holder_id => {
                record.last_heartbeat = now;
                record.expires_at = now + self.inner.lease;
                true
            }
            _ => false,
        }
    }

    /// Release the lock. Idempotent; only removes the record when the stored
    /// holder matches the handle.
    pub fn release(&self, handle: &LockHandle) {
        self.inner
            .locks
            .remove_if(&handle.key, |_, record| record.holder_id == handle.holder_id);
    }

    /// Drop records whose lease expired past the TTL cushion. Callable from
    /// maintenance sweeps; acquire also recovers expired records lazily.
    pub fn purge_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let cushion =
            ChronoDuration::milliseconds(constants::LOCK_TTL_CUSHION_MS as i64);
        let before = self.inner.locks.len();
        self.inner
            .locks
            .retain(|_, record| now <= record.expires_at + cushion);
        before - self.inner.locks.len()
    }

    /// Run `f` while holding the lock on `key`; the lease is released on all
    /// exit paths, including cancellation. `f` receives the live lease and
    /// may call [`LockLease::beat`] inside long critical sections.
    pub async fn with_key_lock<T, Fut>(
        &self,
        key: &str,
        operation: &str,
        priority: u8,
        f: impl FnOnce(LockLease) -> Fut,
    ) -> EngineResult<T>
    where
        Fut: Future<Output = EngineResult<T>>,
    {
        let handle = self
            .acquire(key, operation, priority, self.inner.default_wait)
            .await
            .ok_or_else(|| EngineError::LockTimeout(key.to_string()))?;
        let lease = LockLease {
            manager: self.clone(),
            handle,
        };
        f(lease).await
    }

    /// Row-granular convenience wrapper over [`Self::with_key_lock`]
    pub async fn with_row_lock<T, Fut>(
        &self,
        table: &str,
        row: usize,
        operation: &str,
        f: impl FnOnce(LockLease) -> Fut,
    ) -> EngineResult<T>
    where
        Fut: Future<Output = EngineResult<T>>,
    {
        self.with_row_lock_at(table, row, operation, 1, f).await
    }

    /// Row lock with an explicit acquisition priority; lower retries faster
    pub async fn with_row_lock_at<T, Fut>(
        &self,
        table: &str,
        row: usize,
        operation: &str,
        priority: u8,
        f: impl FnOnce(LockLease) -> Fut,
    ) -> EngineResult<T>
    where
        Fut: Future<Output = EngineResult<T>>,
    {
        let key = row_key(table, row);
        self.with_key_lock(&key, operation, priority, f).await
    }

    fn backoff(&self, priority: u8, attempt: u32) -> Duration {
        let base = constants::LOCK_BACKOFF_BASE_MS * (priority as u64 + 1);
        let exp = base.saturating_mul(1_u64 << attempt.min(6));
        let capped = exp.min(constants::LOCK_BACKOFF_CAP_MS);
        let jitter = rand::thread_rng().gen_range(0..=capped / 4 + 1);
        Duration::from_millis(capped + jitter)
    }

    #[cfg(test)]
    fn record(&self, key: &str) -> Option<LockRecord> {
        self.inner.locks.get(key).map(|r| r.clone())
    }
}

/// Held lease handed to `with_key_lock` critical sections. Releases on drop.
pub struct LockLease {
    manager: LockManager,
    handle: LockHandle,
}

impl LockLease {
    /// Extend the lease; returns false when ownership was lost
    pub fn beat(&self) -> bool {
        self.manager.heartbeat(&self.handle)
    }

    /// The underlying handle
    pub fn handle(&self) -> &LockHandle {
        &self.handle
    }
}

impl Drop for LockLease {
    fn drop(&mut self) {
        self.manager.release(&self.handle);
    }
}

/// Canonical key for a row-granular lock
pub fn row_key(table: &str, row: usize) -> String {
    format!("row:{}:{}", table, row)
}

/// Canonical key serializing operations on one request number
pub fn request_key(table: &str, request_number: &str) -> String {
    format!("rowkey:{}:{}", table, request_number)
}
