//! Engine constants
//!
//! Centralized constants for the orchestration engine: lease lock timings,
//! cache lifetimes, retry budgets and the business work window.

/// Lease duration granted to a key lock on acquire and on each heartbeat (ms)
pub const LEASE_MS: u64 = 300_000;

/// A lock whose last heartbeat is older than this is considered stale (ms)
pub const STALE_THRESHOLD_MS: u64 = 8_000;

/// Cushion added on top of the lease when sizing the lock record TTL (ms)
pub const LOCK_TTL_CUSHION_MS: u64 = 30_000;

/// Base backoff between lock acquisition attempts (ms); scaled by priority
pub const LOCK_BACKOFF_BASE_MS: u64 = 50;

/// Backoff cap between lock acquisition attempts (ms)
pub const LOCK_BACKOFF_CAP_MS: u64 = 2_000;

/// Default wait budget for a lock acquire (ms)
pub const DEFAULT_LOCK_WAIT_MS: u64 = 30_000;

/// Row read cache lifetime (seconds)
pub const ROW_CACHE_TTL_SECONDS: u64 = 60;

/// Configuration relation cache lifetime (seconds)
pub const CONFIG_CACHE_TTL_SECONDS: u64 = 300;

/// Distribution matrix cache lifetime (seconds)
pub const MATRIX_CACHE_TTL_SECONDS: u64 = 21_600;

/// Round-robin cursor lifetime (seconds)
pub const ROUND_ROBIN_TTL_SECONDS: u64 = 900;

/// Maximum notification delivery attempts
pub const NOTIFY_MAX_ATTEMPTS: u32 = 3;

/// Business days without activity after which a pending request expires
pub const EXPIRED_DAY_LIMIT: i64 = 5;

/// Work window opens (hour of day, local business time)
pub const WORK_DAY_START_HOUR: u32 = 9;

/// Work window closes (hour of day, local business time)
pub const WORK_DAY_END_HOUR: u32 = 18;

/// Lunch break start (hour of day)
pub const LUNCH_START_HOUR: u32 = 12;

/// Lunch break end (hour of day)
pub const LUNCH_END_HOUR: u32 = 13;

/// Working seconds in a full business day (9h window minus 1h lunch)
pub const WORK_DAY_SECONDS: i64 = 28_800;

/// Sentinel approver meaning a level has no configured approver
pub const NO_APPROVER: &str = "NO_APPROVER";

/// Wildcard value in configuration rule keys
pub const ALL: &str = "ALL";

/// Modulus for the wall-clock fallback request number
pub const FALLBACK_NUMBER_MODULUS: i64 = 100_000;

/// First task row on an attachment task sheet
pub const DEFAULT_TASK_START_ROW: usize = 25;

/// First task row for promo-type attachments (larger header block)
pub const PROMO_TASK_START_ROW: usize = 34;

/// Attachment cell holding the business unit display name
pub const CELL_COMPANY_NAME: &str = "F10";

/// Attachment cell holding the requester's email
pub const CELL_REQUESTER_EMAIL: &str = "F11";

/// Attachment cell columns per approval level, level 0 (requester) first
pub const LEVEL_CELL_COLUMNS: [char; 4] = ['C', 'D', 'E', 'F'];

/// Attachment row carrying the per-level status cell
pub const LEVEL_STATUS_ROW: u32 = 17;

/// Attachment row carrying the per-level actor name cell
pub const LEVEL_NAME_ROW: u32 = 18;

/// Attachment row carrying the per-level notes cell
pub const LEVEL_NOTES_ROW: u32 = 19;
