//! Configuration relations
//!
//! Memoized lookup over the five read-only configuration tables: approver
//! rosters, SLA baselines, work-allocation rules, the distribution matrix and
//! priority weights. Entries live for a few minutes; the matrix is cached
//! longer and can be invalidated on demand.

use crate::constants::{self, ALL, NO_APPROVER};
use crate::error::EngineResult;
use crate::store::RowStore;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Configuration table names
pub mod tables {
    pub const APPROVERS: &str = "Approvers";
    pub const BASELINE: &str = "Baseline";
    pub const WORK_ALLOCATION: &str = "Work Allocation";
    pub const DISTRIBUTION: &str = "Distribution";
    pub const PRIORITY_WEIGHT: &str = "Priority Weight";
}

/// Configuration table columns
pub mod cols {
    pub const BUSINESS_UNIT: &str = "Business Unit";
    pub const DEPARTMENT: &str = "Department";
    pub const REQUEST_TYPE: &str = "Request Type";
    pub const LEVEL: &str = "Level";
    pub const APPROVERS: &str = "Approvers";
    pub const TASK_RANGE: &str = "Task Range";
    pub const SECONDS: &str = "Seconds";
    pub const PER_TASK: &str = "Per Task";
    pub const PRIMARY: &str = "Primary";
    pub const BACKUP: &str = "Backup";
    pub const BACKUP_II: &str = "Backup II";
    pub const AGENTS: &str = "Agents";
    pub const WEIGHT: &str = "Weight";
}

#[derive(Debug, Clone)]
struct ApproverRule {
    business_unit: String,
    department: String,
    request_type: String,
    level: u8,
    approvers: Vec<String>,
}

#[derive(Debug, Clone)]
struct BaselineRow {
    request_type: String,
    min: i64,
    max: Option<i64>,
    seconds: i64,
    per_task: bool,
}

#[derive(Debug, Clone)]
struct AllocationRow {
    business_unit: String,
    request_type: String,
    department: String,
    groups: Vec<String>,
}

#[derive(Debug, Clone)]
struct DistributionRow {
    request_type: String,
    agents: Vec<String>,
}

#[derive(Debug, Clone)]
struct PriorityRow {
    request_type: String,
    weight: u8,
}

/// Resolved baseline rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    /// Seconds per unit, or flat seconds
    pub seconds: i64,
    /// Whether `seconds` is multiplied by the task count
    pub per_task: bool,
}

struct CacheEntry<T> {
    loaded_at: Instant,
    value: Arc<T>,
}

/// Memoizing facade over the configuration tables
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    store: RowStore,
    ttl: Duration,
    matrix_ttl: Duration,
    approvers: DashMap<(), CacheEntry<Vec<ApproverRule>>>,
    baselines: DashMap<(), CacheEntry<Vec<BaselineRow>>>,
    allocations: DashMap<(), CacheEntry<Vec<AllocationRow>>>,
    distribution: DashMap<(), CacheEntry<Vec<DistributionRow>>>,
    priorities: DashMap<(), CacheEntry<Vec<PriorityRow>>>,
}

impl Catalog {
    pub fn new(store: RowStore) -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                store,
                ttl: Duration::from_secs(constants::CONFIG_CACHE_TTL_SECONDS),
                matrix_ttl: Duration::from_secs(constants::MATRIX_CACHE_TTL_SECONDS),
                approvers: DashMap::new(),
                baselines: DashMap::new(),
                allocations: DashMap::new(),
                distribution: DashMap::new(),
                priorities: DashMap::new(),
            }),
        }
    }

    /// Approver emails for one level of the hierarchy.
    ///
    /// Keys are tried most-specific first; with `use_default` the department,
    /// then the request type, then both fall back to `ALL`. An empty result
    /// (including the literal `NO_APPROVER` sentinel) means the level is
    /// auto-approved.
    pub async fn approvers(
        &self,
        business_unit: &str,
        department: &str,
        request_type: &str,
        level: u8,
        use_default: bool,
    ) -> EngineResult<Vec<String>> {
        let rules = self.approver_rules().await?;
        let mut candidates: Vec<(&str, &str)> = vec![(department, request_type)];
        if use_default {
            candidates.push((ALL, request_type));
            candidates.push((department, ALL));
            candidates.push((ALL, ALL));
        }
        for (dept, rtype) in candidates {
            let found = rules.iter().find(|r| {
                r.level == level
                    && r.business_unit == business_unit
                    && r.department == dept
                    && r.request_type == rtype
            });
            if let Some(rule) = found {
                if rule.approvers.is_empty()
                    || rule.approvers.iter().any(|a| a == NO_APPROVER)
                {
                    return Ok(Vec::new());
                }
                return Ok(rule.approvers.clone());
            }
        }
        Ok(Vec::new())
    }

    /// Baseline rule matching the task count, or `None` to continue with no
    /// estimate.
    pub async fn baseline(
        &self,
        request_type: &str,
        total_task: i64,
    ) -> EngineResult<Option<Baseline>> {
        let rows = self.baseline_rows().await?;
        Ok(rows
            .iter()
            .find(|r| {
                r.request_type == request_type
                    && total_task >= r.min
                    && r.max.map_or(true, |max| total_task <= max)
            })
            .map(|r| Baseline {
                seconds: r.seconds,
                per_task: r.per_task,
            }))
    }

    /// Eligible agents for a request type from the distribution matrix
    pub async fn distribution(&self, request_type: &str) -> EngineResult<Option<Vec<String>>> {
        let rows = self.distribution_rows().await?;
        Ok(rows
            .iter()
            .find(|r| r.request_type == request_type)
            .map(|r| r.agents.clone()))
    }

    /// Ordered candidate groups from the work-allocation rule, with the same
    /// `ALL`-wildcard precedence as the approver lookup.
    pub async fn work_allocation(
        &self,
        business_unit: &str,
        request_type: &str,
        department: &str,
    ) -> EngineResult<Option<Vec<String>>> {
        let rows = self.allocation_rows().await?;
        let candidates = [
            (department, request_type),
            (ALL, request_type),
            (department, ALL),
            (ALL, ALL),
        ];
        for (dept, rtype) in candidates {
            let found = rows.iter().find(|r| {
                r.business_unit == business_unit
                    && r.department == dept
                    && r.request_type == rtype
            });
            if let Some(rule) = found {
                return Ok(Some(rule.groups.clone()));
            }
        }
        Ok(None)
    }

    /// Lock-acquisition priority weight for a request type; 1 when unset
    pub async fn priority_weight(&self, request_type: &str) -> EngineResult<u8> {
        let rows = self.priority_rows().await?;
        Ok(rows
            .iter()
            .find(|r| r.request_type == request_type)
            .map(|r| r.weight)
            .unwrap_or(1))
    }

    /// Drop every memoized relation
    pub fn invalidate(&self) {
        self.inner.approvers.clear();
        self.inner.baselines.clear();
        self.inner.allocations.clear();
        self.inner.distribution.clear();
        self.inner.priorities.clear();
    }

    async fn approver_rules(&self) -> EngineResult<Arc<Vec<ApproverRule>>> {
        if let Some(entry) = self.inner.approvers.get(&()) {
            if entry.loaded_at.elapsed() < self.inner.ttl {
                return Ok(Arc::clone(&entry.value));
            }
        }
        let mut rules = Vec::new();
        let count = self.inner.store.row_count(tables::APPROVERS).await?;
        for row in 0..count {
            let values = self.inner.store.read_row(tables::APPROVERS, row).await?;
            let text = |col: &str| -> String {
                values
                    .get(col)
                    .and_then(|v| v.as_text())
                    .unwrap_or_default()
                    .to_string()
            };
            rules.push(ApproverRule {
                business_unit: text(cols::BUSINESS_UNIT),
                department: text(cols::DEPARTMENT),
                request_type: text(cols::REQUEST_TYPE),
                level: values
                    .get(cols::LEVEL)
                    .and_then(|v| v.as_integer())
                    .unwrap_or(0) as u8,
                approvers: split_list(&text(cols::APPROVERS)),
            });
        }
        let value = Arc::new(rules);
        self.inner.approvers.insert(
            (),
            CacheEntry {
                loaded_at: Instant::now(),
                value: Arc::clone(&value),
            },
        );
        Ok(value)
    }

    async fn baseline_rows(&self) -> EngineResult<Arc<Vec<BaselineRow>>> {
        if let Some(entry) = self.inner.baselines.get(&()) {
            if entry.loaded_at.elapsed() < self.inner.ttl {
                return Ok(Arc::clone(&entry.value));
            }
        }
        let mut rows_out = Vec::new();
        let count = self.inner.store.row_count(tables::BASELINE).await?;
        for row in 0..count {
            let values = self.inner.store.read_row(tables::BASELINE, row).await?;
            let range = values
                .get(cols::TASK_RANGE)
                .and_then(|v| v.as_text())
                .unwrap_or_default()
                .to_string();
            let Some((min, max)) = parse_task_range(&range) else {
                tracing::warn!(row, range, "skipping baseline row with bad task range");
                continue;
            };
            rows_out.push(BaselineRow {
                request_type: values
                    .get(cols::REQUEST_TYPE)
                    .and_then(|v| v.as_text())
                    .unwrap_or_default()
                    .to_string(),
                min,
                max,
                seconds: values
                    .get(cols::SECONDS)
                    .and_then(|v| v.as_integer())
                    .unwrap_or(0),
                per_task: values
                    .get(cols::PER_TASK)
                    .and_then(|v| v.as_text())
                    .map(|s| s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
            });
        }
        let value = Arc::new(rows_out);
        self.inner.baselines.insert(
            (),
            CacheEntry {
                loaded_at: Instant::now(),
                value: Arc::clone(&value),
            },
        );
        Ok(value)
    }

    async fn allocation_rows(&self) -> EngineResult<Arc<Vec<AllocationRow>>> {
        if let Some(entry) = self.inner.allocations.get(&()) {
            if entry.loaded_at.elapsed() < self.inner.ttl {
                return Ok(Arc::clone(&entry.value));
            }
        }
        let mut rows_out = Vec::new();
        let count = self.inner.store.row_count(tables::WORK_ALLOCATION).await?;
        for row in 0..count {
            let values = self
                .inner
                .store
                .read_row(tables::WORK_ALLOCATION, row)
                .await?;
            let text = |col: &str| -> String {
                values
                    .get(col)
                    .and_then(|v| v.as_text())
                    .unwrap_or_default()
                    .to_string()
            };
            let groups: Vec<String> = [cols::PRIMARY, cols::BACKUP, cols::BACKUP_II]
                .iter()
                .map(|c| text(c))
                .filter(|g| !g.is_empty())
                .collect();
            rows_out.push(AllocationRow {
                business_unit: text(cols::BUSINESS_UNIT),
                request_type: text(cols::REQUEST_TYPE),
                department: text(cols::DEPARTMENT),
                groups,
            });
        }
        let value = Arc::new(rows_out);
        self.inner.allocations.insert(
            (),
            CacheEntry {
                loaded_at: Instant::now(),
                value: Arc::clone(&value),
            },
        );
        Ok(value)
    }

    async fn distribution_rows(&self) -> EngineResult<Arc<Vec<DistributionRow>>> {
        if let Some(entry) = self.inner.distribution.get(&()) {
            if entry.loaded_at.elapsed() < self.inner.matrix_ttl {
                return Ok(Arc::clone(&entry.value));
            }
        }
        let mut rows_out = Vec::new();
        let count = self.inner.store.row_count(tables::DISTRIBUTION).await?;
        for row in 0..count {
            let values = self.inner.store.read_row(tables::DISTRIBUTION, row).await?;
            rows_out.push(DistributionRow {
                request_type: values
                    .get(cols::REQUEST_TYPE)
                    .and_then(|v| v.as_text())
                    .unwrap_or_default()
                    .to_string(),
                agents: split_list(
                    values
                        .get(cols::AGENTS)
                        .and_then(|v| v.as_text())
                        .unwrap_or_default(),
                ),
            });
        }
        let value = Arc::new(rows_out);
        self.inner.distribution.insert(
            (),
            CacheEntry {
                loaded_at: Instant::now(),
                value: Arc::clone(&value),
            },
        );
        Ok(value)
    }

    async fn priority_rows(&self) -> EngineResult<Arc<Vec<PriorityRow>>> {
        if let Some(entry) = self.inner.priorities.get(&()) {
            if entry.loaded_at.elapsed() < self.inner.ttl {
                return Ok(Arc::clone(&entry.value));
            }
        }
        let mut rows_out = Vec::new();
        let count = self.inner.store.row_count(tables::PRIORITY_WEIGHT).await?;
        for row in 0..count {
            let values = self
                .inner
                .store
                .read_row(tables::PRIORITY_WEIGHT, row)
                .await?;
            rows_out.push(PriorityRow {
                request_type: values
                    .get(cols::REQUEST_TYPE)
                    .and_then(|v| v.as_text())
                    .unwrap_or_default()
                    .to_string(),
                weight: values
                    .get(cols::WEIGHT)
                    .and_then(|v| v.as_integer())
                    .unwrap_or(1) as u8,
            });
        }
        let value = Arc::new(rows_out);
        self.inner.priorities.insert(
            (),
            CacheEntry {
                loaded_at: Instant::now(),
                value: Arc::clone(&value),
            },
        );
        Ok(value)
    }
}

/// Parse `n-m` or `n+` into an inclusive range
fn parse_task_range(spec: &str) -> Option<(i64, Option<i64>)> {
    let spec = spec.trim();
    if let Some(min) = spec.strip_suffix('+') {
        return min.trim().parse().ok().map(|m| (m, None));
    }
    let (min, max) = spec.split_once('-')?;
    Some((
        min.trim().parse().ok()?,
        Some(max.trim().parse().ok()?),
    ))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
