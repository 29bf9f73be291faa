//! Workload allocation
//!
//! Picks exactly one agent for an approved request: the distribution matrix
//! filtered to free agents, least-loaded with a round-robin tie break, then
//! the BAU work-allocation rule groups, then the default agent. Tie-breaking
//! is always by a per-rule round-robin cursor, never random, so fairness
//! holds over long runs without coordination.

use crate::catalog::Catalog;
use crate::config::AllocationConfig;
use crate::constants;
use crate::error::EngineResult;
use crate::workload::{AgentProfile, WorkloadRegistry};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Cursor {
    value: u64,
    touched: Instant,
}

/// Matrix-filtered least-loaded allocator
#[derive(Clone)]
pub struct Allocator {
    inner: Arc<AllocatorInner>,
}

struct AllocatorInner {
    catalog: Catalog,
    workload: WorkloadRegistry,
    config: AllocationConfig,
    cursors: DashMap<String, Cursor>,
    cursor_ttl: Duration,
}

impl Allocator {
    pub fn new(catalog: Catalog, workload: WorkloadRegistry, config: AllocationConfig) -> Self {
        Self {
            inner: Arc::new(AllocatorInner {
                catalog,
                workload,
                config,
                cursors: DashMap::new(),
                cursor_ttl: Duration::from_secs(constants::ROUND_ROBIN_TTL_SECONDS),
            }),
        }
    }

    /// Choose the assignee for a request. Never fails to produce a name; the
    /// default agent absorbs every exhausted path.
    pub async fn allocate(
        &self,
        business_unit: &str,
        department: &str,
        request_type: &str,
    ) -> EngineResult<String> {
        if department == self.inner.config.special_project_department {
            return Ok(self.inner.config.default_agent.clone());
        }

        if let Some(agent) = self.allocate_from_matrix(request_type).await? {
            return Ok(agent);
        }

        if let Some(agent) = self
            .allocate_from_bau(business_unit, request_type, department)
            .await?
        {
            return Ok(agent);
        }

        tracing::info!(
            business_unit,
            request_type,
            department,
            "allocation fell through to default agent"
        );
        Ok(self.inner.config.default_agent.clone())
    }

    async fn allocate_from_matrix(&self, request_type: &str) -> EngineResult<Option<String>> {
        let Some(eligible) = self.inner.catalog.distribution(request_type).await? else {
            return Ok(None);
        };
        let mut free = Vec::new();
        for agent in &eligible {
            let profile = self.inner.workload.profile(agent).await?;
            if profile.active && !profile.busy {
                free.push(profile);
            }
        }
        if free.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.least_loaded(
            &free,
            &format!("matrix:{}", request_type),
        )))
    }

    async fn allocate_from_bau(
        &self,
        business_unit: &str,
        request_type: &str,
        department: &str,
    ) -> EngineResult<Option<String>> {
        let Some(groups) = self
            .inner
            .catalog
            .work_allocation(business_unit, request_type, department)
            .await?
        else {
            return Ok(None);
        };

        for (position, group) in groups.iter().enumerate() {
            let mut free = Vec::new();
            for candidate in group.split(',').map(str::trim).filter(|c| !c.is_empty()) {
                let profile = self.inner.workload.profile(candidate).await?;
                if profile.active && !profile.busy {
                    free.push(profile);
                }
            }
            if free.is_empty() {
                continue;
            }
            let key = format!("bau:{}:{}:{}:{}", business_unit, request_type, department, position);
            return Ok(Some(self.least_loaded(&free, &key)));
        }
        Ok(None)
    }

    /// Smallest workload wins; ties rotate through the rule's cursor
    fn least_loaded(&self, candidates: &[AgentProfile], cursor_key: &str) -> String {
        let min = candidates
            .iter()
            .map(|p| p.workload_seconds)
            .min()
            .unwrap_or(0);
        let tied: Vec<&AgentProfile> = candidates
            .iter()
            .filter(|p| p.workload_seconds == min)
            .collect();
        if tied.len() == 1 {
            return tied[0].name.clone();
        }
        let slot = self.advance_cursor(cursor_key) as usize % tied.len();
        tied[slot].name.clone()
    }

    fn advance_cursor(&self, key: &str) -> u64 {
        let mut entry = self.inner.cursors.entry(key.to_string()).or_insert(Cursor {
            value: 0,
            touched: Instant::now(),
        });
        if entry.touched.elapsed() > self.inner.cursor_ttl {
            entry.value = 0;
        }
        let current = entry.value;
        entry.value += 1;
        entry.touched = Instant::now();
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{cols, tables};
    use crate::locks::LockManager;
    use crate::model::{CellValue, RowValues};
    use crate::store::{MemoryBackend, RowStore, TableBackend};
    use crate::timebase::SystemClock;
    use crate::workload::{cols as agent_cols, AGENTS_TABLE};

    struct Fixture {
        allocator: Allocator,
        backend: Arc<MemoryBackend>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        backend.create_table(tables::DISTRIBUTION, &[cols::REQUEST_TYPE, cols::AGENTS]);
        backend.create_table(
            tables::WORK_ALLOCATION,
            &[
                cols::BUSINESS_UNIT,
                cols::REQUEST_TYPE,
                cols::DEPARTMENT,
                cols::PRIMARY,
                cols::BACKUP,
                cols::BACKUP_II,
            ],
        );
        backend.create_table(tables::APPROVERS, &[]);
        backend.create_table(tables::BASELINE, &[]);
        backend.create_table(tables::PRIORITY_WEIGHT, &[]);
        backend.create_table(
            AGENTS_TABLE,
            &[
                agent_cols::AGENT,
                agent_cols::ACTIVE,
                agent_cols::STATUS,
                agent_cols::WORKLOAD,
            ],
        );
        let locks = LockManager::new(Arc::new(SystemClock));
        let store = RowStore::new(Arc::clone(&backend) as Arc<dyn TableBackend>, locks);
        let catalog = Catalog::new(store.clone());
        let workload = WorkloadRegistry::new(store);
        Fixture {
            allocator: Allocator::new(catalog, workload, AllocationConfig::default()),
            backend,
        }
    }

    fn seed_agent(backend: &MemoryBackend, name: &str, status: &str, workload: i64) {
        let mut row = RowValues::new();
        row.insert(agent_cols::AGENT.to_string(), CellValue::from(name));
        row.insert(agent_cols::ACTIVE.to_string(), CellValue::from("Yes"));
        row.insert(agent_cols::STATUS.to_string(), CellValue::from(status));
        row.insert(agent_cols::WORKLOAD.to_string(), CellValue::from(workload));
        backend.seed_row(AGENTS_TABLE, &row);
    }

    fn seed_matrix(backend: &MemoryBackend, request_type: &str, agents: &str) {
        let mut row = RowValues::new();
        row.insert(cols::REQUEST_TYPE.to_string(), CellValue::from(request_type));
        row.insert(cols::AGENTS.to_string(), CellValue::from(agents));
        backend.seed_row(tables::DISTRIBUTION, &row);
    }

    #[tokio::test]
    async fn special_project_routes_to_default() {
        let f = fixture();
        let agent = f
            .allocator
            .allocate("BU01", "SPECIAL PROJECT", "BOM Create")
            .await
            .unwrap();
        assert_eq!(agent, AllocationConfig::default().default_agent);
    }

    #[tokio::test]
    async fn busy_agent_loses_the_tie() {
        let f = fixture();
        seed_matrix(&f.backend, "Pricing Create", "alice, bob");
        seed_agent(&f.backend, "alice", "Busy", 300);
        seed_agent(&f.backend, "bob", "Free", 300);
        for _ in 0..3 {
            let agent = f
                .allocator
                .allocate("BU01", "Merchandising", "Pricing Create")
                .await
                .unwrap();
            assert_eq!(agent, "bob");
        }
    }

    #[tokio::test]
    async fn tied_free_agents_rotate() {
        let f = fixture();
        seed_matrix(&f.backend, "Pricing Create", "alice, bob");
        seed_agent(&f.backend, "alice", "Free", 300);
        seed_agent(&f.backend, "bob", "Free", 300);
        let first = f
            .allocator
            .allocate("BU01", "Merchandising", "Pricing Create")
            .await
            .unwrap();
        let second = f
            .allocator
            .allocate("BU01", "Merchandising", "Pricing Create")
            .await
            .unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn least_loaded_wins_outright() {
        let f = fixture();
        seed_matrix(&f.backend, "BOM Create", "alice, bob");
        seed_agent(&f.backend, "alice", "Free", 500);
        seed_agent(&f.backend, "bob", "Free", 100);
        let agent = f
            .allocator
            .allocate("BU01", "Merchandising", "BOM Create")
            .await
            .unwrap();
        assert_eq!(agent, "bob");
    }

    #[tokio::test]
    async fn bau_groups_fall_through_in_order() {
        let f = fixture();
        // no matrix row: straight to BAU
        let mut rule = RowValues::new();
        rule.insert(cols::BUSINESS_UNIT.to_string(), CellValue::from("BU01"));
        rule.insert(cols::REQUEST_TYPE.to_string(), CellValue::from("ALL"));
        rule.insert(cols::DEPARTMENT.to_string(), CellValue::from("ALL"));
        rule.insert(cols::PRIMARY.to_string(), CellValue::from("carol"));
        rule.insert(cols::BACKUP.to_string(), CellValue::from("dave, erin"));
        f.backend.seed_row(tables::WORK_ALLOCATION, &rule);

        seed_agent(&f.backend, "carol", "Busy", 0);
        seed_agent(&f.backend, "dave", "Free", 900);
        seed_agent(&f.backend, "erin", "Free", 200);

        let agent = f
            .allocator
            .allocate("BU01", "Merchandising", "BOM Create")
            .await
            .unwrap();
        assert_eq!(agent, "erin");
    }

    #[tokio::test]
    async fn everything_exhausted_returns_default() {
        let f = fixture();
        seed_matrix(&f.backend, "BOM Create", "alice");
        seed_agent(&f.backend, "alice", "Busy", 0);
        let agent = f
            .allocator
            .allocate("BU01", "Merchandising", "BOM Create")
            .await
            .unwrap();
        assert_eq!(agent, AllocationConfig::default().default_agent);
    }
}
