//! Workload accounting
//!
//! The per-agent workload-seconds counter and the agent roster behind it,
//! plus the request-number counter. Both counters are serialized by their own
//! key lock; the workload counter clamps at zero.

mod counter;

pub use counter::{
    tracker_cols, MemoryPropertyStore, PropertyStore, RequestNumberCounter, TRACKER_TABLE,
};

use crate::error::EngineResult;
use crate::model::CellValue;
use crate::store::{LockScope, RowStore};
use serde::{Deserialize, Serialize};

/// Agents roster table
pub const AGENTS_TABLE: &str = "Agents";

/// Agents roster columns
pub mod cols {
    pub const AGENT: &str = "Agent";
    pub const ACTIVE: &str = "Active";
    pub const STATUS: &str = "Status";
    pub const WORKLOAD: &str = "Workload";
}

/// Roster state of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub active: bool,
    pub busy: bool,
    pub workload_seconds: i64,
}

/// Serialized per-agent seconds counter over the roster table
#[derive(Clone)]
pub struct WorkloadRegistry {
    store: RowStore,
}

impl WorkloadRegistry {
    pub fn new(store: RowStore) -> Self {
        Self { store }
    }

    /// Roster state for an agent; unknown agents read as inactive with zero
    /// workload.
    pub async fn profile(&self, agent: &str) -> EngineResult<AgentProfile> {
        match self.store.find_row_by(AGENTS_TABLE, cols::AGENT, agent).await? {
            Some(row) => {
                let values = self.store.read_row(AGENTS_TABLE, row).await?;
                let flag = |col: &str| {
                    values
                        .get(col)
                        .and_then(|v| v.as_text())
                        .map(|s| s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("true"))
                        .unwrap_or(false)
                };
                Ok(AgentProfile {
                    name: agent.to_string(),
                    active: flag(cols::ACTIVE),
                    busy: values
                        .get(cols::STATUS)
                        .and_then(|v| v.as_text())
                        .map(|s| s.eq_ignore_ascii_case("busy"))
                        .unwrap_or(false),
                    workload_seconds: values
                        .get(cols::WORKLOAD)
                        .and_then(|v| v.as_integer())
                        .unwrap_or(0),
                })
            }
            None => Ok(AgentProfile {
                name: agent.to_string(),
                active: false,
                busy: false,
                workload_seconds: 0,
            }),
        }
    }

    /// Current workload seconds for an agent
    pub async fn get(&self, agent: &str) -> EngineResult<i64> {
        Ok(self.profile(agent).await?.workload_seconds)
    }

    /// Add (or subtract) seconds on an agent's counter under the workload
    /// key lock. The result clamps at zero. Returns the new total.
    pub async fn add(&self, agent: &str, delta_seconds: i64) -> EngineResult<i64> {
        let registry = self.clone();
        let agent = agent.to_string();
        self.store
            .locks()
            .clone()
            .with_key_lock("workload", "workload-add", 0, move |_lease| async move {
                let row = match registry
                    .store
                    .find_row_by(AGENTS_TABLE, cols::AGENT, &agent)
                    .await?
                {
                    Some(row) => row,
                    None => {
                        let mut values = crate::model::RowValues::new();
                        values.insert(cols::AGENT.to_string(), CellValue::from(agent.clone()));
                        values.insert(cols::ACTIVE.to_string(), CellValue::from("Yes"));
                        values.insert(cols::STATUS.to_string(), CellValue::from("Free"));
                        values.insert(cols::WORKLOAD.to_string(), CellValue::from(0_i64));
                        registry.store.append_row(AGENTS_TABLE, &values).await?
                    }
                };
                let values = registry.store.read_row_fresh(AGENTS_TABLE, row).await?;
                let current = values
                    .get(cols::WORKLOAD)
                    .and_then(|v| v.as_integer())
                    .unwrap_or(0);
                let updated = (current + delta_seconds).max(0);
                registry
                    .store
                    .set_cell(
                        AGENTS_TABLE,
                        row,
                        cols::WORKLOAD,
                        CellValue::from(updated),
                        LockScope::Internal,
                    )
                    .await?;
                tracing::debug!(agent = %agent, delta_seconds, updated, "workload adjusted");
                Ok(updated)
            })
            .await
    }
}
