//! Table bootstrap
//!
//! Creates the master and configuration tables an empty backend needs before
//! the engine can run, and seeds rows from JSON fixtures. Dev servers and the
//! test suites share this.

use crate::catalog::{cols, tables};
use crate::error::{EngineError, EngineResult};
use crate::model::{columns, CellValue, RowValues};
use crate::store::MemoryBackend;
use crate::workload::{cols as agent_cols, tracker_cols, AGENTS_TABLE, TRACKER_TABLE};
use std::collections::HashMap;

/// Create every core table on a fresh in-memory backend
pub fn seed_core_tables(backend: &MemoryBackend) {
    for table in ["BOM", "Pricing", "Promo", "Customer", "Vendor"] {
        backend.create_table(table, columns::MASTER_COLUMNS);
    }
    backend.create_table(
        tables::APPROVERS,
        &[
            cols::BUSINESS_UNIT,
            cols::DEPARTMENT,
            cols::REQUEST_TYPE,
            cols::LEVEL,
            cols::APPROVERS,
        ],
    );
    backend.create_table(
        tables::BASELINE,
        &[
            cols::REQUEST_TYPE,
            cols::TASK_RANGE,
            cols::SECONDS,
            cols::PER_TASK,
        ],
    );
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
    backend.create_table(tables::DISTRIBUTION, &[cols::REQUEST_TYPE, cols::AGENTS]);
    backend.create_table(tables::PRIORITY_WEIGHT, &[cols::REQUEST_TYPE, cols::WEIGHT]);
    backend.create_table(
        AGENTS_TABLE,
        &[
            agent_cols::AGENT,
            agent_cols::ACTIVE,
            agent_cols::STATUS,
            agent_cols::WORKLOAD,
        ],
    );
    backend.create_table(TRACKER_TABLE, &[tracker_cols::PREFIX, tracker_cols::CURRENT]);
}

/// Seed one table from a JSON array of `{column: value}` objects
pub fn seed_table_from_json(
    backend: &MemoryBackend,
    table: &str,
    json: &str,
) -> EngineResult<usize> {
    let rows: Vec<HashMap<String, serde_json::Value>> = serde_json::from_str(json)
        .map_err(|e| EngineError::Configuration(format!("bad fixture for {}: {}", table, e)))?;
    let count = rows.len();
    for row in rows {
        let values: RowValues = row
            .into_iter()
            .map(|(col, value)| (col, json_cell(value)))
            .collect();
        backend.seed_row(table, &values);
    }
    Ok(count)
}

fn json_cell(value: serde_json::Value) -> CellValue {
    match value {
        serde_json::Value::Null => CellValue::Empty,
        serde_json::Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or_default(),
        serde_json::Value::String(s) => CellValue::from(s),
        serde_json::Value::Bool(b) => {
            CellValue::from(if b { "Yes" } else { "No" })
        }
        other => CellValue::from(other.to_string()),
    }
}
