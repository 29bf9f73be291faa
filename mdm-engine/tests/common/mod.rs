//! Shared test harness
//!
//! Boots the engine over seeded in-memory boundaries with a manual clock so
//! the scenarios can steer approvals, time and agent state directly.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use mdm_engine::attachment::{
    AttachmentStore, MemoryAttachmentStore, TaskColumn, TaskSheet,
};
use mdm_engine::bootstrap::seed_core_tables;
use mdm_engine::catalog::{cols, tables};
use mdm_engine::engine::SubmitOutcome;
use mdm_engine::model::{columns, ApprovalLevel, CellValue, RequestType, RowValues};
use mdm_engine::notify::RecordingNotifier;
use mdm_engine::scheduling::calendar::FixedHolidayCalendar;
use mdm_engine::store::{LockScope, MemoryBackend, TableBackend};
use mdm_engine::workload::{cols as agent_cols, MemoryPropertyStore, AGENTS_TABLE};
use mdm_engine::{AppConfig, ManualClock, RequestEngine, Scheduler};
use std::sync::Arc;

pub struct Harness {
    pub engine: RequestEngine,
    pub scheduler: Scheduler,
    pub backend: Arc<MemoryBackend>,
    pub attachments: Arc<MemoryAttachmentStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: ManualClock,
}

/// Monday 2024-03-04, 08:00 UTC
pub fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap()
}

impl Harness {
    pub fn new() -> Self {
        let backend = Arc::new(MemoryBackend::new());
        seed_core_tables(&backend);

        // Approver roster: two configured levels, third auto-approved.
        for (dept, level, approvers) in [
            ("ALL", "1", "a@x"),
            ("ALL", "2", "b@x"),
            ("ALL", "3", "NO_APPROVER"),
        ] {
            let mut row = RowValues::new();
            row.insert(cols::BUSINESS_UNIT.to_string(), CellValue::from("BU01"));
            row.insert(cols::DEPARTMENT.to_string(), CellValue::from(dept));
            row.insert(cols::REQUEST_TYPE.to_string(), CellValue::from("BOM Create"));
            row.insert(cols::LEVEL.to_string(), CellValue::from(level));
            row.insert(cols::APPROVERS.to_string(), CellValue::from(approvers));
            backend.seed_row(tables::APPROVERS, &row);
        }

        // Baselines: five tasks at 720s/task estimate exactly one hour x 5.
        for (range, seconds) in [("1-4", "300"), ("5-10", "720"), ("11+", "60")] {
            let mut row = RowValues::new();
            row.insert(cols::REQUEST_TYPE.to_string(), CellValue::from("BOM Create"));
            row.insert(cols::TASK_RANGE.to_string(), CellValue::from(range));
            row.insert(cols::SECONDS.to_string(), CellValue::from(seconds));
            row.insert(cols::PER_TASK.to_string(), CellValue::from("Yes"));
            backend.seed_row(tables::BASELINE, &row);
        }

        // Distribution matrix and agent roster.
        let mut matrix = RowValues::new();
        matrix.insert(cols::REQUEST_TYPE.to_string(), CellValue::from("BOM Create"));
        matrix.insert(cols::AGENTS.to_string(), CellValue::from("alice, bob"));
        backend.seed_row(tables::DISTRIBUTION, &matrix);
        for (agent, workload) in [("alice", 0_i64), ("bob", 600)] {
            let mut row = RowValues::new();
            row.insert(agent_cols::AGENT.to_string(), CellValue::from(agent));
            row.insert(agent_cols::ACTIVE.to_string(), CellValue::from("Yes"));
            row.insert(agent_cols::STATUS.to_string(), CellValue::from("Free"));
            row.insert(agent_cols::WORKLOAD.to_string(), CellValue::from(workload));
            backend.seed_row(AGENTS_TABLE, &row);
        }

        let attachments = Arc::new(MemoryAttachmentStore::new());
        attachments.register_template(
            RequestType::BomCreate,
            vec![TaskSheet {
                name: "Tasks".to_string(),
                start_row: 25,
                columns: vec![TaskColumn {
                    name: "Material".to_string(),
                    mandatory: true,
                    rule: None,
                }],
                rows: Vec::new(),
            }],
        );

        let notifier = Arc::new(RecordingNotifier::new());
        let clock = ManualClock::new(monday_morning());
        let engine = RequestEngine::new(
            AppConfig::default(),
            Arc::new(clock.clone()),
            Arc::clone(&backend) as Arc<dyn TableBackend>,
            Arc::clone(&attachments) as Arc<dyn AttachmentStore>,
            Arc::clone(&notifier) as Arc<dyn mdm_engine::notify::Notifier>,
            Arc::new(MemoryPropertyStore::new()),
            Arc::new(FixedHolidayCalendar::empty()),
        );
        let scheduler = Scheduler::new(engine.clone());
        Self {
            engine,
            scheduler,
            backend,
            attachments,
            notifier,
            clock,
        }
    }

    /// File a BOM Create submission and run the submit handler
    pub async fn submit_bom(&self, total_task: i64) -> SubmitOutcome {
        let mut values = RowValues::new();
        values.insert(
            columns::REQUEST_TYPE.to_string(),
            CellValue::from("BOM Create"),
        );
        values.insert(
            columns::BUSINESS_UNIT.to_string(),
            CellValue::from("Retail Unit Alpha"),
        );
        values.insert(columns::COMPANY_CODE.to_string(), CellValue::from("BU01"));
        values.insert(columns::EMAIL_ADDRESS.to_string(), CellValue::from("u@x"));
        values.insert(
            columns::DEPARTMENT.to_string(),
            CellValue::from("Merchandising"),
        );
        values.insert(columns::TOTAL_TASK.to_string(), CellValue::from(total_task));
        let row = self.engine.store().append_row("BOM", &values).await.unwrap();
        self.engine.handle_on_submit("BOM", row).await.unwrap()
    }

    /// Mark the requester portion of the attachment complete
    pub async fn requester_completes(&self, attachment: &str) {
        self.attachments
            .write_cell(attachment, "C17", CellValue::from("Completed"))
            .await
            .unwrap();
        self.attachments
            .write_cell(attachment, "C18", CellValue::from("u@x"))
            .await
            .unwrap();
    }

    /// Write one approver level's action onto the attachment
    pub async fn approver_acts(&self, attachment: &str, level: u8, status: &str, name: &str) {
        let level = ApprovalLevel::new(level).unwrap();
        self.attachments
            .write_cell(attachment, &level.status_cell(), CellValue::from(status))
            .await
            .unwrap();
        self.attachments
            .write_cell(attachment, &level.name_cell(), CellValue::from(name))
            .await
            .unwrap();
    }

    /// Run an interval pass on the master row carrying `request_number`
    pub async fn run_interval(&self, request_number: &str) {
        let row = self
            .engine
            .store()
            .find_row("BOM", request_number)
            .await
            .unwrap()
            .expect("master row");
        self.engine
            .handle_on_interval("BOM", row, request_number)
            .await
            .unwrap();
    }

    /// Read the typed master record for a request
    pub async fn master_record(&self, request_number: &str) -> mdm_engine::RequestRecord {
        let row = self
            .engine
            .store()
            .find_row("BOM", request_number)
            .await
            .unwrap()
            .expect("master row");
        let values = self
            .engine
            .store()
            .read_row_fresh("BOM", row)
            .await
            .unwrap();
        mdm_engine::RequestRecord::from_row(&values)
    }

    /// Write a cell on an assignee's row
    pub async fn set_child_cell(&self, table: &str, row: usize, column: &str, value: &str) {
        self.engine
            .store()
            .set_cell(table, row, column, CellValue::from(value), LockScope::Internal)
            .await
            .unwrap();
    }

    /// Drive a submission all the way to allocation; returns the outcome and
    /// the assignee table name.
    pub async fn submit_and_approve(&self, total_task: i64) -> (SubmitOutcome, String) {
        let outcome = self.submit_bom(total_task).await;
        self.requester_completes(&outcome.attachment).await;
        self.approver_acts(&outcome.attachment, 1, "Approved", "a@x").await;
        self.approver_acts(&outcome.attachment, 2, "Approved", "b@x").await;
        self.run_interval(&outcome.request_number).await;
        let record = self.master_record(&outcome.request_number).await;
        let assignee = record.processed_by.clone().expect("allocated");
        (outcome, assignee)
    }
}
