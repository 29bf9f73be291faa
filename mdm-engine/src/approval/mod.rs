//! Approval synchronization
//!
//! The per-tick reconciler between the external attachment cells and the
//! internal row state. Each level is examined in ascending order; the
//! internal row is authoritative once it carries an action, a clean pair of
//! empty cells is pending, and a half-filled or unparseable pair is invalid
//! and gets cleared. Ingestion of the outcome is the orchestrator's job.

use crate::attachment::AttachmentStore;
use crate::catalog::Catalog;
use crate::constants::NO_APPROVER;
use crate::error::EngineResult;
use crate::model::{ApprovalLevel, ApproverStatus, RequestRecord, RequesterStatus};
use std::str::FromStr;
use std::sync::Arc;

/// What one level's sync pass found
#[derive(Debug, Clone, PartialEq)]
pub enum LevelOutcome {
    /// The table carries no column for this level; the request type has
    /// fewer levels and the chain ends here.
    MissingColumn,
    /// The internal row already holds this level's action; it is
    /// authoritative and nothing is read from the attachment.
    AlreadyIngested,
    /// Both external cells are clean and empty
    Pending {
        /// Whether the level has configured approvers
        is_approver: bool,
    },
    /// The external status cell was set without a name, or held a value
    /// outside the level's enumerated set; the cell has been cleared.
    Invalid,
    /// An action is ready for ingestion
    Actioned {
        status: String,
        name: String,
        is_approver: bool,
    },
}

/// Everything a level sync needs to know about the row it serves
pub struct SyncContext<'a> {
    pub record: &'a RequestRecord,
    pub headers: &'a [String],
    pub attachment: &'a str,
    pub business_unit: &'a str,
    pub department: &'a str,
    pub request_type: &'a str,
}

/// Per-level reconciler
#[derive(Clone)]
pub struct ApprovalSync {
    catalog: Catalog,
    attachments: Arc<dyn AttachmentStore>,
}

impl ApprovalSync {
    pub fn new(catalog: Catalog, attachments: Arc<dyn AttachmentStore>) -> Self {
        Self {
            catalog,
            attachments,
        }
    }

    /// Reconcile one level. Levels must be fed in ascending order; a
    /// `Rejected` or `Send Back` outcome short-circuits the rest of the
    /// chain at the caller.
    pub async fn sync_level(
        &self,
        ctx: &SyncContext<'_>,
        level: ApprovalLevel,
    ) -> EngineResult<LevelOutcome> {
        if !ctx.headers.iter().any(|h| h == level.status_column()) {
            return Ok(LevelOutcome::MissingColumn);
        }

        let mut is_approver = false;
        if !level.is_requester() {
            let approvers = self
                .catalog
                .approvers(
                    ctx.business_unit,
                    ctx.department,
                    ctx.request_type,
                    level.index(),
                    true,
                )
                .await?;
            if approvers.is_empty() {
                // Auto-approved level: synthesize the action.
                return Ok(LevelOutcome::Actioned {
                    status: ApproverStatus::Approved.to_string(),
                    name: NO_APPROVER.to_string(),
                    is_approver: false,
                });
            }
            is_approver = true;
        }

        if ctx.record.level(level).is_actioned() {
            return Ok(LevelOutcome::AlreadyIngested);
        }

        let status_cell = level.status_cell();
        let status = self
            .attachments
            .read_cell(ctx.attachment, &status_cell)
            .await?;
        let name = self
            .attachments
            .read_cell(ctx.attachment, &level.name_cell())
            .await?;

        if status.is_empty() && name.is_empty() {
            return Ok(LevelOutcome::Pending { is_approver });
        }

        let status_text = status.render();
        let valid_status = if level.is_requester() {
            RequesterStatus::from_str(&status_text).is_ok()
        } else {
            ApproverStatus::from_str(&status_text).is_ok()
        };

        if status.is_empty() || name.is_empty() || !valid_status {
            tracing::warn!(
                attachment = ctx.attachment,
                %level,
                status = %status_text,
                "invalid sync state, clearing status cell"
            );
            self.attachments
                .clear_cell(ctx.attachment, &status_cell)
                .await?;
            return Ok(LevelOutcome::Invalid);
        }

        Ok(LevelOutcome::Actioned {
            status: status_text,
            name: name.render(),
            is_approver,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::MemoryAttachmentStore;
    use crate::catalog::{cols, tables};
    use crate::locks::LockManager;
    use crate::model::{columns, CellValue, RequestType, RowValues};
    use crate::store::{MemoryBackend, RowStore, TableBackend};
    use crate::timebase::SystemClock;

    struct Fixture {
        sync: ApprovalSync,
        attachments: Arc<MemoryAttachmentStore>,
        attachment: String,
        headers: Vec<String>,
    }

    async fn fixture(approver_rows: &[(&str, &str, &str, &str, &str)]) -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
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
        backend.create_table(tables::BASELINE, &[]);
        backend.create_table(tables::WORK_ALLOCATION, &[]);
        backend.create_table(tables::DISTRIBUTION, &[]);
        backend.create_table(tables::PRIORITY_WEIGHT, &[]);
        for (bu, dept, rtype, level, approvers) in approver_rows {
            let mut row = RowValues::new();
            row.insert(cols::BUSINESS_UNIT.to_string(), CellValue::from(*bu));
            row.insert(cols::DEPARTMENT.to_string(), CellValue::from(*dept));
            row.insert(cols::REQUEST_TYPE.to_string(), CellValue::from(*rtype));
            row.insert(cols::LEVEL.to_string(), CellValue::from(*level));
            row.insert(cols::APPROVERS.to_string(), CellValue::from(*approvers));
            backend.seed_row(tables::APPROVERS, &row);
        }

        let locks = LockManager::new(Arc::new(SystemClock));
        let store = RowStore::new(backend as Arc<dyn TableBackend>, locks);
        let attachments = Arc::new(MemoryAttachmentStore::new());
        let attachment = attachments
            .clone_template(RequestType::BomCreate, "BU01")
            .await
            .unwrap();
        Fixture {
            sync: ApprovalSync::new(
                Catalog::new(store),
                Arc::clone(&attachments) as Arc<dyn AttachmentStore>,
            ),
            attachments,
            attachment,
            headers: columns::MASTER_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn ctx<'a>(f: &'a Fixture, record: &'a RequestRecord) -> SyncContext<'a> {
        SyncContext {
            record,
            headers: &f.headers,
            attachment: &f.attachment,
            business_unit: "BU01",
            department: "Merchandising",
            request_type: "BOM Create",
        }
    }

    #[tokio::test]
    async fn clean_cells_are_pending() {
        let f = fixture(&[("BU01", "ALL", "BOM Create", "1", "a@x")]).await;
        let record = RequestRecord::default();
        let outcome = f
            .sync
            .sync_level(&ctx(&f, &record), ApprovalLevel::new(1).unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, LevelOutcome::Pending { is_approver: true });
    }

    #[tokio::test]
    async fn unconfigured_level_auto_approves() {
        let f = fixture(&[("BU01", "ALL", "BOM Create", "1", "a@x")]).await;
        let record = RequestRecord::default();
        let outcome = f
            .sync
            .sync_level(&ctx(&f, &record), ApprovalLevel::new(2).unwrap())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            LevelOutcome::Actioned {
                status: "Approved".to_string(),
                name: NO_APPROVER.to_string(),
                is_approver: false,
            }
        );
    }

    #[tokio::test]
    async fn internal_state_is_authoritative() {
        let f = fixture(&[("BU01", "ALL", "BOM Create", "1", "a@x")]).await;
        let mut record = RequestRecord::default();
        let level = ApprovalLevel::new(1).unwrap();
        record.level_mut(level).status = Some("Approved".to_string());
        record.level_mut(level).name = Some("a@x".to_string());
        // external cells disagree; they must not even be consulted
        f.attachments
            .write_cell(&f.attachment, "D17", CellValue::from("Rejected"))
            .await
            .unwrap();
        let outcome = f.sync.sync_level(&ctx(&f, &record), level).await.unwrap();
        assert_eq!(outcome, LevelOutcome::AlreadyIngested);
    }

    #[tokio::test]
    async fn status_without_name_is_invalid_and_cleared() {
        let f = fixture(&[("BU01", "ALL", "BOM Create", "1", "a@x")]).await;
        f.attachments
            .write_cell(&f.attachment, "D17", CellValue::from("Approved"))
            .await
            .unwrap();
        let record = RequestRecord::default();
        let outcome = f
            .sync
            .sync_level(&ctx(&f, &record), ApprovalLevel::new(1).unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, LevelOutcome::Invalid);
        assert!(f.attachments.cell(&f.attachment, "D17").is_empty());
    }

    #[tokio::test]
    async fn out_of_set_status_is_invalid() {
        let f = fixture(&[("BU01", "ALL", "BOM Create", "1", "a@x")]).await;
        f.attachments
            .write_cell(&f.attachment, "D17", CellValue::from("Maybe"))
            .await
            .unwrap();
        f.attachments
            .write_cell(&f.attachment, "D18", CellValue::from("a@x"))
            .await
            .unwrap();
        let record = RequestRecord::default();
        let outcome = f
            .sync
            .sync_level(&ctx(&f, &record), ApprovalLevel::new(1).unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, LevelOutcome::Invalid);
    }

    #[tokio::test]
    async fn clean_action_is_returned_for_ingestion() {
        let f = fixture(&[("BU01", "ALL", "BOM Create", "1", "a@x")]).await;
        f.attachments
            .write_cell(&f.attachment, "D17", CellValue::from("Approved"))
            .await
            .unwrap();
        f.attachments
            .write_cell(&f.attachment, "D18", CellValue::from("a@x"))
            .await
            .unwrap();
        let record = RequestRecord::default();
        let outcome = f
            .sync
            .sync_level(&ctx(&f, &record), ApprovalLevel::new(1).unwrap())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            LevelOutcome::Actioned {
                status: "Approved".to_string(),
                name: "a@x".to_string(),
                is_approver: true,
            }
        );
    }
}
