//! Execution-phase edits
//!
//! Edits on an assignee's table drive the execution state machine: claiming a
//! task stamps the taken date and deadline, status changes are validated
//! against the closure invariants and mirrored back to the master table, and
//! a send-back rewinds the request through the MDM path. Invalid edits are
//! reverted and surfaced as a toast.

use super::RequestEngine;
use crate::audit::RequestEvent;
use crate::error::EngineResult;
use crate::model::{
    columns, CellValue, ProcessStatus, RequestRecord, RequesterStatus, SendBackActor,
};
use crate::notify::Notification;
use crate::scheduling::business_hours::add_working_seconds;
use crate::store::LockScope;
use std::str::FromStr;

/// An edit observed on an assignee table
#[derive(Debug, Clone)]
pub struct EditEvent {
    pub table: String,
    pub row: usize,
    pub column: String,
    pub old_value: String,
    pub user_email: String,
}

/// What became of the edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    /// Whether the edit stood; reverted edits restore the prior value
    pub accepted: bool,
    /// User-facing message surfaced at the edit boundary
    pub toast: Option<String>,
}

impl EditOutcome {
    fn accepted() -> Self {
        Self {
            accepted: true,
            toast: None,
        }
    }

    fn reverted(toast: &str) -> Self {
        Self {
            accepted: false,
            toast: Some(toast.to_string()),
        }
    }
}

impl RequestEngine {
    /// React to an edit on an assignee table
    pub async fn handle_on_edit(&self, event: EditEvent) -> EngineResult<EditOutcome> {
        let engine = self.clone();
        let table = event.table.clone();
        let row = event.row;
        self.locks
            .with_row_lock(&table, row, "on-edit", move |_lease| async move {
                engine.edit_locked(event).await
            })
            .await
    }

    async fn edit_locked(&self, event: EditEvent) -> EngineResult<EditOutcome> {
        let values = self.store.read_row_fresh(&event.table, event.row).await?;
        let mut record = RequestRecord::from_row(&values);

        if event.column == columns::PROCESSED_BY {
            return self.claim_locked(&event, &mut record).await;
        }
        if event.column == columns::PROCESS_STATUS {
            let new_raw = values
                .get(columns::PROCESS_STATUS)
                .map(|v| v.render())
                .unwrap_or_default();
            return self.status_change_locked(&event, &mut record, &new_raw).await;
        }
        Ok(EditOutcome::accepted())
    }

    /// The assignee claimed the task: grant attachment access, stamp the
    /// taken date and compute the business-hour deadline.
    async fn claim_locked(
        &self,
        event: &EditEvent,
        record: &mut RequestRecord,
    ) -> EngineResult<EditOutcome> {
        if record.processed_by.is_none() {
            return Ok(EditOutcome::accepted());
        }
        if let Some(attachment) = &record.attachment {
            self.attachments
                .grant_edit(attachment, &event.user_email)
                .await?;
        }

        let taken = record.taken_date.unwrap_or_else(|| self.clock.now());
        let mut updates = vec![(columns::TAKEN_DATE, CellValue::from(taken))];
        if let Some(estimated) = record.estimated_time {
            let finished = add_working_seconds(
                taken,
                estimated,
                &self.config.workday,
                self.calendar.as_ref(),
            );
            updates.push((columns::ESTIMATED_TIME_FINISHED, CellValue::from(finished)));
            record.estimated_time_finished = Some(finished);
        }
        self.store
            .set_cells(&event.table, event.row, &updates, LockScope::CallerHeld)
            .await?;
        record.taken_date = Some(taken);

        self.mirror_to_master(record).await?;
        tracing::info!(
            request = record.request_number.as_deref().unwrap_or(""),
            assignee = %event.user_email,
            "task claimed"
        );
        Ok(EditOutcome::accepted())
    }

    async fn status_change_locked(
        &self,
        event: &EditEvent,
        record: &mut RequestRecord,
        new_raw: &str,
    ) -> EngineResult<EditOutcome> {
        let old_status = ProcessStatus::from_str(&event.old_value).ok();

        // Cleared cell: nothing to validate, nothing to mirror.
        if new_raw.trim().is_empty() {
            return Ok(EditOutcome::accepted());
        }

        let Ok(new_status) = ProcessStatus::from_str(new_raw) else {
            self.revert_status(event).await?;
            return Ok(EditOutcome::reverted("Unknown status value"));
        };

        // A sent back task only stays sent back.
        if old_status == Some(ProcessStatus::SendBack) && new_status != ProcessStatus::SendBack {
            self.revert_status(event).await?;
            return Ok(EditOutcome::reverted(
                "A sent back task cannot change status",
            ));
        }
        // Closure requires a taken date.
        if new_status == ProcessStatus::Completed && record.taken_date.is_none() {
            self.revert_status(event).await?;
            return Ok(EditOutcome::reverted(
                "Cannot set status to Completed without a Taken Date",
            ));
        }
        // Terminal states never reopen.
        if old_status.map(ProcessStatus::is_terminal).unwrap_or(false)
            && new_status == ProcessStatus::OnGoing
        {
            self.revert_status(event).await?;
            return Ok(EditOutcome::reverted("Cannot reopen a closed task"));
        }

        if let Some(request_number) = record.request_number.clone() {
            self.audit.record(
                &request_number,
                RequestEvent::StatusChanged {
                    from: event.old_value.clone(),
                    to: new_status.to_string(),
                },
            );
        }

        if new_status == ProcessStatus::SendBack {
            self.mdm_send_back(event, record).await?;
            return Ok(EditOutcome::accepted());
        }

        if new_status != ProcessStatus::OnGoing && record.taken_date.is_some() {
            let mut updates = Vec::new();
            let already_notified = record.processed_date.is_some();
            if record.processed_date.is_none() {
                let now = self.clock.now();
                updates.push((columns::PROCESSED_DATE, CellValue::from(now)));
                record.processed_date = Some(now);
            }
            if record.feedback_status.is_none() {
                updates.push((
                    columns::FEEDBACK_STATUS,
                    CellValue::from("Waiting Feedback"),
                ));
                record.feedback_status = Some("Waiting Feedback".to_string());
            }
            if !updates.is_empty() {
                self.store
                    .set_cells(&event.table, event.row, &updates, LockScope::CallerHeld)
                    .await?;
            }
            if !already_notified {
                if let Some(request_number) = &record.request_number {
                    self.notify(&Notification::Processed {
                        request_number: request_number.clone(),
                        status: new_status.to_string(),
                    })
                    .await;
                }
            }
        }

        self.mirror_to_master(record).await?;
        Ok(EditOutcome::accepted())
    }

    async fn revert_status(&self, event: &EditEvent) -> EngineResult<()> {
        self.store
            .set_cell(
                &event.table,
                event.row,
                columns::PROCESS_STATUS,
                CellValue::from(event.old_value.as_str()),
                LockScope::CallerHeld,
            )
            .await
    }

    /// The assignee sent the request back: rewind the master row, drop the
    /// assignee's copy and notify.
    async fn mdm_send_back(
        &self,
        event: &EditEvent,
        record: &mut RequestRecord,
    ) -> EngineResult<()> {
        let Some(request_number) = record.request_number.clone() else {
            return Ok(());
        };
        let Some(request_type) = record.request_type else {
            return Ok(());
        };
        let master_table = request_type.master_table();
        let Some(master_row) = self.store.find_row(master_table, &request_number).await? else {
            tracing::warn!(request = %request_number, "send-back with no master row");
            return Ok(());
        };

        let engine = self.clone();
        let reason = format!("sent back during execution by {}", event.user_email);
        let request_number_owned = request_number.clone();
        self.locks
            .with_row_lock(master_table, master_row, "mdm-send-back", move |_lease| async move {
                let values = engine.store.read_row_fresh(master_table, master_row).await?;
                let mut master_record = RequestRecord::from_row(&values);
                let Some(attachment) = master_record.attachment.clone() else {
                    return Ok(());
                };
                engine
                    .send_back_locked(
                        master_table,
                        master_row,
                        &mut master_record,
                        &request_number_owned,
                        &attachment,
                        SendBackActor::Mdm,
                        &reason,
                    )
                    .await
            })
            .await?;

        self.store.delete_row(&event.table, event.row).await?;
        tracing::info!(request = %request_number, "assignee row removed after send-back");
        Ok(())
    }

    /// Repair pass over an assignee row. Fixes state a transient failure
    /// left behind: a missing deadline, a missing feedback status, or a
    /// send-back that never reached the master row.
    pub async fn handle_on_child_interval(&self, table: &str, row: usize) -> EngineResult<()> {
        let engine = self.clone();
        let table_owned = table.to_string();
        self.locks
            .with_row_lock(table, row, "child-interval", move |_lease| async move {
                engine.child_repair_locked(&table_owned, row).await
            })
            .await
    }

    async fn child_repair_locked(&self, table: &str, row: usize) -> EngineResult<()> {
        let values = self.store.read_row_fresh(table, row).await?;
        let mut record = RequestRecord::from_row(&values);
        let mut mirrored = false;

        // Stuck send-back: the row should have been deleted already.
        if record.process_status == Some(ProcessStatus::SendBack) {
            let event = EditEvent {
                table: table.to_string(),
                row,
                column: columns::PROCESS_STATUS.to_string(),
                old_value: String::new(),
                user_email: record.processed_by.clone().unwrap_or_default(),
            };
            let master_reset = self.master_already_in_review(&record).await?;
            if master_reset {
                self.store.delete_row(table, row).await?;
            } else {
                self.mdm_send_back(&event, &mut record).await?;
            }
            return Ok(());
        }

        if record.taken_date.is_some()
            && record.estimated_time.is_some()
            && record.estimated_time_finished.is_none()
        {
            let finished = add_working_seconds(
                record.taken_date.unwrap_or_else(|| self.clock.now()),
                record.estimated_time.unwrap_or(0),
                &self.config.workday,
                self.calendar.as_ref(),
            );
            self.store
                .set_cell(
                    table,
                    row,
                    columns::ESTIMATED_TIME_FINISHED,
                    CellValue::from(finished),
                    LockScope::CallerHeld,
                )
                .await?;
            record.estimated_time_finished = Some(finished);
            mirrored = true;
        }

        if record
            .process_status
            .map(ProcessStatus::is_terminal)
            .unwrap_or(false)
            && record.feedback_status.is_none()
        {
            self.store
                .set_cell(
                    table,
                    row,
                    columns::FEEDBACK_STATUS,
                    CellValue::from("Waiting Feedback"),
                    LockScope::CallerHeld,
                )
                .await?;
            record.feedback_status = Some("Waiting Feedback".to_string());
            mirrored = true;
        }

        if mirrored {
            self.mirror_to_master(&record).await?;
        }
        Ok(())
    }

    async fn master_already_in_review(&self, record: &RequestRecord) -> EngineResult<bool> {
        let (Some(request_number), Some(request_type)) =
            (record.request_number.clone(), record.request_type)
        else {
            return Ok(true);
        };
        let master_table = request_type.master_table();
        let Some(master_row) = self.store.find_row(master_table, &request_number).await? else {
            return Ok(true);
        };
        let values = self.store.read_row(master_table, master_row).await?;
        let master = RequestRecord::from_row(&values);
        Ok(master.requester_status() == Some(RequesterStatus::NeedReview))
    }
}
