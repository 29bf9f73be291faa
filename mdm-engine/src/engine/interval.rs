//! Periodic advancement
//!
//! The interval handler drives a request through its approval chain: expiry,
//! level-by-level sync ingestion, rejection and send-back fast paths, and the
//! approved pipeline that baselines, allocates and mirrors the row. All of it
//! runs under the row's lease lock on a fresh read.

use super::RequestEngine;
use crate::approval::{LevelOutcome, SyncContext};
use crate::attachment::validation::{validate_sheets, RowValidation};
use crate::attachment::count_tasks;
use crate::audit::RequestEvent;
use crate::error::EngineResult;
use crate::locks::LockLease;
use crate::model::{
    columns, ApprovalLevel, ApproverStatus, CellValue, RequestRecord, RequesterStatus,
    SendBackActor,
};
use crate::notify::Notification;
use crate::scheduling::business_hours::business_days_elapsed;
use crate::store::LockScope;

impl RequestEngine {
    /// Advance one request. `scheduled_request_number` is re-checked
    /// against the row inside the lock; a mismatch means the row was
    /// reindexed and the pass aborts.
    pub async fn handle_on_interval(
        &self,
        table: &str,
        row: usize,
        scheduled_request_number: &str,
    ) -> EngineResult<()> {
        // Configured priority weight steers how aggressively this pass
        // retries the row lock; the snapshot is only used for that.
        let priority = match self.store.read_row(table, row).await {
            Ok(values) => match RequestRecord::from_row(&values).request_type {
                Some(t) => self
                    .catalog
                    .priority_weight(&t.to_string())
                    .await
                    .unwrap_or(1),
                None => 1,
            },
            Err(_) => 1,
        };

        let engine = self.clone();
        let table_owned = table.to_string();
        let scheduled = scheduled_request_number.to_string();
        self.locks
            .with_row_lock_at(table, row, "on-interval", priority, move |lease| async move {
                engine
                    .interval_locked(&table_owned, row, &scheduled, &lease)
                    .await
            })
            .await
    }

    async fn interval_locked(
        &self,
        table: &str,
        row: usize,
        scheduled: &str,
        lease: &LockLease,
    ) -> EngineResult<()> {
        let values = self.store.read_row_fresh(table, row).await?;
        let mut record = RequestRecord::from_row(&values);

        if record.request_number.as_deref() != Some(scheduled) {
            tracing::debug!(
                table,
                row,
                scheduled,
                actual = record.request_number.as_deref().unwrap_or(""),
                "row reindexed since scheduling, aborting pass"
            );
            return Ok(());
        }
        let request_number = scheduled.to_string();
        let Some(attachment) = record.attachment.clone() else {
            return Ok(());
        };
        let Some(request_type) = record.request_type else {
            tracing::warn!(request = %request_number, "row carries no usable request type");
            return Ok(());
        };

        // Closed rows never re-enter the chain.
        if matches!(
            record.requester_status(),
            Some(RequesterStatus::Expired) | Some(RequesterStatus::Invalid)
        ) {
            return Ok(());
        }

        // Expiry precedes any sync work.
        if let Some(submitted) = record.timestamp {
            let age = business_days_elapsed(submitted, self.clock.now(), self.calendar.as_ref());
            let in_review = record.requester_status() == Some(RequesterStatus::NeedReview);
            if age >= self.config.workday.expired_day_limit
                && !in_review
                && record.processed_by.is_none()
            {
                return self
                    .expire_locked(table, row, &request_number, &attachment)
                    .await;
            }
        }

        let headers = self.store.read_headers(table).await?;
        let levels_present: Vec<ApprovalLevel> = ApprovalLevel::all()
            .filter(|l| headers.iter().any(|h| h == l.status_column()))
            .collect();
        let terminal = *levels_present.last().unwrap_or(&ApprovalLevel::REQUESTER);

        let config_unit = record.config_unit();
        let department = record
            .department
            .clone()
            .unwrap_or_else(|| "GENERAL".to_string());
        let rtype_wire = request_type.to_string();

        for level in levels_present.clone() {
            lease.beat();
            let outcome = {
                let ctx = SyncContext {
                    record: &record,
                    headers: &headers,
                    attachment: &attachment,
                    business_unit: &config_unit,
                    department: &department,
                    request_type: &rtype_wire,
                };
                self.sync.sync_level(&ctx, level).await?
            };

            match outcome {
                LevelOutcome::MissingColumn => break,
                LevelOutcome::AlreadyIngested => {
                    // A rejection already on the row ends the chain.
                    if matches!(record.level(level).status.as_deref(), Some("Rejected")) {
                        return Ok(());
                    }
                    continue;
                }
                LevelOutcome::Pending { is_approver } => {
                    if is_approver {
                        self.ask_approval_once(
                            table,
                            row,
                            &mut record,
                            level,
                            &request_number,
                            &config_unit,
                            &department,
                            &rtype_wire,
                        )
                        .await?;
                    }
                    return Ok(());
                }
                LevelOutcome::Invalid => {
                    self.notify(&Notification::InvalidSync {
                        request_number: request_number.clone(),
                        level,
                    })
                    .await;
                    self.audit
                        .record(&request_number, RequestEvent::InvalidSync { level });
                    return Ok(());
                }
                LevelOutcome::Actioned { status, name, .. } => {
                    if level.is_requester() {
                        let requester_status: RequesterStatus = Self::parse_status(&status)?;
                        match requester_status {
                            RequesterStatus::Completed => {
                                let sheets = self.attachments.task_sheets(&attachment).await?;
                                let failures = validate_sheets(&sheets);
                                if !failures.is_empty() {
                                    let reason = describe_failures(&failures);
                                    self.send_back_locked(
                                        table,
                                        row,
                                        &mut record,
                                        &request_number,
                                        &attachment,
                                        SendBackActor::System,
                                        &reason,
                                    )
                                    .await?;
                                    return Ok(());
                                }
                                self.ingest_level(table, row, &mut record, level, &status, &name)
                                    .await?;
                            }
                            RequesterStatus::NeedReview => return Ok(()),
                            RequesterStatus::Expired | RequesterStatus::Invalid => {
                                self.ingest_level(table, row, &mut record, level, &status, &name)
                                    .await?;
                                return Ok(());
                            }
                        }
                    } else {
                        let approver_status: ApproverStatus = Self::parse_status(&status)?;
                        match approver_status {
                            ApproverStatus::Approved | ApproverStatus::PartiallyRejected => {
                                self.ingest_level(table, row, &mut record, level, &status, &name)
                                    .await?;
                                if level == terminal {
                                    break;
                                }
                            }
                            ApproverStatus::Rejected => {
                                self.ingest_level(table, row, &mut record, level, &status, &name)
                                    .await?;
                                self.attachments.protect(&attachment).await?;
                                self.notify(&Notification::Rejected {
                                    request_number: request_number.clone(),
                                    level,
                                    actor: name.clone(),
                                })
                                .await;
                                self.audit.record(
                                    &request_number,
                                    RequestEvent::Rejected { level, name },
                                );
                                return Ok(());
                            }
                            ApproverStatus::SendBack => {
                                let reason = self
                                    .attachments
                                    .read_cell(&attachment, &level.notes_cell())
                                    .await?
                                    .render();
                                self.send_back_locked(
                                    table,
                                    row,
                                    &mut record,
                                    &request_number,
                                    &attachment,
                                    SendBackActor::Approver,
                                    &reason,
                                )
                                .await?;
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }

        if chain_approved(&record, &levels_present) && record.processed_by.is_none() {
            self.approved_pipeline_locked(
                table,
                row,
                &mut record,
                &request_number,
                &attachment,
                lease,
            )
            .await?;
        }
        Ok(())
    }

    /// Send the approval request email once, guarded by the ask cell
    #[allow(clippy::too_many_arguments)]
    async fn ask_approval_once(
        &self,
        table: &str,
        row: usize,
        record: &mut RequestRecord,
        level: ApprovalLevel,
        request_number: &str,
        business_unit: &str,
        department: &str,
        request_type: &str,
    ) -> EngineResult<()> {
        let Some(ask_column) = level.ask_status_column() else {
            return Ok(());
        };
        let idx = (level.index() - 1) as usize;
        if record.ask_approver_status[idx].is_some() {
            return Ok(());
        }
        let approvers = self
            .catalog
            .approvers(business_unit, department, request_type, level.index(), true)
            .await?;
        let delivered = self
            .notify(&Notification::AskApproval {
                request_number: request_number.to_string(),
                level,
                approvers,
            })
            .await;
        if !delivered {
            tracing::warn!(request = request_number, %level, "approval request undelivered");
        }
        let stamp = self.clock.now();
        self.store
            .set_cell(
                table,
                row,
                ask_column,
                CellValue::from(stamp),
                LockScope::CallerHeld,
            )
            .await?;
        record.ask_approver_status[idx] = Some(stamp.to_rfc3339());
        Ok(())
    }

    /// Write one level's action onto the row
    async fn ingest_level(
        &self,
        table: &str,
        row: usize,
        record: &mut RequestRecord,
        level: ApprovalLevel,
        status: &str,
        name: &str,
    ) -> EngineResult<()> {
        let now = self.clock.now();
        self.store
            .set_cells(
                table,
                row,
                &[
                    (level.status_column(), CellValue::from(status)),
                    (level.name_column(), CellValue::from(name)),
                    (level.timestamp_column(), CellValue::from(now)),
                ],
                LockScope::CallerHeld,
            )
            .await?;
        let slot = record.level_mut(level);
        slot.status = Some(status.to_string());
        slot.name = Some(name.to_string());
        slot.timestamp = Some(now);
        if let Some(request_number) = &record.request_number {
            self.audit.record(
                request_number,
                RequestEvent::LevelIngested {
                    level,
                    status: status.to_string(),
                    name: name.to_string(),
                },
            );
        }
        Ok(())
    }

    /// Approved pipeline: baseline, allocate, count workload, protect and
    /// mirror
    async fn approved_pipeline_locked(
        &self,
        table: &str,
        row: usize,
        record: &mut RequestRecord,
        request_number: &str,
        attachment: &str,
        lease: &LockLease,
    ) -> EngineResult<()> {
        let Some(request_type) = record.request_type else {
            return Ok(());
        };
        let rtype_wire = request_type.to_string();

        // 1. Task count, read off the attachment when the row has none.
        let mut total_task = record.total_task.unwrap_or(0);
        if total_task == 0 {
            let sheets = self.attachments.task_sheets(attachment).await?;
            total_task = count_tasks(&sheets);
            if total_task > 0 {
                self.store
                    .set_cell(
                        table,
                        row,
                        columns::TOTAL_TASK,
                        CellValue::from(total_task),
                        LockScope::CallerHeld,
                    )
                    .await?;
                record.total_task = Some(total_task);
            }
        }
        if total_task == 0 {
            tracing::warn!(request = request_number, "approved with no tasks, aborting");
            let level = ApprovalLevel::REQUESTER;
            self.store
                .set_cells(
                    table,
                    row,
                    &[
                        (level.status_column(), CellValue::Empty),
                        (level.name_column(), CellValue::Empty),
                        (level.timestamp_column(), CellValue::Empty),
                    ],
                    LockScope::CallerHeld,
                )
                .await?;
            *record.level_mut(level) = Default::default();
            self.notify(&Notification::NoTasks {
                request_number: request_number.to_string(),
            })
            .await;
            return Ok(());
        }

        // 2. Baseline; a missing rule means no estimate, not an error.
        let mut estimated = 0;
        if let Some(rule) = self.catalog.baseline(&rtype_wire, total_task).await? {
            estimated = if rule.per_task {
                rule.seconds * total_task
            } else {
                rule.seconds
            };
            self.store
                .set_cells(
                    table,
                    row,
                    &[
                        (columns::BASELINE, CellValue::from(rule.seconds)),
                        (columns::ESTIMATED_TIME, CellValue::from(estimated)),
                    ],
                    LockScope::CallerHeld,
                )
                .await?;
            record.baseline = Some(rule.seconds);
            record.estimated_time = Some(estimated);
        }

        lease.beat();

        // 3. Allocation.
        let config_unit = record.config_unit();
        let department = record
            .department
            .clone()
            .unwrap_or_else(|| "GENERAL".to_string());
        let agent = self
            .allocator
            .allocate(&config_unit, &department, &rtype_wire)
            .await?;
        self.store
            .set_cell(
                table,
                row,
                columns::PROCESSED_BY,
                CellValue::from(agent.clone()),
                LockScope::CallerHeld,
            )
            .await?;
        record.processed_by = Some(agent.clone());
        self.audit.record(
            request_number,
            RequestEvent::Allocated {
                agent: agent.clone(),
            },
        );

        // 4. Workload seconds.
        if estimated > 0 {
            self.workload.add(&agent, estimated).await?;
        }

        // 5. Protect, notify, mirror the full row (detail columns included).
        self.attachments.protect(attachment).await?;
        self.notify(&Notification::Approved {
            request_number: request_number.to_string(),
            assignee: agent.clone(),
        })
        .await;
        let full_row = self.store.read_row_fresh(table, row).await?;
        self.mirror_to_assignee(&agent, &full_row).await?;
        tracing::info!(request = request_number, agent = %agent, "approved and allocated");
        Ok(())
    }

    /// Send-back: clear the chain, reset the requester and notify
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn send_back_locked(
        &self,
        table: &str,
        row: usize,
        record: &mut RequestRecord,
        request_number: &str,
        attachment: &str,
        actor: SendBackActor,
        reason: &str,
    ) -> EngineResult<()> {
        let headers = self.store.read_headers(table).await?;
        let anchor = headers
            .iter()
            .position(|h| h == columns::NEW_SUBMISSION_STATUS);
        if let Some(anchor) = anchor {
            if let Some(first_after) = headers.get(anchor + 1) {
                let first_after = first_after.clone();
                self.store
                    .clear_range(table, row, &first_after, None, LockScope::CallerHeld)
                    .await?;
            }
        }

        // The rewound request also sheds its execution state.
        let execution_reset: Vec<(&str, CellValue)> = [
            columns::BASELINE,
            columns::ESTIMATED_TIME,
            columns::ESTIMATED_TIME_FINISHED,
            columns::PROCESSED_BY,
            columns::PROCESS_STATUS,
            columns::TAKEN_DATE,
            columns::PROCESSED_DATE,
            columns::FEEDBACK_STATUS,
        ]
        .iter()
        .map(|col| (*col, CellValue::Empty))
        .collect();
        self.store
            .set_cells(table, row, &execution_reset, LockScope::CallerHeld)
            .await?;

        let send_back_count = record.system_sent_back_count + 1;
        let delivered = self
            .notify(&Notification::SendBack {
                request_number: request_number.to_string(),
                actor,
                reason: reason.to_string(),
            })
            .await;
        let email_count = record.system_sent_back_email_count + if delivered { 1 } else { 0 };

        self.store
            .set_cells(
                table,
                row,
                &[
                    (
                        ApprovalLevel::REQUESTER.status_column(),
                        CellValue::from(RequesterStatus::NeedReview.to_string()),
                    ),
                    (columns::SYSTEM_SENT_BACK_COUNT, CellValue::from(send_back_count)),
                    (
                        columns::SYSTEM_SENT_BACK_EMAIL_STATUS,
                        CellValue::from(email_count),
                    ),
                ],
                LockScope::CallerHeld,
            )
            .await?;

        // The requester gets the attachment back, with a clean chain.
        self.attachments.unprotect(attachment).await?;
        for level in ApprovalLevel::all() {
            self.attachments
                .clear_cell(attachment, &level.status_cell())
                .await?;
            self.attachments
                .clear_cell(attachment, &level.name_cell())
                .await?;
            self.attachments
                .clear_cell(attachment, &level.notes_cell())
                .await?;
        }

        // Refresh the in-memory view to match the cleared row.
        for level in ApprovalLevel::all() {
            *record.level_mut(level) = Default::default();
        }
        record.level_mut(ApprovalLevel::REQUESTER).status =
            Some(RequesterStatus::NeedReview.to_string());
        record.ask_approver_status = Default::default();
        record.system_sent_back_count = send_back_count;
        record.system_sent_back_email_count = email_count;
        record.baseline = None;
        record.estimated_time = None;
        record.estimated_time_finished = None;
        record.processed_by = None;
        record.process_status = None;
        record.taken_date = None;
        record.processed_date = None;
        record.feedback_status = None;

        self.audit.record(
            request_number,
            RequestEvent::SendBack {
                actor,
                reason: reason.to_string(),
            },
        );
        tracing::info!(request = request_number, %actor, "request sent back");
        Ok(())
    }

    /// Expire a request that aged out while waiting on its chain
    async fn expire_locked(
        &self,
        table: &str,
        row: usize,
        request_number: &str,
        attachment: &str,
    ) -> EngineResult<()> {
        let level = ApprovalLevel::REQUESTER;
        self.store
            .set_cells(
                table,
                row,
                &[
                    (
                        level.status_column(),
                        CellValue::from(RequesterStatus::Expired.to_string()),
                    ),
                    (level.timestamp_column(), CellValue::from(self.clock.now())),
                ],
                LockScope::CallerHeld,
            )
            .await?;
        self.attachments.protect(attachment).await?;
        self.notify(&Notification::Expired {
            request_number: request_number.to_string(),
        })
        .await;
        self.audit.record(request_number, RequestEvent::Expired);
        tracing::info!(request = request_number, "request expired");
        Ok(())
    }
}

/// Every applicable level approved (or auto-approved) and the requester
/// completed.
fn chain_approved(record: &RequestRecord, levels_present: &[ApprovalLevel]) -> bool {
    if record.requester_status() != Some(RequesterStatus::Completed) {
        return false;
    }
    levels_present
        .iter()
        .filter(|l| !l.is_requester())
        .all(|l| {
            matches!(
                record.level(*l).status.as_deref(),
                Some("Approved") | Some("Partially Rejected")
            )
        })
}

fn describe_failures(failures: &[RowValidation]) -> String {
    failures
        .iter()
        .map(|f| {
            let mut parts = Vec::new();
            if !f.empty_columns.is_empty() {
                parts.push(format!("empty: {}", f.empty_columns.join(", ")));
            }
            if !f.invalid_columns.is_empty() {
                parts.push(format!("invalid: {}", f.invalid_columns.join(", ")));
            }
            format!("{} row {} ({})", f.sheet, f.row, parts.join("; "))
        })
        .collect::<Vec<_>>()
        .join(" | ")
}
