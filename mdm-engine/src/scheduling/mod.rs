//! Periodic sweeps
//!
//! One poller per master table walks rows in descending index order (append
//! races shift indices upward, never downward), re-checks each row against a
//! needs-advancement predicate and hands it to the engine under its row lock.
//! Sweeps run against a time budget and stop cleanly when it is exhausted;
//! idempotent handlers mean the next tick resumes without losing progress.

pub mod business_hours;
pub mod calendar;

use crate::engine::RequestEngine;
use crate::error::EngineResult;
use crate::model::{ApprovalLevel, RequestRecord, RequesterStatus};
use std::time::Instant;

/// Outcome of one sweep over one table
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub table: String,
    pub scanned: usize,
    pub advanced: usize,
    pub submits_retried: usize,
    pub send_back_emails_retried: usize,
    pub failed: usize,
    pub budget_exhausted: bool,
}

/// Periodic poller over the engine's tables
#[derive(Clone)]
pub struct Scheduler {
    engine: RequestEngine,
}

impl Scheduler {
    pub fn new(engine: RequestEngine) -> Self {
        Self { engine }
    }

    /// Sweep one master table once
    pub async fn sweep_table(&self, table: &str) -> EngineResult<SweepReport> {
        let started = Instant::now();
        let budget = self.engine.config().scheduler.sweep_budget;
        let mut report = SweepReport {
            table: table.to_string(),
            ..SweepReport::default()
        };

        let headers = self.engine.store().read_headers(table).await?;
        let count = self.engine.store().row_count(table).await?;
        for row in (0..count).rev() {
            if started.elapsed() > budget {
                report.budget_exhausted = true;
                break;
            }
            report.scanned += 1;

            let values = match self.engine.store().read_row(table, row).await {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(table, row, %err, "sweep skipped unreadable row");
                    report.failed += 1;
                    continue;
                }
            };
            let record = RequestRecord::from_row(&values);

            if needs_submit_retry(
                &record,
                self.engine.clock.now(),
                self.engine.config().scheduler.submit_retry_after,
            ) {
                match self.engine.handle_on_submit(table, row).await {
                    Ok(_) => report.submits_retried += 1,
                    Err(err) => {
                        tracing::warn!(table, row, %err, "submission retry failed");
                        report.failed += 1;
                    }
                }
                continue;
            }

            if let Some(request_number) = needs_advancement(&record, &headers) {
                match self
                    .engine
                    .handle_on_interval(table, row, &request_number)
                    .await
                {
                    Ok(()) => report.advanced += 1,
                    Err(err) => {
                        tracing::warn!(table, row, %err, "interval pass failed");
                        report.failed += 1;
                    }
                }
            }

            if record.system_sent_back_count > record.system_sent_back_email_count {
                match self.engine.retry_send_back_email(table, row).await {
                    Ok(()) => report.send_back_emails_retried += 1,
                    Err(err) => {
                        tracing::warn!(table, row, %err, "send-back email retry failed");
                        report.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            table = %report.table,
            scanned = report.scanned,
            advanced = report.advanced,
            submits_retried = report.submits_retried,
            failed = report.failed,
            budget_exhausted = report.budget_exhausted,
            "sweep finished"
        );
        Ok(report)
    }

    /// Repair pass over every known assignee table
    pub async fn sweep_children(&self) -> EngineResult<Vec<SweepReport>> {
        let mut reports = Vec::new();
        for table in self.engine.assignee_tables() {
            let started = Instant::now();
            let budget = self.engine.config().scheduler.sweep_budget;
            let mut report = SweepReport {
                table: table.clone(),
                ..SweepReport::default()
            };
            let count = self.engine.store().row_count(&table).await?;
            for row in (0..count).rev() {
                if started.elapsed() > budget {
                    report.budget_exhausted = true;
                    break;
                }
                report.scanned += 1;
                match self.engine.handle_on_child_interval(&table, row).await {
                    Ok(()) => report.advanced += 1,
                    Err(err) => {
                        tracing::warn!(table = %table, row, %err, "child repair failed");
                        report.failed += 1;
                    }
                }
            }
            reports.push(report);
        }
        Ok(reports)
    }

    /// Spawn the periodic loops: one per master table plus the child repair
    /// loop. The returned handles are aborted on shutdown.
    pub fn spawn(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        let interval = self.engine.config().scheduler.sweep_interval;

        for table in self.engine.config().scheduler.master_tables.clone() {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if let Err(err) = scheduler.sweep_table(&table).await {
                        tracing::error!(table = %table, %err, "sweep errored");
                    }
                }
            }));
        }

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = scheduler.sweep_children().await {
                    tracing::error!(%err, "child sweep errored");
                }
            }
        }));

        handles
    }
}

/// A row needs advancement iff its request number and attachment are set and
/// either the requester is still empty or in review, or some present level's
/// status cell is empty with no earlier rejection and the request has not
/// reached `Expired`/`Invalid`.
pub fn needs_advancement(record: &RequestRecord, headers: &[String]) -> Option<String> {
    let request_number = record.request_number.clone()?;
    record.attachment.as_ref()?;

    if matches!(
        record.requester_status(),
        Some(RequesterStatus::Expired) | Some(RequesterStatus::Invalid)
    ) {
        return None;
    }
    let requester = record.level(ApprovalLevel::REQUESTER);
    if requester.status.is_none() || record.requester_status() == Some(RequesterStatus::NeedReview)
    {
        return Some(request_number);
    }

    for level in ApprovalLevel::approvers() {
        if !headers.iter().any(|h| h == level.status_column()) {
            break;
        }
        match record.level(level).status.as_deref() {
            None => return Some(request_number),
            Some("Rejected") => return None,
            Some(_) => continue,
        }
    }
    None
}

/// A submission left incomplete past the retry window gets re-submitted
fn needs_submit_retry(
    record: &RequestRecord,
    now: chrono::DateTime<chrono::Utc>,
    retry_after: std::time::Duration,
) -> bool {
    let Some(timestamp) = record.timestamp else {
        return false;
    };
    if record.request_number.is_some() && record.attachment.is_some() {
        return false;
    }
    (now - timestamp).to_std().map(|age| age > retry_after).unwrap_or(false)
}
