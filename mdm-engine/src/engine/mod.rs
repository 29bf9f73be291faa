//! Request orchestration
//!
//! [`RequestEngine`] is the composition root coupling submission, approval
//! sync, SLA baselines, allocation, execution and closure. Entry points:
//! [`RequestEngine::handle_on_submit`], [`RequestEngine::handle_on_interval`],
//! [`RequestEngine::handle_on_edit`] and
//! [`RequestEngine::handle_on_child_interval`]. Every mutation of a request
//! row happens under that row's lease lock, and every decision is made on a
//! fresh read inside the locked section.

mod edit;
mod interval;

pub use edit::{EditEvent, EditOutcome};

use crate::allocation::Allocator;
use crate::approval::ApprovalSync;
use crate::attachment::AttachmentStore;
use crate::audit::{AuditLog, RequestEvent};
use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::constants;
use crate::error::{EngineError, EngineResult};
use crate::locks::LockManager;
use crate::model::{
    columns, ApprovalLevel, CellValue, RequestRecord, RequestType, RowValues,
};
use crate::notify::{send_with_retry, Notification, Notifier};
use crate::scheduling::calendar::HolidayCalendar;
use crate::store::{LockScope, RowStore, TableBackend};
use crate::timebase::Clock;
use crate::workload::{PropertyStore, RequestNumberCounter, WorkloadRegistry};
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use std::str::FromStr;
use std::sync::Arc;

/// Result of a completed submission pass
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub request_number: String,
    pub attachment: String,
    pub timestamp: DateTime<Utc>,
}

/// The orchestrator
#[derive(Clone)]
pub struct RequestEngine {
    pub(crate) config: AppConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) locks: LockManager,
    pub(crate) store: RowStore,
    pub(crate) catalog: Catalog,
    pub(crate) sync: ApprovalSync,
    pub(crate) allocator: Allocator,
    pub(crate) workload: WorkloadRegistry,
    pub(crate) counter: RequestNumberCounter,
    pub(crate) attachments: Arc<dyn AttachmentStore>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) audit: AuditLog,
    pub(crate) calendar: Arc<dyn HolidayCalendar>,
    /// Assignee tables this engine has mirrored rows into
    pub(crate) assignee_tables: Arc<DashSet<String>>,
}

impl RequestEngine {
    /// Wire the engine together from its external boundaries
    pub fn new(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        backend: Arc<dyn TableBackend>,
        attachments: Arc<dyn AttachmentStore>,
        notifier: Arc<dyn Notifier>,
        properties: Arc<dyn PropertyStore>,
        calendar: Arc<dyn HolidayCalendar>,
    ) -> Self {
        let locks = LockManager::with_timings(
            Arc::clone(&clock),
            config.locking.lease,
            config.locking.stale_threshold,
            config.locking.default_wait,
        );
        let store = RowStore::new(backend, locks.clone());
        let catalog = Catalog::new(store.clone());
        let workload = WorkloadRegistry::new(store.clone());
        let allocator = Allocator::new(
            catalog.clone(),
            workload.clone(),
            config.allocation.clone(),
        );
        let sync = ApprovalSync::new(catalog.clone(), Arc::clone(&attachments));
        let counter =
            RequestNumberCounter::new(store.clone(), properties, locks.clone(), Arc::clone(&clock));
        let audit = AuditLog::new(Arc::clone(&clock));
        Self {
            config,
            clock,
            locks,
            store,
            catalog,
            sync,
            allocator,
            workload,
            counter,
            attachments,
            notifier,
            audit,
            calendar,
            assignee_tables: Arc::new(DashSet::new()),
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The row store the engine operates on
    pub fn store(&self) -> &RowStore {
        &self.store
    }

    /// The request audit trail
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The per-agent workload counter
    pub fn workload(&self) -> &WorkloadRegistry {
        &self.workload
    }

    /// Assignee tables the engine has mirrored rows into so far
    pub fn assignee_tables(&self) -> Vec<String> {
        self.assignee_tables.iter().map(|t| t.clone()).collect()
    }

    /// Complete a submitted row. Idempotent; a second pass over a finished
    /// submission changes nothing and sends nothing.
    pub async fn handle_on_submit(&self, table: &str, row: usize) -> EngineResult<SubmitOutcome> {
        let engine = self.clone();
        let table_owned = table.to_string();
        self.locks
            .with_row_lock(table, row, "on-submit", move |_lease| async move {
                engine.submit_locked(&table_owned, row).await
            })
            .await
    }

    async fn submit_locked(&self, table: &str, row: usize) -> EngineResult<SubmitOutcome> {
        let values = self.store.read_row_fresh(table, row).await?;
        let mut record = RequestRecord::from_row(&values);
        let mut updates: Vec<(&str, CellValue)> = Vec::new();

        // Defaults the ingress may have left blank.
        let request_type = match record.request_type {
            Some(t) => t,
            None => {
                let fallback = default_type_for_table(table).ok_or_else(|| {
                    EngineError::Configuration(format!("no default request type for {}", table))
                })?;
                updates.push((columns::REQUEST_TYPE, CellValue::from(fallback.to_string())));
                fallback
            }
        };
        if record.department.is_none() {
            record.department = Some("GENERAL".to_string());
            updates.push((columns::DEPARTMENT, CellValue::from("GENERAL")));
        }
        let timestamp = match record.timestamp {
            Some(t) => t,
            None => {
                let now = self.clock.now();
                updates.push((columns::TIMESTAMP, CellValue::from(now)));
                now
            }
        };
        let business_unit = record
            .business_unit
            .clone()
            .unwrap_or_else(|| "GENERAL".to_string());

        let request_number = match record.request_number.clone() {
            Some(n) => n,
            None => {
                let number = self
                    .counter
                    .next(request_type.abbreviation(), &business_unit)
                    .await;
                updates.push((columns::REQUEST_NUMBER, CellValue::from(number.clone())));
                number
            }
        };

        let attachment = match record.attachment.clone() {
            Some(a) => a,
            None => {
                let handle = self
                    .attachments
                    .clone_template(request_type, &business_unit)
                    .await?;
                self.attachments
                    .write_cell(
                        &handle,
                        constants::CELL_COMPANY_NAME,
                        CellValue::from(business_unit.clone()),
                    )
                    .await?;
                if let Some(email) = &record.email_address {
                    self.attachments
                        .write_cell(
                            &handle,
                            constants::CELL_REQUESTER_EMAIL,
                            CellValue::from(email.clone()),
                        )
                        .await?;
                }
                for level in ApprovalLevel::approvers() {
                    let approvers = self
                        .catalog
                        .approvers(
                            &record.config_unit(),
                            record.department.as_deref().unwrap_or("GENERAL"),
                            &request_type.to_string(),
                            level.index(),
                            true,
                        )
                        .await?;
                    if !approvers.is_empty() {
                        self.attachments
                            .grant_level_scope(&handle, level, &approvers)
                            .await?;
                    }
                }
                updates.push((columns::ATTACHMENT, CellValue::from(handle.clone())));
                handle
            }
        };

        if record.new_submission_status.is_none() {
            let requester = record.email_address.clone().unwrap_or_default();
            let delivered = send_with_retry(
                self.notifier.as_ref(),
                &Notification::NewRequest {
                    request_number: request_number.clone(),
                    requester: requester.clone(),
                },
            )
            .await;
            if !delivered {
                tracing::warn!(
                    request = %request_number,
                    "new-request notification undelivered, stamping anyway"
                );
            }
            // Stamp either way so the email is never sent twice.
            updates.push((
                columns::NEW_SUBMISSION_STATUS,
                CellValue::from(self.clock.now()),
            ));
            self.audit
                .record(&request_number, RequestEvent::Submitted { requester });
        }

        if !updates.is_empty() {
            self.store
                .set_cells(table, row, &updates, LockScope::CallerHeld)
                .await?;
        }

        tracing::info!(request = %request_number, table, row, "submission handled");
        Ok(SubmitOutcome {
            request_number,
            attachment,
            timestamp,
        })
    }

    /// Re-send the send-back email for a row whose send-back count ran ahead
    /// of its delivered emails.
    pub async fn retry_send_back_email(&self, table: &str, row: usize) -> EngineResult<()> {
        let engine = self.clone();
        let table_owned = table.to_string();
        self.locks
            .with_row_lock(table, row, "send-back-retry", move |_lease| async move {
                let values = engine.store.read_row_fresh(&table_owned, row).await?;
                let record = RequestRecord::from_row(&values);
                if record.system_sent_back_email_count >= record.system_sent_back_count {
                    return Ok(());
                }
                let Some(request_number) = record.request_number.clone() else {
                    return Ok(());
                };
                let delivered = send_with_retry(
                    engine.notifier.as_ref(),
                    &Notification::SendBack {
                        request_number: request_number.clone(),
                        actor: crate::model::SendBackActor::System,
                        reason: "send-back notification retry".to_string(),
                    },
                )
                .await;
                if delivered {
                    engine
                        .store
                        .set_cell(
                            &table_owned,
                            row,
                            columns::SYSTEM_SENT_BACK_EMAIL_STATUS,
                            CellValue::from(record.system_sent_back_email_count + 1),
                            LockScope::CallerHeld,
                        )
                        .await?;
                    tracing::info!(request = %request_number, "send-back email re-sent");
                }
                Ok(())
            })
            .await
    }

    /// Mirror a request row into its assignee's table, creating the table on
    /// first use.
    pub(crate) async fn mirror_to_assignee(
        &self,
        agent: &str,
        values: &RowValues,
    ) -> EngineResult<()> {
        self.store
            .ensure_table(agent, columns::MASTER_COLUMNS)
            .await?;
        self.assignee_tables.insert(agent.to_string());
        self.store.upsert_row(agent, values, true).await?;
        Ok(())
    }

    /// Mirror execution state from an assignee row back onto the master row
    pub(crate) async fn mirror_to_master(
        &self,
        record: &RequestRecord,
    ) -> EngineResult<()> {
        let Some(request_type) = record.request_type else {
            return Ok(());
        };
        self.store
            .upsert_row(request_type.master_table(), &record.to_row(), false)
            .await?;
        Ok(())
    }

    /// Send a notification, logging on final failure. Returns delivery.
    pub(crate) async fn notify(&self, notification: &Notification) -> bool {
        send_with_retry(self.notifier.as_ref(), notification).await
    }

    /// Parse a wire status string or surface a validation error
    pub(crate) fn parse_status<T: FromStr<Err = EngineError>>(value: &str) -> EngineResult<T> {
        T::from_str(value)
    }
}

/// Default request type assumed for bare rows of a master table
fn default_type_for_table(table: &str) -> Option<RequestType> {
    match table {
        "BOM" => Some(RequestType::BomCreate),
        "Pricing" => Some(RequestType::PricingCreate),
        "Promo" => Some(RequestType::PromoCreate),
        "Customer" => Some(RequestType::CustomerCreate),
        "Vendor" => Some(RequestType::VendorCreate),
        _ => None,
    }
}
