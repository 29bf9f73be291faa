//! Typed view of a request row
//!
//! [`RequestRecord`] is the canonical typed record over the dynamic
//! `column -> cell` map; conversion is lenient on read (unparseable optional
//! cells become `None`) and lossless on write.

use super::{columns, ApprovalLevel, CellValue, ProcessStatus, RequestType, RequesterStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Raw row contract of the tabular store
pub type RowValues = HashMap<String, CellValue>;

/// One approval level's slice of a row. Status is kept as the raw wire
/// string: the sync layer parses it and treats parse failure as an invalid
/// sync rather than a lost value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelRecord {
    /// Raw status wire string
    pub status: Option<String>,
    /// Email of the actor who took the action
    pub name: Option<String>,
    /// When the action was ingested
    pub timestamp: Option<DateTime<Utc>>,
}

impl LevelRecord {
    /// Whether both status and name are present
    pub fn is_actioned(&self) -> bool {
        self.status.is_some() && self.name.is_some()
    }
}

/// Canonical request row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestRecord {
    pub request_number: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub request_type: Option<RequestType>,
    pub department: Option<String>,
    pub business_unit: Option<String>,
    pub company_code: Option<String>,
    pub email_address: Option<String>,
    pub attachment: Option<String>,
    pub total_task: Option<i64>,
    pub baseline: Option<i64>,
    pub estimated_time: Option<i64>,
    pub estimated_time_finished: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
    pub process_status: Option<ProcessStatus>,
    pub taken_date: Option<DateTime<Utc>>,
    pub processed_date: Option<DateTime<Utc>>,
    pub feedback_status: Option<String>,
    /// Stamped when the new-request notification has been handled
    pub new_submission_status: Option<String>,
    /// Stamped when the approval request email for level 1..3 has been sent
    pub ask_approver_status: [Option<String>; 3],
    /// Levels 0..3 of the approval chain
    pub levels: [LevelRecord; 4],
    pub system_sent_back_count: i64,
    pub system_sent_back_email_count: i64,
}

impl RequestRecord {
    /// Read the typed record out of a raw row
    pub fn from_row(row: &RowValues) -> Self {
        let text = |col: &str| -> Option<String> {
            row.get(col).and_then(|v| v.as_text()).map(str::to_string)
        };
        let time = |col: &str| -> Option<DateTime<Utc>> { row.get(col).and_then(|v| v.as_time()) };
        let int = |col: &str| -> Option<i64> { row.get(col).and_then(|v| v.as_integer()) };

        let mut levels: [LevelRecord; 4] = Default::default();
        for level in ApprovalLevel::all() {
            levels[level.index() as usize] = LevelRecord {
                status: text(level.status_column()),
                name: text(level.name_column()),
                timestamp: time(level.timestamp_column()),
            };
        }

        let mut ask: [Option<String>; 3] = Default::default();
        for level in ApprovalLevel::approvers() {
            if let Some(col) = level.ask_status_column() {
                ask[(level.index() - 1) as usize] = text(col);
            }
        }

        Self {
            request_number: text(columns::REQUEST_NUMBER),
            timestamp: time(columns::TIMESTAMP),
            request_type: text(columns::REQUEST_TYPE)
                .and_then(|s| RequestType::from_str(&s).ok()),
            department: text(columns::DEPARTMENT),
            business_unit: text(columns::BUSINESS_UNIT),
            company_code: text(columns::COMPANY_CODE),
            email_address: text(columns::EMAIL_ADDRESS),
            attachment: text(columns::ATTACHMENT),
            total_task: int(columns::TOTAL_TASK),
            baseline: int(columns::BASELINE),
            estimated_time: int(columns::ESTIMATED_TIME),
            estimated_time_finished: time(columns::ESTIMATED_TIME_FINISHED),
            processed_by: text(columns::PROCESSED_BY),
            process_status: text(columns::PROCESS_STATUS)
                .and_then(|s| ProcessStatus::from_str(&s).ok()),
            taken_date: time(columns::TAKEN_DATE),
            processed_date: time(columns::PROCESSED_DATE),
            feedback_status: text(columns::FEEDBACK_STATUS),
            new_submission_status: text(columns::NEW_SUBMISSION_STATUS),
            ask_approver_status: ask,
            levels,
            system_sent_back_count: int(columns::SYSTEM_SENT_BACK_COUNT).unwrap_or(0),
            system_sent_back_email_count: int(columns::SYSTEM_SENT_BACK_EMAIL_STATUS).unwrap_or(0),
        }
    }

    /// Render the typed record back into a raw row
    pub fn to_row(&self) -> RowValues {
        let mut row = RowValues::new();
        let mut put = |col: &str, value: CellValue| {
            row.insert(col.to_string(), value);
        };

        put(columns::REQUEST_NUMBER, self.request_number.clone().into());
        put(columns::TIMESTAMP, self.timestamp.into());
        put(
            columns::REQUEST_TYPE,
            self.request_type.map(|t| t.to_string()).into(),
        );
        put(columns::DEPARTMENT, self.department.clone().into());
        put(columns::BUSINESS_UNIT, self.business_unit.clone().into());
        put(columns::COMPANY_CODE, self.company_code.clone().into());
        put(columns::EMAIL_ADDRESS, self.email_address.clone().into());
        put(columns::ATTACHMENT, self.attachment.clone().into());
        put(columns::TOTAL_TASK, self.total_task.into());
        put(columns::BASELINE, self.baseline.into());
        put(columns::ESTIMATED_TIME, self.estimated_time.into());
        put(
            columns::ESTIMATED_TIME_FINISHED,
            self.estimated_time_finished.into(),
        );
        put(columns::PROCESSED_BY, self.processed_by.clone().into());
        put(
            columns::PROCESS_STATUS,
            self.process_status.map(|s| s.to_string()).into(),
        );
        put(columns::TAKEN_DATE, self.taken_date.into());
        put(columns::PROCESSED_DATE, self.processed_date.into());
        put(columns::FEEDBACK_STATUS, self.feedback_status.clone().into());
        put(
            columns::NEW_SUBMISSION_STATUS,
            self.new_submission_status.clone().into(),
        );

        for level in ApprovalLevel::all() {
            let record = &self.levels[level.index() as usize];
            put(level.status_column(), record.status.clone().into());
            put(level.name_column(), record.name.clone().into());
            put(level.timestamp_column(), record.timestamp.into());
        }
        for level in ApprovalLevel::approvers() {
            if let Some(col) = level.ask_status_column() {
                put(
                    col,
                    self.ask_approver_status[(level.index() - 1) as usize]
                        .clone()
                        .into(),
                );
            }
        }

        put(
            columns::SYSTEM_SENT_BACK_COUNT,
            self.system_sent_back_count.into(),
        );
        put(
            columns::SYSTEM_SENT_BACK_EMAIL_STATUS,
            self.system_sent_back_email_count.into(),
        );
        row
    }

    /// This level's slice of the row
    pub fn level(&self, level: ApprovalLevel) -> &LevelRecord {
        &self.levels[level.index() as usize]
    }

    /// Mutable slice for a level
    pub fn level_mut(&mut self, level: ApprovalLevel) -> &mut LevelRecord {
        &mut self.levels[level.index() as usize]
    }

    /// Key used against the configuration relations: the company code, with
    /// the business unit name as a fallback for rows predating the code.
    pub fn config_unit(&self) -> String {
        self.company_code
            .clone()
            .or_else(|| self.business_unit.clone())
            .unwrap_or_else(|| "GENERAL".to_string())
    }

    /// Parsed requester status, if the cell holds a valid wire string
    pub fn requester_status(&self) -> Option<RequesterStatus> {
        self.level(ApprovalLevel::REQUESTER)
            .status
            .as_deref()
            .and_then(|s| RequesterStatus::from_str(s).ok())
    }
}
