//! Attachment boundary
//!
//! The external tabular document tied to each request lives behind
//! [`AttachmentStore`]: approval cells, protection, per-level write scopes,
//! template cloning and the task sheets read by validation and task counting.
//! The mandatory-column colour marking of the real store surfaces here as a
//! plain `mandatory` flag on [`TaskColumn`].

mod memory;
pub mod validation;

pub use memory::MemoryAttachmentStore;
pub use validation::{RowValidation, ValidationRule, ValueKind};

use crate::error::EngineResult;
use crate::model::{ApprovalLevel, CellValue, RequestType};
use async_trait::async_trait;

/// One column of a task sheet
#[derive(Debug, Clone)]
pub struct TaskColumn {
    pub name: String,
    /// Marked mandatory on the template
    pub mandatory: bool,
    /// Declared validation rule, if any
    pub rule: Option<ValidationRule>,
}

/// One task sheet inside an attachment document
#[derive(Debug, Clone)]
pub struct TaskSheet {
    pub name: String,
    /// First data row on the sheet
    pub start_row: usize,
    pub columns: Vec<TaskColumn>,
    /// Data rows, aligned to `columns`
    pub rows: Vec<Vec<CellValue>>,
}

impl TaskSheet {
    /// Data rows holding at least one non-empty cell
    pub fn occupied_rows(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .count()
    }
}

/// Count work items across every task sheet of an attachment
pub fn count_tasks(sheets: &[TaskSheet]) -> i64 {
    sheets.iter().map(|s| s.occupied_rows() as i64).sum()
}

/// External attachment document store
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Clone the template for a `(request type, business unit)` pair and
    /// return the new attachment handle.
    async fn clone_template(
        &self,
        request_type: RequestType,
        business_unit: &str,
    ) -> EngineResult<String>;

    /// Read a named cell
    async fn read_cell(&self, attachment: &str, cell: &str) -> EngineResult<CellValue>;

    /// Write a named cell
    async fn write_cell(
        &self,
        attachment: &str,
        cell: &str,
        value: CellValue,
    ) -> EngineResult<()>;

    /// Clear a named cell
    async fn clear_cell(&self, attachment: &str, cell: &str) -> EngineResult<()> {
        self.write_cell(attachment, cell, CellValue::Empty).await
    }

    /// Lock the document against further edits
    async fn protect(&self, attachment: &str) -> EngineResult<()>;

    /// Remove the edit lock
    async fn unprotect(&self, attachment: &str) -> EngineResult<()>;

    /// Give one user edit rights on the whole document
    async fn grant_edit(&self, attachment: &str, email: &str) -> EngineResult<()>;

    /// Give a set of users write scope on one approval level's cells
    async fn grant_level_scope(
        &self,
        attachment: &str,
        level: ApprovalLevel,
        emails: &[String],
    ) -> EngineResult<()>;

    /// Read every task sheet of the document
    async fn task_sheets(&self, attachment: &str) -> EngineResult<Vec<TaskSheet>>;
}
