//! In-memory attachment store
//!
//! Stands in for the external document service in dev runs and tests.
//! Templates are registered per request type; cloned documents expose their
//! cells, protection state and granted scopes for inspection.

use super::{AttachmentStore, TaskSheet};
use crate::error::{EngineError, EngineResult};
use crate::model::{ApprovalLevel, CellValue, RequestType};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Doc {
    cells: HashMap<String, CellValue>,
    protected: bool,
    editors: Vec<String>,
    level_scopes: HashMap<u8, Vec<String>>,
    sheets: Vec<TaskSheet>,
}

/// In-memory [`AttachmentStore`]
#[derive(Default)]
pub struct MemoryAttachmentStore {
    docs: DashMap<String, Doc>,
    templates: DashMap<RequestType, Vec<TaskSheet>>,
    next_id: AtomicU64,
}

impl MemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the task sheets cloned into new documents of this type
    pub fn register_template(&self, request_type: RequestType, sheets: Vec<TaskSheet>) {
        self.templates.insert(request_type, sheets);
    }

    /// Replace a document's task sheets; test setup for validation scenarios
    pub fn set_sheets(&self, attachment: &str, sheets: Vec<TaskSheet>) {
        if let Some(mut doc) = self.docs.get_mut(attachment) {
            doc.sheets = sheets;
        }
    }

    /// Inspect a cell without going through the trait
    pub fn cell(&self, attachment: &str, cell: &str) -> CellValue {
        self.docs
            .get(attachment)
            .and_then(|doc| doc.cells.get(cell).cloned())
            .unwrap_or(CellValue::Empty)
    }

    /// Whether the document is protected
    pub fn is_protected(&self, attachment: &str) -> bool {
        self.docs
            .get(attachment)
            .map(|doc| doc.protected)
            .unwrap_or(false)
    }

    /// Users granted whole-document edit rights
    pub fn editors(&self, attachment: &str) -> Vec<String> {
        self.docs
            .get(attachment)
            .map(|doc| doc.editors.clone())
            .unwrap_or_default()
    }

    /// Users granted write scope on one level
    pub fn level_scope(&self, attachment: &str, level: ApprovalLevel) -> Vec<String> {
        self.docs
            .get(attachment)
            .and_then(|doc| doc.level_scopes.get(&level.index()).cloned())
            .unwrap_or_default()
    }

    fn with_doc<T>(
        &self,
        attachment: &str,
        f: impl FnOnce(&mut Doc) -> T,
    ) -> EngineResult<T> {
        match self.docs.get_mut(attachment) {
            Some(mut doc) => Ok(f(&mut doc)),
            None => Err(EngineError::Attachment(format!(
                "unknown attachment {}",
                attachment
            ))),
        }
    }
}

#[async_trait]
impl AttachmentStore for MemoryAttachmentStore {
    async fn clone_template(
        &self,
        request_type: RequestType,
        business_unit: &str,
    ) -> EngineResult<String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = format!(
            "attachment://{}/{}/{}",
            request_type.abbreviation(),
            business_unit.replace(' ', "-"),
            id
        );
        let sheets = self
            .templates
            .get(&request_type)
            .map(|t| t.clone())
            .unwrap_or_default();
        self.docs.insert(
            handle.clone(),
            Doc {
                sheets,
                ..Doc::default()
            },
        );
        Ok(handle)
    }

    async fn read_cell(&self, attachment: &str, cell: &str) -> EngineResult<CellValue> {
        self.with_doc(attachment, |doc| {
            doc.cells.get(cell).cloned().unwrap_or(CellValue::Empty)
        })
    }

    async fn write_cell(
        &self,
        attachment: &str,
        cell: &str,
        value: CellValue,
    ) -> EngineResult<()> {
        self.with_doc(attachment, |doc| {
            if value.is_empty() {
                doc.cells.remove(cell);
            } else {
                doc.cells.insert(cell.to_string(), value);
            }
        })
    }

    async fn protect(&self, attachment: &str) -> EngineResult<()> {
        self.with_doc(attachment, |doc| doc.protected = true)
    }

    async fn unprotect(&self, attachment: &str) -> EngineResult<()> {
        self.with_doc(attachment, |doc| doc.protected = false)
    }

    async fn grant_edit(&self, attachment: &str, email: &str) -> EngineResult<()> {
        self.with_doc(attachment, |doc| {
            if !doc.editors.iter().any(|e| e == email) {
                doc.editors.push(email.to_string());
            }
        })
    }

    async fn grant_level_scope(
        &self,
        attachment: &str,
        level: ApprovalLevel,
        emails: &[String],
    ) -> EngineResult<()> {
        self.with_doc(attachment, |doc| {
            doc.level_scopes.insert(level.index(), emails.to_vec());
        })
    }

    async fn task_sheets(&self, attachment: &str) -> EngineResult<Vec<TaskSheet>> {
        self.with_doc(attachment, |doc| doc.sheets.clone())
    }
}
