//! Request event log
//!
//! Append-only audit trail per request: submissions, level outcomes,
//! send-backs with actor and reason, allocation and execution transitions.
//! The send-back retry sweep derives its counts from here.

use crate::model::{ApprovalLevel, SendBackActor};
use crate::timebase::Clock;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One audited event on a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestEvent {
    /// Row created or completed by submission handling
    Submitted { requester: String },
    /// A level's action was ingested
    LevelIngested {
        level: ApprovalLevel,
        status: String,
        name: String,
    },
    /// The request was sent back for rework
    SendBack {
        actor: SendBackActor,
        reason: String,
    },
    /// The chain ended in rejection
    Rejected { level: ApprovalLevel, name: String },
    /// The request aged out
    Expired,
    /// The request was assigned to an agent
    Allocated { agent: String },
    /// Execution status moved
    StatusChanged { from: String, to: String },
    /// A sync cell was cleared as invalid
    InvalidSync { level: ApprovalLevel },
}

/// Event with its ingestion timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub at: DateTime<Utc>,
    pub event: RequestEvent,
}

/// Append-only per-request audit log
#[derive(Clone)]
pub struct AuditLog {
    inner: Arc<AuditLogInner>,
}

struct AuditLogInner {
    clock: Arc<dyn Clock>,
    events: DashMap<String, Vec<TimedEvent>>,
}

impl AuditLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(AuditLogInner {
                clock,
                events: DashMap::new(),
            }),
        }
    }

    /// Append an event to a request's trail
    pub fn record(&self, request_number: &str, event: RequestEvent) {
        let timed = TimedEvent {
            at: self.inner.clock.now(),
            event,
        };
        self.inner
            .events
            .entry(request_number.to_string())
            .or_default()
            .push(timed);
    }

    /// Full trail for a request, oldest first
    pub fn events(&self, request_number: &str) -> Vec<TimedEvent> {
        self.inner
            .events
            .get(request_number)
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Number of send-back events recorded for a request
    pub fn send_back_count(&self, request_number: &str) -> usize {
        self.events(request_number)
            .iter()
            .filter(|e| matches!(e.event, RequestEvent::SendBack { .. }))
            .count()
    }
}
