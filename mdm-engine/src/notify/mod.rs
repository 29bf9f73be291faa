//! Outbound notifications
//!
//! Email rendering and delivery are external; the engine hands a typed
//! [`Notification`] to a [`Notifier`] and retries a bounded number of times.
//! Delivery is at-least-once; idempotent state transitions absorb duplicates.

use crate::constants;
use crate::error::EngineResult;
use crate::model::{ApprovalLevel, SendBackActor};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Typed outbound notification
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A request was submitted
    NewRequest {
        request_number: String,
        requester: String,
    },
    /// An approver level is pending and should act
    AskApproval {
        request_number: String,
        level: ApprovalLevel,
        approvers: Vec<String>,
    },
    /// The chain completed and the request was allocated
    Approved {
        request_number: String,
        assignee: String,
    },
    /// An approver rejected the request
    Rejected {
        request_number: String,
        level: ApprovalLevel,
        actor: String,
    },
    /// The request was sent back for rework
    SendBack {
        request_number: String,
        actor: SendBackActor,
        reason: String,
    },
    /// The request aged out
    Expired { request_number: String },
    /// A sync cell held an unusable value and was cleared
    InvalidSync {
        request_number: String,
        level: ApprovalLevel,
    },
    /// The assignee moved the request to a non-ongoing status
    Processed {
        request_number: String,
        status: String,
    },
    /// An approved request carried no countable tasks and was aborted
    NoTasks { request_number: String },
}

impl Notification {
    /// Request the notification is about
    pub fn request_number(&self) -> &str {
        match self {
            Notification::NewRequest { request_number, .. }
            | Notification::AskApproval { request_number, .. }
            | Notification::Approved { request_number, .. }
            | Notification::Rejected { request_number, .. }
            | Notification::SendBack { request_number, .. }
            | Notification::Expired { request_number }
            | Notification::InvalidSync { request_number, .. }
            | Notification::Processed { request_number, .. }
            | Notification::NoTasks { request_number } => request_number,
        }
    }
}

/// Notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> EngineResult<()>;
}

/// Send with bounded retries. Returns whether delivery succeeded; the caller
/// decides what state to stamp either way.
pub async fn send_with_retry(notifier: &dyn Notifier, notification: &Notification) -> bool {
    for attempt in 1..=constants::NOTIFY_MAX_ATTEMPTS {
        match notifier.send(notification).await {
            Ok(()) => return true,
            Err(err) => {
                tracing::warn!(
                    request = notification.request_number(),
                    attempt,
                    %err,
                    "notification send failed"
                );
            }
        }
    }
    false
}

/// Notifier that records everything it is asked to send; tests and dev runs
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail_next: AtomicU32,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` sends fail
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::Relaxed);
    }

    /// Everything sent so far
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    /// How many sent notifications match the predicate
    pub fn count_matching(&self, predicate: impl Fn(&Notification) -> bool) -> usize {
        self.sent.lock().iter().filter(|n| predicate(n)).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> EngineResult<()> {
        let remaining = self.fail_next.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::Relaxed);
            return Err(crate::error::EngineError::Notification(
                "injected failure".to_string(),
            ));
        }
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}
