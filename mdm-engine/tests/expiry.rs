//! Request expiry

mod common;

use chrono::Duration;
use common::Harness;
use mdm_engine::notify::Notification;
use mdm_engine::{RequestEvent, RequesterStatus};

#[tokio::test]
async fn stale_pending_request_expires() {
    let harness = Harness::new();
    let outcome = harness.submit_bom(5).await;
    harness.requester_completes(&outcome.attachment).await;
    // level 1 stays pending with a configured approver
    harness.run_interval(&outcome.request_number).await;

    // five business days later (Monday -> next Monday)
    harness.clock.advance(Duration::days(7));
    harness.run_interval(&outcome.request_number).await;

    let record = harness.master_record(&outcome.request_number).await;
    assert_eq!(record.requester_status(), Some(RequesterStatus::Expired));
    assert!(record.processed_by.is_none());
    assert!(harness.attachments.is_protected(&outcome.attachment));
    assert_eq!(
        harness
            .notifier
            .count_matching(|n| matches!(n, Notification::Expired { .. })),
        1
    );
    assert!(harness
        .engine
        .audit()
        .events(&outcome.request_number)
        .iter()
        .any(|e| matches!(e.event, RequestEvent::Expired)));
}

#[tokio::test]
async fn fresh_requests_do_not_expire() {
    let harness = Harness::new();
    let outcome = harness.submit_bom(5).await;
    harness.requester_completes(&outcome.attachment).await;

    // three business days is inside the window
    harness.clock.advance(Duration::days(3));
    harness.run_interval(&outcome.request_number).await;

    let record = harness.master_record(&outcome.request_number).await;
    assert_ne!(record.requester_status(), Some(RequesterStatus::Expired));
}

#[tokio::test]
async fn requests_in_review_never_expire() {
    let harness = Harness::new();
    let outcome = harness.submit_bom(5).await;
    harness.requester_completes(&outcome.attachment).await;
    harness
        .approver_acts(&outcome.attachment, 1, "Send Back", "a@x")
        .await;
    harness.run_interval(&outcome.request_number).await;

    harness.clock.advance(Duration::days(30));
    harness.run_interval(&outcome.request_number).await;

    let record = harness.master_record(&outcome.request_number).await;
    assert_eq!(record.requester_status(), Some(RequesterStatus::NeedReview));
}

#[tokio::test]
async fn expired_rows_stay_expired_on_later_sweeps() {
    let harness = Harness::new();
    let outcome = harness.submit_bom(5).await;
    harness.requester_completes(&outcome.attachment).await;
    harness.clock.advance(Duration::days(7));
    harness.run_interval(&outcome.request_number).await;
    harness.run_interval(&outcome.request_number).await;

    assert_eq!(
        harness
            .notifier
            .count_matching(|n| matches!(n, Notification::Expired { .. })),
        1
    );
}
