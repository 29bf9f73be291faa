//! Submission flow

mod common;

use common::Harness;
use mdm_engine::notify::Notification;

#[tokio::test]
async fn first_submission_gets_first_number_of_its_prefix() {
    let harness = Harness::new();
    let outcome = harness.submit_bom(5).await;
    assert_eq!(outcome.request_number, "BOM/MDM/Retail Unit Alpha/00001");
    assert!(outcome.attachment.starts_with("attachment://BOM/"));

    let record = harness.master_record(&outcome.request_number).await;
    assert!(record.new_submission_status.is_some());
    assert_eq!(record.attachment.as_deref(), Some(outcome.attachment.as_str()));

    let new_request_emails = harness
        .notifier
        .count_matching(|n| matches!(n, Notification::NewRequest { .. }));
    assert_eq!(new_request_emails, 1);
}

#[tokio::test]
async fn request_numbers_are_monotonic_within_a_prefix() {
    let harness = Harness::new();
    let first = harness.submit_bom(2).await;
    let second = harness.submit_bom(3).await;
    assert_eq!(first.request_number, "BOM/MDM/Retail Unit Alpha/00001");
    assert_eq!(second.request_number, "BOM/MDM/Retail Unit Alpha/00002");
}

#[tokio::test]
async fn resubmission_is_idempotent() {
    let harness = Harness::new();
    let outcome = harness.submit_bom(5).await;

    let row = harness
        .engine
        .store()
        .find_row("BOM", &outcome.request_number)
        .await
        .unwrap()
        .unwrap();
    let again = harness.engine.handle_on_submit("BOM", row).await.unwrap();

    assert_eq!(again.request_number, outcome.request_number);
    assert_eq!(again.attachment, outcome.attachment);
    let new_request_emails = harness
        .notifier
        .count_matching(|n| matches!(n, Notification::NewRequest { .. }));
    assert_eq!(new_request_emails, 1);
}

#[tokio::test]
async fn company_name_lands_on_the_attachment() {
    let harness = Harness::new();
    let outcome = harness.submit_bom(5).await;
    assert_eq!(
        harness.attachments.cell(&outcome.attachment, "F10").render(),
        "Retail Unit Alpha"
    );
}

#[tokio::test]
async fn approver_scopes_are_granted_on_clone() {
    let harness = Harness::new();
    let outcome = harness.submit_bom(5).await;
    let level1 = mdm_engine::ApprovalLevel::new(1).unwrap();
    assert_eq!(
        harness.attachments.level_scope(&outcome.attachment, level1),
        vec!["a@x"]
    );
    // level 3 is NO_APPROVER: no scope to grant
    let level3 = mdm_engine::ApprovalLevel::new(3).unwrap();
    assert!(harness
        .attachments
        .level_scope(&outcome.attachment, level3)
        .is_empty());
}

#[tokio::test]
async fn notification_failure_still_stamps_the_flag() {
    let harness = Harness::new();
    harness.notifier.fail_next(10);
    let outcome = harness.submit_bom(5).await;
    let record = harness.master_record(&outcome.request_number).await;
    // flag stamped despite undelivered email: it is never re-sent
    assert!(record.new_submission_status.is_some());
    assert_eq!(harness.notifier.sent().len(), 0);
}
