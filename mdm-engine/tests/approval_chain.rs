//! Approval chain advancement

mod common;

use common::Harness;
use mdm_engine::attachment::AttachmentStore;
use mdm_engine::model::ApprovalLevel;
use mdm_engine::notify::Notification;
use mdm_engine::RequestEvent;

#[tokio::test]
async fn pending_level_asks_for_approval_once() {
    let harness = Harness::new();
    let outcome = harness.submit_bom(5).await;
    harness.requester_completes(&outcome.attachment).await;

    harness.run_interval(&outcome.request_number).await;
    harness.run_interval(&outcome.request_number).await;

    let asks = harness.notifier.count_matching(|n| {
        matches!(
            n,
            Notification::AskApproval { level, .. } if level.index() == 1
        )
    });
    assert_eq!(asks, 1);

    let record = harness.master_record(&outcome.request_number).await;
    assert_eq!(record.requester_status(), Some(mdm_engine::RequesterStatus::Completed));
    assert!(record.ask_approver_status[0].is_some());
    assert!(record.processed_by.is_none());
}

#[tokio::test]
async fn full_chain_allocates_and_mirrors() {
    let harness = Harness::new();
    let (outcome, assignee) = harness.submit_and_approve(5).await;

    // alice starts at 0 workload, bob at 600: alice wins
    assert_eq!(assignee, "alice");

    let record = harness.master_record(&outcome.request_number).await;
    assert_eq!(record.baseline, Some(720));
    assert_eq!(record.estimated_time, Some(3600));
    assert_eq!(record.processed_by.as_deref(), Some("alice"));
    // the unconfigured third level auto-approved with the sentinel
    let level3 = record.level(ApprovalLevel::new(3).unwrap());
    assert_eq!(level3.status.as_deref(), Some("Approved"));
    assert_eq!(level3.name.as_deref(), Some("NO_APPROVER"));

    // mirrored into the assignee's table
    let child_row = harness
        .engine
        .store()
        .find_row("alice", &outcome.request_number)
        .await
        .unwrap();
    assert!(child_row.is_some());

    // attachment is protected and the approved email went out
    assert!(harness.attachments.is_protected(&outcome.attachment));
    let approved = harness
        .notifier
        .count_matching(|n| matches!(n, Notification::Approved { .. }));
    assert_eq!(approved, 1);
}

#[tokio::test]
async fn rerunning_interval_on_settled_row_is_a_noop() {
    let harness = Harness::new();
    let (outcome, assignee) = harness.submit_and_approve(5).await;
    assert_eq!(assignee, "alice");
    let workload_after = harness.engine.workload().get("alice").await.unwrap();

    harness.run_interval(&outcome.request_number).await;
    harness.run_interval(&outcome.request_number).await;

    // no duplicate emails, no duplicate workload increment
    assert_eq!(
        harness
            .notifier
            .count_matching(|n| matches!(n, Notification::Approved { .. })),
        1
    );
    assert_eq!(
        harness.engine.workload().get("alice").await.unwrap(),
        workload_after
    );
}

#[tokio::test]
async fn workload_counts_the_estimate() {
    let harness = Harness::new();
    let before = harness.engine.workload().get("alice").await.unwrap();
    harness.submit_and_approve(5).await;
    let after = harness.engine.workload().get("alice").await.unwrap();
    assert_eq!(after - before, 3600);
}

#[tokio::test]
async fn rejection_short_circuits_the_chain() {
    let harness = Harness::new();
    let outcome = harness.submit_bom(5).await;
    harness.requester_completes(&outcome.attachment).await;
    harness
        .approver_acts(&outcome.attachment, 1, "Rejected", "a@x")
        .await;
    harness
        .approver_acts(&outcome.attachment, 2, "Approved", "b@x")
        .await;
    harness.run_interval(&outcome.request_number).await;

    let record = harness.master_record(&outcome.request_number).await;
    assert!(record.processed_by.is_none());
    assert_eq!(
        record.level(ApprovalLevel::new(1).unwrap()).status.as_deref(),
        Some("Rejected")
    );
    // level 2 was never ingested despite its external cells
    assert!(record.level(ApprovalLevel::new(2).unwrap()).status.is_none());
    assert!(harness.attachments.is_protected(&outcome.attachment));
    assert_eq!(
        harness
            .notifier
            .count_matching(|n| matches!(n, Notification::Rejected { .. })),
        1
    );
    let rejected = harness
        .engine
        .audit()
        .events(&outcome.request_number)
        .iter()
        .filter(|e| matches!(e.event, RequestEvent::Rejected { .. }))
        .count();
    assert_eq!(rejected, 1);
}

#[tokio::test]
async fn invalid_external_state_is_cleared_and_reported() {
    let harness = Harness::new();
    let outcome = harness.submit_bom(5).await;
    harness.requester_completes(&outcome.attachment).await;
    // status without a name
    harness
        .attachments
        .write_cell(
            &outcome.attachment,
            "D17",
            mdm_engine::CellValue::from("Approved"),
        )
        .await
        .unwrap();
    harness.run_interval(&outcome.request_number).await;

    assert!(harness.attachments.cell(&outcome.attachment, "D17").is_empty());
    assert_eq!(
        harness
            .notifier
            .count_matching(|n| matches!(n, Notification::InvalidSync { .. })),
        1
    );
}
