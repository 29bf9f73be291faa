//! Concurrency invariants

mod common;

use common::Harness;
use mdm_engine::model::{columns, CellValue, RowValues};
use mdm_engine::notify::Notification;

#[tokio::test]
async fn concurrent_submissions_of_one_row_agree_on_the_number() {
    let harness = Harness::new();
    let mut values = RowValues::new();
    values.insert(
        columns::REQUEST_TYPE.to_string(),
        CellValue::from("BOM Create"),
    );
    values.insert(
        columns::BUSINESS_UNIT.to_string(),
        CellValue::from("Retail Unit Alpha"),
    );
    values.insert(columns::COMPANY_CODE.to_string(), CellValue::from("BU01"));
    values.insert(columns::EMAIL_ADDRESS.to_string(), CellValue::from("u@x"));
    let row = harness.engine.store().append_row("BOM", &values).await.unwrap();

    let a = {
        let engine = harness.engine.clone();
        tokio::spawn(async move { engine.handle_on_submit("BOM", row).await })
    };
    let b = {
        let engine = harness.engine.clone();
        tokio::spawn(async move { engine.handle_on_submit("BOM", row).await })
    };
    let first = a.await.unwrap().unwrap();
    let second = b.await.unwrap().unwrap();

    // the row lock serialized the two passes: same number, same attachment
    assert_eq!(first.request_number, second.request_number);
    assert_eq!(first.attachment, second.attachment);
    assert_eq!(
        harness
            .notifier
            .count_matching(|n| matches!(n, Notification::NewRequest { .. })),
        1
    );
}

#[tokio::test]
async fn concurrent_interval_passes_allocate_once() {
    let harness = Harness::new();
    let outcome = harness.submit_bom(5).await;
    harness.requester_completes(&outcome.attachment).await;
    harness
        .approver_acts(&outcome.attachment, 1, "Approved", "a@x")
        .await;
    harness
        .approver_acts(&outcome.attachment, 2, "Approved", "b@x")
        .await;
    let row = harness
        .engine
        .store()
        .find_row("BOM", &outcome.request_number)
        .await
        .unwrap()
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = harness.engine.clone();
        let number = outcome.request_number.clone();
        handles.push(tokio::spawn(async move {
            engine.handle_on_interval("BOM", row, &number).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // exactly one allocation, one approved email, one workload increment
    assert_eq!(
        harness
            .notifier
            .count_matching(|n| matches!(n, Notification::Approved { .. })),
        1
    );
    assert_eq!(harness.engine.workload().get("alice").await.unwrap(), 3600);
}

#[tokio::test]
async fn tied_agents_are_never_double_assigned_in_one_round() {
    let harness = Harness::new();
    // two requests, both hitting the tied pair
    let first = harness.submit_bom(1).await;
    let second = harness.submit_bom(1).await;

    // equalize the tie before the chains complete
    harness.engine.workload().add("bob", -600).await.unwrap();

    for outcome in [&first, &second] {
        harness.requester_completes(&outcome.attachment).await;
        harness
            .approver_acts(&outcome.attachment, 1, "Approved", "a@x")
            .await;
        harness
            .approver_acts(&outcome.attachment, 2, "Approved", "b@x")
            .await;
    }

    let row_a = harness
        .engine
        .store()
        .find_row("BOM", &first.request_number)
        .await
        .unwrap()
        .unwrap();
    let row_b = harness
        .engine
        .store()
        .find_row("BOM", &second.request_number)
        .await
        .unwrap()
        .unwrap();

    let a = {
        let engine = harness.engine.clone();
        let number = first.request_number.clone();
        tokio::spawn(async move { engine.handle_on_interval("BOM", row_a, &number).await })
    };
    let b = {
        let engine = harness.engine.clone();
        let number = second.request_number.clone();
        tokio::spawn(async move { engine.handle_on_interval("BOM", row_b, &number).await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let record_a = harness.master_record(&first.request_number).await;
    let record_b = harness.master_record(&second.request_number).await;
    let agent_a = record_a.processed_by.unwrap();
    let agent_b = record_b.processed_by.unwrap();
    // both requests at workload parity: the round-robin cursor splits them
    assert_ne!(agent_a, agent_b);
}
