/// Integration tests for bulk task creation
///
/// Run with: cargo test --test bulk_create_tests

mod common;

use std::time::Duration;

use taskdesk_engine::bulk_create::{BulkCreateOutcome, BulkTaskCreator};
use taskdesk_engine::error::OperationError;
use taskdesk_engine::tasks::TASK_NAME_MAX;
use taskdesk_shared::store::{FaultPlan, MemoryGateway};
use tokio_util::sync::CancellationToken;

fn names(outcome: &BulkCreateOutcome) -> Vec<String> {
    let mut names: Vec<String> = outcome.created().iter().map(|t| t.name.clone()).collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_duplicates_within_input_collapse() {
    let gateway = MemoryGateway::new();
    let creator = BulkTaskCreator::new(gateway.clone(), 4);

    let outcome = creator
        .create("Work\r\nwork\r\nEat", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(names(&outcome), vec!["Eat", "Work"]);
    assert_eq!(common::task_names(&gateway).await, vec!["Eat", "Work"]);
}

#[tokio::test]
async fn test_existing_names_are_skipped() {
    let gateway = MemoryGateway::new();
    common::add_tasks(&gateway, &["Sleep"]).await;

    let creator = BulkTaskCreator::new(gateway.clone(), 2);
    let outcome = creator
        .create("Sleep\nRun", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(names(&outcome), vec!["Run"]);
    assert_eq!(common::task_names(&gateway).await, vec!["Run", "Sleep"]);
}

#[tokio::test]
async fn test_existing_names_match_ignoring_case() {
    let fixture = common::seeded().await;
    let creator = BulkTaskCreator::new(fixture.gateway.clone(), 2);

    let outcome = creator
        .create("SLEEP\nwork\nRead", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(names(&outcome), vec!["Read"]);
}

#[tokio::test]
async fn test_blank_input_is_rejected() {
    let gateway = MemoryGateway::new();
    let creator = BulkTaskCreator::new(gateway.clone(), 2);

    for input in ["", "   ", "\r\n \r\n\t\n"] {
        let err = creator
            .create(input, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            OperationError::Validation(errors) => {
                assert_eq!(errors[0].message, "No valid task names provided.");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    assert!(common::task_names(&gateway).await.is_empty());
    assert_eq!(gateway.commit_count().await, 0);
}

#[tokio::test]
async fn test_oversized_name_rejects_whole_submission() {
    let gateway = MemoryGateway::new();
    let creator = BulkTaskCreator::new(gateway.clone(), 1);
    let input = format!("Ok\n{}\nAlso ok", "x".repeat(TASK_NAME_MAX + 1));

    let err = creator
        .create(&input, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        OperationError::Validation(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].field, "task_names");
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    assert!(common::task_names(&gateway).await.is_empty());
    assert_eq!(gateway.commit_count().await, 0);
}

#[tokio::test]
async fn test_name_at_limit_is_accepted() {
    let gateway = MemoryGateway::new();
    let creator = BulkTaskCreator::new(gateway.clone(), 1);
    let longest = "x".repeat(TASK_NAME_MAX);

    let outcome = creator
        .create(&format!("{}\nOk", longest), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.created().len(), 2);
    assert!(common::task_names(&gateway).await.contains(&longest));
}

#[tokio::test]
async fn test_all_existing_is_nothing_to_do() {
    let fixture = common::seeded().await;
    let commits_before = fixture.gateway.commit_count().await;

    let creator = BulkTaskCreator::new(fixture.gateway.clone(), 2);
    let outcome = creator
        .create("work\nEAT\nSleep", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, BulkCreateOutcome::NothingToDo);
    assert_eq!(fixture.gateway.commit_count().await, commits_before);
}

#[tokio::test]
async fn test_each_batch_commits_in_its_own_session() {
    let gateway = MemoryGateway::new();
    let input: Vec<String> = (0..10).map(|i| format!("Task {}", i)).collect();

    let creator = BulkTaskCreator::new(gateway.clone(), 4);
    let outcome = creator
        .create(&input.join("\n"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.created().len(), 10);
    // batch size 10 / 4 + 1 = 3 -> batches of 3, 3, 3, 1
    assert_eq!(gateway.commit_count().await, 4);
    assert_eq!(common::task_names(&gateway).await.len(), 10);
}

#[tokio::test]
async fn test_failed_batch_does_not_stop_others() {
    let gateway = MemoryGateway::new();
    gateway.set_faults(FaultPlan::failing_commits(1)).await;

    let creator = BulkTaskCreator::new(gateway.clone(), 2);
    let outcome = creator
        .create("A\nB\nC\nD", &CancellationToken::new())
        .await
        .unwrap();

    let BulkCreateOutcome::Created(report) = outcome else {
        panic!("expected a report");
    };

    assert_eq!(report.failed.len(), 1);
    let failed = &report.failed[0];
    assert!(failed.index.is_some());
    assert_eq!(report.created.len() + failed.names.len(), 4);
    assert_eq!(common::task_names(&gateway).await.len(), report.created.len());
}

#[tokio::test]
async fn test_cancelled_before_start_writes_nothing() {
    let gateway = MemoryGateway::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let creator = BulkTaskCreator::new(gateway.clone(), 2);
    let err = creator.create("Work\nEat", &cancel).await.unwrap_err();

    assert!(matches!(err, OperationError::Cancelled { committed: 0 }));
    assert!(common::task_names(&gateway).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_run_keeps_committed_batches() {
    let gateway = MemoryGateway::new();
    // commits complete one at a time, 100ms apart
    gateway
        .set_faults(FaultPlan::delayed_commits(Duration::from_millis(100)))
        .await;

    let input: Vec<String> = (0..40).map(|i| format!("Task {}", i)).collect();
    let input = input.join("\n");

    let cancel = CancellationToken::new();
    let creator = BulkTaskCreator::new(gateway.clone(), 4);
    let token = cancel.clone();
    let handle = tokio::spawn(async move { creator.create(&input, &token).await });

    tokio::time::sleep(Duration::from_millis(250)).await;
    cancel.cancel();

    let err = handle.await.unwrap().unwrap_err();
    let OperationError::Cancelled { committed } = err else {
        panic!("expected cancellation, got {:?}", err);
    };

    let persisted = common::task_names(&gateway).await.len();
    assert_eq!(persisted, committed);
    assert!(committed > 0);
    assert!(committed < 40);
    assert_eq!(gateway.commit_count().await, 2);
}
