//! Integration tests for graceful shutdown and resume
//!
//! These tests verify that:
//! - A shutdown request stops the run after the batch in flight commits
//! - The checkpoint is saved as interrupted at the last committed id
//! - A resumed run finishes the collection without rewriting or losing documents

mod common;

use common::{config, no_shutdown, patients, Fixture, ShutdownAfter, DESTINATION, SOURCE};
use phimask::adapters::database::CheckpointStorage;
use phimask::core::pipeline::{Orchestrator, PipelineState, RunOptions};
use phimask::core::state::CheckpointStatus;
use phimask::domain::{CheckpointKey, CollectionName, DocumentId};
use std::sync::Arc;

const RULES: &str = r#"
[[masking.rules]]
field = "Email"
type = "email_mask"
"#;

fn key() -> CheckpointKey {
    CheckpointKey::for_collections(
        &CollectionName::new(SOURCE).unwrap(),
        &CollectionName::new(DESTINATION).unwrap(),
    )
}

#[tokio::test]
async fn test_shutdown_stops_after_committed_batch() {
    let fixture = Fixture::new(patients(1..=10));
    let (destination, shutdown) = ShutdownAfter::new(fixture.destination.clone(), 1);
    let mut orchestrator =
        Orchestrator::new(config(RULES), fixture.with_destination(Arc::new(destination))).unwrap();

    let outcome = orchestrator.run(shutdown).await;

    assert!(outcome.error.is_none());
    let summary = outcome.summary;
    assert!(summary.interrupted);
    assert_eq!(summary.final_state, PipelineState::Processing);
    assert_eq!(summary.written, 2);
    assert_eq!(summary.last_processed_id, Some(DocumentId::Int(2)));
    assert!(!summary.is_successful());

    let checkpoint = fixture.checkpoints.load(&key()).await.unwrap().unwrap();
    assert_eq!(checkpoint.status, CheckpointStatus::Interrupted);
    assert_eq!(checkpoint.last_processed_id, Some(DocumentId::Int(2)));
    assert_eq!(checkpoint.documents_processed, 2);
    assert!(checkpoint.is_resumable());
}

#[tokio::test]
async fn test_resume_completes_without_duplicates() {
    let fixture = Fixture::new(patients(1..=9));
    let (destination, shutdown) = ShutdownAfter::new(fixture.destination.clone(), 2);
    let mut first =
        Orchestrator::new(config(RULES), fixture.with_destination(Arc::new(destination))).unwrap();
    let interrupted = first.run(shutdown).await.summary;
    assert!(interrupted.interrupted);
    assert_eq!(interrupted.written, 4);

    let config = config(RULES);
    let options = RunOptions {
        resume: true,
        ..RunOptions::from_config(&config).unwrap()
    };
    let mut second = Orchestrator::new(config, fixture.stores())
        .unwrap()
        .with_options(options);
    let resumed = second.run(no_shutdown()).await.into_result().unwrap();

    assert_eq!(resumed.resume_point, Some(DocumentId::Int(4)));
    assert_eq!(resumed.total, 5);
    assert_eq!(resumed.written, 5);
    assert_eq!(interrupted.written + resumed.written, 9);

    let expected: Vec<DocumentId> = (1..=9).map(DocumentId::Int).collect();
    assert_eq!(fixture.destination_ids().await, expected);

    let checkpoint = fixture.checkpoints.load(&key()).await.unwrap().unwrap();
    assert_eq!(checkpoint.status, CheckpointStatus::Completed);
    assert_eq!(checkpoint.documents_processed, 9);
    assert!(!checkpoint.is_resumable());
}

#[tokio::test]
async fn test_run_without_resume_starts_over() {
    let fixture = Fixture::new(patients(1..=6));
    let (destination, shutdown) = ShutdownAfter::new(fixture.destination.clone(), 1);
    let mut first =
        Orchestrator::new(config(RULES), fixture.with_destination(Arc::new(destination))).unwrap();
    first.run(shutdown).await;

    let mut second = Orchestrator::new(config(RULES), fixture.stores()).unwrap();
    let summary = second.run(no_shutdown()).await.into_result().unwrap();

    assert_eq!(summary.resume_point, None);
    assert_eq!(summary.total, 6);
    assert_eq!(summary.written, 6);
}

#[tokio::test]
async fn test_shutdown_before_start_writes_nothing() {
    let fixture = Fixture::new(patients(1..=3));
    let (tx, shutdown) = tokio::sync::watch::channel(false);
    tx.send(true).unwrap();
    let mut orchestrator = Orchestrator::new(config(RULES), fixture.stores()).unwrap();

    let summary = orchestrator.run(shutdown).await.summary;

    assert!(summary.interrupted);
    assert_eq!(summary.batches, 0);
    assert!(fixture.destination.is_empty().await);
    let checkpoint = fixture.checkpoints.load(&key()).await.unwrap().unwrap();
    assert_eq!(checkpoint.status, CheckpointStatus::Interrupted);
    // Nothing committed, so there is no cursor to resume from
    assert!(!checkpoint.is_resumable());
}
