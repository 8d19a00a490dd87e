// tests/timeline_integration_test.rs
//! Timeline pipeline integration tests, driven through the public API only.

mod common;

use std::sync::Arc;

use agent_timeline::bus::event_types::{EVENT_SUBSYSTEM_MESSAGE, EVENT_SYSTEM_ERROR, EVENT_TIMELINE};
use agent_timeline::{Report, ResetOutcome, TimelineConfig, TimelineEntry, TimelineService};
use common::{config_in, Collector};
use serde_json::json;

#[tokio::test]
async fn test_subsystem_message_round_trip_to_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let service = TimelineService::start(config_in(tmp.path())).unwrap();

    service.publish(
        EVENT_SUBSYSTEM_MESSAGE,
        json!({"module": "x", "content": {"a": 1}}),
    );
    service.bus().flush().await;

    let outcome = match service.reset().await.unwrap() {
        ResetOutcome::Archived(outcome) => outcome,
        ResetOutcome::Empty => panic!("expected a backup"),
    };
    assert!(outcome
        .path
        .starts_with(tmp.path().join("timeline_backups")));

    let raw = std::fs::read_to_string(&outcome.path).unwrap();
    let saved: Vec<TimelineEntry> = serde_json::from_str(&raw).unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].subsystem, "x");
    assert_eq!(saved[0].payload, json!({"a": 1}));
}

#[tokio::test]
async fn test_backup_files_are_json_arrays_with_camel_case_keys() {
    let tmp = tempfile::tempdir().unwrap();
    let service = TimelineService::start(config_in(tmp.path())).unwrap();

    service.publish_report(Report::system_error("y", json!({"message": "bad"})));
    service.bus().flush().await;
    let ResetOutcome::Archived(outcome) = service.reset().await.unwrap() else {
        panic!("expected a backup");
    };

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&outcome.path).unwrap()).unwrap();
    let first = &raw.as_array().unwrap()[0];
    assert_eq!(first["subsystem"], "y");
    assert!(first["receivedAt"].is_string());
    assert!(first["title"].as_str().unwrap().contains("Error"));
}

#[tokio::test]
async fn test_rotation_respects_configured_limit() {
    let tmp = tempfile::tempdir().unwrap();
    let config = TimelineConfig {
        max_backups: 2,
        ..config_in(tmp.path())
    };
    let service = TimelineService::start(config).unwrap();

    for i in 0..4 {
        service.recorder().record("bench", "tick", json!({ "i": i })).await;
        service.reset().await.unwrap();
    }

    let backups = service.store().list_backups().await.unwrap();
    assert_eq!(backups.len(), 2);
    let newest = service.store().load(&backups[0].path).await.unwrap();
    assert_eq!(newest[0].payload, json!({"i": 3}));
}

#[tokio::test]
async fn test_external_subscribers_share_the_ordered_stream() {
    let tmp = tempfile::tempdir().unwrap();
    let service = TimelineService::start(config_in(tmp.path())).unwrap();
    let collector = Collector::default();
    service.bus().register(EVENT_SYSTEM_ERROR, Arc::new(collector.clone()));
    service.bus().register(EVENT_TIMELINE, Arc::new(collector.clone()));

    service.publish(EVENT_SYSTEM_ERROR, json!({"message": "disk full"}));
    service.bus().flush().await;

    // The recorder runs first and its republished entry queues behind the error.
    assert_eq!(collector.names(), vec![EVENT_SYSTEM_ERROR, EVENT_TIMELINE]);
}

#[tokio::test]
async fn test_shutdown_drains_queue_and_archives() {
    let tmp = tempfile::tempdir().unwrap();
    let config = TimelineConfig {
        archive_on_shutdown: true,
        ..config_in(tmp.path())
    };
    let service = TimelineService::start(config).unwrap();

    for i in 0..25 {
        service.publish(
            EVENT_SUBSYSTEM_MESSAGE,
            json!({"module": "load", "content": { "i": i }}),
        );
    }
    service.shutdown().await.unwrap();

    let backups = service.store().list_backups().await.unwrap();
    assert_eq!(backups.len(), 1);
    let saved = service.store().load(&backups[0].path).await.unwrap();
    let order: Vec<i64> = saved
        .iter()
        .map(|e| e.payload["i"].as_i64().unwrap())
        .collect();
    assert_eq!(order, (0..25).collect::<Vec<_>>());
    assert!(service.events().await.is_empty());
}
