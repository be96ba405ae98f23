//! Snapshot persistence across a simulated restart
//!
//! Stores are backed by the JSON file store in a temp folder; background
//! flushers are cancelled the way `main` cancels them on shutdown.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use civic_board::geocode::DisabledGeocoder;
use civic_board::incidents::{CreateIncidentInput, IncidentStatus, IncidentStore};
use civic_board::persistence::{spawn_flusher, BlobStore, Flush, JsonFileStore, INCIDENTS_KEY, POLL_RESPONSES_KEY};
use civic_board::polls::PollLedger;

fn report(kind: &str) -> CreateIncidentInput {
    CreateIncidentInput {
        incident_type: Some(kind.to_string()),
        description: Some("Water main burst".to_string()),
        severity: Some("attention".to_string()),
        latitude: Some(19.0760),
        longitude: Some(72.8777),
        location_name: None,
    }
}

#[tokio::test]
async fn test_shutdown_flush_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let blob: Arc<dyn BlobStore> = Arc::new(JsonFileStore::new(temp_dir.path()));

    let incidents = Arc::new(
        IncidentStore::load(blob.clone(), Arc::new(DisabledGeocoder))
            .await
            .unwrap(),
    );
    let polls = Arc::new(PollLedger::load(blob.clone()).await.unwrap());

    let shutdown = CancellationToken::new();
    let handles = vec![
        spawn_flusher(incidents.clone(), incidents.dirty_flag(), Duration::from_secs(3600), shutdown.clone()),
        spawn_flusher(polls.clone(), polls.dirty_flag(), Duration::from_secs(3600), shutdown.clone()),
    ];

    let flood = incidents.create(report("flood")).await.unwrap();
    incidents.update_status(&flood.id, "responding").await.unwrap();
    incidents.update_notes(&flood.id, "Pump crew requested").await.unwrap();
    polls.submit_vote(&flood.id, "user_1", "confirm").await.unwrap();

    // Debounce window far exceeds the test; only the shutdown flush can write
    shutdown.cancel();
    for handle in handles {
        handle.await.unwrap();
    }

    let store = JsonFileStore::new(temp_dir.path());
    assert!(store.path_for(INCIDENTS_KEY).exists());
    assert!(store.path_for(POLL_RESPONSES_KEY).exists());

    let reloaded = IncidentStore::load(blob.clone(), Arc::new(DisabledGeocoder))
        .await
        .unwrap();
    let restored = reloaded.get(&flood.id).await.unwrap();
    assert_eq!(Some(restored.clone()), incidents.get(&flood.id).await);
    assert_eq!(restored.status, IncidentStatus::Responding);
    assert_eq!(restored.display_location, "Lat: 19.0760, Lng: 72.8777");

    let reloaded_polls = PollLedger::load(blob).await.unwrap();
    assert!(reloaded_polls.has_voted(&flood.id, "user_1").await);
}

#[tokio::test]
async fn test_corrupt_snapshot_fails_startup() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("incidents.json"), "{ truncated").unwrap();

    let blob: Arc<dyn BlobStore> = Arc::new(JsonFileStore::new(temp_dir.path()));
    let result = IncidentStore::load(blob, Arc::new(DisabledGeocoder)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_malformed_incident_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("incidents.json"),
        r#"[
            {
                "id": "inc_kept",
                "type": "fire",
                "description": "",
                "severity": "critical",
                "latitude": 28.6,
                "longitude": 77.2,
                "display_location": "Janpath",
                "timestamp": "2024-03-01T10:00:00Z",
                "updated_at": "2024-03-01T10:05:00Z",
                "status": "verified",
                "confirmation_count": 2,
                "internal_notes": "",
                "timeline": [
                    {"ts": "2024-03-01T10:05:00Z", "actor": "responder", "action": "status_updated", "detail": "unverified → verified"},
                    {"ts": "2024-03-01T10:00:00Z", "actor": "system", "action": "incident_reported", "detail": "Reported as fire (critical)"}
                ],
                "group_id": "inc_kept"
            },
            {"id": "inc_broken", "type": "fire"}
        ]"#,
    )
    .unwrap();

    let blob: Arc<dyn BlobStore> = Arc::new(JsonFileStore::new(temp_dir.path()));
    let store = IncidentStore::load(blob, Arc::new(DisabledGeocoder)).await.unwrap();

    assert_eq!(store.len().await, 1);
    let kept = store.get("inc_kept").await.unwrap();
    assert_eq!(kept.status, IncidentStatus::Verified);
    assert_eq!(kept.timeline[0].action, "incident_reported");
    assert_eq!(kept.timeline[1].action, "status_updated");
}

#[tokio::test]
async fn test_unreadable_incident_survives_flush() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("incidents.json"),
        r#"[{"id": "inc_legacy", "type": "fire", "latitude": 28.6, "longitude": 77.2,
             "display_location": "Janpath", "timestamp": "not-a-date", "updated_at": "not-a-date"}]"#,
    )
    .unwrap();

    let blob: Arc<dyn BlobStore> = Arc::new(JsonFileStore::new(temp_dir.path()));
    let store = IncidentStore::load(blob.clone(), Arc::new(DisabledGeocoder)).await.unwrap();
    assert!(store.is_empty().await);

    let fresh = store.create(report("flood")).await.unwrap();
    store.flush().await.unwrap();

    let raw: Vec<serde_json::Value> =
        serde_json::from_slice(&std::fs::read(temp_dir.path().join("incidents.json")).unwrap()).unwrap();
    assert_eq!(raw.len(), 2);
    assert_eq!(raw[0]["id"], fresh.id.as_str());
    assert_eq!(raw[1]["id"], "inc_legacy");
    assert_eq!(raw[1]["timestamp"], "not-a-date");

    let reloaded = IncidentStore::load(blob, Arc::new(DisabledGeocoder)).await.unwrap();
    assert_eq!(reloaded.len().await, 1);
    assert!(reloaded.contains(&fresh.id).await);
}

#[tokio::test]
async fn test_unreadable_poll_response_survives_flush() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("poll_responses.json"),
        r#"{"inc_a": [{"id": "poll_old", "incident_id": "inc_a", "user_id": "asha", "choice": "maybe"}]}"#,
    )
    .unwrap();

    let blob: Arc<dyn BlobStore> = Arc::new(JsonFileStore::new(temp_dir.path()));
    let polls = PollLedger::load(blob).await.unwrap();
    polls.submit_vote("inc_a", "bilal", "confirm").await.unwrap();
    polls.flush().await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(temp_dir.path().join("poll_responses.json")).unwrap()).unwrap();
    let kept = raw["inc_a"].as_array().unwrap();
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0]["user_id"], "bilal");
    assert_eq!(kept[1]["id"], "poll_old");
}
