// SPDX-License-Identifier: MIT

//! Full refresh-tick tests against a mocked Flow cloud.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flowbridge::config::Config;
use flowbridge::services::{Coordinator, FlowClient, FlowSession, SnapshotRegistry, TokenSet};
use flowbridge::store::StateStore;

async fn setup(server: &MockServer) -> (Arc<Coordinator>, StateStore, SnapshotRegistry) {
    let base = server.uri();
    let config = Config {
        token_url: format!("{}/token", base),
        profile_base_url: base.clone(),
        activity_base_url: base.clone(),
        bikepass_base_url: base.clone(),
        subscription_base_url: base,
        ..Default::default()
    };

    let store = StateStore::in_memory();
    store
        .set_tokens(&TokenSet {
            access_token: "token-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        })
        .await
        .unwrap();

    let session = FlowSession::new(
        FlowClient::new(&config),
        store.clone(),
        config.token_url.clone(),
    );
    let registry: SnapshotRegistry = Arc::new(dashmap::DashMap::new());
    let coordinator = Arc::new(Coordinator::new(
        session,
        store.clone(),
        registry.clone(),
        StdDuration::from_secs(300),
    ));
    (coordinator, store, registry)
}

async fn mount_happy_cloud(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": true})))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/bike-profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{
                "id": "bike-1",
                "attributes": {
                    "brandName": "Cube",
                    "driveUnit": {"productName": "Performance Line CX"}
                }
            }]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/passes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "bikePasses": [{"bikeId": "bike-1", "frameNumber": "WOW1234"}]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/bike-profile/bike-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "id": "bike-1",
                "attributes": {
                    "brandName": "Cube",
                    "batteries": [{
                        "batteryLevel": null,
                        "totalEnergy": 625.0,
                        "isCharging": null
                    }],
                    "driveUnit": {
                        "totalDistanceTraveled": 1_000_000.0,
                        "productName": "Performance Line CX",
                        "driveUnitAssistModes": [
                            {"name": "eco", "reachableRange": 95.0}
                        ]
                    }
                }
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/state-of-charge/bike-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "stateOfCharge": 76.0,
            "chargingActive": true,
            "reachableRange": [91.0, 74.0],
            "odometer": 1_002_500.0,
            "stateOfChargeLatestUpdate": "2025-06-01T08:12:00Z"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/activity"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{
                "id": "a1",
                "attributes": {
                    "bikeId": "bike-1",
                    "startTime": "2025-05-30T17:01:00Z",
                    "totalDistance": 15200.0,
                    "type": "BIKE_RIDE"
                }
            }],
            "meta": {"pages": 1, "elements": 1}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn one_tick_publishes_a_merged_snapshot() {
    let server = MockServer::start().await;
    mount_happy_cloud(&server).await;

    let (coordinator, store, registry) = setup(&server).await;

    coordinator.initialize().await.unwrap();
    coordinator.refresh_all().await;

    let entry = registry.get("bike-1").expect("bike registered");
    assert_eq!(entry.name, "Cube (Performance Line CX)");
    assert!(entry.available());
    assert_eq!(
        entry.pass.as_ref().unwrap().frame_number.as_deref(),
        Some("WOW1234")
    );

    let snapshot = entry.snapshot.as_ref().unwrap();
    assert!(snapshot.live_data_available);
    // Null profile level filled from live data
    assert_eq!(snapshot.battery.level_percent, Some(76.0));
    // Live odometer overrides the cloud copy
    assert_eq!(snapshot.bike.total_distance_m, Some(1_002_500.0));
    // Live range replaces the assist-mode predictions
    assert_eq!(snapshot.battery.reachable_range_km, vec![91.0, 74.0]);

    // The activity history was reconciled into the stats
    let bike = store.bike("bike-1").await.unwrap();
    assert_eq!(bike.stats.total_rides, 1);
    assert_eq!(bike.last_activity_id.as_deref(), Some("a1"));
    // The pass was persisted, not just cached
    assert!(bike.pass.is_some());
}

#[tokio::test]
async fn failed_refresh_keeps_the_stale_snapshot() {
    let server = MockServer::start().await;
    mount_happy_cloud(&server).await;

    let (coordinator, _store, registry) = setup(&server).await;
    coordinator.initialize().await.unwrap();
    coordinator.refresh_all().await;
    assert!(registry.get("bike-1").unwrap().available());

    // The cloud starts failing
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/v2/bike-profile/bike-1"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    coordinator.refresh_all().await;

    let entry = registry.get("bike-1").unwrap();
    assert!(!entry.available());
    assert!(entry.last_error.is_some());
    // Entity goes unavailable but the last data is kept for inspection
    assert!(entry.snapshot.is_some());
}

#[tokio::test]
async fn no_subscription_skips_live_data() {
    let server = MockServer::start().await;
    mount_happy_cloud(&server).await;

    // Override the subscription answer: everything else stays mounted, but
    // the state endpoint now denies.
    server.reset().await;
    mount_happy_cloud(&server).await;
    // Re-mount /v1/state with higher priority saying "no subscription"
    Mock::given(method("GET"))
        .and(path("/v1/state"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": false})),
        )
        .with_priority(1)
        .mount(&server)
        .await;

    let (coordinator, _store, registry) = setup(&server).await;
    coordinator.initialize().await.unwrap();
    coordinator.refresh_all().await;

    let entry = registry.get("bike-1").unwrap();
    let snapshot = entry.snapshot.as_ref().unwrap();
    assert!(!snapshot.live_data_available);
    // Without live data the profile values stand: no level, cloud odometer
    assert_eq!(snapshot.battery.level_percent, None);
    assert_eq!(snapshot.bike.total_distance_m, Some(1_000_000.0));
    assert_eq!(snapshot.battery.reachable_range_km, vec![95.0]);
}
