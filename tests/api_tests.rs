// SPDX-License-Identifier: MIT

//! Router-level tests for the entity API.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use tower::ServiceExt;

use flowbridge::config::Config;
use flowbridge::models::bike::BikePass;
use flowbridge::models::snapshot::BikeSnapshot;
use flowbridge::models::{Activity, UsageStats};
use flowbridge::services::{BikeEntry, Coordinator, FlowClient, FlowSession, SnapshotRegistry};
use flowbridge::store::StateStore;
use flowbridge::AppState;

fn test_state(api_token: Option<String>) -> Arc<AppState> {
    let config = Config {
        api_token,
        ..Default::default()
    };
    let store = StateStore::in_memory();
    let session = FlowSession::new(
        FlowClient::new(&config),
        store.clone(),
        config.token_url.clone(),
    );
    let registry: SnapshotRegistry = Arc::new(dashmap::DashMap::new());
    let coordinator = Arc::new(Coordinator::new(
        session.clone(),
        store.clone(),
        registry.clone(),
        StdDuration::from_secs(300),
    ));

    Arc::new(AppState {
        config,
        store,
        session,
        registry,
        coordinator,
        pending_login: tokio::sync::Mutex::new(None),
    })
}

fn seed_bike(state: &AppState) {
    let mut snapshot = BikeSnapshot::default();
    snapshot.battery.level_percent = Some(80.0);
    snapshot.battery.total_capacity_wh = Some(625.0);
    snapshot.battery.reachable_range_km = vec![95.0, 42.0, 0.0];
    snapshot.bike.total_distance_m = Some(1_234_567.0);
    snapshot.bike.lock_enabled = Some(true);
    snapshot.live_data_available = false;

    let pass: BikePass = serde_json::from_value(serde_json::json!({
        "bikeId": "bike-1",
        "frameNumber": "WOW1234"
    }))
    .unwrap();

    state.registry.insert(
        "bike-1".to_string(),
        BikeEntry {
            name: "Cube (Performance Line CX)".to_string(),
            snapshot: Some(snapshot),
            pass: Some(pass),
            last_success: Some(Utc::now()),
            last_error: None,
        },
    );
}

async fn get_json(
    state: Arc<AppState>,
    uri: &str,
    bearer: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let app = flowbridge::routes::create_router(state);
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let response = app
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn health_is_public() {
    let (status, body) = get_json(test_state(None), "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn auth_status_reports_logged_out() {
    let (status, body) = get_json(test_state(None), "/auth/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logged_in"], false);
}

#[tokio::test]
async fn bike_list_summarizes_registry() {
    let state = test_state(None);
    seed_bike(&state);

    let (status, body) = get_json(state, "/api/bikes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], "bike-1");
    assert_eq!(body[0]["name"], "Cube (Performance Line CX)");
    assert_eq!(body[0]["available"], true);
}

#[tokio::test]
async fn bike_document_flattens_the_snapshot() {
    let state = test_state(None);
    seed_bike(&state);

    let (status, body) = get_json(state, "/api/bikes/bike-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["battery_level_percent"], 80.0);
    assert_eq!(body["battery_capacity_wh"], 625.0);
    assert_eq!(body["odometer_km"], 1234.57);
    assert_eq!(body["reachable_range_km_max"], 95.0);
    // Zero ranges are skipped for the minimum
    assert_eq!(body["reachable_range_km_min"], 42.0);
    // is_locked unknown, lock feature enabled -> fallback
    assert_eq!(body["lock_engaged"], true);
    assert_eq!(body["live_data_available"], false);
}

#[tokio::test]
async fn unknown_bike_is_404() {
    let state = test_state(None);
    seed_bike(&state);

    let (status, body) = get_json(state, "/api/bikes/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn stats_come_from_the_store() {
    let state = test_state(None);
    seed_bike(&state);

    let mut stats = UsageStats::default();
    let activity: Activity = serde_json::from_value(serde_json::json!({
        "id": "a1",
        "attributes": {
            "bikeId": "bike-1",
            "startTime": "2025-06-01T10:00:00Z",
            "totalDistance": 15200.0,
            "type": "BIKE_RIDE"
        }
    }))
    .unwrap();
    stats.record_activity(&activity, "2025-06-01T12:00:00Z");
    state
        .store
        .commit_activity_progress("bike-1", Some("a1".to_string()), &stats)
        .await
        .unwrap();

    let (status, body) = get_json(state, "/api/bikes/bike-1/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_rides"], 1);
    assert_eq!(body["total_distance_m"], 15200.0);
    assert_eq!(body["rides_by_year"]["2025"], 1);
    // The internal id set is not exposed
    assert!(body.get("processed_activity_ids").is_none());
}

#[tokio::test]
async fn bike_pass_endpoint() {
    let state = test_state(None);
    seed_bike(&state);

    let (status, body) = get_json(state.clone(), "/api/bikes/bike-1/pass", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["frameNumber"], "WOW1234");

    // A bike without a pass 404s
    state.registry.get_mut("bike-1").unwrap().pass = None;
    let (status, _) = get_json(state, "/api/bikes/bike-1/pass", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_token_guards_the_entity_routes() {
    let state = test_state(Some("hunter2".to_string()));
    seed_bike(&state);

    // Missing or wrong token -> 401
    let (status, _) = get_json(state.clone(), "/api/bikes", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = get_json(state.clone(), "/api/bikes", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Correct token -> 200
    let (status, _) = get_json(state.clone(), "/api/bikes", Some("hunter2")).await;
    assert_eq!(status, StatusCode::OK);

    // Health stays public
    let (status, _) = get_json(state, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn login_issues_an_authorize_url() {
    let state = test_state(None);

    let (status, body) = get_json(state.clone(), "/auth/login", None).await;
    assert_eq!(status, StatusCode::OK);
    let url = body["authorize_url"].as_str().unwrap();
    assert!(url.contains("code_challenge="));
    assert!(url.contains("state="));

    // The PKCE verifier is now pending
    assert!(state.pending_login.lock().await.is_some());
}

#[tokio::test]
async fn callback_rejects_a_bad_state() {
    let state = test_state(None);

    let app = flowbridge::routes::create_router(state);
    let request = Request::builder()
        .method("POST")
        .uri("/auth/callback")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({
                "redirect_url": "onebikeapp-ios://cb?code=abc&state=forged"
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
