// SPDX-License-Identifier: MIT

//! Entity API: the republished telemetry.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::bike::BikePass;
use crate::services::BikeEntry;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;

/// Entity routes (bearer-token protected when a token is configured).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/bikes", get(list_bikes))
        .route("/api/bikes/{bike_id}", get(get_bike))
        .route("/api/bikes/{bike_id}/stats", get(get_bike_stats))
        .route("/api/bikes/{bike_id}/pass", get(get_bike_pass))
}

// ─── Bike list ───────────────────────────────────────────────

/// Summary row for one bike.
#[derive(Serialize)]
pub struct BikeSummary {
    pub id: String,
    pub name: String,
    pub available: bool,
    pub last_success: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

async fn list_bikes(State(state): State<Arc<AppState>>) -> Json<Vec<BikeSummary>> {
    let mut bikes: Vec<BikeSummary> = state
        .registry
        .iter()
        .map(|entry| BikeSummary {
            id: entry.key().clone(),
            name: entry.name.clone(),
            available: entry.available(),
            last_success: entry.last_success.map(format_utc_rfc3339),
            last_error: entry.last_error.clone(),
        })
        .collect();
    bikes.sort_by(|a, b| a.id.cmp(&b.id));
    Json(bikes)
}

// ─── Bike entity document ────────────────────────────────────

/// Full entity document for one bike: the merged snapshot flattened into
/// the values the original sensor tables exposed.
#[derive(Serialize)]
pub struct BikeDocument {
    pub id: String,
    pub name: String,
    pub available: bool,

    // Battery
    pub battery_level_percent: Option<f64>,
    pub battery_remaining_wh: Option<f64>,
    pub battery_capacity_wh: Option<f64>,
    pub charge_cycles: Option<u32>,
    pub lifetime_energy_kwh: Option<f64>,
    pub remaining_energy_rider_wh: Option<f64>,
    pub reachable_range_km_max: Option<f64>,
    pub reachable_range_km_min: Option<f64>,
    pub charging: Option<bool>,
    pub charger_connected: Option<bool>,

    // Bike
    pub odometer_km: Option<f64>,
    pub lock_engaged: Option<bool>,
    pub alarm_enabled: Option<bool>,

    // Diagnostics
    pub software_versions: HashMap<String, Option<String>>,

    // Freshness
    pub live_data_available: bool,
    pub last_update: Option<String>,
    pub last_success: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

fn build_document(bike_id: &str, entry: &BikeEntry) -> BikeDocument {
    let snapshot = entry.snapshot.as_ref();

    let software_versions = snapshot
        .map(|s| {
            HashMap::from([
                (
                    "drive_unit".to_string(),
                    s.components.drive_unit.software_version.clone(),
                ),
                (
                    "battery".to_string(),
                    s.components.battery.software_version.clone(),
                ),
                (
                    "connect_module".to_string(),
                    s.components.connected_module.software_version.clone(),
                ),
                (
                    "remote_control".to_string(),
                    s.components.remote_control.software_version.clone(),
                ),
            ])
        })
        .unwrap_or_default();

    BikeDocument {
        id: bike_id.to_string(),
        name: entry.name.clone(),
        available: entry.available(),

        battery_level_percent: snapshot.and_then(|s| s.battery.level_percent),
        battery_remaining_wh: snapshot.and_then(|s| s.battery.remaining_wh),
        battery_capacity_wh: snapshot.and_then(|s| s.battery.total_capacity_wh),
        charge_cycles: snapshot.and_then(|s| s.battery.charge_cycles_total),
        lifetime_energy_kwh: snapshot.and_then(|s| s.lifetime_energy_kwh()),
        remaining_energy_rider_wh: snapshot.and_then(|s| s.battery.remaining_energy_rider_wh),
        reachable_range_km_max: snapshot.and_then(|s| s.reachable_range_max()),
        reachable_range_km_min: snapshot.and_then(|s| s.reachable_range_min()),
        charging: snapshot.and_then(|s| s.battery.is_charging),
        charger_connected: snapshot.and_then(|s| s.battery.is_charger_connected),

        odometer_km: snapshot.and_then(|s| s.total_distance_km()),
        lock_engaged: snapshot.and_then(|s| s.lock_engaged()),
        alarm_enabled: snapshot.and_then(|s| s.bike.alarm_enabled),

        software_versions,

        live_data_available: snapshot.map(|s| s.live_data_available).unwrap_or(false),
        last_update: snapshot.and_then(|s| s.last_update.clone()),
        last_success: entry.last_success.map(format_utc_rfc3339),
        last_error: entry.last_error.clone(),
    }
}

async fn get_bike(
    State(state): State<Arc<AppState>>,
    Path(bike_id): Path<String>,
) -> Result<Json<BikeDocument>> {
    let entry = state
        .registry
        .get(&bike_id)
        .ok_or_else(|| AppError::NotFound(format!("Bike {}", bike_id)))?;

    Ok(Json(build_document(&bike_id, &entry)))
}

// ─── Usage statistics ────────────────────────────────────────

/// Usage statistics, without the internal processed-id set.
#[derive(Serialize)]
pub struct StatsResponse {
    pub total_rides: u32,
    pub total_distance_m: f64,
    pub total_ride_time_s: u64,
    pub rides_by_type: HashMap<String, u32>,
    pub distance_by_type: HashMap<String, f64>,
    pub rides_by_month: HashMap<String, u32>,
    pub rides_by_year: HashMap<String, u32>,
    pub first_ride_at: Option<String>,
    pub last_ride_at: Option<String>,
    pub updated_at: String,
}

async fn get_bike_stats(
    State(state): State<Arc<AppState>>,
    Path(bike_id): Path<String>,
) -> Result<Json<StatsResponse>> {
    if !state.registry.contains_key(&bike_id) {
        return Err(AppError::NotFound(format!("Bike {}", bike_id)));
    }

    let stats = state
        .store
        .bike(&bike_id)
        .await
        .map(|b| b.stats)
        .unwrap_or_default();

    Ok(Json(StatsResponse {
        total_rides: stats.total_rides,
        total_distance_m: stats.total_distance_m,
        total_ride_time_s: stats.total_ride_time_s,
        rides_by_type: stats.rides_by_type,
        distance_by_type: stats.distance_by_type,
        rides_by_month: stats.rides_by_month,
        rides_by_year: stats.rides_by_year,
        first_ride_at: stats.first_ride_at,
        last_ride_at: stats.last_ride_at,
        updated_at: stats.updated_at,
    }))
}

// ─── Bike pass ───────────────────────────────────────────────

async fn get_bike_pass(
    State(state): State<Arc<AppState>>,
    Path(bike_id): Path<String>,
) -> Result<Json<BikePass>> {
    let entry = state
        .registry
        .get(&bike_id)
        .ok_or_else(|| AppError::NotFound(format!("Bike {}", bike_id)))?;

    let pass = entry
        .pass
        .clone()
        .ok_or_else(|| AppError::NotFound(format!("Bike pass for {}", bike_id)))?;

    Ok(Json(pass))
}
