// SPDX-License-Identifier: MIT

//! Bike profile documents as returned by the Flow rider-profile API.
//!
//! The v1 endpoint lists all bikes of the account, the v2 endpoint returns a
//! single profile. Both wrap the payload in a JSON:API-style `data` envelope
//! and both may return `null` for any optional field, so every leaf here is
//! an `Option`.

use serde::{Deserialize, Serialize};

/// Envelope of the v1 bike list: `{"data": [...]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BikeProfileList {
    #[serde(default)]
    pub data: Vec<BikeProfileDoc>,
}

/// Envelope of the v2 single-bike profile: `{"data": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BikeProfileEnvelope {
    pub data: BikeProfileDoc,
}

/// One bike document: id plus attributes.
#[derive(Debug, Clone, Deserialize)]
pub struct BikeProfileDoc {
    pub id: String,
    #[serde(default)]
    pub attributes: BikeProfile,
}

/// Bike profile attributes (static info plus last known battery state).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BikeProfile {
    pub brand_name: Option<String>,
    pub frame_number: Option<String>,
    #[serde(default)]
    pub batteries: Vec<Battery>,
    pub drive_unit: Option<DriveUnit>,
    pub connected_module: Option<ConnectedModule>,
    pub remote_control: Option<RemoteControl>,
}

/// Battery pack state as last reported to the cloud.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Battery {
    /// Charge level in percent
    pub battery_level: Option<f64>,
    /// Remaining energy in Wh
    pub remaining_energy: Option<f64>,
    /// Total capacity in Wh
    pub total_energy: Option<f64>,
    pub is_charging: Option<bool>,
    pub is_charger_connected: Option<bool>,
    pub number_of_full_charge_cycles: Option<ChargeCycles>,
    /// Energy delivered over the battery's lifetime in Wh
    pub delivered_wh_over_lifetime: Option<f64>,
    pub product_name: Option<String>,
    pub software_version: Option<String>,
    pub serial_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeCycles {
    pub total: Option<u32>,
}

/// Drive unit data, including the odometer and the lock feature state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveUnit {
    /// Odometer in meters
    pub total_distance_traveled: Option<f64>,
    pub lock: Option<LockState>,
    #[serde(default)]
    pub drive_unit_assist_modes: Vec<AssistMode>,
    pub product_name: Option<String>,
    pub software_version: Option<String>,
    pub serial_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockState {
    pub is_locked: Option<bool>,
    pub is_enabled: Option<bool>,
}

/// Predicted range for one assist mode (eco, tour, sport, turbo).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistMode {
    pub name: Option<String>,
    /// Predicted range in km
    pub reachable_range: Option<f64>,
}

/// ConnectModule component info.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedModule {
    pub is_alarm_feature_enabled: Option<bool>,
    pub product_name: Option<String>,
    pub software_version: Option<String>,
    pub serial_number: Option<String>,
}

/// Handlebar remote component info.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteControl {
    pub product_name: Option<String>,
    pub software_version: Option<String>,
    pub serial_number: Option<String>,
}

// ─── Bike pass ───────────────────────────────────────────────

/// Envelope of the bike-pass endpoint: `{"bikePasses": [...]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BikePassList {
    #[serde(default)]
    pub bike_passes: Vec<BikePass>,
}

/// Proof-of-ownership record for a bike.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BikePass {
    pub bike_id: Option<String>,
    pub frame_number: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default)]
    pub files: Vec<BikePassFile>,
}

/// An attachment on a bike pass (invoice scan etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BikePassFile {
    pub file_id: Option<String>,
    pub file_type: Option<String>,
    pub link: Option<String>,
}

/// Build a descriptive display name for a bike.
///
/// "Cube (Performance CX)" when the drive unit product is known,
/// "Cube (...1234)" from the frame number, or just the brand.
pub fn display_name(profile: &BikeProfile) -> String {
    let brand = profile.brand_name.as_deref().unwrap_or("eBike");

    if let Some(du_name) = profile
        .drive_unit
        .as_ref()
        .and_then(|du| du.product_name.as_deref())
    {
        return format!("{} ({})", brand, du_name);
    }

    if let Some(frame) = profile.frame_number.as_deref() {
        if frame.len() >= 4 {
            return format!("{} (...{})", brand, &frame[frame.len() - 4..]);
        }
    }

    brand.to_string()
}
