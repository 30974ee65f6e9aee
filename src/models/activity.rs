// SPDX-License-Identifier: MIT

//! Ride activity documents from the Flow rider-activity API.

use serde::{Deserialize, Serialize};

/// One page of the activity list: `{"data": [...], "meta": {...}}`.
///
/// The list is account-wide (all bikes) and sorted newest-first by the
/// caller via `sort=-startTime`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityPage {
    #[serde(default)]
    pub data: Vec<Activity>,
    #[serde(default)]
    pub meta: PageMeta,
}

/// Pagination metadata.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Total number of pages available
    #[serde(default)]
    pub pages: u32,
    /// Total number of activities across all pages
    #[serde(default)]
    pub elements: u32,
}

/// One recorded ride.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    #[serde(default)]
    pub attributes: ActivityAttributes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityAttributes {
    /// Which bike recorded the ride
    pub bike_id: Option<String>,
    /// Ride start (ISO 8601)
    pub start_time: Option<String>,
    /// Distance ridden in meters
    pub total_distance: Option<f64>,
    /// Moving time in seconds
    pub ride_duration: Option<u64>,
    /// Average speed in km/h
    pub average_speed: Option<f64>,
    pub title: Option<String>,
    /// Ride type as reported by the app (e.g. "BIKE_RIDE")
    #[serde(rename = "type")]
    pub ride_type: Option<String>,
}

impl Activity {
    /// Whether this activity belongs to the given bike.
    pub fn belongs_to(&self, bike_id: &str) -> bool {
        self.attributes.bike_id.as_deref() == Some(bike_id)
    }
}
