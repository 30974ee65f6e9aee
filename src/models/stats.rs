// SPDX-License-Identifier: MIT

//! Usage statistics aggregated from the activity history.
//!
//! These aggregates are folded incrementally as new activities appear, so a
//! re-walk of the paginated history never double-counts: the processed-id set
//! makes the fold idempotent and every counter monotonically non-decreasing.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::Activity;

/// Pre-computed usage statistics for one bike.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    // ─── Totals ──────────────────────────────────────────────────
    /// Total rides recorded
    #[serde(default)]
    pub total_rides: u32,
    /// Total distance across all rides (meters)
    #[serde(default)]
    pub total_distance_m: f64,
    /// Total moving time (seconds)
    #[serde(default)]
    pub total_ride_time_s: u64,

    // ─── By Ride Type ────────────────────────────────────────────
    /// Ride count per ride type
    #[serde(default)]
    pub rides_by_type: HashMap<String, u32>,
    /// Distance per ride type (meters)
    #[serde(default)]
    pub distance_by_type: HashMap<String, f64>,

    // ─── Time Series ─────────────────────────────────────────────
    /// Ride count per month ("YYYY-MM" format)
    #[serde(default)]
    pub rides_by_month: HashMap<String, u32>,
    /// Ride count per year ("YYYY" format)
    #[serde(default)]
    pub rides_by_year: HashMap<String, u32>,

    // ─── First/Last ──────────────────────────────────────────────
    /// Start time of the earliest ride (ISO 8601)
    #[serde(default)]
    pub first_ride_at: Option<String>,
    /// Start time of the most recent ride (ISO 8601)
    #[serde(default)]
    pub last_ride_at: Option<String>,

    // ─── Idempotency ─────────────────────────────────────────────
    /// Set of processed activity IDs (for duplicate detection)
    #[serde(default)]
    pub processed_activity_ids: HashSet<String>,

    // ─── Metadata ────────────────────────────────────────────────
    /// Last update timestamp (ISO 8601)
    #[serde(default)]
    pub updated_at: String,
}

impl Default for UsageStats {
    fn default() -> Self {
        Self {
            total_rides: 0,
            total_distance_m: 0.0,
            total_ride_time_s: 0,
            rides_by_type: HashMap::new(),
            distance_by_type: HashMap::new(),
            rides_by_month: HashMap::new(),
            rides_by_year: HashMap::new(),
            first_ride_at: None,
            last_ride_at: None,
            processed_activity_ids: HashSet::new(),
            updated_at: String::new(),
        }
    }
}

impl UsageStats {
    /// Fold one activity into the aggregates.
    ///
    /// Returns `true` if the activity was new and counted.
    /// Returns `false` if it was already processed (nothing mutated).
    pub fn record_activity(&mut self, activity: &Activity, now: &str) -> bool {
        // Idempotency check: skip if already processed
        if self.processed_activity_ids.contains(&activity.id) {
            return false;
        }

        self.processed_activity_ids.insert(activity.id.clone());
        self.updated_at = now.to_string();

        let attrs = &activity.attributes;
        let distance = attrs.total_distance.unwrap_or(0.0);
        let ride_type = attrs.ride_type.as_deref().unwrap_or("UNKNOWN");

        self.total_rides += 1;
        self.total_distance_m += distance;
        self.total_ride_time_s += attrs.ride_duration.unwrap_or(0);

        *self.rides_by_type.entry(ride_type.to_string()).or_insert(0) += 1;
        *self
            .distance_by_type
            .entry(ride_type.to_string())
            .or_insert(0.0) += distance;

        if let Some(start) = attrs.start_time.as_deref() {
            if let Some(month_key) = extract_month_key(start) {
                *self.rides_by_month.entry(month_key).or_insert(0) += 1;
            }
            if let Some(year_key) = extract_year_key(start) {
                *self.rides_by_year.entry(year_key).or_insert(0) += 1;
            }

            // ISO 8601 UTC strings compare correctly as strings.
            match self.first_ride_at.as_deref() {
                Some(first) if first <= start => {}
                _ => self.first_ride_at = Some(start.to_string()),
            }
            match self.last_ride_at.as_deref() {
                Some(last) if last >= start => {}
                _ => self.last_ride_at = Some(start.to_string()),
            }
        }

        true
    }
}

/// Extract "YYYY-MM" from an ISO 8601 date string.
fn extract_month_key(date: &str) -> Option<String> {
    // ISO 8601: "2024-01-15T10:30:00Z" -> "2024-01"
    if date.len() >= 7 {
        Some(date[..7].to_string())
    } else {
        None
    }
}

/// Extract "YYYY" from an ISO 8601 date string.
fn extract_year_key(date: &str) -> Option<String> {
    if date.len() >= 4 {
        Some(date[..4].to_string())
    } else {
        None
    }
}
