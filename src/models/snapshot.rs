// SPDX-License-Identifier: MIT

//! Merged telemetry snapshot for one bike.
//!
//! The bike profile carries the last state the cloud knows about; the live
//! state-of-charge document (when the bike is online) is fresher but sparse.
//! [`BikeSnapshot::merge`] combines the two: profile values win, live data
//! fills the gaps. The reachable range and the odometer are the exception,
//! there the live reading supersedes the cloud's stale copy.

use serde::{Deserialize, Serialize};

use crate::models::bike::BikeProfile;
use crate::models::soc::StateOfCharge;

/// Combined view over the profile and state-of-charge documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BikeSnapshot {
    pub battery: BatteryState,
    pub bike: BikeState,
    pub components: Components,
    /// When the ConnectModule last reported (only with live data)
    pub last_update: Option<String>,
    /// Whether the live state-of-charge document was available
    pub live_data_available: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatteryState {
    pub level_percent: Option<f64>,
    pub remaining_wh: Option<f64>,
    pub total_capacity_wh: Option<f64>,
    pub is_charging: Option<bool>,
    pub is_charger_connected: Option<bool>,
    pub charge_cycles_total: Option<u32>,
    pub delivered_lifetime_wh: Option<f64>,
    /// Predicted range per assist mode in km, sorted descending
    pub reachable_range_km: Vec<f64>,
    /// Energy still available to the rider in Wh (live only)
    pub remaining_energy_rider_wh: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BikeState {
    pub total_distance_m: Option<f64>,
    pub is_locked: Option<bool>,
    pub lock_enabled: Option<bool>,
    pub alarm_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Components {
    pub drive_unit: ComponentInfo,
    pub battery: ComponentInfo,
    pub connected_module: ComponentInfo,
    pub remote_control: ComponentInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub product_name: Option<String>,
    pub software_version: Option<String>,
    pub serial_number: Option<String>,
}

impl BikeSnapshot {
    /// Combine a bike profile with an optional live state-of-charge document.
    pub fn merge(profile: &BikeProfile, soc: Option<&StateOfCharge>) -> Self {
        // First battery of the list; bikes with dual batteries report the
        // combined state there.
        let battery = profile.batteries.first();
        let drive_unit = profile.drive_unit.as_ref();
        let connected_module = profile.connected_module.as_ref();
        let remote_control = profile.remote_control.as_ref();

        // Profile-derived range: the per-assist-mode predictions, strongest
        // range first.
        let mut reachable_range_km: Vec<f64> = drive_unit
            .map(|du| {
                du.drive_unit_assist_modes
                    .iter()
                    .filter_map(|m| m.reachable_range)
                    .collect()
            })
            .unwrap_or_default();
        reachable_range_km.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let mut snapshot = BikeSnapshot {
            battery: BatteryState {
                level_percent: battery.and_then(|b| b.battery_level),
                remaining_wh: battery.and_then(|b| b.remaining_energy),
                total_capacity_wh: battery.and_then(|b| b.total_energy),
                is_charging: battery.and_then(|b| b.is_charging),
                is_charger_connected: battery.and_then(|b| b.is_charger_connected),
                charge_cycles_total: battery
                    .and_then(|b| b.number_of_full_charge_cycles.as_ref())
                    .and_then(|c| c.total),
                delivered_lifetime_wh: battery.and_then(|b| b.delivered_wh_over_lifetime),
                reachable_range_km,
                remaining_energy_rider_wh: None,
            },
            bike: BikeState {
                total_distance_m: drive_unit.and_then(|du| du.total_distance_traveled),
                is_locked: drive_unit
                    .and_then(|du| du.lock.as_ref())
                    .and_then(|l| l.is_locked),
                lock_enabled: drive_unit
                    .and_then(|du| du.lock.as_ref())
                    .and_then(|l| l.is_enabled),
                alarm_enabled: connected_module.and_then(|cm| cm.is_alarm_feature_enabled),
            },
            components: Components {
                drive_unit: ComponentInfo {
                    product_name: drive_unit.and_then(|c| c.product_name.clone()),
                    software_version: drive_unit.and_then(|c| c.software_version.clone()),
                    serial_number: drive_unit.and_then(|c| c.serial_number.clone()),
                },
                battery: ComponentInfo {
                    product_name: battery.and_then(|c| c.product_name.clone()),
                    software_version: battery.and_then(|c| c.software_version.clone()),
                    serial_number: battery.and_then(|c| c.serial_number.clone()),
                },
                connected_module: ComponentInfo {
                    product_name: connected_module.and_then(|c| c.product_name.clone()),
                    software_version: connected_module.and_then(|c| c.software_version.clone()),
                    serial_number: connected_module.and_then(|c| c.serial_number.clone()),
                },
                remote_control: ComponentInfo {
                    product_name: remote_control.and_then(|c| c.product_name.clone()),
                    software_version: remote_control.and_then(|c| c.software_version.clone()),
                    serial_number: remote_control.and_then(|c| c.serial_number.clone()),
                },
            },
            last_update: None,
            live_data_available: false,
        };

        if let Some(soc) = soc {
            snapshot.live_data_available = true;
            snapshot.last_update = soc.state_of_charge_latest_update.clone();

            // Live data fills in nulls but never overwrites a profile value.
            if snapshot.battery.level_percent.is_none() {
                snapshot.battery.level_percent = soc.state_of_charge;
            }
            if snapshot.battery.is_charging.is_none() {
                snapshot.battery.is_charging = soc.charging_active;
            }
            if snapshot.battery.is_charger_connected.is_none() {
                snapshot.battery.is_charger_connected = soc.charger_connected;
            }

            // The live range replaces the profile-derived predictions.
            snapshot.battery.reachable_range_km = soc.reachable_range.clone();
            snapshot.battery.remaining_energy_rider_wh = soc.remaining_energy_for_rider;

            // The live odometer supersedes the cloud's copy.
            if soc.odometer.is_some() {
                snapshot.bike.total_distance_m = soc.odometer;
            }
        }

        snapshot
    }

    /// Best-case range: the first entry of the descending list.
    pub fn reachable_range_max(&self) -> Option<f64> {
        self.battery.reachable_range_km.first().copied()
    }

    /// Worst-case range: the last non-zero entry. Modes the bike cannot
    /// reach any more report 0, which would be a useless "minimum".
    pub fn reachable_range_min(&self) -> Option<f64> {
        if self.battery.reachable_range_km.is_empty() {
            return None;
        }
        for range in self.battery.reachable_range_km.iter().rev() {
            if *range != 0.0 {
                return Some(*range);
            }
        }
        Some(0.0)
    }

    /// Odometer in km, rounded to two decimals.
    pub fn total_distance_km(&self) -> Option<f64> {
        self.bike
            .total_distance_m
            .map(|m| (m / 1000.0 * 100.0).round() / 100.0)
    }

    /// Lifetime delivered energy in kWh, rounded to two decimals.
    pub fn lifetime_energy_kwh(&self) -> Option<f64> {
        self.battery
            .delivered_lifetime_wh
            .map(|wh| (wh / 1000.0 * 100.0).round() / 100.0)
    }

    /// Lock state, falling back to the lock feature flag when the actual
    /// engaged state is unknown.
    pub fn lock_engaged(&self) -> Option<bool> {
        self.bike.is_locked.or(self.bike.lock_enabled)
    }
}
