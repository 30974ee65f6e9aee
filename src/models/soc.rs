// SPDX-License-Identifier: MIT

//! Live state-of-charge document from the ConnectModule.
//!
//! Only available while the bike is online (typically while charging) and
//! only with a Flow subscription; the endpoint 404s otherwise.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateOfCharge {
    /// Charge level in percent
    pub state_of_charge: Option<f64>,
    pub charging_active: Option<bool>,
    pub charger_connected: Option<bool>,
    /// Energy still available to the rider in Wh
    pub remaining_energy_for_rider: Option<f64>,
    /// Predicted range per assist mode in km, most economical mode first
    #[serde(default)]
    pub reachable_range: Vec<f64>,
    /// Odometer in meters
    pub odometer: Option<f64>,
    /// When the ConnectModule last reported (ISO 8601)
    pub state_of_charge_latest_update: Option<String>,
}
