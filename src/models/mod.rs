// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod activity;
pub mod bike;
pub mod snapshot;
pub mod soc;
pub mod stats;

pub use activity::{Activity, ActivityPage};
pub use bike::{BikePass, BikeProfile};
pub use snapshot::BikeSnapshot;
pub use soc::StateOfCharge;
pub use stats::UsageStats;
