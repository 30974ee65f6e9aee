// SPDX-License-Identifier: MIT

//! flowbridge: republish Bosch eBike Flow telemetry as local entities
//!
//! This crate polls the Flow cloud for bike telemetry (battery, odometer,
//! lock/alarm state, ride activities) and serves the merged result over a
//! small REST API.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod time_utils;

use std::sync::Arc;

use config::Config;
use services::{Coordinator, FlowSession, SnapshotRegistry};
use store::StateStore;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: StateStore,
    pub session: FlowSession,
    pub registry: SnapshotRegistry,
    pub coordinator: Arc<Coordinator>,
    /// PKCE verifier of the login currently in progress, if any.
    pub pending_login: tokio::sync::Mutex<Option<String>>,
}
