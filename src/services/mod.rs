// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod activities;
pub mod coordinator;
pub mod flow;
pub mod oauth;

pub use coordinator::{BikeEntry, Coordinator, SnapshotRegistry};
pub use flow::{FlowClient, FlowSession};
pub use oauth::TokenSet;
