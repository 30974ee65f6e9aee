// SPDX-License-Identifier: MIT

//! Periodic data-refresh coordinator.
//!
//! One cooperative polling loop on a fixed interval. Every tick fetches the
//! bike profile (the one hard requirement), opportunistically adds live
//! state-of-charge data, merges both into a snapshot, and reconciles the
//! activity history into the usage statistics. A failed refresh keeps the
//! previous snapshot, marks the bike unavailable, and is retried on the next
//! tick; there is no backoff protocol beyond that.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

use crate::error::AppError;
use crate::models::bike::{display_name, BikePass};
use crate::models::BikeSnapshot;
use crate::services::{activities, flow::FlowSession};
use crate::store::StateStore;

/// Live view of one bike, published for the REST surface.
#[derive(Debug, Clone, Default)]
pub struct BikeEntry {
    pub name: String,
    pub snapshot: Option<BikeSnapshot>,
    pub pass: Option<BikePass>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl BikeEntry {
    /// Entity-availability semantics: available only while the most recent
    /// refresh succeeded and produced data.
    pub fn available(&self) -> bool {
        self.last_error.is_none() && self.snapshot.is_some()
    }
}

/// Shared registry of live bike entries, keyed by bike id.
pub type SnapshotRegistry = Arc<DashMap<String, BikeEntry>>;

/// The polling coordinator.
pub struct Coordinator {
    session: FlowSession,
    store: StateStore,
    registry: SnapshotRegistry,
    poll_interval: Duration,
    has_flow_subscription: AtomicBool,
    initialized: AtomicBool,
    poke: Notify,
}

impl Coordinator {
    pub fn new(
        session: FlowSession,
        store: StateStore,
        registry: SnapshotRegistry,
        poll_interval: Duration,
    ) -> Self {
        Self {
            session,
            store,
            registry,
            poll_interval,
            has_flow_subscription: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            poke: Notify::new(),
        }
    }

    /// Wake the loop outside its schedule (after a completed login).
    pub fn poke(&self) {
        self.poke.notify_one();
    }

    /// Drive the polling loop forever. Shutdown happens with the runtime.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.poke.notified() => {}
            }

            if !self.session.logged_in().await {
                tracing::debug!("Not logged in yet, skipping refresh tick");
                continue;
            }

            if !self.initialized.load(Ordering::Acquire) {
                if let Err(e) = self.initialize().await {
                    tracing::warn!(error = %e, "Coordinator initialization failed, retrying next tick");
                    continue;
                }
            }

            self.refresh_all().await;
        }
    }

    /// One-time setup once tokens are available: subscription state, bike
    /// discovery, and the bike pass (fetched once and kept).
    pub async fn initialize(&self) -> Result<(), AppError> {
        let subscribed = self.session.has_subscription().await;
        self.has_flow_subscription
            .store(subscribed, Ordering::Release);
        tracing::info!(subscribed, "Flow subscription checked");

        let bikes = self.session.bike_profiles().await?;
        if bikes.is_empty() {
            tracing::warn!("The Flow account has no bikes");
        }

        for doc in bikes {
            let name = display_name(&doc.attributes);
            self.store.upsert_bike(&doc.id, &name).await?;

            let stored_pass = self.store.bike(&doc.id).await.and_then(|b| b.pass);
            let pass = match stored_pass {
                Some(pass) => Some(pass),
                None => match self.session.bike_pass(&doc.id).await {
                    Ok(Some(pass)) if pass.frame_number.is_some() => {
                        self.store.set_bike_pass(&doc.id, &pass).await?;
                        Some(pass)
                    }
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!(bike_id = %doc.id, error = %e, "Bike pass fetch failed");
                        None
                    }
                },
            };

            let mut entry = self.registry.entry(doc.id.clone()).or_default();
            entry.name = name;
            entry.pass = pass;

            tracing::info!(bike_id = %doc.id, name = %entry.name, "Bike registered");
        }

        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Refresh every registered bike once.
    pub async fn refresh_all(&self) {
        // Collect ids first; holding a DashMap guard across an await would
        // block the registry readers.
        let bike_ids: Vec<String> = self.registry.iter().map(|e| e.key().clone()).collect();

        for bike_id in bike_ids {
            self.refresh_bike(&bike_id).await;
        }
    }

    /// One tick for one bike.
    async fn refresh_bike(&self, bike_id: &str) {
        match self.fetch_snapshot(bike_id).await {
            Ok(snapshot) => {
                tracing::info!(
                    bike_id,
                    battery = ?snapshot.battery.level_percent,
                    charging = ?snapshot.battery.is_charging,
                    live = snapshot.live_data_available,
                    "Refresh complete"
                );

                // A failed reconcile must not discard the fresh snapshot;
                // the cursor stays put and the next tick retries.
                if let Err(e) = activities::reconcile(&self.session, &self.store, bike_id).await {
                    tracing::warn!(
                        bike_id,
                        error = %e,
                        "Activity reconciliation failed, will retry next tick"
                    );
                }

                if let Some(mut entry) = self.registry.get_mut(bike_id) {
                    entry.snapshot = Some(snapshot);
                    entry.last_success = Some(Utc::now());
                    entry.last_error = None;
                }
            }
            Err(e) => {
                tracing::error!(bike_id, error = %e, "Refresh failed");
                if let Some(mut entry) = self.registry.get_mut(bike_id) {
                    entry.last_error = Some(e.to_string());
                }
            }
        }
    }

    /// Fetch and merge the two data sources for one bike.
    async fn fetch_snapshot(&self, bike_id: &str) -> Result<BikeSnapshot, AppError> {
        // Static info plus last known battery state; this one must succeed.
        let profile_doc = self.session.bike_profile(bike_id).await?;

        // Live state of charge only works with a subscription and while the
        // bike is online; anything going wrong here just means "no live data".
        let soc = if self.has_flow_subscription.load(Ordering::Acquire) {
            match self.session.state_of_charge(bike_id).await {
                Ok(soc) => soc,
                Err(e) => {
                    tracing::debug!(bike_id, error = %e, "State-of-charge fetch failed");
                    None
                }
            }
        } else {
            tracing::debug!(bike_id, "No Flow subscription, skipping live state-of-charge");
            None
        };

        Ok(BikeSnapshot::merge(&profile_doc.attributes, soc.as_ref()))
    }
}
