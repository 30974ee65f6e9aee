// SPDX-License-Identifier: MIT

//! Persisted bridge state.
//!
//! Everything durable lives in one small JSON file: the OAuth tokens, the
//! per-bike pass, the activity cursor and the usage statistics. Writes
//! serialize the full state to a temp file and rename it over the original,
//! and the coordinator is the only writer, so a crash can at worst lose the
//! latest tick (which the next tick repeats harmlessly).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::models::bike::BikePass;
use crate::models::UsageStats;
use crate::services::oauth::TokenSet;

/// Full persisted state of the bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub tokens: Option<TokenSet>,
    #[serde(default)]
    pub bikes: HashMap<String, PersistedBike>,
}

/// Durable per-bike record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedBike {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pass: Option<BikePass>,
    /// Newest activity id that has been folded into the stats
    #[serde(default)]
    pub last_activity_id: Option<String>,
    #[serde(default)]
    pub stats: UsageStats,
}

/// Handle to the state file with an in-memory copy.
#[derive(Clone)]
pub struct StateStore {
    /// `None` runs the store purely in memory (tests).
    path: Option<PathBuf>,
    state: Arc<RwLock<PersistedState>>,
}

impl StateStore {
    /// Load the state file, starting fresh when it does not exist yet.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();

        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                AppError::State(format!(
                    "State file {} is not parseable: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No state file yet, starting fresh");
                PersistedState::default()
            }
            Err(e) => {
                return Err(AppError::State(format!(
                    "Cannot read state file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            path: Some(path),
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// An in-memory store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Arc::new(RwLock::new(PersistedState::default())),
        }
    }

    // ─── Token Operations ────────────────────────────────────────

    pub async fn tokens(&self) -> Option<TokenSet> {
        self.state.read().await.tokens.clone()
    }

    pub async fn set_tokens(&self, tokens: &TokenSet) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.tokens = Some(tokens.clone());
        self.persist(&state).await
    }

    // ─── Bike Operations ─────────────────────────────────────────

    pub async fn bike(&self, bike_id: &str) -> Option<PersistedBike> {
        self.state.read().await.bikes.get(bike_id).cloned()
    }

    /// Make sure a bike record exists and carries the current display name.
    pub async fn upsert_bike(&self, bike_id: &str, name: &str) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        let bike = state.bikes.entry(bike_id.to_string()).or_default();
        if bike.name != name {
            bike.name = name.to_string();
        }
        self.persist(&state).await
    }

    pub async fn set_bike_pass(&self, bike_id: &str, pass: &BikePass) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state
            .bikes
            .entry(bike_id.to_string())
            .or_default()
            .pass = Some(pass.clone());
        self.persist(&state).await
    }

    /// Commit reconciliation progress: the cursor and the stats are one
    /// logical unit and must never be persisted separately.
    pub async fn commit_activity_progress(
        &self,
        bike_id: &str,
        last_activity_id: Option<String>,
        stats: &UsageStats,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        let bike = state.bikes.entry(bike_id.to_string()).or_default();
        bike.last_activity_id = last_activity_id;
        bike.stats = stats.clone();
        self.persist(&state).await
    }

    // ─── Persistence ─────────────────────────────────────────────

    async fn persist(&self, state: &PersistedState) -> Result<(), AppError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| AppError::State(format!("Cannot serialize state: {}", e)))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| AppError::State(format!("Cannot write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| AppError::State(format!("Cannot replace {}: {}", path.display(), e)))?;

        Ok(())
    }
}
