// SPDX-License-Identifier: MIT

//! Flow cloud API client.
//!
//! Handles:
//! - Bike profile fetching (v1 list, v2 single bike)
//! - Live state-of-charge (404 means the bike is offline, not an error)
//! - Paginated activity history
//! - Bike pass and subscription status
//! - Token refresh when expired, with a single retry after a 401

use std::future::Future;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::AppError;
use crate::models::activity::ActivityPage;
use crate::models::bike::{BikePass, BikePassList, BikeProfileDoc, BikeProfileEnvelope, BikeProfileList};
use crate::models::soc::StateOfCharge;
use crate::services::oauth::{self, TokenSet};
use crate::store::StateStore;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Activities per page; the vendor caps the page size at 30.
pub const ACTIVITY_PAGE_SIZE: u32 = 30;

/// Low-level Flow API client.
#[derive(Clone)]
pub struct FlowClient {
    http: reqwest::Client,
    profile_base_url: String,
    activity_base_url: String,
    bikepass_base_url: String,
    subscription_base_url: String,
}

impl FlowClient {
    /// Create a new client against the configured vendor endpoints.
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            profile_base_url: config.profile_base_url.clone(),
            activity_base_url: config.activity_base_url.clone(),
            bikepass_base_url: config.bikepass_base_url.clone(),
            subscription_base_url: config.subscription_base_url.clone(),
        }
    }

    /// The underlying HTTP client (shared with the token endpoint calls).
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// List all bikes of the authenticated account.
    pub async fn get_bike_profiles(
        &self,
        access_token: &str,
    ) -> Result<Vec<BikeProfileDoc>, AppError> {
        let url = format!("{}/v1/bike-profile", self.profile_base_url);
        let list: BikeProfileList = self.get_json(&url, access_token).await?;
        tracing::debug!(count = list.data.len(), "Fetched bike list");
        Ok(list.data)
    }

    /// Get the detailed v2 profile of one bike.
    pub async fn get_bike_profile(
        &self,
        access_token: &str,
        bike_id: &str,
    ) -> Result<BikeProfileDoc, AppError> {
        let url = format!("{}/v2/bike-profile/{}", self.profile_base_url, bike_id);
        let envelope: BikeProfileEnvelope = self.get_json(&url, access_token).await?;
        Ok(envelope.data)
    }

    /// Get live state-of-charge data from the ConnectModule.
    ///
    /// Returns `Ok(None)` when the endpoint 404s: that is the normal
    /// "bike is offline" case, not a failure.
    pub async fn get_state_of_charge(
        &self,
        access_token: &str,
        bike_id: &str,
    ) -> Result<Option<StateOfCharge>, AppError> {
        let url = format!("{}/v1/state-of-charge/{}", self.profile_base_url, bike_id);
        match self.get_json::<StateOfCharge>(&url, access_token).await {
            Ok(soc) => Ok(Some(soc)),
            Err(e) if e.is_offline() => {
                tracing::debug!(bike_id, "Live state-of-charge not available (bike offline?)");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch one page of the account's activity list, newest first.
    pub async fn get_activities(
        &self,
        access_token: &str,
        page: u32,
        size: u32,
    ) -> Result<ActivityPage, AppError> {
        let url = format!(
            "{}/v1/activity?page={}&size={}&sort=-startTime&include-polyline=false",
            self.activity_base_url, page, size
        );
        self.get_json(&url, access_token).await
    }

    /// Fetch all bike passes of the account.
    pub async fn get_bike_passes(&self, access_token: &str) -> Result<Vec<BikePass>, AppError> {
        let url = format!("{}/v1/passes", self.bikepass_base_url);
        let list: BikePassList = self.get_json(&url, access_token).await?;
        Ok(list.bike_passes)
    }

    /// Whether the account has an active Flow subscription.
    pub async fn get_subscription_state(&self, access_token: &str) -> Result<bool, AppError> {
        let url = format!("{}/v1/state", self.subscription_base_url);
        let state: SubscriptionState = self.get_json(&url, access_token).await?;
        Ok(state.status.unwrap_or(false))
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::flow(format!("Connection failed: {}", e)))?;

        self.check_response_json(response).await
    }

    /// Check response status and parse the JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Flow rate limit hit (429)");
            }

            return Err(AppError::flow_status(
                format!("HTTP {}: {}", status, body),
                status.as_u16(),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::flow(format!("JSON parse error: {}", e)))
    }
}

/// Subscription status response.
#[derive(Debug, Deserialize)]
struct SubscriptionState {
    status: Option<bool>,
}

// ─────────────────────────────────────────────────────────────────────────────
// FlowSession - high-level client with token management
// ─────────────────────────────────────────────────────────────────────────────

/// High-level Flow session that manages the token lifecycle and API calls.
///
/// The bridge serves exactly one account, so the cached token set lives
/// behind a single mutex; holding it across a refresh also serializes
/// concurrent refresh attempts.
#[derive(Clone)]
pub struct FlowSession {
    client: FlowClient,
    store: StateStore,
    token_url: String,
    cached: Arc<Mutex<Option<TokenSet>>>,
}

impl FlowSession {
    pub fn new(client: FlowClient, store: StateStore, token_url: String) -> Self {
        Self {
            client,
            store,
            token_url,
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether tokens are installed (i.e. the login flow has completed).
    pub async fn logged_in(&self) -> bool {
        if self.cached.lock().await.is_some() {
            return true;
        }
        self.store.tokens().await.is_some()
    }

    /// Install a fresh token set (from the OAuth callback) and persist it.
    pub async fn install_tokens(&self, tokens: TokenSet) -> Result<(), AppError> {
        self.store.set_tokens(&tokens).await?;
        *self.cached.lock().await = Some(tokens);
        tracing::info!("Flow tokens installed");
        Ok(())
    }

    /// Complete the login: exchange the pasted authorization code.
    pub async fn login_with_code(&self, code: &str, verifier: &str) -> Result<(), AppError> {
        let tokens =
            oauth::exchange_code(self.client.http(), &self.token_url, code, verifier).await?;
        self.install_tokens(tokens).await
    }

    /// Get a valid (non-expired) access token, refreshing if needed.
    async fn current_access_token(&self) -> Result<String, AppError> {
        let mut cached = self.cached.lock().await;

        if cached.is_none() {
            *cached = self.store.tokens().await;
        }

        let tokens = cached.as_ref().ok_or(AppError::Unauthorized)?;

        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
        if Utc::now() + margin < tokens.expires_at {
            return Ok(tokens.access_token.clone());
        }

        tracing::info!("Access token expired, refreshing");
        let refreshed =
            oauth::refresh_token(self.client.http(), &self.token_url, &tokens.refresh_token)
                .await?;
        self.store.set_tokens(&refreshed).await?;
        let access_token = refreshed.access_token.clone();
        *cached = Some(refreshed);
        Ok(access_token)
    }

    /// Refresh unconditionally (after the vendor rejected a token that we
    /// still believed to be valid).
    async fn force_refresh(&self) -> Result<String, AppError> {
        let mut cached = self.cached.lock().await;

        if cached.is_none() {
            *cached = self.store.tokens().await;
        }
        let tokens = cached.as_ref().ok_or(AppError::Unauthorized)?;

        let refreshed =
            oauth::refresh_token(self.client.http(), &self.token_url, &tokens.refresh_token)
                .await?;
        self.store.set_tokens(&refreshed).await?;
        let access_token = refreshed.access_token.clone();
        *cached = Some(refreshed);
        Ok(access_token)
    }

    /// Run an API call; on an auth error, refresh the token and retry
    /// exactly once, then surface whatever happens.
    async fn request_with_retry<T, Fut, F>(&self, call: F) -> Result<T, AppError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let token = self.current_access_token().await?;
        match call(token).await {
            Err(e) if e.is_auth_error() => {
                tracing::debug!("Got an auth error from the Flow API, refreshing and retrying");
                let token = self.force_refresh().await?;
                call(token).await
            }
            other => other,
        }
    }

    // ─── API Wrappers ────────────────────────────────────────────────────

    /// List all bikes of the account.
    pub async fn bike_profiles(&self) -> Result<Vec<BikeProfileDoc>, AppError> {
        self.request_with_retry(|token| async move {
            self.client.get_bike_profiles(&token).await
        })
        .await
    }

    /// Detailed v2 profile of one bike.
    pub async fn bike_profile(&self, bike_id: &str) -> Result<BikeProfileDoc, AppError> {
        self.request_with_retry(|token| async move {
            self.client.get_bike_profile(&token, bike_id).await
        })
        .await
    }

    /// Live state-of-charge; `None` when the bike is offline.
    pub async fn state_of_charge(&self, bike_id: &str) -> Result<Option<StateOfCharge>, AppError> {
        self.request_with_retry(|token| async move {
            self.client.get_state_of_charge(&token, bike_id).await
        })
        .await
    }

    /// One page of the account's activity list.
    pub async fn activities(&self, page: u32, size: u32) -> Result<ActivityPage, AppError> {
        self.request_with_retry(|token| async move {
            self.client.get_activities(&token, page, size).await
        })
        .await
    }

    /// The bike pass for one bike, if the account has one.
    pub async fn bike_pass(&self, bike_id: &str) -> Result<Option<BikePass>, AppError> {
        let passes = self
            .request_with_retry(|token| async move { self.client.get_bike_passes(&token).await })
            .await?;
        Ok(passes
            .into_iter()
            .find(|p| p.bike_id.as_deref() == Some(bike_id)))
    }

    /// Whether the account has an active Flow subscription.
    ///
    /// Any failure is treated as "no subscription": the live data fetch is
    /// then skipped, which is the safe degraded mode.
    pub async fn has_subscription(&self) -> bool {
        match self
            .request_with_retry(|token| async move {
                self.client.get_subscription_state(&token).await
            })
            .await
        {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "Subscription status check failed, assuming none");
                false
            }
        }
    }
}
