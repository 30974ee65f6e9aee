// SPDX-License-Identifier: MIT

//! Flow OAuth login routes.
//!
//! The vendor only redirects to the mobile app's native scheme, so the flow
//! here is paste-based: `/auth/login` hands out the authorization URL, the
//! user signs in with their Flow account in a browser, and pastes the
//! resulting `onebikeapp-ios://...` redirect URL into `/auth/callback`.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::services::oauth;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/login", get(login_start))
        .route("/auth/callback", post(login_callback))
        .route("/auth/status", get(login_status))
}

/// Response of `/auth/login`: where to send the user.
#[derive(Serialize)]
pub struct LoginResponse {
    pub authorize_url: String,
}

/// Start the login: generate PKCE material and the signed state.
async fn login_start(State(state): State<Arc<AppState>>) -> Result<Json<LoginResponse>> {
    let pkce = oauth::generate_pkce_pair()?;
    let oauth_state = oauth::sign_state(&state.config.state_signing_key)?;
    let authorize_url =
        oauth::build_authorize_url(&state.config.auth_url, &pkce.challenge, &oauth_state)?;

    // One pending login at a time; a new start supersedes the previous one.
    *state.pending_login.lock().await = Some(pkce.verifier);

    tracing::info!("Login started, authorization URL issued");
    Ok(Json(LoginResponse { authorize_url }))
}

/// Request body of `/auth/callback`.
#[derive(Deserialize)]
pub struct CallbackRequest {
    /// The full redirect URL the browser ended up on.
    pub redirect_url: String,
}

#[derive(Serialize)]
pub struct CallbackResponse {
    pub success: bool,
    pub message: String,
}

/// Finish the login: verify the state, exchange the code, install tokens.
async fn login_callback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CallbackRequest>,
) -> Result<Json<CallbackResponse>> {
    let (code, oauth_state) = oauth::extract_code(&payload.redirect_url)?;

    let oauth_state = oauth_state
        .ok_or_else(|| AppError::BadRequest("Redirect URL carries no state".to_string()))?;
    oauth::verify_state(&state.config.state_signing_key, &oauth_state)?;

    let verifier = state
        .pending_login
        .lock()
        .await
        .take()
        .ok_or_else(|| AppError::BadRequest("No login in progress".to_string()))?;

    state.session.login_with_code(&code, &verifier).await?;

    // Let the coordinator pick the account up right away instead of waiting
    // out the poll interval.
    state.coordinator.poke();

    Ok(Json(CallbackResponse {
        success: true,
        message: "Logged in; bike discovery is running.".to_string(),
    }))
}

/// Whether the bridge holds tokens.
#[derive(Serialize)]
pub struct AuthStatusResponse {
    pub logged_in: bool,
}

async fn login_status(State(state): State<Arc<AppState>>) -> Json<AuthStatusResponse> {
    Json(AuthStatusResponse {
        logged_in: state.session.logged_in().await,
    })
}
