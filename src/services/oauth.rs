// SPDX-License-Identifier: MIT

//! OAuth2 plumbing for the vendor's identity provider.
//!
//! The Flow cloud uses an authorization-code flow with PKCE against the
//! mobile app's public client id. There is no client secret; the code
//! verifier plus an HMAC-signed `state` parameter carry the proof. The
//! redirect URI is a native-app scheme, so the login flow ends with the user
//! pasting the redirect URL back to us.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{OAUTH_CLIENT_ID, OAUTH_REDIRECT_URI, OAUTH_SCOPE};
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// How long a signed OAuth state stays valid.
const STATE_MAX_AGE_MS: u128 = 15 * 60 * 1000;

/// Token lifetime assumed when the endpoint omits `expires_in` (2 hours).
const DEFAULT_EXPIRES_IN_SECS: i64 = 7200;

/// PKCE verifier/challenge pair for one login attempt.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

/// A usable set of OAuth tokens, as persisted in the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    /// When the access token expires (UTC)
    pub expires_at: DateTime<Utc>,
}

/// Raw token endpoint response.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: Option<i64>,
}

impl TokenSet {
    fn from_response(response: TokenResponse) -> Self {
        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        TokenSet {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        }
    }
}

/// Generate a PKCE code verifier and its S256 challenge.
pub fn generate_pkce_pair() -> Result<PkcePair, AppError> {
    // 32 random bytes -> 43 base64url chars, within the 43..=128 the RFC allows
    let verifier = random_urlsafe(32)?;
    let challenge = challenge_for(&verifier);
    Ok(PkcePair {
        verifier,
        challenge,
    })
}

/// S256 challenge for a given verifier.
fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Random url-safe base64 string from `bytes` random bytes.
fn random_urlsafe(bytes: usize) -> Result<String, AppError> {
    let mut buf = vec![0u8; bytes];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG failure")))?;
    Ok(URL_SAFE_NO_PAD.encode(buf))
}

/// Build the authorization URL the user opens in a browser.
pub fn build_authorize_url(auth_url: &str, challenge: &str, state: &str) -> Result<String, AppError> {
    let nonce = random_urlsafe(32)?;

    let params: [(&str, &str); 10] = [
        ("client_id", OAUTH_CLIENT_ID),
        ("redirect_uri", OAUTH_REDIRECT_URI),
        ("response_type", "code"),
        ("scope", OAUTH_SCOPE),
        ("code_challenge", challenge),
        ("code_challenge_method", "S256"),
        ("kc_idp_hint", "skid"),
        ("prompt", "login"),
        ("nonce", &nonce),
        ("state", state),
    ];

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    Ok(format!("{}?{}", auth_url, query))
}

// ─── Signed state parameter ──────────────────────────────────────────────

/// Create an HMAC-signed `state` value: base64url("nonce|ts_hex|sig_hex").
pub fn sign_state(key: &[u8]) -> Result<String, AppError> {
    let nonce = random_urlsafe(16)?;
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis();

    let payload = format!("{}|{:x}", nonce, timestamp);

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    let signed = format!("{}|{}", payload, hex::encode(signature));
    Ok(URL_SAFE_NO_PAD.encode(signed.as_bytes()))
}

/// Verify a `state` value produced by [`sign_state`].
pub fn verify_state(key: &[u8], state: &str) -> Result<(), AppError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(state.as_bytes())
        .map_err(|_| AppError::BadRequest("Malformed OAuth state".to_string()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| AppError::BadRequest("Malformed OAuth state".to_string()))?;

    let mut parts = decoded.splitn(3, '|');
    let (nonce, ts_hex, sig_hex) = match (parts.next(), parts.next(), parts.next()) {
        (Some(n), Some(t), Some(s)) => (n, t, s),
        _ => return Err(AppError::BadRequest("Malformed OAuth state".to_string())),
    };

    let payload = format!("{}|{}", nonce, ts_hex);
    let signature = hex::decode(sig_hex)
        .map_err(|_| AppError::BadRequest("Malformed OAuth state".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| AppError::BadRequest("OAuth state signature mismatch".to_string()))?;

    let timestamp = u128::from_str_radix(ts_hex, 16)
        .map_err(|_| AppError::BadRequest("Malformed OAuth state".to_string()))?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis();

    if now.saturating_sub(timestamp) > STATE_MAX_AGE_MS {
        return Err(AppError::BadRequest("OAuth state expired".to_string()));
    }

    Ok(())
}

/// Pull the authorization code (and state) out of a pasted redirect URL.
pub fn extract_code(redirect_url: &str) -> Result<(String, Option<String>), AppError> {
    let query = redirect_url
        .split_once('?')
        .map(|(_, q)| q)
        .unwrap_or(redirect_url);

    let mut code = None;
    let mut state = None;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("code", v)) => code = Some(v.to_string()),
            Some(("state", v)) => state = Some(v.to_string()),
            _ => {}
        }
    }

    match code {
        Some(code) if !code.is_empty() => Ok((code, state)),
        _ => Err(AppError::BadRequest(
            "Redirect URL carries no authorization code".to_string(),
        )),
    }
}

// ─── Token endpoint ──────────────────────────────────────────────────────

/// Exchange an authorization code for tokens.
pub async fn exchange_code(
    http: &reqwest::Client,
    token_url: &str,
    code: &str,
    verifier: &str,
) -> Result<TokenSet, AppError> {
    let response = http
        .post(token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("client_id", OAUTH_CLIENT_ID),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", OAUTH_REDIRECT_URI),
        ])
        .send()
        .await
        .map_err(|e| AppError::flow(format!("Token exchange request failed: {}", e)))?;

    parse_token_response(response).await
}

/// Refresh an expired access token.
pub async fn refresh_token(
    http: &reqwest::Client,
    token_url: &str,
    refresh_token: &str,
) -> Result<TokenSet, AppError> {
    let response = http
        .post(token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", OAUTH_CLIENT_ID),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await
        .map_err(|e| AppError::flow(format!("Token refresh request failed: {}", e)))?;

    parse_token_response(response).await
}

async fn parse_token_response(response: reqwest::Response) -> Result<TokenSet, AppError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "Token endpoint rejected the request");
        return Err(AppError::flow_status(
            format!("Token endpoint failed: {}", body),
            status.as_u16(),
        ));
    }

    let raw: TokenResponse = response
        .json()
        .await
        .map_err(|e| AppError::flow(format!("Failed to parse token response: {}", e)))?;

    Ok(TokenSet::from_response(raw))
}
