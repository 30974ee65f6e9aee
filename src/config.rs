//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup. The vendor base URLs are plain fields
//! with production defaults so tests can point the client at a local server.

use std::env;

/// OAuth client id registered for the vendor's mobile app.
pub const OAUTH_CLIENT_ID: &str = "one-bike-app";
/// Redirect URI the vendor accepts for that client (a native-app scheme).
pub const OAUTH_REDIRECT_URI: &str = "onebikeapp-ios://com.bosch.ebike.onebikeapp/oauth2redirect";
/// Scopes needed for profile access plus a refresh token.
pub const OAUTH_SCOPE: &str = "openid offline_access";

const DEFAULT_AUTH_URL: &str =
    "https://p9.authz.bosch.com/auth/realms/obc/protocol/openid-connect/auth";
const DEFAULT_TOKEN_URL: &str =
    "https://p9.authz.bosch.com/auth/realms/obc/protocol/openid-connect/token";
const DEFAULT_PROFILE_BASE_URL: &str = "https://obc-rider-profile.prod.connected-biking.cloud";
const DEFAULT_ACTIVITY_BASE_URL: &str = "https://obc-rider-activity.prod.connected-biking.cloud";
const DEFAULT_BIKEPASS_BASE_URL: &str = "https://bike-pass.prod.connected-biking.cloud";
const DEFAULT_SUBSCRIPTION_BASE_URL: &str =
    "https://obc-inapp-purchase.prod.connected-biking.cloud";

/// Poll every 5 minutes by default (the ConnectModule reports on that cadence).
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Coordinator poll interval in seconds
    pub poll_interval_secs: u64,
    /// Path of the JSON state file
    pub state_path: String,
    /// Optional bearer token protecting the /api routes
    pub api_token: Option<String>,
    /// HMAC key for signing the OAuth state parameter
    pub state_signing_key: Vec<u8>,

    // --- Vendor endpoints (overridable for tests) ---
    pub auth_url: String,
    pub token_url: String,
    pub profile_base_url: String,
    pub activity_base_url: String,
    pub bikepass_base_url: String,
    pub subscription_base_url: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            port: 8080,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            state_path: "flowbridge_state.json".to_string(),
            api_token: None,
            state_signing_key: b"test_state_key_32_bytes_minimum!".to_vec(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            profile_base_url: DEFAULT_PROFILE_BASE_URL.to_string(),
            activity_base_url: DEFAULT_ACTIVITY_BASE_URL.to_string(),
            bikepass_base_url: DEFAULT_BIKEPASS_BASE_URL.to_string(),
            subscription_base_url: DEFAULT_SUBSCRIPTION_BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            port: env::var("FLOWBRIDGE_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            poll_interval_secs: env::var("FLOWBRIDGE_POLL_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            state_path: env::var("FLOWBRIDGE_STATE_PATH")
                .unwrap_or_else(|_| "flowbridge_state.json".to_string()),
            api_token: env::var("FLOWBRIDGE_API_TOKEN")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            state_signing_key: env::var("FLOWBRIDGE_STATE_KEY")
                .map_err(|_| ConfigError::Missing("FLOWBRIDGE_STATE_KEY"))?
                .into_bytes(),

            auth_url: env::var("FLOWBRIDGE_AUTH_URL").unwrap_or_else(|_| DEFAULT_AUTH_URL.into()),
            token_url: env::var("FLOWBRIDGE_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_TOKEN_URL.into()),
            profile_base_url: env::var("FLOWBRIDGE_PROFILE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PROFILE_BASE_URL.into()),
            activity_base_url: env::var("FLOWBRIDGE_ACTIVITY_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_ACTIVITY_BASE_URL.into()),
            bikepass_base_url: env::var("FLOWBRIDGE_BIKEPASS_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BIKEPASS_BASE_URL.into()),
            subscription_base_url: env::var("FLOWBRIDGE_SUBSCRIPTION_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_SUBSCRIPTION_BASE_URL.into()),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
