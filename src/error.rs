// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not logged in to the Flow account")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Flow API error: {message}")]
    FlowApi {
        message: String,
        status: Option<u16>,
    },

    #[error("State store error: {0}")]
    State(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Build a `FlowApi` error without an HTTP status (connection-level failures).
    pub fn flow(message: impl Into<String>) -> Self {
        AppError::FlowApi {
            message: message.into(),
            status: None,
        }
    }

    /// Build a `FlowApi` error carrying the HTTP status of the failed call.
    pub fn flow_status(message: impl Into<String>, status: u16) -> Self {
        AppError::FlowApi {
            message: message.into(),
            status: Some(status),
        }
    }

    /// True when the vendor rejected our credentials. Drives the
    /// refresh-then-retry-once path in the session layer.
    pub fn is_auth_error(&self) -> bool {
        match self {
            AppError::Unauthorized => true,
            AppError::FlowApi { status, message } => {
                matches!(status, Some(401) | Some(403))
                    || message.contains("invalid_grant")
                    || message.contains("invalid_token")
            }
            _ => false,
        }
    }

    /// True when the vendor answered 404. The live state-of-charge endpoint
    /// 404s when the bike is offline, which is not an error condition.
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            AppError::FlowApi {
                status: Some(404),
                ..
            }
        )
    }

    /// True when the vendor answered 429.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            AppError::FlowApi {
                status: Some(429),
                ..
            }
        )
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::FlowApi { message, .. } => {
                (StatusCode::BAD_GATEWAY, "flow_error", Some(message.clone()))
            }
            AppError::State(msg) => {
                tracing::error!(error = %msg, "State store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "state_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_classification() {
        assert!(AppError::Unauthorized.is_auth_error());
        assert!(AppError::flow_status("expired", 401).is_auth_error());
        assert!(AppError::flow_status("forbidden", 403).is_auth_error());
        assert!(AppError::flow("invalid_grant: stale refresh token").is_auth_error());
        assert!(!AppError::flow_status("server exploded", 500).is_auth_error());
        assert!(!AppError::NotFound("bike".into()).is_auth_error());
    }

    #[test]
    fn offline_is_exactly_404() {
        assert!(AppError::flow_status("no live data", 404).is_offline());
        assert!(!AppError::flow_status("gone", 410).is_offline());
        assert!(!AppError::flow("connection refused").is_offline());
    }

    #[test]
    fn rate_limit_is_429() {
        assert!(AppError::flow_status("slow down", 429).is_rate_limited());
        assert!(!AppError::flow_status("nope", 401).is_rate_limited());
    }
}
