//! HTTP gateway
//!
//! The network-facing surface: chat forwarding with incremental relay,
//! upload intake, health probe, and the session middleware wiring. All
//! handler failures flow through [`ApiError`] so every error body has
//! the same `{"error":{"message":...}}` envelope.

pub mod chat;
pub mod upload;

use crate::auth::{self, AuthState};
use crate::config::Config;
use crate::error::{ChatRelayError, Result};
use crate::providers::ProviderRegistry;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Duration;

/// Extra multipart envelope room on top of the raw file size limit
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Shared state for the gateway handlers
#[derive(Clone)]
pub struct AppState {
    /// Provider registry built at startup
    pub registry: Arc<ProviderRegistry>,
    /// Outbound HTTP client (connect timeout baked in)
    pub http: reqwest::Client,
    /// Deadline for upstream response headers
    pub first_byte_timeout: Duration,
    /// Upload size limit in bytes, boundary inclusive
    pub upload_max_bytes: u64,
}

impl AppState {
    /// Build the gateway state from the loaded configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the outbound HTTP client cannot be
    /// constructed.
    pub fn from_config(config: &Config, registry: Arc<ProviderRegistry>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.server.connect_timeout_seconds))
            .build()
            .map_err(ChatRelayError::Http)?;
        Ok(Self {
            registry,
            http,
            first_byte_timeout: Duration::from_secs(config.server.first_byte_timeout_seconds),
            upload_max_bytes: config.upload.max_bytes,
        })
    }
}

/// Build the gateway router
///
/// The logout route sits outside the session middleware: it implements
/// its own two-phase credential handling and must be reachable without
/// a valid session.
pub fn router(state: AppState, auth: Arc<AuthState>) -> Router {
    let body_limit = (state.upload_max_bytes + MULTIPART_OVERHEAD) as usize;
    let protected = Router::new()
        .route("/api/chat", post(chat::chat))
        .route(
            "/api/upload",
            post(upload::upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .layer(axum::middleware::from_fn_with_state(
            auth.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/logout", post(auth::logout).with_state(auth))
        .merge(protected)
        .with_state(state)
}

/// Liveness probe
async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Handler-level error with the gateway's JSON envelope
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Build an error with an explicit status
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Validation failure (400)
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<ChatRelayError> for ApiError {
    fn from(e: ChatRelayError) -> Self {
        let status = match &e {
            ChatRelayError::InvalidRequest(_)
            | ChatRelayError::UnknownProvider(_)
            | ChatRelayError::MissingSecret(_) => StatusCode::BAD_REQUEST,
            ChatRelayError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ChatRelayError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            ChatRelayError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{}", self.message);
        } else {
            tracing::debug!(status = %self.status, "{}", self.message);
        }
        (
            self.status,
            Json(serde_json::json!({ "error": { "message": self.message } })),
        )
            .into_response()
    }
}
