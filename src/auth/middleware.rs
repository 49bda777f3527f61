//! Session middleware and logout flow
//!
//! Every API route runs behind [`require_session`]: a valid session
//! cookie passes through, a valid Basic credential mints a fresh
//! cookie, anything else gets a 401 challenge. Logout is two-phase
//! because browsers replay cached Basic credentials: the first call
//! plants a short-lived marker cookie and answers 401 so the cached
//! credentials are dropped, the second call (marker present) clears
//! everything and confirms.

use crate::auth::credentials::CredentialSet;
use crate::auth::token;
use crate::config::AuthConfig;
use crate::error::ChatRelayError;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use std::sync::Arc;

/// Paths that never require a session
const OPEN_PATHS: &[&str] = &["/healthz"];

/// Lifetime of the logout marker cookie (seconds)
const LOGOUT_MARKER_TTL: u64 = 30;

/// Authenticated user attached to the request extensions
#[derive(Debug, Clone)]
pub struct SessionUser(pub String);

/// Shared authentication state for the middleware and logout handler
#[derive(Debug, Clone)]
pub struct AuthState {
    /// Session cookie name
    pub session_cookie: String,
    /// Logout marker cookie name
    pub logout_cookie: String,
    /// Token lifetime in seconds
    pub session_ttl_seconds: u64,
    /// Signing secret; `None` means authentication is not configured
    pub session_secret: Option<String>,
    /// Parsed credential set; `None` means authentication is not configured
    pub credentials: Option<CredentialSet>,
}

impl AuthState {
    /// Build the runtime state from the loaded configuration
    ///
    /// # Errors
    ///
    /// Returns `ChatRelayError::Config` if the credential string does
    /// not parse.
    pub fn from_config(auth: &AuthConfig) -> std::result::Result<Self, ChatRelayError> {
        let credentials = match &auth.credentials {
            Some(raw) => Some(CredentialSet::parse(raw)?),
            None => None,
        };
        Ok(Self {
            session_cookie: auth.session_cookie.clone(),
            logout_cookie: auth.logout_cookie.clone(),
            session_ttl_seconds: auth.session_ttl_seconds,
            session_secret: auth.session_secret.clone(),
            credentials,
        })
    }
}

/// Session-enforcing middleware
///
/// On success the authenticated [`SessionUser`] is attached to the
/// request extensions. A Basic login additionally sets a fresh session
/// cookie on the response.
pub async fn require_session(
    State(auth): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if OPEN_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let (secret, credentials) = match (&auth.session_secret, &auth.credentials) {
        (Some(secret), Some(credentials)) => (secret.clone(), credentials.clone()),
        _ => {
            tracing::error!("Session secret or credential list not configured");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "authentication is not configured",
            );
        }
    };

    // An existing session cookie wins over everything else.
    if let Some(cookie) = cookie_value(request.headers(), &auth.session_cookie) {
        match token::verify(&cookie, &secret) {
            Ok(username) => {
                request.extensions_mut().insert(SessionUser(username));
                return next.run(request).await;
            }
            Err(e) => {
                tracing::debug!("Rejecting session cookie: {}", e);
            }
        }
    }

    // Fall back to Basic credentials and mint a cookie on success.
    if let Some((username, password)) = basic_credentials(request.headers()) {
        if credentials.verify(&username, &password) {
            match token::mint(&username, auth.session_ttl_seconds, &secret) {
                Ok(minted) => {
                    tracing::info!(user = %username, "Session established");
                    request.extensions_mut().insert(SessionUser(username));
                    let mut response = next.run(request).await;
                    append_cookie(
                        &mut response,
                        &set_cookie(&auth.session_cookie, &minted, auth.session_ttl_seconds),
                    );
                    return response;
                }
                Err(e) => {
                    tracing::error!("Failed to mint session token: {}", e);
                    return error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "failed to establish session",
                    );
                }
            }
        }
        tracing::debug!(user = %username, "Basic credentials rejected");
    }

    challenge_response()
}

/// Two-phase logout handler
///
/// Phase one (no marker cookie): expire the session cookie, plant the
/// marker, and answer 401 with a challenge so the browser discards its
/// cached Basic credentials. Phase two (marker present): treat the
/// request as a fresh login attempt; valid Basic credentials mint a new
/// session cookie, clear the marker, and redirect to the root, while
/// anything else is challenged again with the marker left in place.
pub async fn logout(State(auth): State<Arc<AuthState>>, headers: HeaderMap) -> Response {
    let (secret, credentials) = match (&auth.session_secret, &auth.credentials) {
        (Some(secret), Some(credentials)) => (secret.clone(), credentials.clone()),
        _ => {
            tracing::error!("Session secret or credential list not configured");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "authentication is not configured",
            );
        }
    };

    if cookie_value(&headers, &auth.logout_cookie).is_none() {
        let mut response = challenge_response();
        append_cookie(
            &mut response,
            &set_cookie(&auth.logout_cookie, "1", LOGOUT_MARKER_TTL),
        );
        append_cookie(&mut response, &clear_cookie(&auth.session_cookie));
        return response;
    }

    // Marker present: a fresh login attempt completes the cycle.
    if let Some((username, password)) = basic_credentials(&headers) {
        if credentials.verify(&username, &password) {
            match token::mint(&username, auth.session_ttl_seconds, &secret) {
                Ok(minted) => {
                    tracing::info!(user = %username, "Re-authenticated after logout");
                    let mut response = (
                        StatusCode::SEE_OTHER,
                        [(header::LOCATION, HeaderValue::from_static("/"))],
                    )
                        .into_response();
                    append_cookie(
                        &mut response,
                        &set_cookie(&auth.session_cookie, &minted, auth.session_ttl_seconds),
                    );
                    append_cookie(&mut response, &clear_cookie(&auth.logout_cookie));
                    return response;
                }
                Err(e) => {
                    tracing::error!("Failed to mint session token: {}", e);
                    return error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "failed to establish session",
                    );
                }
            }
        }
    }
    challenge_response()
}

/// Extract a named cookie value from the Cookie header
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in raw.split(';') {
        let pair = pair.trim();
        if let Some((key, value)) = pair.split_once('=') {
            if key == name {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Decode Basic credentials from the Authorization header
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = raw.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Build a Set-Cookie value for a session-scoped cookie
fn set_cookie(name: &str, value: &str, max_age: u64) -> String {
    format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}")
}

/// Build a Set-Cookie value that expires a cookie immediately
fn clear_cookie(name: &str) -> String {
    format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Append a Set-Cookie header, skipping values that fail header encoding
fn append_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => {
            tracing::error!("Dropping unencodable cookie header: {}", e);
        }
    }
}

/// 401 challenge asking for Basic credentials
fn challenge_response() -> Response {
    let mut response = error_response(StatusCode::UNAUTHORIZED, "authentication required");
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"chatrelay\""),
    );
    response
}

/// JSON error body in the gateway's envelope shape
fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": { "message": message } })),
    )
        .into_response()
}
