//! Error types for ChatRelay
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for ChatRelay operations
///
/// This enum encompasses all possible errors that can occur during
/// configuration loading, provider resolution, gateway request handling,
/// stream reconciliation, and session authentication.
#[derive(Error, Debug)]
pub enum ChatRelayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown provider key requested by a caller
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Provider registry entry has no resolvable secret
    #[error("Missing secret for provider: {0}")]
    MissingSecret(String),

    /// Inbound chat/upload request failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream provider could not be reached
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Upstream provider returned a non-success response
    #[error("Upstream error ({status}): {message}")]
    Upstream {
        /// HTTP status code reported by the upstream
        status: u16,
        /// Error detail (masked for upstream auth failures)
        message: String,
    },

    /// Stream decoding or mid-stream read errors
    #[error("Stream error: {0}")]
    Stream(String),

    /// Authentication/session errors (401-equivalent)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Conversation storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for ChatRelay operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
