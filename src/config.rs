//! Configuration management for ChatRelay
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files and environment variables. Structural
//! settings (bind address, provider registry, cookie names, limits)
//! live in the YAML file; secrets (session signing secret, credential
//! list, provider API keys) come from the environment only and are
//! loaded exactly once at startup.

use crate::error::{ChatRelayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration structure for ChatRelay
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Gateway server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Session authentication settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Conversation store persistence settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Upload intake settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Provider registry: logical key to upstream connection details
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderEntry>,
}

/// Gateway server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the gateway listens on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Upstream TCP connect timeout (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Deadline for the upstream response headers / first byte (seconds).
    /// The streaming body itself carries no deadline; a hung stream is
    /// bounded by caller-initiated cancellation.
    #[serde(default = "default_first_byte_timeout")]
    pub first_byte_timeout_seconds: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_first_byte_timeout() -> u64 {
    120
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            connect_timeout_seconds: default_connect_timeout(),
            first_byte_timeout_seconds: default_first_byte_timeout(),
        }
    }
}

/// Session authentication configuration
///
/// The signing secret and the credential list are deliberately absent
/// from the serialized form; they are populated from `CHATRELAY_SESSION_SECRET`
/// and `CHATRELAY_USERS` during [`Config::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Name of the session cookie
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    /// Name of the short-lived logout marker cookie
    #[serde(default = "default_logout_cookie")]
    pub logout_cookie: String,

    /// Session token time-to-live (seconds)
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,

    /// Session token signing secret (environment only)
    #[serde(skip)]
    pub session_secret: Option<String>,

    /// Raw credential list, `user:pass,user2:pass2` (environment only)
    #[serde(skip)]
    pub credentials: Option<String>,
}

fn default_session_cookie() -> String {
    "chatrelay_session".to_string()
}

fn default_logout_cookie() -> String {
    "chatrelay_logout".to_string()
}

fn default_session_ttl() -> u64 {
    86_400
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_cookie: default_session_cookie(),
            logout_cookie: default_logout_cookie(),
            session_ttl_seconds: default_session_ttl(),
            session_secret: None,
            credentials: None,
        }
    }
}

/// Conversation store persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Path to the sled database directory.
    ///
    /// When unset, a platform data directory is used
    /// (e.g. `~/.local/share/chatrelay/state` on Linux).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the effective database path
    ///
    /// # Returns
    ///
    /// The configured path, or the platform default data directory.
    pub fn resolve_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        directories::ProjectDirs::from("", "", "chatrelay")
            .map(|dirs| dirs.data_dir().join("state"))
            .unwrap_or_else(|| PathBuf::from(".chatrelay/state"))
    }
}

/// Upload intake configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes (boundary inclusive)
    #[serde(default = "default_upload_max_bytes")]
    pub max_bytes: u64,
}

fn default_upload_max_bytes() -> u64 {
    5_242_880
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_upload_max_bytes(),
        }
    }
}

/// A single provider registry entry
///
/// Describes how to reach one upstream text-generation service. The
/// secret itself is never stored here; `secret_env` names the
/// environment variable it is read from when the registry is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Upstream base URL (scheme + host, no path)
    pub base_url: String,

    /// Request path appended to the base URL
    #[serde(default = "default_provider_path")]
    pub path: String,

    /// Environment variable holding the provider secret
    #[serde(default)]
    pub secret_env: Option<String>,

    /// Allowed model list; empty means any model is accepted
    #[serde(default)]
    pub models: Vec<String>,

    /// Provider accepts image attachments
    #[serde(default)]
    pub vision: bool,

    /// Provider accepts video attachments
    #[serde(default)]
    pub video: bool,
}

fn default_provider_path() -> String {
    "/v1/chat/completions".to_string()
}

fn default_providers() -> BTreeMap<String, ProviderEntry> {
    let mut providers = BTreeMap::new();
    providers.insert(
        "openai".to_string(),
        ProviderEntry {
            base_url: "https://api.openai.com".to_string(),
            path: default_provider_path(),
            secret_env: Some("OPENAI_API_KEY".to_string()),
            models: Vec::new(),
            vision: true,
            video: false,
        },
    );
    providers
}

impl Config {
    /// Load configuration from a YAML file with environment overrides
    ///
    /// Missing files are not an error: defaults are used so the server
    /// can run from environment variables alone.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                ChatRelayError::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            serde_yaml::from_str(&contents).map_err(|e| {
                ChatRelayError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Self::default_with_providers()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Default configuration including the default provider registry
    ///
    /// `#[derive(Default)]` leaves the registry empty; this variant seeds
    /// the registry the same way a missing `providers` key in the file
    /// would.
    pub fn default_with_providers() -> Self {
        Self {
            providers: default_providers(),
            ..Self::default()
        }
    }

    /// Apply `CHATRELAY_*` environment variable overrides
    ///
    /// Called by [`Config::load`]; overrides win over file values.
    fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("CHATRELAY_BIND") {
            self.server.bind = bind;
        }
        if let Ok(state_dir) = std::env::var("CHATRELAY_STATE_DIR") {
            self.storage.path = Some(PathBuf::from(state_dir));
        }
        if let Ok(cookie) = std::env::var("CHATRELAY_SESSION_COOKIE") {
            self.auth.session_cookie = cookie;
        }
        if let Ok(cookie) = std::env::var("CHATRELAY_LOGOUT_COOKIE") {
            self.auth.logout_cookie = cookie;
        }
        if let Ok(ttl) = std::env::var("CHATRELAY_SESSION_TTL") {
            if let Ok(value) = ttl.parse() {
                self.auth.session_ttl_seconds = value;
            } else {
                tracing::warn!("Invalid CHATRELAY_SESSION_TTL: {}", ttl);
            }
        }
        if let Ok(timeout) = std::env::var("CHATRELAY_CONNECT_TIMEOUT") {
            if let Ok(value) = timeout.parse() {
                self.server.connect_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid CHATRELAY_CONNECT_TIMEOUT: {}", timeout);
            }
        }
        if let Ok(timeout) = std::env::var("CHATRELAY_FIRST_BYTE_TIMEOUT") {
            if let Ok(value) = timeout.parse() {
                self.server.first_byte_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid CHATRELAY_FIRST_BYTE_TIMEOUT: {}", timeout);
            }
        }
        if let Ok(max_bytes) = std::env::var("CHATRELAY_UPLOAD_MAX_BYTES") {
            if let Ok(value) = max_bytes.parse() {
                self.upload.max_bytes = value;
            } else {
                tracing::warn!("Invalid CHATRELAY_UPLOAD_MAX_BYTES: {}", max_bytes);
            }
        }

        // Secrets are environment-only by design.
        if let Ok(secret) = std::env::var("CHATRELAY_SESSION_SECRET") {
            self.auth.session_secret = Some(secret);
        }
        if let Ok(users) = std::env::var("CHATRELAY_USERS") {
            self.auth.credentials = Some(users);
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ChatRelayError::Config` describing the first problem
    /// found: empty provider registry, unparseable provider base URL,
    /// zero session TTL, zero upload limit, or a malformed credential
    /// entry.
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(ChatRelayError::Config("provider registry is empty".to_string()).into());
        }
        for (key, entry) in &self.providers {
            url::Url::parse(&entry.base_url).map_err(|e| {
                ChatRelayError::Config(format!("provider '{}' base_url invalid: {}", key, e))
            })?;
            if !entry.path.starts_with('/') {
                return Err(ChatRelayError::Config(format!(
                    "provider '{}' path must start with '/'",
                    key
                ))
                .into());
            }
        }
        if self.auth.session_ttl_seconds == 0 {
            return Err(
                ChatRelayError::Config("session TTL must be greater than zero".to_string()).into(),
            );
        }
        if self.upload.max_bytes == 0 {
            return Err(
                ChatRelayError::Config("upload size limit must be greater than zero".to_string())
                    .into(),
            );
        }
        if let Some(raw) = &self.auth.credentials {
            for entry in raw.split(',').filter(|s| !s.trim().is_empty()) {
                if !entry.contains(':') {
                    return Err(ChatRelayError::Config(format!(
                        "credential entry '{}' is not user:pass",
                        entry
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
}
