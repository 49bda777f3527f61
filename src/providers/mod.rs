//! Provider registry and resolution
//!
//! Maps a logical provider key to fully-specified upstream connection
//! details. The registry is built exactly once at startup from the
//! configuration; provider secrets are read from their bound
//! environment variables at construction time so resolution itself
//! never touches the process environment.

use crate::config::ProviderEntry;
use crate::error::ChatRelayError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Per-request override of registry values
///
/// A caller-supplied base URL, secret, or model allow-list takes
/// precedence over the registry for that single request. Supplying a
/// secret moves accountability for its exposure to the caller, so that
/// path is logged explicitly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOverride {
    /// Replace the upstream base URL
    pub base_url: Option<String>,
    /// Caller-supplied upstream secret
    pub api_key: Option<String>,
    /// Replace the allowed model list
    pub models: Option<Vec<String>>,
}

impl ProviderOverride {
    /// Whether the caller supplied its own upstream secret
    pub fn has_secret(&self) -> bool {
        self.api_key.as_deref().map(|k| !k.is_empty()).unwrap_or(false)
    }
}

/// A fully-resolved upstream target
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    /// Logical provider key
    pub key: String,
    /// Upstream base URL
    pub base_url: String,
    /// Request path
    pub path: String,
    /// Resolved secret, if any
    pub secret: Option<String>,
    /// Allowed model list; empty means any model
    pub models: Vec<String>,
    /// Provider accepts image attachments
    pub vision: bool,
    /// Provider accepts video attachments
    pub video: bool,
}

impl ResolvedProvider {
    /// Full upstream endpoint URL
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path)
    }

    /// Default headers for the upstream call
    ///
    /// Contains an `Authorization: Bearer` entry only when a secret was
    /// actually resolved.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if let Some(secret) = &self.secret {
            headers.push(("Authorization".to_string(), format!("Bearer {}", secret)));
        }
        headers
    }

    /// Whether the given model passes the allow-list
    ///
    /// An empty list accepts any model.
    pub fn allows_model(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.iter().any(|m| m == model)
    }

    /// Apply a per-request override, returning the effective target
    pub fn with_override(mut self, overrides: &ProviderOverride) -> Self {
        if let Some(base_url) = &overrides.base_url {
            tracing::info!(provider = %self.key, "Using caller-supplied base URL override");
            self.base_url = base_url.clone();
        }
        if overrides.has_secret() {
            tracing::info!(
                provider = %self.key,
                "Using caller-supplied secret override; caller owns its exposure"
            );
            self.secret = overrides.api_key.clone();
        }
        if let Some(models) = &overrides.models {
            self.models = models.clone();
        }
        self
    }
}

/// Fixed registry of known providers
///
/// Construct with [`ProviderRegistry::from_config`] once at startup and
/// pass by reference into the gateway.
pub struct ProviderRegistry {
    providers: BTreeMap<String, ResolvedProvider>,
}

impl ProviderRegistry {
    /// Build the registry from configuration entries
    ///
    /// Secrets are read from each entry's bound environment variable
    /// here, exactly once. Entries whose secret is absent stay in the
    /// registry; resolution decides whether that is fatal.
    pub fn from_config(entries: &BTreeMap<String, ProviderEntry>) -> Self {
        let providers = entries
            .iter()
            .map(|(key, entry)| {
                let secret = entry
                    .secret_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|s| !s.is_empty());
                if secret.is_none() {
                    if let Some(var) = &entry.secret_env {
                        tracing::debug!(provider = %key, env = %var, "No secret in environment");
                    }
                }
                let resolved = ResolvedProvider {
                    key: key.clone(),
                    base_url: entry.base_url.clone(),
                    path: entry.path.clone(),
                    secret,
                    models: entry.models.clone(),
                    vision: entry.vision,
                    video: entry.video,
                };
                (key.clone(), resolved)
            })
            .collect();
        Self { providers }
    }

    /// Build a registry directly from resolved entries (tests, embedders)
    pub fn from_resolved(providers: Vec<ResolvedProvider>) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.key.clone(), p)).collect(),
        }
    }

    /// Resolve a provider key to a fully-specified upstream target
    ///
    /// # Arguments
    ///
    /// * `key` - Logical provider key
    /// * `allow_missing_secret` - Accept an entry without a secret
    ///   (the caller supplies its own credential out-of-band)
    ///
    /// # Errors
    ///
    /// `UnknownProvider` for a key absent from the registry;
    /// `MissingSecret` when the entry has no secret and the caller did
    /// not allow that.
    pub fn resolve(
        &self,
        key: &str,
        allow_missing_secret: bool,
    ) -> std::result::Result<ResolvedProvider, ChatRelayError> {
        let provider = self
            .providers
            .get(key)
            .ok_or_else(|| ChatRelayError::UnknownProvider(key.to_string()))?;
        if provider.secret.is_none() && !allow_missing_secret {
            return Err(ChatRelayError::MissingSecret(key.to_string()));
        }
        Ok(provider.clone())
    }

    /// Known provider keys, in stable order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(|k| k.as_str())
    }
}
