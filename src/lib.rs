//! # ChatRelay
//!
//! A streaming chat gateway and client orchestration core. The gateway
//! validates chat requests, forwards them to a configured upstream
//! provider, and relays the streamed reply incrementally without
//! buffering. The client side reconciles the relayed stream into a
//! persistent conversation store, with cancellation and retry.
//!
//! ## Components
//!
//! - [`config`]: YAML configuration with `CHATRELAY_*` environment
//!   overrides; secrets are environment-only
//! - [`providers`]: registry mapping provider keys to upstream targets
//! - [`gateway`]: the HTTP surface (chat relay, upload intake, health)
//! - [`auth`]: signed session cookies minted from Basic credentials,
//!   with a two-phase logout
//! - [`stream`]: chunk-boundary-invariant event decoding and the
//!   cancellable reconciliation loop
//! - [`store`]: conversation state with best-effort sled persistence
//! - [`client`]: the send/retry/cancel pipeline tying it all together

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod store;
pub mod stream;

pub use client::{CancelHandle, ChatClient, SendRequest};
pub use config::Config;
pub use error::{ChatRelayError, Result};
pub use providers::{ProviderOverride, ProviderRegistry, ResolvedProvider};
pub use store::ConversationStore;
pub use stream::{StreamDecoder, StreamOutcome};
