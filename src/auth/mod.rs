//! Session authentication
//!
//! Stateless signed session tokens carried in a cookie, minted from
//! Basic credentials checked against an environment-supplied user
//! list. See `middleware` for the request flow and the two-phase
//! logout.

pub mod credentials;
pub mod middleware;
pub mod token;

pub use credentials::CredentialSet;
pub use middleware::{logout, require_session, AuthState, SessionUser};
