//! Stream decoding and reconciliation
//!
//! This module turns the relayed provider byte stream back into
//! ordered text increments: `decoder` handles framing and UTF-8
//! carry-over, `reconciler` drives the consumption loop with
//! cancellation support.

pub mod decoder;
pub mod reconciler;

pub use decoder::{StreamDecoder, DONE_SENTINEL};
pub use reconciler::{reconcile, StreamOutcome};
