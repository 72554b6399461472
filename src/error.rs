//! Internal error currency for the router.
//!
//! `RouterError` never crosses the [`crate::router::Router::route`] boundary
//! unwrapped — every variant is matched at that boundary and flattened into a
//! [`crate::types::RoutingResult`]. `anyhow` is reserved for constructors
//! (building a `reqwest::Client`) and the CLI demo binary.

use thiserror::Error;

/// Failure modes produced by the router's internal helpers.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no repair API key configured")]
    MissingApiKey,

    #[error("auto-review is disabled")]
    FeatureDisabled,

    #[error("invalid repo format: {0}")]
    InvalidRepo(String),

    #[error("repair API returned status {status}")]
    UpstreamStatus { status: u16 },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("could not parse upstream response: {0}")]
    Parse(String),
}
