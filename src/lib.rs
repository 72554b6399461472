//! Intelligent error-routing pipeline: decides whether and how to escalate
//! agent-platform runtime errors to an external automated-repair service.

pub mod active_work;
pub mod classifier;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fingerprint;
pub mod history;
pub mod prompt;
pub mod rate_limit;
pub mod repair_client;
pub mod router;
pub mod sanitize;
pub mod types;

pub use config::RouterConfig;
pub use router::Router;
pub use types::{ErrorReport, RoutingResult};
