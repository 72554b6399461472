//! Sliding-window suppression of identical fingerprints.
//!
//! Lies upstream of the rate limiter so an error storm from one bug
//! consumes at most one quota unit.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::types::Fingerprint;

pub struct DedupStore {
    window: Duration,
    seen: Arc<RwLock<HashMap<Fingerprint, DateTime<Utc>>>>,
}

impl DedupStore {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { window, seen: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Returns `true` if `fp` was already seen within the window (and does
    /// not refresh its timestamp); otherwise records it and returns `false`.
    pub async fn check(&self, fp: &Fingerprint) -> bool {
        let now = Utc::now();
        let mut seen = self.seen.write().await;

        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::zero());
        seen.retain(|_, ts| now.signed_duration_since(*ts) < window);

        if seen.contains_key(fp) {
            return true;
        }

        seen.insert(fp.clone(), now);
        false
    }
}
