//! Rolling-hour quota on outbound repair dispatches.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A single rolling counter keyed by hour-since-epoch.
pub struct RateLimiter {
    max_per_hour: u32,
    state: Arc<RwLock<BucketState>>,
}

struct BucketState {
    hour: i64,
    count: u32,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_per_hour: u32) -> Self {
        Self {
            max_per_hour,
            state: Arc::new(RwLock::new(BucketState { hour: current_hour(), count: 0 })),
        }
    }

    /// Attempts to admit one request. Returns `true` if admitted; `false`
    /// if the current hour's quota is exhausted. A denial is never retried
    /// automatically by the caller.
    pub async fn try_admit(&self) -> bool {
        let now_hour = current_hour();
        let mut state = self.state.write().await;

        if state.hour != now_hour {
            debug!("rate limiter crossed into a new hour, resetting quota");
            state.hour = now_hour;
            state.count = 0;
        }

        if state.count >= self.max_per_hour {
            return false;
        }

        state.count += 1;
        true
    }
}

fn current_hour() -> i64 {
    chrono::Utc::now().timestamp() / 3600
}
