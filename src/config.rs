//! Environment-driven configuration, mirroring the `RemediationConfig`
//! default-plus-env-override pattern: typed defaults with a `from_env`
//! constructor and `with_*` builder methods for tests.

use std::env;
use std::time::Duration;

use crate::types::Severity;

/// Tunables for the [`crate::router::Router`].
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Repair service base URL, e.g. `https://api.example-repair.dev`.
    pub repair_base_url: String,
    /// Code-hosting API base URL, e.g. `https://api.github.com`.
    pub host_base_url: String,
    /// AI classifier base URL, e.g. `https://api.anthropic.com`.
    pub ai_base_url: String,

    /// Maximum dispatches accepted per rolling hour.
    pub max_requests_per_hour: u32,
    /// Sliding window within which identical fingerprints are suppressed.
    pub dedup_window: Duration,
    /// Window after a merged fix during which new reports are suppressed.
    pub pr_merge_cooldown: Duration,
    /// Minimum severity that is eligible for escalation.
    pub min_severity: Severity,
    /// Whether the AI duplicate-of-active-work check runs at all.
    pub enable_ai_analysis: bool,

    /// `DEVIN_API_KEY` equivalent: required for dispatch.
    pub repair_api_key: Option<String>,
    /// `DISABLE_DEVIN_AUTO_REVIEW` equivalent: global kill switch.
    pub auto_review_disabled: bool,
    /// `ANTHROPIC_API_KEY` equivalent: required for the AI duplicate check.
    pub ai_api_key: Option<String>,
    /// `GITHUB_TOKEN` equivalent: required to enumerate open change requests.
    pub host_token: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            repair_base_url: "https://api.devin.ai".to_string(),
            host_base_url: "https://api.github.com".to_string(),
            ai_base_url: "https://api.anthropic.com".to_string(),
            max_requests_per_hour: 10,
            dedup_window: Duration::from_secs(3600),
            pr_merge_cooldown: Duration::from_secs(5 * 60),
            min_severity: Severity::Error,
            enable_ai_analysis: true,
            repair_api_key: None,
            auto_review_disabled: false,
            ai_api_key: None,
            host_token: None,
        }
    }
}

impl RouterConfig {
    /// Build a config from the environment, following the variable table
    /// documented for the router's external interfaces.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(key) = env::var("DEVIN_API_KEY") {
            cfg.repair_api_key = Some(key);
        }
        if let Ok(token) = env::var("GITHUB_TOKEN") {
            cfg.host_token = Some(token);
        }
        if let Ok(key) = env::var("ANTHROPIC_API_KEY") {
            cfg.ai_api_key = Some(key);
        }
        cfg.auto_review_disabled = env::var("DISABLE_DEVIN_AUTO_REVIEW")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        if let Ok(url) = env::var("DEVIN_API_BASE_URL") {
            cfg.repair_base_url = url;
        }
        if let Ok(url) = env::var("GITHUB_API_BASE_URL") {
            cfg.host_base_url = url;
        }
        if let Ok(url) = env::var("ANTHROPIC_API_BASE_URL") {
            cfg.ai_base_url = url;
        }

        cfg
    }

    #[must_use]
    pub fn with_repair_api_key(mut self, key: impl Into<String>) -> Self {
        self.repair_api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_ai_api_key(mut self, key: impl Into<String>) -> Self {
        self.ai_api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_host_token(mut self, token: impl Into<String>) -> Self {
        self.host_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_max_requests_per_hour(mut self, max: u32) -> Self {
        self.max_requests_per_hour = max;
        self
    }

    #[must_use]
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    #[must_use]
    pub fn with_pr_merge_cooldown(mut self, cooldown: Duration) -> Self {
        self.pr_merge_cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    #[must_use]
    pub fn with_ai_analysis_enabled(mut self, enabled: bool) -> Self {
        self.enable_ai_analysis = enabled;
        self
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.auto_review_disabled
    }
}
