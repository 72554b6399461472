//! Router (C10): the top-level orchestrator composing the sanitizer,
//! fingerprinter, rate limiter, dedup store, cooldown/history store,
//! prompt builder, repair client, active-work inspector, and AI
//! duplicate classifier into a single `route` operation.

use tracing::{info, warn};

use crate::active_work::{gather_active_work, ChangeRequestSource, HttpChangeRequestSource, NoChangeRequests};
use crate::classifier::{AnthropicClassifier, DuplicateClassifier, NoOpClassifier};
use crate::config::RouterConfig;
use crate::dedup::DedupStore;
use crate::error::RouterError;
use crate::fingerprint::fingerprint;
use crate::history::HistoryStore;
use crate::prompt::build_prompt;
use crate::rate_limit::RateLimiter;
use crate::repair_client::{HttpRepairClient, RepairClient};
use crate::sanitize::sanitize_report;
use crate::types::{ErrorReport, RoutingResult};

/// Orchestrates error routing per the gate ordering: severity, feature
/// flag, cooldown, active session, dedup, rate limit, AI duplicate check,
/// then dispatch.
pub struct Router {
    config: RouterConfig,
    history: HistoryStore,
    dedup: DedupStore,
    rate_limiter: RateLimiter,
    repair_client: Box<dyn RepairClient>,
    change_requests: Box<dyn ChangeRequestSource>,
    classifier: Box<dyn DuplicateClassifier>,
}

impl Router {
    /// Builds a router from configuration, selecting HTTP-backed
    /// collaborators when the relevant API keys are present and
    /// degraded (no-op/empty) collaborators otherwise.
    pub fn from_config(config: RouterConfig) -> anyhow::Result<Self> {
        let repair_client: Box<dyn RepairClient> = match &config.repair_api_key {
            Some(key) => Box::new(HttpRepairClient::new(config.repair_base_url.clone(), key.clone())?),
            None => Box::new(NoRepairClient),
        };

        let change_requests: Box<dyn ChangeRequestSource> = match &config.host_token {
            Some(token) => Box::new(HttpChangeRequestSource::new(config.host_base_url.clone(), token.clone())?),
            None => Box::new(NoChangeRequests),
        };

        let classifier: Box<dyn DuplicateClassifier> = if config.enable_ai_analysis {
            match &config.ai_api_key {
                Some(key) => Box::new(AnthropicClassifier::new(config.ai_base_url.clone(), key.clone())?),
                None => Box::new(NoOpClassifier),
            }
        } else {
            Box::new(NoOpClassifier)
        };

        Ok(Self::new(config, repair_client, change_requests, classifier))
    }

    /// Builds a router from explicit collaborators, for tests that inject fakes.
    pub fn new(
        config: RouterConfig,
        repair_client: Box<dyn RepairClient>,
        change_requests: Box<dyn ChangeRequestSource>,
        classifier: Box<dyn DuplicateClassifier>,
    ) -> Self {
        Self {
            history: HistoryStore::new(config.pr_merge_cooldown),
            dedup: DedupStore::new(config.dedup_window),
            rate_limiter: RateLimiter::new(config.max_requests_per_hour),
            repair_client,
            change_requests,
            classifier,
            config,
        }
    }

    /// Marks a fingerprint's fix as merged, starting its cooldown window.
    pub async fn mark_merged(&self, report: &ErrorReport, pr_url: &str, session_id: &str) {
        let fp = fingerprint(report);
        self.history.mark_merged(&fp, pr_url, session_id, None).await;
    }

    /// Cancels a fingerprint's active session: marks the matching in-progress
    /// attempt cancelled and clears the active pointer, without touching any
    /// already-terminal attempt.
    pub async fn cancel_session(&self, report: &ErrorReport, session_id: &str, notes: Option<String>) {
        let fp = fingerprint(report);
        self.history.record_cancelled(&fp, session_id, notes).await;
    }

    /// Routes a single error report through every gate, producing exactly
    /// one terminal [`RoutingResult`].
    pub async fn route(&self, report: &ErrorReport) -> RoutingResult {
        if report.severity < self.config.min_severity {
            return RoutingResult::skipped("severity below threshold");
        }

        if !self.config.is_enabled() {
            return RoutingResult::skipped("auto-review disabled");
        }

        let fp = fingerprint(report);

        let (in_cooldown, cooldown_ends_at, _pr_url) = self.history.check_cooldown(&fp).await;
        if in_cooldown {
            info!("fingerprint {fp} is in cooldown, skipping");
            return RoutingResult {
                success: true,
                skipped_reason: Some("in cooldown".to_string()),
                in_cooldown: Some(true),
                cooldown_ends_at,
                ..Default::default()
            };
        }

        if let Some(session_id) = self.history.check_active(&fp).await {
            info!("fingerprint {fp} already has an active session {session_id}, linking");
            return RoutingResult {
                success: true,
                session_id: Some(session_id),
                linked_to_existing: true,
                ..Default::default()
            };
        }

        if self.dedup.check(&fp).await {
            return RoutingResult::skipped("duplicate error within deduplication window");
        }

        if !self.rate_limiter.try_admit().await {
            return RoutingResult::skipped("rate limit exceeded");
        }

        let sanitized = sanitize_report(report);

        let ai_analysis = if self.config.enable_ai_analysis {
            let active_work = gather_active_work(
                &self.history,
                self.change_requests.as_ref(),
                report.source_repo.as_deref(),
            )
            .await;

            Some(self.classifier.classify(&sanitized, &active_work).await)
        } else {
            None
        };

        if let Some(analysis) = &ai_analysis {
            if analysis.is_duplicate_of_active_work {
                let matched = analysis
                    .matching_active_work
                    .as_ref()
                    .map(|w| format!("{} ({})", w.title, w.id))
                    .unwrap_or_else(|| "Unknown".to_string());
                info!("fingerprint {fp} judged duplicate of active work: {matched}");
                return RoutingResult {
                    success: false,
                    linked_to_existing: true,
                    skipped_reason: Some(format!("duplicate of active work: {matched}")),
                    ai_analysis,
                    ..Default::default()
                };
            }
        }

        let repo = report.source_repo.clone().unwrap_or_default();
        if !repo.is_empty() && repo.split('/').count() != 2 {
            return RoutingResult::error(RouterError::InvalidRepo(repo).to_string());
        }
        if repo.is_empty() {
            warn!("dispatch attempted without a source_repo; using empty repo slug");
        }

        self.dispatch(&fp, &sanitized, repo, ai_analysis).await
    }

    async fn dispatch(
        &self,
        fp: &crate::types::Fingerprint,
        sanitized: &crate::sanitize::SanitizedReport,
        repo: String,
        ai_analysis: Option<crate::types::RootCauseAnalysis>,
    ) -> RoutingResult {
        if self.config.repair_api_key.is_none() {
            return RoutingResult::error(RouterError::MissingApiKey.to_string());
        }

        let history = self.history.history_for(fp).await;
        let has_historical_context = history.has_history;
        let prompt = build_prompt(sanitized, &history);

        match self.repair_client.dispatch(&prompt, &repo).await {
            Ok(Some(session)) => {
                self.history.record_attempt(fp, &session.session_id, &session.session_url).await;
                info!("dispatched repair session {} for fingerprint {fp}", session.session_id);
                RoutingResult {
                    success: true,
                    session_id: Some(session.session_id),
                    session_url: Some(session.session_url),
                    ai_analysis,
                    has_historical_context: Some(has_historical_context),
                    ..Default::default()
                }
            }
            Ok(None) => RoutingResult::error("repair service did not accept the dispatch"),
            Err(e) => {
                warn!("repair dispatch failed for fingerprint {fp}: {e}");
                RoutingResult::error(format!("repair dispatch failed: {e}"))
            }
        }
    }
}

struct NoRepairClient;

#[async_trait::async_trait]
impl RepairClient for NoRepairClient {
    async fn dispatch(&self, _prompt: &str, _repo: &str) -> anyhow::Result<Option<crate::repair_client::RepairSession>> {
        Err(RouterError::MissingApiKey.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repair_client::RepairSession;
    use crate::types::{ActiveWork, Severity};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeRepair {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RepairClient for FakeRepair {
        async fn dispatch(&self, _prompt: &str, _repo: &str) -> anyhow::Result<Option<RepairSession>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(RepairSession {
                session_id: format!("sess-{}", self.calls.load(Ordering::SeqCst)),
                session_url: "https://host/sessions/sess".to_string(),
                status: Some("in_progress".to_string()),
            }))
        }
    }

    struct FakeClassifier(bool);

    #[async_trait]
    impl DuplicateClassifier for FakeClassifier {
        async fn classify(
            &self,
            _report: &crate::sanitize::SanitizedReport,
            active_work: &[ActiveWork],
        ) -> crate::types::RootCauseAnalysis {
            if self.0 {
                crate::types::RootCauseAnalysis {
                    root_cause: "r".to_string(),
                    category: crate::types::RootCauseCategory::Functional,
                    severity: Severity::Error,
                    affected_components: vec![],
                    suggested_action: "s".to_string(),
                    is_duplicate_of_active_work: true,
                    matching_active_work: active_work.first().cloned(),
                    confidence: 0.9,
                    reasoning: "matches active work".to_string(),
                }
            } else {
                crate::types::RootCauseAnalysis::fail_open("no match")
            }
        }
    }

    fn report() -> ErrorReport {
        ErrorReport {
            category: "agent_error".to_string(),
            event: "timeout".to_string(),
            message: "request took 30s".to_string(),
            stack_trace: None,
            code_location: None,
            context: None,
            severity: Severity::Error,
            source_repo: Some("owner/repo".to_string()),
        }
    }

    fn router_with(calls: Arc<AtomicUsize>, classifier_duplicates: bool) -> Router {
        let config = RouterConfig::default()
            .with_repair_api_key("key")
            .with_ai_analysis_enabled(true);
        Router::new(
            config,
            Box::new(FakeRepair { calls }),
            Box::new(NoChangeRequests),
            Box::new(FakeClassifier(classifier_duplicates)),
        )
    }

    #[tokio::test]
    async fn happy_path_dispatches_and_records_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = router_with(calls.clone(), false);

        let result = router.route(&report()).await;
        assert!(result.success);
        assert!(result.session_id.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cooldown_blocks_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = router_with(calls.clone(), false);

        router.route(&report()).await;
        router.mark_merged(&report(), "https://host/pr/7", "sess-1").await;

        let result = router.route(&report()).await;
        assert_eq!(result.in_cooldown, Some(true));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_storm_dispatches_at_most_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = router_with(calls.clone(), false);

        for _ in 0..20 {
            router.route(&report()).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn below_threshold_severity_is_skipped_without_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = router_with(calls.clone(), false);

        let mut low = report();
        low.severity = Severity::Info;

        let result = router.route(&low).await;
        assert!(!result.success);
        assert_eq!(result.skipped_reason.as_deref(), Some("severity below threshold"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ai_duplicate_of_active_work_skips_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = router_with(calls.clone(), true);

        let result = router.route(&report()).await;
        assert!(!result.success);
        assert!(result.linked_to_existing);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_repo_slug_is_a_configuration_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = router_with(calls.clone(), false);

        let mut bad = report();
        bad.source_repo = Some("not-a-valid-slug".to_string());

        let result = router.route(&bad).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or_default().contains("invalid repo format"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_session_clears_active_without_reviving_on_recheck() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = RouterConfig::default()
            .with_repair_api_key("key")
            .with_dedup_window(std::time::Duration::from_millis(1));
        let router = Router::new(
            config,
            Box::new(FakeRepair { calls: calls.clone() }),
            Box::new(NoChangeRequests),
            Box::new(NoOpClassifier),
        );

        let first = router.route(&report()).await;
        let session_id = first.session_id.expect("happy path dispatches a session");
        router.cancel_session(&report(), &session_id, Some("abandoned".to_string())).await;

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let second = router.route(&report()).await;
        assert!(second.success);
        assert_ne!(second.session_id, Some(session_id));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disabled_feature_skips_before_any_gate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = RouterConfig::default().with_repair_api_key("key");
        let mut config = config;
        config.auto_review_disabled = true;
        let router = Router::new(
            config,
            Box::new(FakeRepair { calls: calls.clone() }),
            Box::new(NoChangeRequests),
            Box::new(NoOpClassifier),
        );

        let result = router.route(&report()).await;
        assert_eq!(result.skipped_reason.as_deref(), Some("auto-review disabled"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
