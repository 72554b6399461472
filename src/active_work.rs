//! Active-work inspector (C8): enumerates currently-open upstream work —
//! active repair sessions tracked by [`crate::history::HistoryStore`], plus
//! open unmerged change requests from the code-hosting service.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::types::{ActiveWork, ActiveWorkKind};

const MAX_CHANGE_REQUESTS: usize = 50;

/// Source of open, unmerged change requests for a repository.
#[async_trait]
pub trait ChangeRequestSource: Send + Sync {
    async fn open_change_requests(&self, repo: &str) -> Vec<ActiveWork>;
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    html_url: String,
    created_at: DateTime<Utc>,
}

/// `reqwest`-backed [`ChangeRequestSource`] against a GitHub-compatible REST API.
///
/// Absence of a token is not an error: callers construct this only when a
/// token is configured, and falls back to an empty source otherwise (see
/// [`NoChangeRequests`]).
pub struct HttpChangeRequestSource {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpChangeRequestSource {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build code-hosting HTTP client")?;

        Ok(Self { client, base_url: base_url.into(), token: token.into() })
    }
}

#[async_trait]
impl ChangeRequestSource for HttpChangeRequestSource {
    async fn open_change_requests(&self, repo: &str) -> Vec<ActiveWork> {
        let Some((owner, name)) = repo.split_once('/') else {
            warn!("invalid repo format for active-work inspection: {repo}");
            return Vec::new();
        };

        let url = format!("{}/repos/{owner}/{name}/pulls", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .query(&[
                ("state", "open"),
                ("sort", "created"),
                ("direction", "desc"),
                ("per_page", "50"),
            ])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!("failed to reach code-hosting service: {e}");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!("code-hosting service returned status {}", response.status());
            return Vec::new();
        }

        let pulls: Vec<PullRequest> = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("failed to parse code-hosting response: {e}");
                return Vec::new();
            }
        };

        pulls
            .into_iter()
            .take(MAX_CHANGE_REQUESTS)
            .map(|pr| ActiveWork {
                kind: ActiveWorkKind::OpenChangeRequest,
                id: pr.number.to_string(),
                title: pr.title,
                description: pr.body.unwrap_or_default(),
                url: Some(pr.html_url),
                created_at: Some(pr.created_at),
            })
            .collect()
    }
}

/// [`ChangeRequestSource`] used when no code-hosting token is configured.
pub struct NoChangeRequests;

#[async_trait]
impl ChangeRequestSource for NoChangeRequests {
    async fn open_change_requests(&self, _repo: &str) -> Vec<ActiveWork> {
        Vec::new()
    }
}

/// Combines every tracked active session with open change requests into the
/// unified active-work view consumed by the AI duplicate classifier. All
/// active sessions are included, not just the fingerprint under evaluation,
/// so the classifier can match an error against in-flight work on a
/// different root cause.
pub async fn gather_active_work(
    history: &crate::history::HistoryStore,
    change_requests: &dyn ChangeRequestSource,
    repo: Option<&str>,
) -> Vec<ActiveWork> {
    let mut work: Vec<ActiveWork> = history
        .all_active()
        .await
        .into_iter()
        .map(|(fp, session_id)| ActiveWork {
            kind: ActiveWorkKind::RepairSession,
            id: session_id.clone(),
            title: format!("Active repair session {session_id}"),
            description: format!("Tracked repair session for fingerprint {fp}"),
            url: None,
            created_at: None,
        })
        .collect();

    if let Some(repo) = repo {
        work.extend(change_requests.open_change_requests(repo).await);
    }

    work
}
