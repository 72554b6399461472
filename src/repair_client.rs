//! Client for the upstream repair service (C7).
//!
//! Expressed as a trait so the router can be tested against a fake,
//! following the same dependency-injection shape as [`crate::active_work`]
//! and [`crate::classifier`].

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// A dispatched repair session as reported by the upstream service.
#[derive(Debug, Clone)]
pub struct RepairSession {
    pub session_id: String,
    pub session_url: String,
    pub status: Option<String>,
}

#[async_trait]
pub trait RepairClient: Send + Sync {
    async fn dispatch(&self, prompt: &str, repo: &str) -> Result<Option<RepairSession>>;
}

#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    prompt: &'a str,
    repo: &'a str,
}

#[derive(Debug, Deserialize)]
struct DispatchResponse {
    session_id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// `reqwest`-backed implementation of [`RepairClient`].
pub struct HttpRepairClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpRepairClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build repair service HTTP client")?;

        Ok(Self { client, base_url: base_url.into(), api_key: api_key.into() })
    }
}

#[async_trait]
impl RepairClient for HttpRepairClient {
    async fn dispatch(&self, prompt: &str, repo: &str) -> Result<Option<RepairSession>> {
        let url = format!("{}/sessions", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&DispatchRequest { prompt, repo })
            .send()
            .await
            .context("failed to reach repair service")?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("repair service returned non-success status {status}");
            return Ok(None);
        }

        let body: DispatchResponse = response
            .json()
            .await
            .context("failed to parse repair service response")?;

        let session_url = body
            .url
            .unwrap_or_else(|| format!("{}/sessions/{}", self.base_url.trim_end_matches('/'), body.session_id));

        Ok(Some(RepairSession { session_id: body.session_id, session_url, status: body.status }))
    }
}
