//! AI duplicate classifier (C9): asks a secondary language model whether an
//! error is already covered by active upstream work.
//!
//! Fails open on any missing key, transport error, or unparseable response:
//! the caller proceeds as though no match was found, per the router's
//! fail-open policy.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::warn;

use crate::sanitize::SanitizedReport;
use crate::types::{ActiveWork, RootCauseAnalysis, RootCauseCategory, Severity};

const SYSTEM_PROMPT: &str = "You are an IT manager responsible for triaging incoming error reports \
against a list of work already in progress. Given an error and a list of active work items, \
determine the likely root cause, classify it, and decide whether it duplicates an active work item. \
Respond with a single JSON object with exactly these fields: rootCause, category, severity, \
affectedComponents, suggestedAction, isDuplicateOfActiveWork, matchingActiveWorkId, confidence, reasoning.";

const MAX_DESCRIPTION_CHARS: usize = 500;

#[async_trait]
pub trait DuplicateClassifier: Send + Sync {
    async fn classify(&self, report: &SanitizedReport, active_work: &[ActiveWork]) -> RootCauseAnalysis;
}

/// `reqwest`-backed classifier calling an Anthropic-compatible `/v1/messages` endpoint.
pub struct AnthropicClassifier {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicClassifier {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build AI classifier HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: "claude-3-5-haiku-latest".to_string(),
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

#[async_trait]
impl DuplicateClassifier for AnthropicClassifier {
    async fn classify(&self, report: &SanitizedReport, active_work: &[ActiveWork]) -> RootCauseAnalysis {
        let user_prompt = format_user_prompt(report, active_work);

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: 2048,
            system: SYSTEM_PROMPT,
            messages: vec![Message { role: "user", content: &user_prompt }],
        };

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!("AI classifier unreachable: {e}");
                return RootCauseAnalysis::fail_open("classifier unreachable");
            }
        };

        if !response.status().is_success() {
            warn!("AI classifier returned status {}", response.status());
            return RootCauseAnalysis::fail_open("classifier returned an error status");
        }

        let body: MessagesResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                warn!("failed to parse AI classifier envelope: {e}");
                return RootCauseAnalysis::fail_open("classifier response envelope unparseable");
            }
        };

        let Some(text) = body.content.first().map(|b| b.text.as_str()) else {
            warn!("AI classifier returned an empty content array");
            return RootCauseAnalysis::fail_open("classifier returned no content");
        };

        parse_analysis_response(text, active_work).unwrap_or_else(|e| {
            warn!("failed to parse AI classifier verdict: {e}");
            RootCauseAnalysis::fail_open("classifier verdict unparseable")
        })
    }
}

fn format_user_prompt(report: &SanitizedReport, active_work: &[ActiveWork]) -> String {
    let mut prompt = format!(
        "ERROR:\ncategory: {}\nevent: {}\nmessage: {}\n",
        report.category, report.event, report.message
    );
    if let Some(location) = &report.code_location {
        prompt.push_str(&format!("code location: {location}\n"));
    }

    prompt.push_str("\nACTIVE WORK:\n");
    if active_work.is_empty() {
        prompt.push_str("(none)\n");
    } else {
        for item in active_work {
            let description = truncate_description(&item.description);
            prompt.push_str(&format!("- id: {}, title: {}, description: {}\n", item.id, item.title, description));
        }
    }

    prompt
}

fn truncate_description(description: &str) -> String {
    if description.chars().count() <= MAX_DESCRIPTION_CHARS {
        return description.to_string();
    }
    let truncated: String = description.chars().take(MAX_DESCRIPTION_CHARS).collect();
    format!("{truncated}...")
}

static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").unwrap());

fn strip_markdown_fence(text: &str) -> &str {
    FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text.trim(), |m| m.as_str().trim())
}

fn parse_analysis_response(text: &str, active_work: &[ActiveWork]) -> Result<RootCauseAnalysis> {
    let json_text = strip_markdown_fence(text);
    let value: Value = serde_json::from_str(json_text).context("invalid JSON in classifier response")?;

    let category = value
        .get("category")
        .and_then(Value::as_str)
        .and_then(validate_category)
        .unwrap_or(RootCauseCategory::Other);

    let severity = value
        .get("severity")
        .and_then(Value::as_str)
        .and_then(validate_severity)
        .unwrap_or(Severity::Error);

    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c.clamp(0.0, 1.0) as f32)
        .unwrap_or(0.5);

    let is_duplicate = value.get("isDuplicateOfActiveWork").and_then(Value::as_bool).unwrap_or(false);

    let matching_active_work = if is_duplicate {
        value
            .get("matchingActiveWorkId")
            .and_then(Value::as_str)
            .and_then(|id| active_work.iter().find(|w| w.id == id).cloned())
    } else {
        None
    };

    Ok(RootCauseAnalysis {
        root_cause: value.get("rootCause").and_then(Value::as_str).unwrap_or_default().to_string(),
        category,
        severity,
        affected_components: value
            .get("affectedComponents")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
        suggested_action: value.get("suggestedAction").and_then(Value::as_str).unwrap_or_default().to_string(),
        // The model's verdict stands even if `matchingActiveWorkId` fails to
        // resolve against the active-work list: the router still skips
        // dispatch, it just has no back-reference to show.
        is_duplicate_of_active_work: is_duplicate,
        matching_active_work,
        confidence,
        reasoning: value.get("reasoning").and_then(Value::as_str).unwrap_or_default().to_string(),
    })
}

fn validate_category(s: &str) -> Option<RootCauseCategory> {
    match s.to_uppercase().as_str() {
        "SECURITY" => Some(RootCauseCategory::Security),
        "FUNCTIONAL" => Some(RootCauseCategory::Functional),
        "DATA_INTEGRITY" => Some(RootCauseCategory::DataIntegrity),
        "USER_EXPERIENCE" => Some(RootCauseCategory::UserExperience),
        "PERFORMANCE" => Some(RootCauseCategory::Performance),
        "OTHER" => Some(RootCauseCategory::Other),
        _ => None,
    }
}

fn validate_severity(s: &str) -> Option<Severity> {
    match s.to_uppercase().as_str() {
        "DEBUG" => Some(Severity::Debug),
        "INFO" => Some(Severity::Info),
        "WARNING" => Some(Severity::Warning),
        "ERROR" => Some(Severity::Error),
        "CRITICAL" => Some(Severity::Critical),
        _ => None,
    }
}

/// [`DuplicateClassifier`] used when no AI API key is configured. Always
/// fails open rather than making the caller special-case a missing key.
pub struct NoOpClassifier;

#[async_trait]
impl DuplicateClassifier for NoOpClassifier {
    async fn classify(&self, _report: &SanitizedReport, _active_work: &[ActiveWork]) -> RootCauseAnalysis {
        RootCauseAnalysis::fail_open("AI analysis not configured")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work(id: &str, title: &str) -> ActiveWork {
        ActiveWork {
            kind: crate::types::ActiveWorkKind::OpenChangeRequest,
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            url: None,
            created_at: None,
        }
    }

    #[test]
    fn parses_unfenced_json() {
        let text = r#"{"rootCause":"timeout","category":"PERFORMANCE","severity":"ERROR",
            "affectedComponents":["scheduler"],"suggestedAction":"increase timeout",
            "isDuplicateOfActiveWork":false,"matchingActiveWorkId":null,
            "confidence":0.8,"reasoning":"no match"}"#;
        let analysis = parse_analysis_response(text, &[]).unwrap();
        assert_eq!(analysis.category, RootCauseCategory::Performance);
        assert!(!analysis.is_duplicate_of_active_work);
        assert!((analysis.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn parses_fenced_json_and_resolves_matching_active_work() {
        let text = "```json\n{\"rootCause\":\"r\",\"category\":\"FUNCTIONAL\",\"severity\":\"ERROR\",\
            \"affectedComponents\":[],\"suggestedAction\":\"s\",\"isDuplicateOfActiveWork\":true,\
            \"matchingActiveWorkId\":\"7\",\"confidence\":0.9,\"reasoning\":\"matches PR #7\"}\n```";
        let active = vec![work("7", "Fix timeout in scheduler")];
        let analysis = parse_analysis_response(text, &active).unwrap();
        assert!(analysis.is_duplicate_of_active_work);
        assert_eq!(analysis.matching_active_work.unwrap().id, "7");
    }

    #[test]
    fn duplicate_verdict_stands_even_when_matching_id_does_not_resolve() {
        let text = r#"{"rootCause":"r","category":"FUNCTIONAL","severity":"ERROR",
            "affectedComponents":[],"suggestedAction":"s","isDuplicateOfActiveWork":true,
            "matchingActiveWorkId":"does-not-exist","confidence":0.9,"reasoning":"r"}"#;
        let analysis = parse_analysis_response(text, &[work("7", "Fix timeout in scheduler")]).unwrap();
        assert!(analysis.is_duplicate_of_active_work);
        assert!(analysis.matching_active_work.is_none());
    }

    #[test]
    fn falls_back_to_other_and_error_on_invalid_enum_values() {
        let text = r#"{"rootCause":"r","category":"NONSENSE","severity":"NONSENSE",
            "affectedComponents":[],"suggestedAction":"s","isDuplicateOfActiveWork":false,
            "matchingActiveWorkId":null,"confidence":5.0,"reasoning":"r"}"#;
        let analysis = parse_analysis_response(text, &[]).unwrap();
        assert_eq!(analysis.category, RootCauseCategory::Other);
        assert_eq!(analysis.severity, Severity::Error);
        assert!((analysis.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn invalid_json_is_an_error_not_a_panic() {
        let result = parse_analysis_response("not json at all", &[]);
        assert!(result.is_err());
    }

    #[test]
    fn truncates_long_descriptions_with_ellipsis() {
        let long = "a".repeat(600);
        let truncated = truncate_description(&long);
        assert_eq!(truncated.chars().count(), MAX_DESCRIPTION_CHARS + 3);
        assert!(truncated.ends_with("..."));
    }
}
