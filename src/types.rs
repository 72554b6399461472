//! Core data types for the error-routing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Severity of an incoming error, ordered low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// A scalar, list, or nested map of context attached to an error report.
///
/// Mirrors `serde_json::Value` but keeps the sanitizer's recursion explicit
/// rather than pattern-matching on a generic JSON value throughout the crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<ContextValue>),
    Map(HashMap<String, ContextValue>),
}

/// Raw error event emitted by the agent platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub category: String,
    pub event: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, ContextValue>>,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_repo: Option<String>,
}

/// 256-bit content hash identifying an error class.
///
/// A newtype rather than a bare `String` so call sites cannot accidentally
/// mix a fingerprint up with, say, a session ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A merged fix recorded against a fingerprint, gating the cooldown window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownRecord {
    pub resolved_at: DateTime<Utc>,
    pub pr_url: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Terminal/non-terminal status of a single repair attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Resolved,
    Cancelled,
}

/// One entry in a fingerprint's append-only attempt history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub session_id: String,
    pub session_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    pub status: AttemptStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Historical context for a fingerprint, as surfaced to the prompt builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorHistory {
    pub has_history: bool,
    pub attempts: Vec<Attempt>,
    pub total_occurrences: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
}

/// Kind of item returned by the active-work inspector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveWorkKind {
    RepairSession,
    OpenChangeRequest,
}

/// A single piece of in-flight upstream work, either a repair session we
/// tracked ourselves or an open change request on the code-hosting service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveWork {
    pub kind: ActiveWorkKind,
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Root-cause category as classified by the AI duplicate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RootCauseCategory {
    Security,
    Functional,
    DataIntegrity,
    UserExperience,
    Performance,
    Other,
}

/// Structured verdict produced by the AI duplicate classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCauseAnalysis {
    pub root_cause: String,
    pub category: RootCauseCategory,
    pub severity: Severity,
    pub affected_components: Vec<String>,
    pub suggested_action: String,
    pub is_duplicate_of_active_work: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching_active_work: Option<ActiveWork>,
    pub confidence: f32,
    pub reasoning: String,
}

impl RootCauseAnalysis {
    /// The analysis used on every fail-open path: proceed as if no active
    /// work matched, with zero confidence, so the caller can tell a real
    /// verdict apart from a degraded one.
    #[must_use]
    pub fn fail_open(reason: impl Into<String>) -> Self {
        Self {
            root_cause: String::new(),
            category: RootCauseCategory::Other,
            severity: Severity::Error,
            affected_components: Vec::new(),
            suggested_action: String::new(),
            is_duplicate_of_active_work: false,
            matching_active_work: None,
            confidence: 0.0,
            reasoning: reason.into(),
        }
    }
}

/// Outcome of routing a single [`ErrorReport`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_url: Option<String>,
    pub linked_to_existing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<RootCauseAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_cooldown: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_ends_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_historical_context: Option<bool>,
}

impl RoutingResult {
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            skipped_reason: Some(reason.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }
}
