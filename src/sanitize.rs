//! Redacts secrets, identifiers, and absolute paths before an error leaves
//! the process. Pure and reentrant: no hidden state, patterns compiled once.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{ContextValue, ErrorReport};

struct Redaction {
    pattern: &'static LazyLock<Regex>,
    replacement: &'static str,
}

static ANTHROPIC_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"sk-ant-[A-Za-z0-9_-]+").unwrap());
static OPENAI_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"sk-[A-Za-z0-9]{20,}").unwrap());
static PINECONE_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"pckey_[A-Za-z0-9_-]+").unwrap());
static VOYAGE_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"pa-[A-Za-z0-9_-]+").unwrap());
static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap()
});
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static JWT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"eyJ[A-Za-z0-9_-]+\.eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+").unwrap());
static BEARER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Bearer\s+[A-Za-z0-9._-]+").unwrap());
static DATABASE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"postgres(?:ql)?://[^\s]+").unwrap());
static IPV4: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").unwrap());

static REDACTIONS: LazyLock<Vec<Redaction>> = LazyLock::new(|| {
    vec![
        Redaction { pattern: &ANTHROPIC_KEY, replacement: "[ANTHROPIC_KEY]" },
        Redaction { pattern: &OPENAI_KEY, replacement: "[OPENAI_KEY]" },
        Redaction { pattern: &PINECONE_KEY, replacement: "[PINECONE_KEY]" },
        Redaction { pattern: &VOYAGE_KEY, replacement: "[VOYAGE_KEY]" },
        Redaction { pattern: &UUID, replacement: "[UUID]" },
        Redaction { pattern: &EMAIL, replacement: "[EMAIL]" },
        Redaction { pattern: &JWT, replacement: "[JWT_TOKEN]" },
        Redaction { pattern: &BEARER, replacement: "Bearer [TOKEN]" },
        Redaction { pattern: &DATABASE_URL, replacement: "[DATABASE_URL]" },
        Redaction { pattern: &IPV4, replacement: "[IP_ADDRESS]" },
    ]
});

const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api_key",
    "apikey",
    "authorization",
    "cookie",
    "session",
    "user_id",
    "userid",
    "email",
    "phone",
    "ssn",
    "credit_card",
    "creditcard",
];

/// Applies every redaction pattern to a single string, in the fixed order
/// the patterns are registered.
#[must_use]
pub fn sanitize_string(input: &str) -> String {
    let mut out = input.to_string();
    for redaction in REDACTIONS.iter() {
        out = redaction.pattern.replace_all(&out, redaction.replacement).into_owned();
    }
    // Bearer replaces "Bearer [TOKEN]" but the JWT/OPENAI_KEY pass above may
    // already have eaten the token portion; re-running Bearer here is a
    // no-op in that case and a correct substitution otherwise.
    out
}

/// Sanitizes a stack trace line-by-line, collapsing absolute paths to a
/// project-relative prefix and home directories to `~/`.
#[must_use]
pub fn sanitize_stack_trace(trace: &str, project_root_marker: &str) -> String {
    trace
        .lines()
        .map(|line| {
            let line = sanitize_string(line);
            let line = collapse_project_root(&line, project_root_marker);
            collapse_home_dir(&line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_project_root(line: &str, marker: &str) -> String {
    if marker.is_empty() {
        return line.to_string();
    }
    if let Some(idx) = line.find(marker) {
        let mut collapsed = String::from(marker);
        collapsed.push_str(&line[idx + marker.len()..]);
        return collapsed;
    }
    line.to_string()
}

fn collapse_home_dir(line: &str) -> String {
    static HOME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/home/[^/\s]+/").unwrap());
    HOME.replace_all(line, "~/").into_owned()
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_FRAGMENTS.iter().any(|frag| lower.contains(frag))
}

/// Recursively sanitizes a context map: sensitive keys are replaced
/// wholesale regardless of value type; other string leaves are redacted by
/// pattern; non-string leaves pass through unchanged.
#[must_use]
pub fn sanitize_context_value(value: &ContextValue) -> ContextValue {
    match value {
        ContextValue::String(s) => ContextValue::String(sanitize_string(s)),
        ContextValue::List(items) => {
            ContextValue::List(items.iter().map(sanitize_context_value).collect())
        }
        ContextValue::Map(map) => {
            let mut out = std::collections::HashMap::with_capacity(map.len());
            for (k, v) in map {
                let sanitized = if is_sensitive_key(k) {
                    ContextValue::String("[REDACTED]".to_string())
                } else {
                    sanitize_context_value(v)
                };
                out.insert(k.clone(), sanitized);
            }
            ContextValue::Map(out)
        }
        other => other.clone(),
    }
}

/// A fully sanitized [`ErrorReport`], safe to send to an external service.
#[derive(Debug, Clone)]
pub struct SanitizedReport {
    pub category: String,
    pub event: String,
    pub message: String,
    pub stack_trace: Option<String>,
    pub code_location: Option<String>,
    pub context: Option<std::collections::HashMap<String, ContextValue>>,
    pub source_repo: Option<String>,
}

/// Sanitizes every externally-visible field of an [`ErrorReport`].
#[must_use]
pub fn sanitize_report(report: &ErrorReport) -> SanitizedReport {
    let project_root_marker = report
        .source_repo
        .as_deref()
        .and_then(|repo| repo.rsplit('/').next())
        .unwrap_or("project");

    SanitizedReport {
        category: sanitize_string(&report.category),
        event: sanitize_string(&report.event),
        message: sanitize_string(&report.message),
        stack_trace: report
            .stack_trace
            .as_deref()
            .map(|trace| sanitize_stack_trace(trace, project_root_marker)),
        code_location: report.code_location.as_deref().map(sanitize_string),
        context: report.context.as_ref().map(|ctx| {
            ctx.iter()
                .map(|(k, v)| {
                    let sanitized = if is_sensitive_key(k) {
                        ContextValue::String("[REDACTED]".to_string())
                    } else {
                        sanitize_context_value(v)
                    };
                    (k.clone(), sanitized)
                })
                .collect()
        }),
        source_repo: report.source_repo.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn redacts_email_and_bearer_token() {
        let out = sanitize_string("auth failed for alice@example.com using Bearer abc.def.ghi");
        assert!(out.contains("[EMAIL]"));
        assert!(out.contains("Bearer [TOKEN]"));
        assert!(!out.contains("alice@example.com"));
    }

    #[test]
    fn redacts_anthropic_and_openai_keys() {
        let out = sanitize_string("key=sk-ant-abc123XYZ leaked next to sk-aaaaaaaaaaaaaaaaaaaaaaaa");
        assert!(out.contains("[ANTHROPIC_KEY]"));
        assert!(out.contains("[OPENAI_KEY]"));
    }

    #[test]
    fn redacts_uuid_and_database_url() {
        let out = sanitize_string(
            "session 123e4567-e89b-12d3-a456-426614174000 connected to postgres://u:p@host/db",
        );
        assert!(out.contains("[UUID]"));
        assert!(out.contains("[DATABASE_URL]"));
    }

    #[test]
    fn idempotent_under_repeated_application() {
        let input = "contact bob@example.com via Bearer xyz.abc.123";
        let once = sanitize_string(input);
        let twice = sanitize_string(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn sensitive_keys_are_redacted_regardless_of_value_type() {
        let mut ctx = HashMap::new();
        ctx.insert("api_token".to_string(), ContextValue::Number(42.into()));
        ctx.insert("safe_field".to_string(), ContextValue::String("hello".to_string()));
        let report = ErrorReport {
            category: "c".to_string(),
            event: "e".to_string(),
            message: "m".to_string(),
            stack_trace: None,
            code_location: None,
            context: Some(ctx),
            severity: crate::types::Severity::Error,
            source_repo: None,
        };
        let sanitized = sanitize_report(&report);
        let ctx = sanitized.context.unwrap();
        assert_eq!(ctx.get("api_token"), Some(&ContextValue::String("[REDACTED]".to_string())));
        assert_eq!(ctx.get("safe_field"), Some(&ContextValue::String("hello".to_string())));
    }

    #[test]
    fn collapses_home_directory_in_stack_trace() {
        let out = sanitize_stack_trace("at /home/alice/project/main.rs:10", "");
        assert!(out.contains("~/project/main.rs"));
        assert!(!out.contains("/home/alice"));
    }
}
