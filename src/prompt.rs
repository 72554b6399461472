//! Builds the repair-service escalation payload from a sanitized error,
//! prefixing a "recurring error" block when prior attempts exist.

use std::fmt::Write as _;

use crate::sanitize::SanitizedReport;
use crate::types::{Attempt, AttemptStatus, ErrorHistory};

const MAX_HISTORY_ATTEMPTS_SHOWN: usize = 5;

/// Renders the full prompt text sent to the repair service.
#[must_use]
pub fn build_prompt(report: &SanitizedReport, history: &ErrorHistory) -> String {
    let mut prompt = String::new();

    if history.has_history {
        write_recurring_error_block(&mut prompt, history);
    }

    let _ = writeln!(prompt, "## Error Report");
    let _ = writeln!(prompt, "- Category: {}", report.category);
    let _ = writeln!(prompt, "- Event: {}", report.event);
    let _ = writeln!(prompt, "- Message: {}", report.message);

    if let Some(location) = &report.code_location {
        let _ = writeln!(prompt, "- Code location: {location}");
    }

    if let Some(trace) = &report.stack_trace {
        let _ = writeln!(prompt, "\n### Stack Trace\n```\n{trace}\n```");
    }

    if let Some(context) = &report.context {
        if let Ok(json) = serde_json::to_string_pretty(context) {
            let _ = writeln!(prompt, "\n### Context\n```json\n{json}\n```");
        }
    }

    let _ = write!(
        prompt,
        "\n### Instructions\n\
         Perform a root-cause analysis of the error above, implement a fix, \
         ensure no regressions are introduced, and submit a change request \
         with the fix.\n"
    );

    prompt
}

fn write_recurring_error_block(prompt: &mut String, history: &ErrorHistory) {
    let _ = writeln!(prompt, "## RECURRING ERROR");
    let _ = writeln!(prompt, "This error has occurred {} time(s) before.", history.total_occurrences);

    if let Some(first_seen) = history.first_seen {
        let _ = writeln!(prompt, "First seen: {}", first_seen.to_rfc3339());
    }

    let _ = writeln!(prompt, "\nPrior attempts (most recent first):");
    for attempt in history.attempts.iter().rev().take(MAX_HISTORY_ATTEMPTS_SHOWN) {
        write_attempt_line(prompt, attempt);
    }

    let _ = writeln!(
        prompt,
        "\nRead the prior sessions above, avoid repeating failed approaches, \
         and document the new approach taken.\n"
    );
}

fn write_attempt_line(prompt: &mut String, attempt: &Attempt) {
    let status = match attempt.status {
        AttemptStatus::InProgress => "in_progress",
        AttemptStatus::Resolved => "resolved",
        AttemptStatus::Cancelled => "cancelled",
    };

    let _ = write!(prompt, "- session {} ({status})", attempt.session_url);
    if let Some(pr_url) = &attempt.pr_url {
        let _ = write!(prompt, ", change request: {pr_url}");
    }
    if let Some(resolved_at) = attempt.resolved_at {
        let _ = write!(prompt, ", resolved: {}", resolved_at.to_rfc3339());
    }
    if let Some(notes) = &attempt.notes {
        let _ = write!(prompt, ", notes: {notes}");
    }
    let _ = writeln!(prompt);
}
