//! Cooldown and history store (C5): tracks merged fixes, active sessions,
//! and the append-only attempt history, all keyed by [`Fingerprint`] and
//! held under one lock, following the `Arc<RwLock<HashMap<K, V>>>` idiom
//! used elsewhere in this crate for shared mutable state.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{Attempt, AttemptStatus, CooldownRecord, ErrorHistory, Fingerprint};

struct Tables {
    resolved: HashMap<Fingerprint, CooldownRecord>,
    active: HashMap<Fingerprint, String>,
    history: HashMap<Fingerprint, Vec<Attempt>>,
}

/// Cooldown-and-history store for repair attempts.
pub struct HistoryStore {
    cooldown: Duration,
    tables: Arc<RwLock<Tables>>,
}

impl HistoryStore {
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            tables: Arc::new(RwLock::new(Tables {
                resolved: HashMap::new(),
                active: HashMap::new(),
                history: HashMap::new(),
            })),
        }
    }

    /// Returns `(in_cooldown, ends_at, pr_url)` for the fingerprint's most
    /// recent merged fix, if any.
    pub async fn check_cooldown(&self, fp: &Fingerprint) -> (bool, Option<DateTime<Utc>>, Option<String>) {
        let tables = self.tables.read().await;
        let Some(record) = tables.resolved.get(fp) else {
            return (false, None, None);
        };

        let cooldown = chrono::Duration::from_std(self.cooldown).unwrap_or(chrono::Duration::zero());
        let ends_at = record.resolved_at + cooldown;
        let in_cooldown = Utc::now() < ends_at;
        (in_cooldown, Some(ends_at), Some(record.pr_url.clone()))
    }

    /// Returns the session ID of the active repair for this fingerprint, if any.
    pub async fn check_active(&self, fp: &Fingerprint) -> Option<String> {
        self.tables.read().await.active.get(fp).cloned()
    }

    /// Returns every `(fingerprint, sessionId)` pair currently tracked as
    /// active, across all fingerprints, not just one.
    pub async fn all_active(&self) -> Vec<(Fingerprint, String)> {
        self.tables
            .read()
            .await
            .active
            .iter()
            .map(|(fp, sid)| (fp.clone(), sid.clone()))
            .collect()
    }

    /// Returns the prior-attempt history for this fingerprint.
    pub async fn history_for(&self, fp: &Fingerprint) -> ErrorHistory {
        let tables = self.tables.read().await;
        let Some(attempts) = tables.history.get(fp) else {
            return ErrorHistory::default();
        };

        if attempts.is_empty() {
            return ErrorHistory::default();
        }

        let first_seen = attempts.iter().map(|a| a.created_at).min();
        ErrorHistory {
            has_history: true,
            attempts: attempts.clone(),
            total_occurrences: attempts.len(),
            first_seen,
        }
    }

    /// Records a new dispatch: appends an in-progress attempt and marks the
    /// fingerprint active.
    pub async fn record_attempt(&self, fp: &Fingerprint, session_id: &str, session_url: &str) {
        let mut tables = self.tables.write().await;
        tables.active.insert(fp.clone(), session_id.to_string());
        tables.history.entry(fp.clone()).or_default().push(Attempt {
            session_id: session_id.to_string(),
            session_url: session_url.to_string(),
            pr_url: None,
            status: AttemptStatus::InProgress,
            created_at: Utc::now(),
            resolved_at: None,
            notes: None,
        });
    }

    /// Records a merged fix: writes the cooldown record, marks the
    /// matching in-progress attempt resolved, and clears the active pointer.
    pub async fn mark_merged(
        &self,
        fp: &Fingerprint,
        pr_url: &str,
        session_id: &str,
        notes: Option<String>,
    ) {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        tables.resolved.insert(
            fp.clone(),
            CooldownRecord {
                resolved_at: now,
                pr_url: pr_url.to_string(),
                session_id: session_id.to_string(),
                notes: notes.clone(),
            },
        );

        if let Some(attempts) = tables.history.get_mut(fp) {
            if let Some(attempt) = attempts
                .iter_mut()
                .find(|a| a.session_id == session_id && a.status == AttemptStatus::InProgress)
            {
                attempt.status = AttemptStatus::Resolved;
                attempt.resolved_at = Some(now);
                attempt.pr_url = Some(pr_url.to_string());
                attempt.notes = notes;
            }
        }

        tables.active.remove(fp);
        debug!("marked fingerprint {fp} merged and cleared active session");
    }

    /// Clears the active pointer without touching attempt status.
    pub async fn clear_active(&self, fp: &Fingerprint) {
        self.tables.write().await.active.remove(fp);
    }

    /// Marks the in-progress attempt matching `session_id` as cancelled.
    /// Resolved attempts are left untouched: status transitions are
    /// monotonic and never revert from a terminal state.
    pub async fn record_cancelled(&self, fp: &Fingerprint, session_id: &str, notes: Option<String>) {
        let mut tables = self.tables.write().await;
        if let Some(attempts) = tables.history.get_mut(fp) {
            if let Some(attempt) = attempts
                .iter_mut()
                .find(|a| a.session_id == session_id && a.status == AttemptStatus::InProgress)
            {
                attempt.status = AttemptStatus::Cancelled;
                attempt.notes = notes;
            }
        }
        tables.active.remove(fp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp() -> Fingerprint {
        Fingerprint("abc123".to_string())
    }

    #[tokio::test]
    async fn all_active_lists_every_fingerprint_not_just_one() {
        let store = HistoryStore::new(Duration::from_secs(300));
        let fp2 = Fingerprint("def456".to_string());
        store.record_attempt(&fp(), "sess-1", "https://host/sessions/sess-1").await;
        store.record_attempt(&fp2, "sess-2", "https://host/sessions/sess-2").await;

        let mut active = store.all_active().await;
        active.sort_by(|a, b| a.1.cmp(&b.1));
        assert_eq!(active, vec![(fp(), "sess-1".to_string()), (fp2, "sess-2".to_string())]);
    }

    #[tokio::test]
    async fn record_attempt_sets_active_and_history() {
        let store = HistoryStore::new(Duration::from_secs(300));
        store.record_attempt(&fp(), "sess-1", "https://host/sessions/sess-1").await;

        assert_eq!(store.check_active(&fp()).await, Some("sess-1".to_string()));
        let history = store.history_for(&fp()).await;
        assert!(history.has_history);
        assert_eq!(history.total_occurrences, 1);
        assert_eq!(history.attempts[0].status, AttemptStatus::InProgress);
    }

    #[tokio::test]
    async fn mark_merged_clears_active_and_resolves_attempt() {
        let store = HistoryStore::new(Duration::from_secs(300));
        store.record_attempt(&fp(), "sess-1", "https://host/sessions/sess-1").await;
        store.mark_merged(&fp(), "https://host/pr/7", "sess-1", None).await;

        assert_eq!(store.check_active(&fp()).await, None);
        let history = store.history_for(&fp()).await;
        assert_eq!(history.attempts[0].status, AttemptStatus::Resolved);
        assert!(history.attempts[0].resolved_at.is_some());
    }

    #[tokio::test]
    async fn cooldown_is_active_immediately_after_merge_and_expires_after_window() {
        let store = HistoryStore::new(Duration::from_millis(10));
        store.record_attempt(&fp(), "sess-1", "url").await;
        store.mark_merged(&fp(), "pr", "sess-1", None).await;

        let (in_cooldown, ends_at, pr_url) = store.check_cooldown(&fp()).await;
        assert!(in_cooldown);
        assert!(ends_at.is_some());
        assert_eq!(pr_url.as_deref(), Some("pr"));

        tokio::time::sleep(Duration::from_millis(30)).await;
        let (in_cooldown, ..) = store.check_cooldown(&fp()).await;
        assert!(!in_cooldown);
    }

    #[tokio::test]
    async fn cancelled_transition_does_not_affect_resolved_attempts() {
        let store = HistoryStore::new(Duration::from_secs(300));
        store.record_attempt(&fp(), "sess-1", "url-1").await;
        store.mark_merged(&fp(), "pr", "sess-1", None).await;
        store.record_attempt(&fp(), "sess-2", "url-2").await;
        store.record_cancelled(&fp(), "sess-2", Some("duplicate approach".to_string())).await;

        let history = store.history_for(&fp()).await;
        assert_eq!(history.attempts[0].status, AttemptStatus::Resolved);
        assert_eq!(history.attempts[1].status, AttemptStatus::Cancelled);
    }
}
