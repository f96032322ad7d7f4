// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-subject access sessions.
//!
//! ## Sweep
//!
//! A sweep runs in three phases so that slow refreshes never hold the map
//! lock:
//!
//! 1. Snapshot expired and near-expiry sessions under a read lock.
//! 2. Run refreshes with no lock held, each bounded by the configured
//!    refresh timeout. A timeout counts as a failed refresh.
//! 3. Commit under a write lock. A refresh result only applies if the entry
//!    still has the same `session_id` and `refresh_count` it had in the
//!    snapshot; otherwise someone replaced it in the meantime.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::{AccessError, AccessResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub session_id: String,
    pub subject: String,
    pub created_at: u64,
    pub expires_at: u64,
    pub refresh_count: u32,
}

impl Session {
    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        now_millis >= self.expires_at
    }

    pub fn remaining_at(&self, now_millis: u64) -> u64 {
        self.expires_at.saturating_sub(now_millis)
    }
}

/// Renews a session's backing authorization before it lapses.
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh(&self, session: &Session) -> AccessResult<()>;
}

/// Refresher that always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysRefresh;

#[async_trait]
impl SessionRefresher for AlwaysRefresh {
    async fn refresh(&self, _session: &Session) -> AccessResult<()> {
        Ok(())
    }
}

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub refreshed: usize,
    /// Sessions removed because their refresh failed.
    pub dropped: usize,
}

pub struct SessionManager {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    refresher: Arc<dyn SessionRefresher>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        clock: Arc<dyn Clock>,
        refresher: Arc<dyn SessionRefresher>,
    ) -> Self {
        Self {
            config,
            clock,
            refresher,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Return the subject's live session, creating one if absent or expired.
    pub async fn get_or_create_session(&self, subject: &str) -> Session {
        let now = self.clock.now_millis();
        let mut sessions = self.sessions.write().await;

        if let Some(existing) = sessions.get(subject) {
            if !existing.is_expired_at(now) {
                return existing.clone();
            }
        }

        let session = Session {
            session_id: uuid::Uuid::new_v4().to_string(),
            subject: subject.to_string(),
            created_at: now,
            expires_at: now.saturating_add(self.config.ttl_ms),
            refresh_count: 0,
        };
        info!(
            subject = %subject,
            session_id = %session.session_id,
            expires_at = session.expires_at,
            "Session created"
        );
        sessions.insert(subject.to_string(), session.clone());
        session
    }

    /// The subject's unexpired session, or `SessionExpired`.
    pub async fn active_session(&self, subject: &str) -> AccessResult<Session> {
        let now = self.clock.now_millis();
        let sessions = self.sessions.read().await;
        match sessions.get(subject) {
            Some(session) if !session.is_expired_at(now) => Ok(session.clone()),
            _ => Err(AccessError::SessionExpired(subject.to_string())),
        }
    }

    /// Remove the subject's session. Returns whether one existed.
    pub async fn revoke(&self, subject: &str) -> bool {
        let removed = self.sessions.write().await.remove(subject);
        if let Some(session) = &removed {
            info!(subject = %subject, session_id = %session.session_id, "Session revoked");
        }
        removed.is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn sweep(&self) -> SweepReport {
        // Phase 1: snapshot
        let (expired, due) = {
            let now = self.clock.now_millis();
            let sessions = self.sessions.read().await;
            let mut expired = Vec::new();
            let mut due = Vec::new();
            for session in sessions.values() {
                if session.is_expired_at(now) {
                    expired.push((session.subject.clone(), session.session_id.clone()));
                } else if session.remaining_at(now) < self.config.refresh_threshold_ms {
                    due.push(session.clone());
                }
            }
            (expired, due)
        };

        // Phase 2: refresh without holding the lock
        let mut outcomes = Vec::with_capacity(due.len());
        for session in due {
            let result = match tokio::time::timeout(
                self.config.refresh_timeout,
                self.refresher.refresh(&session),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AccessError::EvaluationError(format!(
                    "session refresh timed out after {}ms",
                    self.config.refresh_timeout.as_millis()
                ))),
            };
            outcomes.push((session, result));
        }

        // Phase 3: commit
        let mut report = SweepReport::default();
        let now = self.clock.now_millis();
        let mut sessions = self.sessions.write().await;

        for (subject, session_id) in expired {
            let still_expired = sessions
                .get(&subject)
                .is_some_and(|s| s.session_id == session_id && s.is_expired_at(now));
            if still_expired {
                sessions.remove(&subject);
                report.expired += 1;
                debug!(subject = %subject, session_id = %session_id, "Session expired");
            }
        }

        for (snapshot, result) in outcomes {
            let Some(current) = sessions.get_mut(&snapshot.subject) else {
                continue;
            };
            if current.session_id != snapshot.session_id {
                continue;
            }
            match result {
                Ok(()) if current.refresh_count == snapshot.refresh_count => {
                    current.refresh_count = current.refresh_count.saturating_add(1);
                    current.expires_at = now.saturating_add(self.config.ttl_ms);
                    report.refreshed += 1;
                    debug!(
                        subject = %snapshot.subject,
                        refresh_count = current.refresh_count,
                        expires_at = current.expires_at,
                        "Session refreshed"
                    );
                }
                Ok(()) => {}
                Err(e) => {
                    warn!(
                        subject = %snapshot.subject,
                        session_id = %snapshot.session_id,
                        error = %e,
                        "Session refresh failed; dropping session"
                    );
                    sessions.remove(&snapshot.subject);
                    report.dropped += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const T0: u64 = 1_000_000;

    fn config() -> SessionConfig {
        SessionConfig {
            ttl_ms: 3_600_000,
            refresh_threshold_ms: 300_000,
            sweep_interval: Duration::from_millis(30_000),
            refresh_timeout: Duration::from_millis(50),
        }
    }

    fn manager(clock: Arc<ManualClock>) -> SessionManager {
        SessionManager::new(config(), clock, Arc::new(AlwaysRefresh))
    }

    struct FailingRefresher;

    #[async_trait]
    impl SessionRefresher for FailingRefresher {
        async fn refresh(&self, _session: &Session) -> AccessResult<()> {
            Err(AccessError::EvaluationError("upstream down".to_string()))
        }
    }

    struct StalledRefresher;

    #[async_trait]
    impl SessionRefresher for StalledRefresher {
        async fn refresh(&self, _session: &Session) -> AccessResult<()> {
            std::future::pending().await
        }
    }

    /// Replaces the session mid-refresh to simulate a concurrent writer.
    struct RacingRefresher {
        manager: std::sync::OnceLock<Arc<SessionManager>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SessionRefresher for RacingRefresher {
        async fn refresh(&self, session: &Session) -> AccessResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(manager) = self.manager.get() {
                manager.revoke(&session.subject).await;
                manager.get_or_create_session(&session.subject).await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn session_is_reused_until_expiry() {
        let clock = Arc::new(ManualClock::new(T0));
        let sessions = manager(Arc::clone(&clock));

        let first = sessions.get_or_create_session("alice").await;
        assert_eq!(first.created_at, T0);
        assert_eq!(first.expires_at, T0 + 3_600_000);
        assert_eq!(first.refresh_count, 0);

        clock.advance(1_000);
        let again = sessions.get_or_create_session("alice").await;
        assert_eq!(again.session_id, first.session_id);

        clock.set(first.expires_at);
        let replaced = sessions.get_or_create_session("alice").await;
        assert_ne!(replaced.session_id, first.session_id);
    }

    #[tokio::test]
    async fn sweep_refreshes_inside_threshold() {
        let clock = Arc::new(ManualClock::new(T0));
        let sessions = manager(Arc::clone(&clock));
        sessions.get_or_create_session("alice").await;

        clock.set(T0 + 3_400_000);
        let report = sessions.sweep().await;
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.expired, 0);

        let session = sessions.active_session("alice").await.unwrap();
        assert_eq!(session.refresh_count, 1);
        assert_eq!(session.expires_at, T0 + 3_400_000 + 3_600_000);
    }

    #[tokio::test]
    async fn sweep_leaves_fresh_sessions_alone() {
        let clock = Arc::new(ManualClock::new(T0));
        let sessions = manager(Arc::clone(&clock));
        sessions.get_or_create_session("alice").await;

        // Exactly at the threshold is not yet due
        clock.set(T0 + 3_300_000);
        assert_eq!(sessions.sweep().await, SweepReport::default());
        let session = sessions.active_session("alice").await.unwrap();
        assert_eq!(session.refresh_count, 0);
    }

    #[tokio::test]
    async fn sweep_deletes_expired_sessions() {
        let clock = Arc::new(ManualClock::new(T0));
        let sessions = manager(Arc::clone(&clock));
        sessions.get_or_create_session("alice").await;

        clock.set(T0 + 3_700_000);
        let report = sessions.sweep().await;
        assert_eq!(report.expired, 1);
        assert!(sessions.is_empty().await);
        assert!(matches!(
            sessions.active_session("alice").await,
            Err(AccessError::SessionExpired(_))
        ));
    }

    #[tokio::test]
    async fn refresh_count_increases_across_sweeps() {
        let clock = Arc::new(ManualClock::new(T0));
        let sessions = manager(Arc::clone(&clock));
        sessions.get_or_create_session("alice").await;

        let mut last = 0;
        for _ in 0..3 {
            let current = sessions.active_session("alice").await.unwrap();
            clock.set(current.expires_at - 1_000);
            sessions.sweep().await;
            let refreshed = sessions.active_session("alice").await.unwrap();
            assert!(refreshed.refresh_count > last);
            last = refreshed.refresh_count;
        }
        assert_eq!(last, 3);
    }

    #[tokio::test]
    async fn failed_refresh_drops_the_session() {
        let clock = Arc::new(ManualClock::new(T0));
        let sessions = SessionManager::new(
            config(),
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::new(FailingRefresher),
        );
        sessions.get_or_create_session("alice").await;

        clock.set(T0 + 3_400_000);
        let report = sessions.sweep().await;
        assert_eq!(report.dropped, 1);
        assert!(sessions.active_session("alice").await.is_err());
    }

    #[tokio::test]
    async fn stalled_refresh_times_out_and_drops_the_session() {
        let clock = Arc::new(ManualClock::new(T0));
        let sessions = SessionManager::new(
            config(),
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::new(StalledRefresher),
        );
        sessions.get_or_create_session("alice").await;
        clock.advance(200_000);
        sessions.get_or_create_session("bob").await;

        // alice is past expiry, bob is inside the refresh threshold
        clock.set(T0 + 3_600_000 + 1);
        let report = tokio::time::timeout(Duration::from_secs(2), sessions.sweep())
            .await
            .expect("sweep must not hang on a stalled refresher");

        assert_eq!(report.expired, 1);
        assert_eq!(report.dropped, 1);
        assert!(sessions.is_empty().await);
    }

    #[tokio::test]
    async fn replaced_session_is_not_overwritten_by_stale_refresh() {
        let clock = Arc::new(ManualClock::new(T0));
        let refresher = Arc::new(RacingRefresher {
            manager: std::sync::OnceLock::new(),
            calls: AtomicUsize::new(0),
        });
        let sessions = Arc::new(SessionManager::new(
            config(),
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::clone(&refresher) as Arc<dyn SessionRefresher>,
        ));
        let _ = refresher.manager.set(Arc::clone(&sessions));

        let original = sessions.get_or_create_session("alice").await;
        clock.set(T0 + 3_400_000);
        let report = sessions.sweep().await;

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.refreshed, 0);
        let current = sessions.active_session("alice").await.unwrap();
        assert_ne!(current.session_id, original.session_id);
        assert_eq!(current.refresh_count, 0);
        assert_eq!(current.created_at, T0 + 3_400_000);
    }

    #[tokio::test]
    async fn revoke_removes_session() {
        let clock = Arc::new(ManualClock::new(T0));
        let sessions = manager(clock);
        sessions.get_or_create_session("alice").await;

        assert!(sessions.revoke("alice").await);
        assert!(!sessions.revoke("alice").await);
        assert!(sessions.active_session("alice").await.is_err());
    }
}
