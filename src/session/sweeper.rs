// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Sweeper
//!
//! Background task that periodically sweeps the session map: expired
//! sessions are deleted and sessions close to expiry are refreshed.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown. A sweep
//! that is already running completes before the task exits.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::manager::SessionManager;

pub struct SessionSweeper {
    sessions: Arc<SessionManager>,
    interval: Duration,
}

impl SessionSweeper {
    /// Sweep on the interval from the manager's session config.
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        let interval = sessions.config().sweep_interval;
        Self { sessions, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Session sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Session sweeper shutting down");
                return;
            }

            self.sweep_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Session sweeper shutting down");
                    return;
                }
            }
        }
    }

    async fn sweep_step(&self) {
        let report = self.sessions.sweep().await;
        if report.expired + report.refreshed + report.dropped == 0 {
            return;
        }
        info!(
            expired = report.expired,
            refreshed = report.refreshed,
            dropped = report.dropped,
            "Session sweep completed"
        );
    }
}
