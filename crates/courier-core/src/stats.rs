use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Process-wide counters. Monotonic, never reset.
#[derive(Debug)]
pub struct ProcessStats {
    total_sent: AtomicU64,
    total_sessions: AtomicU64,
    total_tasks: AtomicU64,
    successful_sessions: AtomicU64,
    failed_sessions: AtomicU64,
    started_at: DateTime<Utc>,
    started: Instant,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_sent: u64,
    pub total_sessions: u64,
    pub total_tasks: u64,
    pub successful_sessions: u64,
    pub failed_sessions: u64,
    pub started_at: DateTime<Utc>,
    /// Seconds since startup.
    pub uptime: u64,
}

impl Default for ProcessStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessStats {
    pub fn new() -> Self {
        Self {
            total_sent: AtomicU64::new(0),
            total_sessions: AtomicU64::new(0),
            total_tasks: AtomicU64::new(0),
            successful_sessions: AtomicU64::new(0),
            failed_sessions: AtomicU64::new(0),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn record_sent(&self) {
        self.total_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_created(&self) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_created(&self) {
        self.total_tasks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_opened(&self) {
        self.successful_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_failed(&self) {
        self.failed_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_sent: self.total_sent.load(Ordering::Relaxed),
            total_sessions: self.total_sessions.load(Ordering::Relaxed),
            total_tasks: self.total_tasks.load(Ordering::Relaxed),
            successful_sessions: self.successful_sessions.load(Ordering::Relaxed),
            failed_sessions: self.failed_sessions.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime: self.uptime().as_secs(),
        }
    }
}
