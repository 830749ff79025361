//! Metrics ledger
//!
//! Concurrent, process-lifetime counters keyed by tenant-provider pair.
//! Entries are created lazily on first event and never deleted; a restart
//! resets all counters. Counters only ever increase. In addition to the
//! queryable ledger, each event is mirrored onto the `metrics` facade for
//! whatever exporter the host process installs.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use metrics::counter;
use serde::Serialize;

use crate::models::PairKey;

#[derive(Debug, Default)]
struct PairMetrics {
    oauth_attempts: AtomicU64,
    successful_connections: AtomicU64,
    failed_connections: AtomicU64,
    successful_refreshes: AtomicU64,
    failed_refreshes: AtomicU64,
    disconnections: AtomicU64,
    // Epoch milliseconds, 0 meaning "never".
    last_connection_ms: AtomicI64,
    last_refresh_ms: AtomicI64,
}

/// Point-in-time copy of one pair's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub oauth_attempts: u64,
    pub successful_connections: u64,
    pub failed_connections: u64,
    pub successful_refreshes: u64,
    pub failed_refreshes: u64,
    pub disconnections: u64,
    pub last_successful_connection: Option<DateTime<Utc>>,
    pub last_successful_refresh: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Derived health for one pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub success_rate: f64,
}

/// Thread-safe metrics ledger shared by request paths and the refresh sweep.
#[derive(Debug, Default)]
pub struct MetricsLedger {
    entries: RwLock<HashMap<PairKey, Arc<PairMetrics>>>,
}

impl MetricsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &PairKey) -> Arc<PairMetrics> {
        if let Some(entry) = self.entries.read().expect("metrics lock poisoned").get(key) {
            return Arc::clone(entry);
        }
        let mut entries = self.entries.write().expect("metrics lock poisoned");
        Arc::clone(entries.entry(key.clone()).or_default())
    }

    fn labels(key: &PairKey) -> [(&'static str, String); 2] {
        [
            ("tenant_id", key.tenant_id.to_string()),
            ("provider", key.provider.slug().to_string()),
        ]
    }

    pub fn record_attempt(&self, key: &PairKey) {
        self.entry(key).oauth_attempts.fetch_add(1, Ordering::Relaxed);
        counter!("oauth_attempts_total", &Self::labels(key)).increment(1);
    }

    pub fn record_success(&self, key: &PairKey) {
        let entry = self.entry(key);
        entry.successful_connections.fetch_add(1, Ordering::Relaxed);
        entry
            .last_connection_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        counter!("oauth_connect_success_total", &Self::labels(key)).increment(1);
    }

    pub fn record_failure(&self, key: &PairKey) {
        self.entry(key)
            .failed_connections
            .fetch_add(1, Ordering::Relaxed);
        counter!("oauth_connect_failure_total", &Self::labels(key)).increment(1);
    }

    pub fn record_refresh(&self, key: &PairKey, success: bool) {
        let entry = self.entry(key);
        if success {
            entry.successful_refreshes.fetch_add(1, Ordering::Relaxed);
            entry
                .last_refresh_ms
                .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
            counter!("token_refresh_success_total", &Self::labels(key)).increment(1);
        } else {
            entry.failed_refreshes.fetch_add(1, Ordering::Relaxed);
            counter!("token_refresh_failure_total", &Self::labels(key)).increment(1);
        }
    }

    pub fn record_disconnect(&self, key: &PairKey) {
        self.entry(key).disconnections.fetch_add(1, Ordering::Relaxed);
        counter!("oauth_disconnect_total", &Self::labels(key)).increment(1);
    }

    /// Snapshot the counters for one pair. A pair with no recorded events
    /// yields an all-zero snapshot.
    pub fn snapshot(&self, key: &PairKey) -> MetricsSnapshot {
        let entries = self.entries.read().expect("metrics lock poisoned");
        let Some(entry) = entries.get(key) else {
            return MetricsSnapshot::default();
        };

        MetricsSnapshot {
            oauth_attempts: entry.oauth_attempts.load(Ordering::Relaxed),
            successful_connections: entry.successful_connections.load(Ordering::Relaxed),
            failed_connections: entry.failed_connections.load(Ordering::Relaxed),
            successful_refreshes: entry.successful_refreshes.load(Ordering::Relaxed),
            failed_refreshes: entry.failed_refreshes.load(Ordering::Relaxed),
            disconnections: entry.disconnections.load(Ordering::Relaxed),
            last_successful_connection: millis_to_datetime(
                entry.last_connection_ms.load(Ordering::Relaxed),
            ),
            last_successful_refresh: millis_to_datetime(
                entry.last_refresh_ms.load(Ordering::Relaxed),
            ),
        }
    }

    /// Derive pair health: healthy when at least one connection succeeded and
    /// failures stay below successes. The success rate is 0.0 when no
    /// connection has been attempted to completion.
    pub fn health(&self, key: &PairKey) -> HealthReport {
        let snapshot = self.snapshot(key);
        let successes = snapshot.successful_connections;
        let failures = snapshot.failed_connections;

        let status = if successes > 0 && failures < successes {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        let denominator = successes + failures;
        let success_rate = if denominator == 0 {
            0.0
        } else {
            successes as f64 / denominator as f64
        };

        HealthReport {
            status,
            success_rate,
        }
    }
}

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    if millis == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}
