use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::watch;

use super::cycle::CycleResult;

pub const DEFAULT_LATENCY_HISTORY_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceStatus {
    Idle,
    Running,
    /// A cycle task panicked; the next cycle that completes normally clears it.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySample {
    /// Value of `checks_performed` this sample was committed with.
    pub check: u64,
    /// Local wall-clock label, `HH:MM`.
    pub label: String,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringStats {
    pub last_checked_at: Option<DateTime<Utc>>,
    pub current_value: Option<String>,
    pub status: ServiceStatus,
    pub checks_performed: u64,
    pub latency_history: VecDeque<LatencySample>,
}

impl Default for MonitoringStats {
    fn default() -> Self {
        Self {
            last_checked_at: None,
            current_value: None,
            status: ServiceStatus::Idle,
            checks_performed: 0,
            latency_history: VecDeque::new(),
        }
    }
}

impl MonitoringStats {
    pub fn last_latency_ms(&self) -> Option<u64> {
        self.latency_history.back().map(|s| s.latency_ms)
    }
}

/// Single writer for [`MonitoringStats`]; readers get snapshots or a watch receiver.
#[derive(Clone)]
pub struct StatsTracker {
    tx: watch::Sender<MonitoringStats>,
    history_len: usize,
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY_HISTORY_LEN)
    }
}

impl StatsTracker {
    pub fn new(history_len: usize) -> Self {
        let (tx, _) = watch::channel(MonitoringStats::default());
        Self {
            tx,
            history_len: history_len.max(1),
        }
    }

    pub fn snapshot(&self) -> MonitoringStats {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitoringStats> {
        self.tx.subscribe()
    }

    pub fn current_value(&self) -> Option<String> {
        self.tx.borrow().current_value.clone()
    }

    pub fn status(&self) -> ServiceStatus {
        self.tx.borrow().status
    }

    pub fn set_status(&self, status: ServiceStatus) {
        self.tx.send_if_modified(|stats| {
            let changed = stats.status != status;
            stats.status = status;
            changed
        });
    }

    /// Sets `to` only while the status is still `from`. Returns whether it moved.
    pub(crate) fn transition(&self, from: ServiceStatus, to: ServiceStatus) -> bool {
        self.tx.send_if_modified(|stats| {
            if stats.status == from && from != to {
                stats.status = to;
                true
            } else {
                false
            }
        })
    }

    pub fn record_success(&self, value: &str, latency: Duration, at: DateTime<Utc>) {
        let history_len = self.history_len;
        self.tx.send_modify(|stats| {
            stats.last_checked_at = Some(at);
            stats.current_value = Some(value.to_string());
            stats.checks_performed += 1;
            stats.latency_history.push_back(LatencySample {
                check: stats.checks_performed,
                label: at.with_timezone(&Local).format("%H:%M").to_string(),
                latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            });
            // Evict by insertion order only; sample timestamps are never compared.
            while stats.latency_history.len() > history_len {
                stats.latency_history.pop_front();
            }
        });
    }

    /// Applies a finished cycle. Only a successful extraction touches the stats.
    pub fn commit(&self, result: &CycleResult) {
        if let Some(value) = result.value() {
            self.record_success(value, result.latency, result.finished_at);
        }
    }
}
