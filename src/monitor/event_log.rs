//! Append-only operator log shared between the cycle pipeline and observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Process-wide so ids stay unique across several logs.
static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

const SUBSCRIBER_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Appended(LogEntry),
    Cleared,
}

#[derive(Clone)]
pub struct EventLog {
    entries: Arc<RwLock<Vec<LogEntry>>>,
    events_tx: broadcast::Sender<LogEvent>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            events_tx,
        }
    }

    /// Records a message. Timestamps never go backwards relative to the
    /// previous entry, even if the wall clock does.
    pub fn append(&self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => info!(level = %level, "{message}"),
            LogLevel::Warning => warn!("{message}"),
            LogLevel::Error => error!("{message}"),
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let timestamp = entries
            .last()
            .map_or(now, |last| last.timestamp.max(now));
        let entry = LogEntry {
            id: NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed),
            timestamp,
            level,
            message,
        };
        entries.push(entry.clone());
        // Sent under the lock so subscribers see events in log order.
        let _ = self.events_tx.send(LogEvent::Appended(entry.clone()));
        entry
    }

    pub fn info(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogLevel::Info, message)
    }

    pub fn success(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogLevel::Success, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogLevel::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogLevel::Error, message)
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
        let _ = self.events_tx.send(LogEvent::Cleared);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events_tx.subscribe()
    }
}
