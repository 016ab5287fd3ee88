//! The monitoring core: scheduler, check-cycle pipeline, event log and stats.

pub mod cycle;
pub mod event_log;
pub mod scheduler;
pub mod stats;

pub use cycle::{Collaborators, CycleResult, NotificationOutcome};
pub use event_log::{EventLog, LogEntry, LogEvent, LogLevel};
pub use scheduler::{
    DEFAULT_INTERVAL_FLOOR, DEFAULT_STAGE_TIMEOUT, Scheduler, SchedulerOptions,
};
pub use stats::{LatencySample, MonitoringStats, ServiceStatus, StatsTracker};
