//! Run/stop lifecycle and the timer that drives check cycles.
//!
//! A run owns one driver task. The driver ticks on a fixed interval and hands
//! each tick to a freshly spawned cycle task, so `stop()` only ever revokes
//! the driver: a cycle already in flight runs to completion and is recorded.
//! At most one cycle runs at a time. A later tick that finds one in flight is
//! skipped with a WARNING entry; the first tick of a run waits for it instead.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedMutexGuard, broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::cycle::{Collaborators, CycleContext, CycleResult};
use super::event_log::{EventLog, LogEntry, LogEvent};
use super::stats::{DEFAULT_LATENCY_HISTORY_LEN, MonitoringStats, ServiceStatus, StatsTracker};
use crate::config::MonitorConfig;
use crate::error::ConfigurationError;

pub const DEFAULT_INTERVAL_FLOOR: Duration = Duration::from_secs(60);
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Safety clamp on the request rate: the timer never ticks faster than
    /// this, whatever interval the configuration asks for.
    pub interval_floor: Duration,
    /// Upper bound for each collaborator call (authenticate, fetch, extract, notify).
    pub stage_timeout: Duration,
    pub latency_history_len: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            interval_floor: DEFAULT_INTERVAL_FLOOR,
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            latency_history_len: DEFAULT_LATENCY_HISTORY_LEN,
        }
    }
}

struct ActiveRun {
    shutdown_tx: oneshot::Sender<()>,
    _driver: JoinHandle<()>,
}

pub struct Scheduler {
    context: CycleContext,
    options: SchedulerOptions,
    // Held for the duration of every cycle, across runs.
    cycle_gate: Arc<tokio::sync::Mutex<()>>,
    run: Mutex<Option<ActiveRun>>,
}

impl Scheduler {
    pub fn new(collaborators: Collaborators, options: SchedulerOptions) -> Self {
        let context = CycleContext {
            collaborators,
            log: EventLog::new(),
            stats: StatsTracker::new(options.latency_history_len),
            stage_timeout: options.stage_timeout,
        };
        Self {
            context,
            options,
            cycle_gate: Arc::new(tokio::sync::Mutex::new(())),
            run: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// The period the timer actually uses for `config`.
    pub fn effective_interval(&self, config: &MonitorConfig) -> Duration {
        config.interval().max(self.options.interval_floor)
    }

    /// Validates `config`, runs one cycle immediately and then one per interval.
    ///
    /// A rejected configuration leaves the scheduler idle and the log untouched.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, config: MonitorConfig) -> Result<(), ConfigurationError> {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Refusing to start monitoring.");
            return Err(e);
        }

        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        if run.is_some() {
            return Err(ConfigurationError::AlreadyRunning);
        }

        let interval = self.effective_interval(&config);
        if interval > config.interval() {
            warn!(
                configured_minutes = config.interval_minutes,
                floor_seconds = self.options.interval_floor.as_secs(),
                "Check interval raised to the configured floor."
            );
        }
        info!(interval_seconds = interval.as_secs(), "Starting monitoring service.");

        self.context.stats.set_status(ServiceStatus::Running);
        self.context.log.success("Monitoring service started.");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let driver = tokio::spawn(drive(
            self.context.clone(),
            Arc::clone(&self.cycle_gate),
            Arc::new(config),
            interval,
            shutdown_rx,
        ));
        *run = Some(ActiveRun {
            shutdown_tx,
            _driver: driver,
        });
        Ok(())
    }

    /// Disarms the timer. A cycle already in flight is left to finish.
    pub fn stop(&self) {
        // Held until the status and log are updated so a concurrent start()
        // cannot land in between.
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(active) = run.take() else {
            debug!("Stop requested while idle; nothing to do.");
            return;
        };

        if active.shutdown_tx.send(()).is_err() {
            warn!("Failed to send shutdown signal to the monitor driver; it might have already finished.");
        }
        self.context.stats.set_status(ServiceStatus::Idle);
        self.context.log.warning("Monitoring stopped by operator.");
    }

    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Runs a single cycle now, waiting for any in-flight cycle first.
    pub async fn check_once(&self, config: &MonitorConfig) -> CycleResult {
        let _guard = self.cycle_gate.lock().await;
        self.context.run(config, self.effective_interval(config)).await
    }

    /// Resolves once no cycle is in flight.
    pub async fn wait_for_cycle(&self) {
        let _guard = self.cycle_gate.lock().await;
    }

    pub fn clear_log(&self) {
        self.context.log.clear();
    }

    pub fn status(&self) -> ServiceStatus {
        self.context.stats.status()
    }

    pub fn stats(&self) -> MonitoringStats {
        self.context.stats.snapshot()
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<MonitoringStats> {
        self.context.stats.subscribe()
    }

    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.context.log.entries()
    }

    pub fn subscribe_log(&self) -> broadcast::Receiver<LogEvent> {
        self.context.log.subscribe()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.context.log
    }
}

async fn drive(
    context: CycleContext,
    cycle_gate: Arc<tokio::sync::Mutex<()>>,
    config: Arc<MonitorConfig>,
    interval: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    // The first tick completes immediately.
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    // The first cycle of a run waits out a cycle left over from a previous
    // run instead of being skipped.
    let guard = tokio::select! {
        biased;
        _ = &mut shutdown_rx => {
            info!("Monitor driver received shutdown signal.");
            return;
        }
        guard = Arc::clone(&cycle_gate).lock_owned() => guard,
    };
    spawn_cycle(context.clone(), guard, Arc::clone(&config), interval);
    ticker.reset();

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                info!("Monitor driver received shutdown signal.");
                break;
            }
            _ = ticker.tick() => {
                match Arc::clone(&cycle_gate).try_lock_owned() {
                    Ok(guard) => spawn_cycle(context.clone(), guard, Arc::clone(&config), interval),
                    Err(_) => {
                        context.log.warning("Previous check cycle still running; skipping this tick.");
                    }
                }
            }
        }
    }
    debug!("Monitor driver finished.");
}

/// Runs the cycle in its own task so a panic is contained and reported.
fn spawn_cycle(
    context: CycleContext,
    guard: OwnedMutexGuard<()>,
    config: Arc<MonitorConfig>,
    interval: Duration,
) {
    tokio::spawn(async move {
        let cycle_context = context.clone();
        let cycle = tokio::spawn(async move { cycle_context.run(&config, interval).await });
        if let Err(e) = cycle.await {
            context.log.error(format!("Check cycle aborted unexpectedly: {e}"));
            context.stats.transition(ServiceStatus::Running, ServiceStatus::Error);
        }
        drop(guard);
    });
}
