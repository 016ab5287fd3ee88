//! One check cycle: authenticate, fetch, extract, compare, notify, commit.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::event_log::EventLog;
use super::stats::{ServiceStatus, StatsTracker};
use crate::config::MonitorConfig;
use crate::error::{CycleError, Stage};
use crate::extract::Extractor;
use crate::notifications::{Ack, Notifier, change_message};
use crate::portal::PortalClient;

/// The external systems a cycle talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub portal: Arc<dyn PortalClient>,
    pub extractor: Arc<dyn Extractor>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    pub fn new(
        portal: Arc<dyn PortalClient>,
        extractor: Arc<dyn Extractor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            portal,
            extractor,
            notifier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// No change, so nothing to send.
    NotRequired,
    /// Changed, but no recipient is configured.
    Skipped,
    Delivered(Ack),
    Failed(String),
}

#[derive(Debug)]
pub struct CycleResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Monotonic duration of the whole cycle.
    pub latency: Duration,
    pub outcome: Result<String, CycleError>,
    pub previous_value: Option<String>,
    pub changed: bool,
    pub notification: NotificationOutcome,
}

impl CycleResult {
    pub fn value(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }

    pub fn error(&self) -> Option<&CycleError> {
        self.outcome.as_ref().err()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Everything a cycle needs, cheap to clone into a spawned task.
#[derive(Clone)]
pub(crate) struct CycleContext {
    pub(crate) collaborators: Collaborators,
    pub(crate) log: EventLog,
    pub(crate) stats: StatsTracker,
    pub(crate) stage_timeout: Duration,
}

impl CycleContext {
    pub(crate) async fn run(&self, config: &MonitorConfig, interval: Duration) -> CycleResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let cycle_number = self.stats.snapshot().checks_performed + 1;
        self.log.info(format!("Initiating check cycle #{cycle_number}..."));

        let previous_value = self.stats.current_value();
        let outcome = self.fetch_value(config).await;

        let (changed, notification) = match &outcome {
            Ok(value) => self.compare_and_notify(config, previous_value.as_deref(), value).await,
            Err(e) => {
                self.log.error(format!("{} failed: {e}", e.stage()));
                (false, NotificationOutcome::NotRequired)
            }
        };

        let result = CycleResult {
            started_at,
            finished_at: Utc::now(),
            latency: clock.elapsed(),
            outcome,
            previous_value,
            changed,
            notification,
        };
        self.stats.commit(&result);
        self.stats.transition(ServiceStatus::Error, ServiceStatus::Running);

        self.log.info(format!(
            "Cycle complete. Sleeping for {}.",
            describe_interval(interval)
        ));
        result
    }

    /// Stages 1-4. The first failure ends the cycle.
    async fn fetch_value(&self, config: &MonitorConfig) -> Result<String, CycleError> {
        if !config.has_credentials() {
            return Err(CycleError::CredentialsMissing);
        }
        let portal = &self.collaborators.portal;

        self.log.info(format!("Navigating to {}", config.portal_url));
        let session = self
            .within(
                Stage::Authenticate,
                portal.authenticate(&config.portal_url, &config.username, &config.password),
                CycleError::AuthenticationFailed,
            )
            .await?;
        self.log.success("Session authenticated successfully.");

        self.log.info(format!("Accessing grade page: {}", config.grade_page_url));
        let page = self
            .within(
                Stage::Fetch,
                portal.fetch(&session, &config.grade_page_url),
                CycleError::FetchFailed,
            )
            .await?;

        self.log.info(format!("Locating element by selector: {}", config.selector));
        self.within(
            Stage::Extract,
            self.collaborators.extractor.extract(&page, &config.selector),
            CycleError::ExtractionFailed,
        )
        .await
    }

    async fn compare_and_notify(
        &self,
        config: &MonitorConfig,
        previous: Option<&str>,
        value: &str,
    ) -> (bool, NotificationOutcome) {
        match previous {
            None => {
                self.log.info(format!("Initial value recorded: \"{value}\"."));
                (false, NotificationOutcome::NotRequired)
            }
            Some(previous) if previous == value => {
                self.log.info(format!(
                    "Value extracted: \"{value}\". No change detected."
                ));
                (false, NotificationOutcome::NotRequired)
            }
            Some(previous) => {
                self.log.warning(format!(
                    "GRADE CHANGE DETECTED! Old: {previous} -> New: {value}"
                ));
                (true, self.notify(config, previous, value).await)
            }
        }
    }

    /// A failed send is logged but leaves the cycle successful.
    async fn notify(&self, config: &MonitorConfig, previous: &str, value: &str) -> NotificationOutcome {
        let Some(recipient) = config.recipient() else {
            self.log.warning("Notifier not configured. Skipping alert.");
            return NotificationOutcome::Skipped;
        };

        self.log.info(format!(
            "Sending notification to chat {}...",
            recipient.chat_id
        ));
        let message = change_message(previous, value, &config.grade_page_url);
        let sent = self
            .within(
                Stage::Notify,
                self.collaborators.notifier.send(&recipient, &message),
                CycleError::NotificationFailed,
            )
            .await;

        match sent {
            Ok(ack) => {
                self.log.success("Notification sent successfully.");
                NotificationOutcome::Delivered(ack)
            }
            Err(e) => {
                self.log.error(format!("{} failed: {e}", e.stage()));
                NotificationOutcome::Failed(e.to_string())
            }
        }
    }

    async fn within<T, E, F>(
        &self,
        stage: Stage,
        call: F,
        wrap: impl FnOnce(E) -> CycleError,
    ) -> Result<T, CycleError>
    where
        F: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.stage_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(wrap(e)),
            Err(_) => Err(CycleError::Timeout {
                stage,
                after: self.stage_timeout,
            }),
        }
    }
}

pub(crate) fn describe_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    match (secs / 60, secs % 60) {
        (1, 0) => "1 minute".to_string(),
        (minutes, 0) if minutes > 0 => format!("{minutes} minutes"),
        _ => format!("{secs} seconds"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_interval() {
        assert_eq!(describe_interval(Duration::from_secs(60)), "1 minute");
        assert_eq!(describe_interval(Duration::from_secs(15 * 60)), "15 minutes");
        assert_eq!(describe_interval(Duration::from_secs(90)), "90 seconds");
        assert_eq!(describe_interval(Duration::from_secs(0)), "0 seconds");
    }
}
