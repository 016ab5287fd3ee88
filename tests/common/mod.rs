#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gradewatch::config::MonitorConfig;
use gradewatch::extract::HtmlExtractor;
use gradewatch::monitor::{Collaborators, LogLevel, Scheduler, SchedulerOptions};
use gradewatch::notifications::{Ack, NotificationError, Notifier, Recipient};
use gradewatch::portal::{PageContent, PortalClient, PortalError, Session};

pub const PORTAL_URL: &str = "https://university.portal.edu/login";
pub const GRADE_PAGE_URL: &str = "https://university.portal.edu/student/grades";

pub fn valid_config() -> MonitorConfig {
    let mut config = MonitorConfig::new(PORTAL_URL, GRADE_PAGE_URL);
    config.username = "student".to_string();
    config.password = "hunter2".to_string();
    config.bot_token = "123456:test-token".to_string();
    config.chat_id = "42".to_string();
    config.interval_minutes = 1;
    config
}

/// A grade page the default selector can read `value` from.
pub fn grade_page(value: &str) -> String {
    format!(
        r#"<html><body>
<div class="student">Jane Doe</div>
<div class="final-score"><span>{value}</span></div>
</body></html>"#
    )
}

/// One scripted response of [`ScriptedPortal::fetch`].
#[derive(Debug, Clone)]
pub enum Page {
    Grade(&'static str),
    /// A page that loads but has no grade element.
    NoValue,
    Status(u16),
}

/// Portal double that serves pages from a script. Once the script runs out
/// the last grade page is served again.
#[derive(Default)]
pub struct ScriptedPortal {
    pages: Mutex<VecDeque<Page>>,
    last_grade: Mutex<Option<&'static str>>,
    auth_delay: Option<Duration>,
    panic_on_auth_call: Option<usize>,
    reject_auth_call: Option<usize>,
    pub auth_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl ScriptedPortal {
    pub fn serving(pages: impl IntoIterator<Item = Page>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn grades(values: &[&'static str]) -> Self {
        Self::serving(values.iter().copied().map(Page::Grade))
    }

    pub fn with_auth_delay(mut self, delay: Duration) -> Self {
        self.auth_delay = Some(delay);
        self
    }

    /// Panics inside `authenticate` on the given 1-based call.
    pub fn panicking_on_auth_call(mut self, call: usize) -> Self {
        self.panic_on_auth_call = Some(call);
        self
    }

    /// Rejects the login on the given 1-based call.
    pub fn rejecting_auth_call(mut self, call: usize) -> Self {
        self.reject_auth_call = Some(call);
        self
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortalClient for ScriptedPortal {
    async fn authenticate(
        &self,
        _login_url: &str,
        username: &str,
        _password: &str,
    ) -> Result<Session, PortalError> {
        let call = self.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on_auth_call == Some(call) {
            panic!("portal double exploded on call {call}");
        }
        if self.reject_auth_call == Some(call) {
            return Err(PortalError::Rejected("invalid username or password".to_string()));
        }
        if let Some(delay) = self.auth_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Session::new(username))
    }

    async fn fetch(&self, _session: &Session, page_url: &str) -> Result<PageContent, PortalError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.pages.lock().unwrap().pop_front();
        let mut last_grade = self.last_grade.lock().unwrap();
        match next {
            Some(Page::Grade(value)) => {
                *last_grade = Some(value);
                Ok(PageContent::new(page_url, grade_page(value)))
            }
            Some(Page::NoValue) => Ok(PageContent::new(
                page_url,
                "<html><body><p>Grades are not published yet.</p></body></html>",
            )),
            Some(Page::Status(status)) => Err(PortalError::Status {
                status,
                url: page_url.to_string(),
            }),
            None => {
                let value = last_grade.unwrap_or("N/A");
                Ok(PageContent::new(page_url, grade_page(value)))
            }
        }
    }
}

/// Notifier double that records every message it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, _recipient: &Recipient, message: &str) -> Result<Ack, NotificationError> {
        self.messages.lock().unwrap().push(message.to_string());
        if self.fail {
            return Err(NotificationError::Rejected("chat not found".to_string()));
        }
        Ok(Ack {
            message_id: Some(self.calls() as i64),
        })
    }
}

pub fn build_scheduler(
    portal: &Arc<ScriptedPortal>,
    notifier: &Arc<RecordingNotifier>,
    options: SchedulerOptions,
) -> Scheduler {
    let collaborators = Collaborators::new(
        portal.clone(),
        Arc::new(HtmlExtractor),
        notifier.clone(),
    );
    Scheduler::new(collaborators, options)
}

pub fn count_messages(scheduler: &Scheduler, level: LogLevel, needle: &str) -> usize {
    scheduler
        .log_entries()
        .iter()
        .filter(|e| e.level == level && e.message.contains(needle))
        .count()
}
