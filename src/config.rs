use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use crate::error::ConfigurationError;
use crate::monitor::SchedulerOptions;
use crate::notifications::Recipient;
use crate::portal::http::HttpPortalOptions;

pub const DEFAULT_INTERVAL_MINUTES: u64 = 15;
pub const DEFAULT_SELECTOR: &str = "//div[@class='final-score']/span";

/// Everything one monitoring run needs. Held immutably while the run is active.
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct MonitorConfig {
    pub portal_url: String,
    pub grade_page_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_selector")]
    pub selector: String,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

fn default_selector() -> String {
    DEFAULT_SELECTOR.to_string()
}

fn default_interval_minutes() -> u64 {
    DEFAULT_INTERVAL_MINUTES
}

impl MonitorConfig {
    pub fn new(portal_url: impl Into<String>, grade_page_url: impl Into<String>) -> Self {
        Self {
            portal_url: portal_url.into(),
            grade_page_url: grade_page_url.into(),
            username: String::new(),
            password: String::new(),
            selector: default_selector(),
            bot_token: String::new(),
            chat_id: String::new(),
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }

    /// The alert recipient, present only when both identity fields are filled in.
    pub fn recipient(&self) -> Option<Recipient> {
        let bot_token = self.bot_token.trim();
        let chat_id = self.chat_id.trim();
        if bot_token.is_empty() || chat_id.is_empty() {
            return None;
        }
        Some(Recipient {
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    /// Checks everything a run depends on. Credentials come first so an
    /// operator sees the most common mistake before URL typos.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.username.trim().is_empty() {
            return Err(ConfigurationError::MissingUsername);
        }
        if self.password.is_empty() {
            return Err(ConfigurationError::MissingPassword);
        }
        if self.interval_minutes < 1 {
            return Err(ConfigurationError::InvalidInterval(self.interval_minutes));
        }
        if self.selector.trim().is_empty() {
            return Err(ConfigurationError::EmptySelector);
        }
        validate_url("portal_url", &self.portal_url)?;
        validate_url("grade_page_url", &self.grade_page_url)?;
        Ok(())
    }

    /// Applies `GRADEWATCH_*` overrides. `lookup` is `std::env::var` in the binary.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut String); 4] = [
            ("GRADEWATCH_USERNAME", &mut self.username),
            ("GRADEWATCH_PASSWORD", &mut self.password),
            ("GRADEWATCH_BOT_TOKEN", &mut self.bot_token),
            ("GRADEWATCH_CHAT_ID", &mut self.chat_id),
        ];
        for (key, field) in fields {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *field = value;
            }
        }
    }
}

impl fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("portal_url", &self.portal_url)
            .field("grade_page_url", &self.grade_page_url)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("selector", &self.selector)
            .field("bot_token", &redacted(&self.bot_token))
            .field("chat_id", &self.chat_id)
            .field("interval_minutes", &self.interval_minutes)
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "<redacted>" }
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigurationError> {
    let url = reqwest::Url::parse(value).map_err(|e| ConfigurationError::InvalidUrl {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigurationError::InvalidUrl {
            field,
            value: value.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// `[scheduler]` table of the config file.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SchedulerSettings {
    pub interval_floor_seconds: u64,
    pub stage_timeout_seconds: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        let options = SchedulerOptions::default();
        Self {
            interval_floor_seconds: options.interval_floor.as_secs(),
            stage_timeout_seconds: options.stage_timeout.as_secs(),
        }
    }
}

impl From<&SchedulerSettings> for SchedulerOptions {
    fn from(settings: &SchedulerSettings) -> Self {
        SchedulerOptions {
            interval_floor: Duration::from_secs(settings.interval_floor_seconds),
            stage_timeout: Duration::from_secs(settings.stage_timeout_seconds.max(1)),
            ..SchedulerOptions::default()
        }
    }
}

/// Layout of `gradewatch.toml`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileConfig {
    #[serde(flatten)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub http: HttpPortalOptions,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

pub fn parse_config(config_str: &str) -> Result<FileConfig, ConfigurationError> {
    Ok(toml::from_str(config_str)?)
}

pub fn load_config(config_path_str: &str) -> Result<FileConfig, ConfigurationError> {
    let config_path = Path::new(config_path_str);
    // Canonicalize only for the log line; a missing file is reported by the read below.
    let absolute_path_display = config_path
        .canonicalize()
        .unwrap_or_else(|_| config_path.to_path_buf());
    info!(path = ?absolute_path_display, "Attempting to load config.");

    let config_str = fs::read_to_string(config_path).map_err(|e| {
        error!(path = %config_path_str, error = %e, "Failed to read config file.");
        ConfigurationError::Read {
            path: config_path.to_path_buf(),
            source: e,
        }
    })?;

    let file_config = parse_config(&config_str).map_err(|e| {
        error!(path = %config_path_str, error = %e, "Failed to parse config file.");
        e
    })?;

    info!(config = ?file_config.monitor, "Loaded config successfully.");
    Ok(file_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn valid_config() -> MonitorConfig {
        let mut config = MonitorConfig::new(
            "https://university.portal.edu/login",
            "https://university.portal.edu/student/grades",
        );
        config.username = "student".to_string();
        config.password = "hunter2".to_string();
        config
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_credentials() {
        let mut config = valid_config();
        config.username = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingUsername)
        ));

        let mut config = valid_config();
        config.password.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingPassword)
        ));
    }

    #[test]
    fn test_validate_rejects_bad_interval_and_urls() {
        let mut config = valid_config();
        config.interval_minutes = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidInterval(0))
        ));

        let mut config = valid_config();
        config.grade_page_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidUrl { field: "grade_page_url", .. })
        ));

        let mut config = valid_config();
        config.portal_url = "ftp://university.portal.edu/login".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidUrl { field: "portal_url", .. })
        ));
    }

    #[test]
    fn test_recipient_requires_both_fields() {
        let mut config = valid_config();
        assert!(config.recipient().is_none());
        config.bot_token = "123:abc".to_string();
        assert!(config.recipient().is_none());
        config.chat_id = " 42 ".to_string();
        let recipient = config.recipient().unwrap();
        assert_eq!(recipient.chat_id, "42");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = valid_config();
        config.bot_token = "123:abc".to_string();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("123:abc"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_apply_overrides() {
        let env: HashMap<&str, &str> = [
            ("GRADEWATCH_PASSWORD", "from-env"),
            ("GRADEWATCH_CHAT_ID", ""),
        ]
        .into_iter()
        .collect();
        let mut config = valid_config();
        config.chat_id = "7".to_string();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.password, "from-env");
        assert_eq!(config.username, "student");
        // Empty values never blank out the file's value.
        assert_eq!(config.chat_id, "7");
    }

    #[test]
    fn test_parse_config_defaults() {
        let file_config = parse_config(
            r#"
portal_url = "https://university.portal.edu/login"
grade_page_url = "https://university.portal.edu/student/grades"
username = "student"
"#,
        )
        .unwrap();
        assert_eq!(file_config.monitor.interval_minutes, DEFAULT_INTERVAL_MINUTES);
        assert_eq!(file_config.monitor.selector, DEFAULT_SELECTOR);
        assert!(file_config.monitor.password.is_empty());
        assert_eq!(file_config.http.username_field, "username");
        assert_eq!(file_config.scheduler.interval_floor_seconds, 60);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
portal_url = "https://university.portal.edu/login"
grade_page_url = "https://university.portal.edu/student/grades"
username = "student"
password = "hunter2"
interval_minutes = 5

[http]
password_field = "pass"

[scheduler]
stage_timeout_seconds = 10
"#
        )
        .unwrap();

        let file_config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(file_config.monitor.interval_minutes, 5);
        assert_eq!(file_config.http.password_field, "pass");
        let options = SchedulerOptions::from(&file_config.scheduler);
        assert_eq!(options.stage_timeout, Duration::from_secs(10));
        assert!(file_config.monitor.validate().is_ok());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/definitely/not/here/gradewatch.toml");
        assert!(matches!(result, Err(ConfigurationError::Read { .. })));
    }
}
