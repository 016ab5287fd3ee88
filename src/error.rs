use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::extract::ExtractError;
use crate::notifications::NotificationError;
use crate::portal::PortalError;

/// Rejection of a configuration, either while loading it or when a run is started.
///
/// Never produced by a running service; a started run only ever sees [`CycleError`].
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Username is required")]
    MissingUsername,
    #[error("Password is required")]
    MissingPassword,
    #[error("Selector expression is empty")]
    EmptySelector,
    #[error("Invalid check interval: {0} minutes. Must be at least 1.")]
    InvalidInterval(u64),
    #[error("Invalid URL for {field} ({value}): {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("Monitoring service is already running")]
    AlreadyRunning,
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// The pipeline stage a cycle was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Precondition,
    Authenticate,
    Fetch,
    Extract,
    Notify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Precondition => "Precondition check",
            Stage::Authenticate => "Authentication",
            Stage::Fetch => "Grade page fetch",
            Stage::Extract => "Value extraction",
            Stage::Notify => "Notification",
        };
        f.write_str(name)
    }
}

/// Recoverable failure of a single check cycle.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Credentials missing. Aborting.")]
    CredentialsMissing,
    #[error("{0}")]
    AuthenticationFailed(#[source] PortalError),
    #[error("{0}")]
    FetchFailed(#[source] PortalError),
    #[error("{0}")]
    ExtractionFailed(#[source] ExtractError),
    #[error("{0}")]
    NotificationFailed(#[source] NotificationError),
    #[error("timed out after {}s", after.as_secs())]
    Timeout { stage: Stage, after: Duration },
}

impl CycleError {
    pub fn stage(&self) -> Stage {
        match self {
            CycleError::CredentialsMissing => Stage::Precondition,
            CycleError::AuthenticationFailed(_) => Stage::Authenticate,
            CycleError::FetchFailed(_) => Stage::Fetch,
            CycleError::ExtractionFailed(_) => Stage::Extract,
            CycleError::NotificationFailed(_) => Stage::Notify,
            CycleError::Timeout { stage, .. } => *stage,
        }
    }
}
