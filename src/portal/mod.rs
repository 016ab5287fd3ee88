use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub mod http;

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("Portal rejected the login: {0}")]
    Rejected(String),
    #[error("Portal returned non-success status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("Session is no longer valid; portal redirected to the login page")]
    SessionExpired,
    #[error("Session was not established by this portal client")]
    ForeignSession,
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// An authenticated portal session, handed back to the client that created it.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub username: String,
    pub established_at: DateTime<Utc>,
    http: Option<HttpSession>,
}

/// Cookie-carrying client plus the login page it authenticated against.
#[derive(Debug, Clone)]
pub(crate) struct HttpSession {
    pub(crate) client: reqwest::Client,
    pub(crate) login_url: reqwest::Url,
}

impl Session {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            established_at: Utc::now(),
            http: None,
        }
    }

    pub(crate) fn with_http(username: impl Into<String>, http: HttpSession) -> Self {
        Self {
            http: Some(http),
            ..Self::new(username)
        }
    }

    pub(crate) fn http(&self) -> Option<&HttpSession> {
        self.http.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct PageContent {
    /// Final URL after redirects.
    pub url: String,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

impl PageContent {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
            fetched_at: Utc::now(),
        }
    }
}

/// Authenticates against the portal and retrieves pages on behalf of a session.
#[async_trait]
pub trait PortalClient: Send + Sync {
    async fn authenticate(
        &self,
        login_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Session, PortalError>;

    async fn fetch(&self, session: &Session, page_url: &str) -> Result<PageContent, PortalError>;
}
