use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod telegram;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Notification rejected: {0}")]
    Rejected(String),
    #[error("Notification API returned non-success status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Who receives change alerts: a bot identity and the chat it posts into.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub bot_token: String,
    pub chat_id: String,
}

impl std::fmt::Debug for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recipient")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Delivery receipt returned by a notifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub message_id: Option<i64>,
}

/// A channel that can deliver a change alert.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &Recipient, message: &str) -> Result<Ack, NotificationError>;
}

/// Alert text for a detected change. Always names both values.
pub fn change_message(previous: &str, current: &str, page_url: &str) -> String {
    format!("Grade change detected!\nOld: {previous}\nNew: {current}\n{page_url}")
}
