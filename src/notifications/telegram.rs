use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Ack, NotificationError, Notifier, Recipient};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Pushes alerts through the Telegram Bot API.
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new() -> Result<Self, NotificationError> {
        Self::with_api_base(TELEGRAM_API_BASE)
    }

    /// Points the notifier at another Bot API host (a local stub, a proxy).
    pub fn with_api_base(api_base: impl Into<String>) -> Result<Self, NotificationError> {
        let client = Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn send_message_url(&self, bot_token: &str) -> String {
        format!("{}/bot{bot_token}/sendMessage", self.api_base)
    }
}

/// Escapes text for Telegram MarkdownV2.
/// Characters to escape: _ * [ ] ( ) ~ ` > # + - = | { } . !
fn escape_markdown_v2(text: &str) -> String {
    let mut escaped_text = String::with_capacity(text.len());
    for char_to_escape in text.chars() {
        match char_to_escape {
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '='
            | '|' | '{' | '}' | '.' | '!' | '\\' => {
                escaped_text.push('\\');
                escaped_text.push(char_to_escape);
            }
            _ => {
                escaped_text.push(char_to_escape);
            }
        }
    }
    escaped_text
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Deserialize, Debug)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
    result: Option<TelegramSentMessage>,
}

#[derive(Deserialize, Debug)]
struct TelegramSentMessage {
    message_id: i64,
}

impl TelegramResponse {
    fn into_ack(self) -> Result<Ack, NotificationError> {
        if !self.ok {
            return Err(NotificationError::Rejected(
                self.description
                    .unwrap_or_else(|| "Telegram API reported failure".to_string()),
            ));
        }
        Ok(Ack {
            message_id: self.result.map(|m| m.message_id),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, recipient: &Recipient, message: &str) -> Result<Ack, NotificationError> {
        let escaped_message = escape_markdown_v2(message);
        let payload = TelegramMessage {
            chat_id: &recipient.chat_id,
            text: &escaped_message,
            parse_mode: "MarkdownV2",
        };

        let response = self
            .client
            .post(self.send_message_url(&recipient.bot_token))
            .json(&payload)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(NotificationError::Status {
                status: status.as_u16(),
                body: error_body,
            });
        }

        response.json::<TelegramResponse>().await?.into_ack()
    }
}
