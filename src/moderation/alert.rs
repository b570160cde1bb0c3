// Moderator alerts: formatting and delivery.
//
// Delivery is fire-and-forget from the pipeline's point of view: a failed
// alert is logged and counted, never retried inline and never allowed to
// fail message processing.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::error::AlertError;
use crate::output::truncate_chars;
use crate::scoring::Verdict;

/// Default Telegram Bot API base URL.
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Somewhere alerts can be delivered.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, destination_id: &str, text: &str) -> Result<(), AlertError>;
}

/// Build the moderator alert for a flagged message.
///
/// `original_text` is the message as received, not the truncated text that
/// was scored.
pub fn format_alert(author: &str, verdict: &Verdict, original_text: &str) -> String {
    format!(
        "[ALERT] Toxic message detected\n\
         User: @{author}\n\
         Score: {:.2}  ({})\n\
         Text: {original_text}",
        verdict.primary_score,
        verdict.reasons_label(),
    )
}

/// Delivers alerts to a Telegram chat through the Bot API.
pub struct TelegramAlertSink {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramAlertSink {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            timeout,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl AlertSink for TelegramAlertSink {
    async fn send_alert(&self, destination_id: &str, text: &str) -> Result<(), AlertError> {
        let text = truncate_chars(text, TELEGRAM_MAX_MESSAGE_LENGTH - 3);
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .timeout(self.timeout)
            .json(&SendMessage {
                chat_id: destination_id,
                text: &text,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AlertError::Timeout(self.timeout)
                } else {
                    AlertError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AlertError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(chat_id = destination_id, "Alert sent to moderators");
        Ok(())
    }
}
