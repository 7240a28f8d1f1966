use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use signal_generation::{AlertThread, Notifier, TradeSignal};

pub const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

fn message_id(response: SendResponse) -> Result<i64> {
    if !response.ok {
        return Err(anyhow!(
            "Telegram rejected message: {}",
            response.description.unwrap_or_else(|| "no description".to_string())
        ));
    }
    response
        .result
        .map(|m| m.message_id)
        .ok_or_else(|| anyhow!("Telegram response has no message id"))
}

/// Posts each signal as a headline message with threaded replies
pub struct TelegramNotifier {
    api_url: String,
    bot_token: String,
    chat_id: String,
    client: Client,
}

impl TelegramNotifier {
    pub fn new(
        api_url: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            api_url: api_url.into(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    /// Send one Markdown message, returning its id
    pub async fn send_message(&self, text: &str, reply_to: Option<i64>) -> Result<i64> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
            reply_to_message_id: reply_to,
        };

        let response: SendResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Telegram request failed")?
            .json()
            .await
            .context("Failed to decode Telegram response")?;

        message_id(response)
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn publish(&self, signal: &TradeSignal) -> Result<()> {
        let thread = AlertThread::from_signal(signal);

        let head = self.send_message(&thread.headline, None).await?;

        // replies are best effort once the headline is out
        for reply in thread.replies() {
            if let Err(e) = self.send_message(reply, Some(head)).await {
                warn!(signal_id = %signal.id, "Telegram reply failed: {:#}", e);
            }
        }

        info!(signal_id = %signal.id, message_id = head, "📨 Signal posted to Telegram");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let body = SendMessage {
            chat_id: "-100123",
            text: "hello",
            parse_mode: "Markdown",
            reply_to_message_id: Some(42),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["chat_id"], "-100123");
        assert_eq!(json["parse_mode"], "Markdown");
        assert_eq!(json["reply_to_message_id"], 42);

        let headline = SendMessage {
            reply_to_message_id: None,
            ..body
        };
        let json = serde_json::to_value(&headline).unwrap();
        assert!(json.get("reply_to_message_id").is_none());
    }

    #[test]
    fn test_message_id_from_response() {
        let ok: SendResponse =
            serde_json::from_str(r#"{"ok": true, "result": {"message_id": 777, "chat": {"id": 1}}}"#).unwrap();
        assert_eq!(message_id(ok).unwrap(), 777);

        let rejected: SendResponse =
            serde_json::from_str(r#"{"ok": false, "error_code": 400, "description": "Bad Request: chat not found"}"#)
                .unwrap();
        let err = message_id(rejected).unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }
}
