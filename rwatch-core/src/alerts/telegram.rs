//! Telegram bot channel.

use super::{AlertChannel, AlertEvent, ChannelError, check_response, http_client};
use async_trait::async_trait;
use serde::Serialize;

/// Bot credentials and the chat to post into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramConfig {
    pub fn is_complete(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

pub struct TelegramChannel {
    config: TelegramConfig,
    api_base: String,
    http_client: reqwest::Client,
}

impl TelegramChannel {
    const API_BASE: &str = "https://api.telegram.org";

    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            api_base: Self::API_BASE.to_string(),
            http_client: http_client(),
        }
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.config.bot_token)
    }
}

#[async_trait]
impl AlertChannel for TelegramChannel {
    fn name(&self) -> &'static str {
        "Telegram"
    }

    async fn send(&self, alert: &AlertEvent) -> Result<(), ChannelError> {
        let payload = SendMessage {
            chat_id: &self.config.chat_id,
            text: &alert.message,
            parse_mode: "Markdown",
        };
        let response = self
            .http_client
            .post(self.send_message_url())
            .json(&payload)
            .send()
            .await?;
        check_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_complete() {
        assert!(!TelegramConfig::default().is_complete());
        assert!(
            !TelegramConfig {
                bot_token: "123:abc".into(),
                chat_id: String::new(),
            }
            .is_complete()
        );
        assert!(
            TelegramConfig {
                bot_token: "123:abc".into(),
                chat_id: "-100200".into(),
            }
            .is_complete()
        );
    }

    #[test]
    fn test_payload_shape() {
        let payload = SendMessage {
            chat_id: "42",
            text: "🔄 New round 5 started.",
            parse_mode: "Markdown",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["chat_id"], "42");
        assert_eq!(json["text"], "🔄 New round 5 started.");
        assert_eq!(json["parse_mode"], "Markdown");
    }

    #[test]
    fn test_send_message_url() {
        let channel = TelegramChannel::new(TelegramConfig {
            bot_token: "123:abc".into(),
            chat_id: "42".into(),
        });
        assert_eq!(
            channel.send_message_url(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }
}
