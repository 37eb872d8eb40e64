//! Discord webhook channel.

use super::{ALERT_TITLE, AlertChannel, AlertEvent, ChannelError, check_response, http_client};
use async_trait::async_trait;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscordConfig {
    pub webhook_url: String,
}

impl DiscordConfig {
    pub fn is_complete(&self) -> bool {
        !self.webhook_url.is_empty()
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    embeds: [Embed<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'static str,
    description: &'a str,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

impl<'a> WebhookPayload<'a> {
    fn from_alert(alert: &'a AlertEvent) -> Self {
        Self {
            embeds: [Embed {
                title: ALERT_TITLE,
                description: &alert.message,
                color: alert.severity.color(),
                timestamp: alert.timestamp.format(&Rfc3339).ok(),
            }],
        }
    }
}

pub struct DiscordChannel {
    config: DiscordConfig,
    http_client: reqwest::Client,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            http_client: http_client(),
        }
    }
}

#[async_trait]
impl AlertChannel for DiscordChannel {
    fn name(&self) -> &'static str {
        "Discord"
    }

    async fn send(&self, alert: &AlertEvent) -> Result<(), ChannelError> {
        let response = self
            .http_client
            .post(&self.config.webhook_url)
            .json(&WebhookPayload::from_alert(alert))
            .send()
            .await?;
        check_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Severity;
    use time::macros::datetime;

    #[test]
    fn test_embed_payload() {
        let alert = AlertEvent {
            message: "❌ No reward called".to_string(),
            severity: Severity::Warning,
            timestamp: datetime!(2026-01-02 03:04:05 UTC),
        };
        let json = serde_json::to_value(WebhookPayload::from_alert(&alert)).unwrap();
        let embed = &json["embeds"][0];
        assert_eq!(embed["title"], ALERT_TITLE);
        assert_eq!(embed["description"], "❌ No reward called");
        assert_eq!(embed["color"], 0xFF0000);
        assert_eq!(embed["timestamp"], "2026-01-02T03:04:05Z");
    }

    #[test]
    fn test_severity_colors() {
        let alert = AlertEvent::new("🔄 New round 9 started.", Severity::Info);
        let json = serde_json::to_value(WebhookPayload::from_alert(&alert)).unwrap();
        assert_eq!(json["embeds"][0]["color"], 0x0099FF);
        assert_eq!(Severity::Success.color(), 0x00FF00);
    }
}
