//! Alert delivery.
//!
//! An [`AlertEvent`] is fanned out by the [`AlertDispatcher`] to every
//! configured [`AlertChannel`]:
//!
//! - `TelegramChannel`: bot API `sendMessage`, markdown passed through
//! - `DiscordChannel`: webhook embed, severity mapped to the embed color
//! - `EmailChannel`: SMTP, markdown links rendered to HTML
//!
//! Channels are attempted independently. Delivery never fails as a whole;
//! the per-channel outcome is collected into a [`DeliveryReport`].

pub mod discord;
pub mod dispatcher;
pub mod email;
pub mod markdown;
pub mod telegram;

pub use discord::{DiscordChannel, DiscordConfig};
pub use dispatcher::AlertDispatcher;
pub use email::{EmailChannel, EmailConfig};
pub use telegram::{TelegramChannel, TelegramConfig};

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

/// Title used by channels that support one (embed title, email subject).
pub const ALERT_TITLE: &str = "Livepeer Reward Watcher Alert";

/// How an alert should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Reward called, connection restored.
    Success,
    /// New round, monitoring started.
    Info,
    /// Reward not called within the grace period.
    Warning,
    /// Feed fault.
    Error,
    /// The watcher is giving up.
    Fatal,
}

impl Severity {
    /// RGB color for channels that render one.
    pub fn color(self) -> u32 {
        match self {
            Severity::Success => 0x00FF00,
            Severity::Info => 0x0099FF,
            Severity::Warning | Severity::Error | Severity::Fatal => 0xFF0000,
        }
    }
}

/// A message to deliver to every configured channel.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    /// Message text with lightweight markdown (`[text](url)` links).
    pub message: String,
    pub severity: Severity,
    pub timestamp: OffsetDateTime,
}

impl AlertEvent {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Errors a single channel can report.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Remote API answered with a non-success status
    #[error("delivery failed with status {status}: {body}")]
    DeliveryFailed { status: u16, body: String },

    /// Email message could not be built (bad address, bad header)
    #[error("email build error: {0}")]
    EmailBuild(String),

    /// SMTP transport error
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// A destination alerts can be delivered to.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Channel name used in logs and delivery reports.
    fn name(&self) -> &'static str;

    /// Deliver one alert.
    async fn send(&self, alert: &AlertEvent) -> Result<(), ChannelError>;
}

/// Result of delivering one alert to one channel.
#[derive(Debug)]
pub struct ChannelOutcome {
    pub channel: &'static str,
    pub result: Result<(), ChannelError>,
}

/// Per-channel results of one delivery.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub outcomes: Vec<ChannelOutcome>,
}

impl DeliveryReport {
    /// Channels that accepted the alert.
    pub fn succeeded(&self) -> Vec<&'static str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.channel)
            .collect()
    }

    /// Channels that failed, with their errors.
    pub fn failed(&self) -> Vec<(&'static str, &ChannelError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.channel, e)))
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// At least one channel received the alert, or nothing was configured.
    pub fn any_delivered(&self) -> bool {
        self.outcomes.is_empty() || self.outcomes.iter().any(|o| o.result.is_ok())
    }
}

impl std::fmt::Display for DeliveryReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let failed = self.failed();
        if failed.is_empty() {
            return write!(f, "delivered to {} channel(s)", self.outcomes.len());
        }
        let names: Vec<&str> = failed.iter().map(|(name, _)| *name).collect();
        write!(f, "alert failed for: {}", names.join(", "))
    }
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Turn a non-2xx response into [`ChannelError::DeliveryFailed`].
pub(crate) async fn check_response(response: reqwest::Response) -> Result<(), ChannelError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::DeliveryFailed {
            status: status.as_u16(),
            body,
        })
    }
}
