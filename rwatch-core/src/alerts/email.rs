//! SMTP email channel.

use super::markdown::markdown_to_html;
use super::{ALERT_TITLE, AlertChannel, AlertEvent, ChannelError};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Port used when only a host is configured.
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Port on which the server expects TLS from the first byte.
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_SMTP_PORT,
            username: String::new(),
            password: String::new(),
            from: String::new(),
            to: Vec::new(),
        }
    }
}

impl EmailConfig {
    /// Email is only attempted when every field needed to authenticate and
    /// address the message is present.
    pub fn is_complete(&self) -> bool {
        !self.host.is_empty()
            && !self.from.is_empty()
            && !self.to.is_empty()
            && !self.username.is_empty()
            && !self.password.is_empty()
    }
}

pub struct EmailChannel {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailChannel {
    pub fn new(config: EmailConfig) -> Result<Self, ChannelError> {
        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            // Upgrade with STARTTLS when the server offers it, plain otherwise.
            let tls = TlsParameters::new(config.host.clone())?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .tls(Tls::Opportunistic(tls))
        };
        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        Ok(Self { config, transport })
    }

    fn build_message(&self, alert: &AlertEvent) -> Result<Message, ChannelError> {
        let from: Mailbox = self
            .config
            .from
            .parse()
            .map_err(|e| ChannelError::EmailBuild(format!("invalid from address: {e}")))?;

        let mut builder = Message::builder()
            .from(from)
            .subject(ALERT_TITLE)
            .header(ContentType::TEXT_HTML);
        for recipient in &self.config.to {
            let to: Mailbox = recipient.parse().map_err(|e| {
                ChannelError::EmailBuild(format!("invalid recipient {recipient}: {e}"))
            })?;
            builder = builder.to(to);
        }

        builder
            .body(markdown_to_html(alert.message.trim()))
            .map_err(|e| ChannelError::EmailBuild(e.to_string()))
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "Email"
    }

    async fn send(&self, alert: &AlertEvent) -> Result<(), ChannelError> {
        let message = self.build_message(alert)?;
        self.transport.send(message).await?;
        Ok(())
    }
}
