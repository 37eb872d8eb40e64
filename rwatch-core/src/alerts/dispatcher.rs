//! AlertDispatcher.
//!
//! The AlertDispatcher is responsible for:
//! - Holding the set of configured channels
//! - Delivering an `AlertEvent` to all of them concurrently
//! - Collecting per-channel outcomes into a `DeliveryReport`
//! - Offering fire-and-forget delivery for the monitoring loop, where the
//!   report is only logged

use super::{AlertChannel, AlertEvent, ChannelOutcome, DeliveryReport};
use futures_util::future::join_all;
use kanau::processor::Processor;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Fans alerts out to every configured channel.
#[derive(Default)]
pub struct AlertDispatcher {
    channels: Vec<Box<dyn AlertChannel>>,
}

impl AlertDispatcher {
    pub fn new(channels: Vec<Box<dyn AlertChannel>>) -> Self {
        Self { channels }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Deliver to every channel and report each outcome.
    ///
    /// Channels are attempted concurrently; one failing or hanging channel
    /// does not prevent the others from being tried. With no channels this
    /// is a no-op returning an empty report.
    pub async fn deliver(&self, alert: &AlertEvent) -> DeliveryReport {
        let sends = self.channels.iter().map(|channel| async move {
            let result = channel.send(alert).await;
            if let Err(e) = &result {
                warn!(channel = channel.name(), error = %e, "Alert delivery failed");
            }
            ChannelOutcome {
                channel: channel.name(),
                result,
            }
        });
        DeliveryReport {
            outcomes: join_all(sends).await,
        }
    }

    /// Deliver in a background task. The report is logged, never retried.
    pub fn dispatch(self: &Arc<Self>, alert: AlertEvent) -> JoinHandle<DeliveryReport> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let report = dispatcher.deliver(&alert).await;
            if report.is_success() {
                debug!(severity = ?alert.severity, %report, "Alert delivered");
            } else {
                warn!(severity = ?alert.severity, %report, "Alert delivery incomplete");
            }
            report
        })
    }
}

impl Processor<AlertEvent> for AlertDispatcher {
    type Output = DeliveryReport;
    type Error = Infallible;

    async fn process(&self, alert: AlertEvent) -> Result<DeliveryReport, Infallible> {
        Ok(self.deliver(&alert).await)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::alerts::{ChannelError, Severity};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Channel double that records what it was asked to send.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingChannel {
        pub(crate) name: &'static str,
        pub(crate) fail: bool,
        pub(crate) sent: Arc<Mutex<Vec<AlertEvent>>>,
    }

    impl RecordingChannel {
        pub(crate) fn named(name: &'static str) -> Self {
            Self {
                name,
                ..Default::default()
            }
        }

        pub(crate) fn failing(name: &'static str) -> Self {
            Self {
                name,
                fail: true,
                ..Default::default()
            }
        }

        pub(crate) fn messages(&self) -> Vec<(Severity, String)> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|a| (a.severity, a.message.clone()))
                .collect()
        }
    }

    #[async_trait]
    impl AlertChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn send(&self, alert: &AlertEvent) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(alert.clone());
            if self.fail {
                Err(ChannelError::DeliveryFailed {
                    status: 502,
                    body: "bad gateway".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported_per_channel() {
        let telegram = RecordingChannel::failing("Telegram");
        let discord = RecordingChannel::named("Discord");
        let email = RecordingChannel::failing("Email");
        let dispatcher = AlertDispatcher::new(vec![
            Box::new(telegram.clone()),
            Box::new(discord.clone()),
            Box::new(email.clone()),
        ]);

        let report = dispatcher
            .deliver(&AlertEvent::new("hello", Severity::Info))
            .await;

        assert_eq!(report.succeeded(), vec!["Discord"]);
        let failed: Vec<&str> = report.failed().iter().map(|(n, _)| *n).collect();
        assert_eq!(failed, vec!["Telegram", "Email"]);
        assert!(!report.is_success());
        assert!(report.any_delivered());
        assert_eq!(report.to_string(), "alert failed for: Telegram, Email");

        // Every channel was attempted despite the first one failing.
        assert_eq!(telegram.messages().len(), 1);
        assert_eq!(discord.messages().len(), 1);
        assert_eq!(email.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_no_channels_is_a_no_op() {
        let dispatcher = AlertDispatcher::default();
        let report = dispatcher
            .process(AlertEvent::new("hello", Severity::Info))
            .await
            .unwrap();
        assert!(report.outcomes.is_empty());
        assert!(report.is_success());
        assert!(dispatcher.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_runs_in_background() {
        let discord = RecordingChannel::named("Discord");
        let dispatcher = Arc::new(AlertDispatcher::new(vec![Box::new(discord.clone())]));

        let report = dispatcher
            .dispatch(AlertEvent::new("🔄 New round 1 started.", Severity::Info))
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(
            discord.messages(),
            vec![(Severity::Info, "🔄 New round 1 started.".to_string())]
        );
        assert_eq!(dispatcher.channel_names(), vec!["Discord"]);
    }
}
