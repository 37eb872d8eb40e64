//! RewardMonitor.
//!
//! The RewardMonitor is responsible for:
//! - Obtaining a live connection from the `ConnectionManager`, with a fixed
//!   backoff between failed attempts
//! - Opening the reward/new-round `SubscriptionPair` on it
//! - Running one monitoring epoch: a single loop that waits on both feeds
//!   and the check ticker and feeds each input to the `RoundTracker`
//! - Tearing the epoch down on any feed fault and starting the next one
//! - Giving up, with a final alert, once the retry window is exhausted
//!
//! Epochs are strictly sequential. Round state lives in the tracker and
//! carries over from one epoch to the next; connections and subscriptions
//! do not.

use crate::alerts::{AlertDispatcher, AlertEvent};
use crate::connection::{ChainConnection, ConnectionManager, Dialer, RetryWindow};
use crate::endpoint::Endpoint;
use crate::events::{ContractAddresses, FeedKind, NewRound, RewardCall};
use crate::messages::AlertTemplates;
use crate::subscription::{FeedEvent, FeedFault, LogFilter, SubscriptionPair};
use crate::tracker::{RoundTracker, TrackerOptions};
use alloy::primitives::Address;
use kanau::processor::Processor;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Errors that end the monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// No live connection for longer than the retry window
    #[error("failed to connect to any RPC for {0:?}, giving up")]
    GaveUp(Duration),

    /// The check interval must be positive
    #[error("check interval must be greater than zero")]
    InvalidCheckInterval,
}

/// Monitoring knobs.
#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub tracker: TrackerOptions,
    /// How often the tracker is asked whether a warning is due.
    pub check_interval: Duration,
    /// Alert on feed faults and on recovery.
    pub fault_alerts: bool,
    /// Give up after this long without a live epoch. Zero retries forever.
    pub max_retry_window: Duration,
    /// Pause after every endpoint failed.
    pub reconnect_backoff: Duration,
    /// Pause after a subscription failure or a finished epoch.
    pub resubscribe_backoff: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tracker: TrackerOptions::default(),
            check_interval: Duration::from_secs(60 * 60),
            fault_alerts: false,
            max_retry_window: Duration::from_secs(30 * 60),
            reconnect_backoff: Duration::from_secs(30),
            resubscribe_backoff: Duration::from_secs(5),
        }
    }
}

/// Watches one participant's reward calls across reconnects.
pub struct RewardMonitor<D> {
    connections: ConnectionManager<D>,
    dispatcher: Arc<AlertDispatcher>,
    tracker: RoundTracker,
    templates: AlertTemplates,
    settings: MonitorSettings,
    reward_filter: LogFilter,
    round_filter: LogFilter,
    retry: RetryWindow,
    announced: bool,
}

impl<D: Dialer> RewardMonitor<D> {
    pub fn new(
        connections: ConnectionManager<D>,
        dispatcher: Arc<AlertDispatcher>,
        participant: Address,
        contracts: ContractAddresses,
        settings: MonitorSettings,
    ) -> Result<Self, MonitorError> {
        if settings.check_interval.is_zero() {
            return Err(MonitorError::InvalidCheckInterval);
        }
        let templates = AlertTemplates::new(participant);
        Ok(Self {
            connections,
            dispatcher,
            tracker: RoundTracker::new(settings.tracker, templates.clone()),
            templates,
            reward_filter: LogFilter::reward(&contracts, participant),
            round_filter: LogFilter::new_round(&contracts),
            retry: RetryWindow::new(settings.max_retry_window),
            settings,
            announced: false,
        })
    }

    /// Run until the retry window is exhausted.
    ///
    /// The final alert is awaited before returning, so the caller can exit
    /// right away.
    pub async fn run(mut self) -> Result<Infallible, MonitorError> {
        loop {
            if self.retry.is_exhausted() {
                return Err(self.give_up().await);
            }

            let (connection, endpoint) = match self.connections.connect().await {
                Ok(live) => live,
                Err(e) => {
                    warn!(
                        error = %e,
                        backoff_secs = self.settings.reconnect_backoff.as_secs(),
                        "RPC connection failed"
                    );
                    tokio::time::sleep(self.settings.reconnect_backoff).await;
                    continue;
                }
            };

            let pair =
                match SubscriptionPair::open(&connection, &self.reward_filter, &self.round_filter)
                    .await
                {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(endpoint = %endpoint, error = %e, "Subscription failed");
                        connection.close().await;
                        tokio::time::sleep(self.settings.resubscribe_backoff).await;
                        continue;
                    }
                };

            self.retry.reset();
            let (feed, fault) = self.run_epoch(&endpoint, pair).await;
            info!(
                endpoint = %endpoint,
                %feed,
                %fault,
                "Monitoring epoch ended, reconnecting"
            );

            connection.close().await;
            tokio::time::sleep(self.settings.resubscribe_backoff).await;
            self.retry.reset();
        }
    }

    /// Process inputs until a feed faults. Both feeds are closed on return.
    async fn run_epoch(
        &mut self,
        endpoint: &Endpoint,
        mut pair: SubscriptionPair,
    ) -> (FeedKind, FeedFault) {
        info!(endpoint = %endpoint, "Monitoring started");
        if !self.announced {
            self.announced = true;
            self.notify(Some(self.templates.monitoring_started()));
        } else if self.settings.fault_alerts {
            self.notify(Some(self.templates.connection_restored(endpoint)));
        }

        let period = self.settings.check_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let (feed, fault) = loop {
            tokio::select! {
                event = pair.next() => match event {
                    FeedEvent::Reward(log) => {
                        let alert = self.tracker.on_reward(&RewardCall::from(&log));
                        self.notify(alert);
                    }
                    FeedEvent::NewRound(log) => {
                        let alert = self.tracker.on_new_round(NewRound::from(&log), Instant::now());
                        self.notify(alert);
                    }
                    FeedEvent::Fault { feed, fault } => break (feed, fault),
                },
                _ = ticker.tick() => {
                    let alert = self.tracker.on_tick(Instant::now());
                    self.notify(alert);
                }
            }
        };

        error!(endpoint = %endpoint, %feed, %fault, "Subscription error");
        if self.settings.fault_alerts {
            self.notify(Some(self.templates.feed_fault(feed, &fault.reason)));
        }
        pair.close();
        (feed, fault)
    }

    /// Fire-and-forget delivery; the dispatcher logs the outcome.
    fn notify(&self, alert: Option<AlertEvent>) {
        if let Some(alert) = alert {
            drop(self.dispatcher.dispatch(alert));
        }
    }

    async fn give_up(&self) -> MonitorError {
        let window = self.retry.max();
        let alert = self.templates.giving_up(window);
        error!(window_secs = window.as_secs(), "{}", alert.message);

        let Ok(report) = self.dispatcher.process(alert).await;
        if !report.is_success() {
            warn!(%report, "Final alert not fully delivered");
        }
        MonitorError::GaveUp(window)
    }
}
