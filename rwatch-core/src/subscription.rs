//! Live log feeds and the reward/new-round subscription pair.
//!
//! A [`LogFeed`] is the consumer side of one subscription: a stream of
//! [`ChainLog`]s plus a fault signal that fires once when the feed becomes
//! unusable. The [`SubscriptionPair`] opens the two feeds the watcher needs
//! and treats a fault on either as fatal for both.

use crate::connection::ChainConnection;
use crate::events::{
    ChainLog, ContractAddresses, EventSchema, FeedKind, NEW_ROUND_EVENT, REWARD_EVENT,
    address_topic,
};
use alloy::primitives::{Address, B256};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Buffer size for a feed's log channel.
pub const FEED_BUFFER: usize = 256;

/// Errors that can occur while opening subscriptions.
#[derive(Debug, Error)]
pub enum SubscribeError {
    /// The node rejected or failed the subscription request
    #[error("RPC error: {0}")]
    Rpc(String),

    /// One of the pair's feeds could not be opened
    #[error("{feed} subscription failed: {reason}")]
    Open { feed: FeedKind, reason: String },
}

/// Which logs a subscription should deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub feed: FeedKind,
    pub address: Address,
    pub event: EventSchema,
    /// Required value of the first indexed argument, if any.
    pub topic1: Option<B256>,
}

impl LogFilter {
    /// Reward calls made by `participant`.
    pub fn reward(contracts: &ContractAddresses, participant: Address) -> Self {
        Self {
            feed: FeedKind::Reward,
            address: contracts.bonding_manager,
            event: REWARD_EVENT,
            topic1: Some(address_topic(participant)),
        }
    }

    /// Every new round.
    pub fn new_round(contracts: &ContractAddresses) -> Self {
        Self {
            feed: FeedKind::NewRound,
            address: contracts.rounds_manager,
            event: NEW_ROUND_EVENT,
            topic1: None,
        }
    }

    /// The equivalent `eth_subscribe("logs")` filter.
    pub fn to_rpc_filter(&self) -> alloy::rpc::types::Filter {
        let filter = alloy::rpc::types::Filter::new()
            .address(self.address)
            .event_signature(self.event.topic());
        match self.topic1 {
            Some(topic) => filter.topic1(topic),
            None => filter,
        }
    }
}

/// Why a feed stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFault {
    pub reason: String,
}

impl FeedFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn closed() -> Self {
        Self::new("subscription closed")
    }
}

impl std::fmt::Display for FeedFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Producer side of a [`LogFeed`].
pub struct FeedSender {
    logs: mpsc::Sender<ChainLog>,
    fault: oneshot::Sender<FeedFault>,
}

impl FeedSender {
    /// Forward one log. Returns `false` once the consumer is gone.
    pub async fn send(&self, log: ChainLog) -> bool {
        self.logs.send(log).await.is_ok()
    }

    /// Signal the fault. Consumes the sender, so it can only fire once.
    pub fn fail(self, fault: FeedFault) {
        let _ = self.fault.send(fault);
    }

    /// The consumer has dropped the feed.
    pub fn is_closed(&self) -> bool {
        self.logs.is_closed()
    }
}

/// Create a connected (producer, consumer) pair for one subscription.
pub fn log_feed() -> (FeedSender, LogFeed) {
    let (logs_tx, logs_rx) = mpsc::channel(FEED_BUFFER);
    let (fault_tx, fault_rx) = oneshot::channel();
    (
        FeedSender {
            logs: logs_tx,
            fault: fault_tx,
        },
        LogFeed {
            logs: logs_rx,
            fault: fault_rx,
            fired: None,
            task: None,
        },
    )
}

/// Consumer side of one subscription.
///
/// If the producer goes away without reporting a fault, that is reported
/// as a fault too.
pub struct LogFeed {
    logs: mpsc::Receiver<ChainLog>,
    fault: oneshot::Receiver<FeedFault>,
    fired: Option<FeedFault>,
    task: Option<JoinHandle<()>>,
}

impl LogFeed {
    /// Tie the task that feeds this subscription to the feed's lifetime.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// Next log, or the fault once the feed is unusable.
    ///
    /// Logs already queued ahead of the fault are delivered first. Cancel
    /// safe, so it can be used as a `select!` branch.
    pub async fn next(&mut self) -> Result<ChainLog, FeedFault> {
        if let Some(fault) = &self.fired {
            return Err(fault.clone());
        }
        let fault = tokio::select! {
            biased;
            Some(log) = self.logs.recv() => return Ok(log),
            fault = &mut self.fault => fault.unwrap_or_else(|_| FeedFault::closed()),
        };
        self.fired = Some(fault.clone());
        Err(fault)
    }

    /// Stop the producer and release the subscription.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.logs.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for LogFeed {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Input produced by a [`SubscriptionPair`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Reward(ChainLog),
    NewRound(ChainLog),
    /// One feed failed; the pair is dead.
    Fault { feed: FeedKind, fault: FeedFault },
}

/// The reward and new-round feeds of one monitoring epoch.
pub struct SubscriptionPair {
    reward: LogFeed,
    new_round: LogFeed,
}

impl SubscriptionPair {
    /// Open both feeds, reward first.
    ///
    /// If the second feed cannot be opened the first is closed before the
    /// error is returned. The connection stays with the caller either way.
    pub async fn open<C: ChainConnection>(
        connection: &C,
        reward_filter: &LogFilter,
        round_filter: &LogFilter,
    ) -> Result<Self, SubscribeError> {
        let reward = connection
            .subscribe(reward_filter)
            .await
            .map_err(|e| SubscribeError::Open {
                feed: FeedKind::Reward,
                reason: e.to_string(),
            })?;
        debug!(event = reward_filter.event.name, "Subscribed");

        let new_round = match connection.subscribe(round_filter).await {
            Ok(feed) => feed,
            Err(e) => {
                reward.close();
                return Err(SubscribeError::Open {
                    feed: FeedKind::NewRound,
                    reason: e.to_string(),
                });
            }
        };
        debug!(event = round_filter.event.name, "Subscribed");

        info!("Subscribed to reward and new round events");
        Ok(Self { reward, new_round })
    }

    /// Wait for the next input from either feed.
    pub async fn next(&mut self) -> FeedEvent {
        tokio::select! {
            result = self.reward.next() => match result {
                Ok(log) => FeedEvent::Reward(log),
                Err(fault) => FeedEvent::Fault { feed: FeedKind::Reward, fault },
            },
            result = self.new_round.next() => match result {
                Ok(log) => FeedEvent::NewRound(log),
                Err(fault) => FeedEvent::Fault { feed: FeedKind::NewRound, fault },
            },
        }
    }

    /// Tear down both feeds together.
    pub fn close(self) {
        self.reward.close();
        self.new_round.close();
        debug!("Unsubscribed from both feeds");
    }
}

/// Drive a [`FeedSender`] from a stream of logs until it ends.
///
/// The end of the stream is reported as a fault.
pub async fn forward_stream<S>(sender: FeedSender, mut stream: S, feed: FeedKind)
where
    S: futures_util::Stream<Item = ChainLog> + Unpin,
{
    use futures_util::StreamExt;

    while let Some(log) = stream.next().await {
        if !sender.send(log).await {
            debug!(%feed, "Feed consumer dropped, stopping forwarder");
            return;
        }
    }
    warn!(%feed, "Subscription stream ended");
    sender.fail(FeedFault::new("subscription stream ended"));
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::connection::ConnectError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Connection double whose subscriptions are driven by the test.
    #[derive(Default)]
    pub(crate) struct ScriptedConnection {
        pub(crate) fail_on: Option<FeedKind>,
        pub(crate) senders: Mutex<Vec<(FeedKind, FeedSender)>>,
        pub(crate) live_tasks: Arc<AtomicUsize>,
    }

    impl ScriptedConnection {
        pub(crate) fn take_sender(&self, feed: FeedKind) -> Option<FeedSender> {
            let mut senders = self.senders.lock().unwrap();
            let index = senders.iter().position(|(kind, _)| *kind == feed)?;
            Some(senders.remove(index).1)
        }
    }

    #[async_trait]
    impl ChainConnection for ScriptedConnection {
        async fn block_number(&self) -> Result<u64, ConnectError> {
            Ok(1)
        }

        async fn subscribe(&self, filter: &LogFilter) -> Result<LogFeed, SubscribeError> {
            let kind = filter.feed;
            if self.fail_on == Some(kind) {
                return Err(SubscribeError::Rpc("filter not found".into()));
            }
            let (sender, feed) = log_feed();
            self.senders.lock().unwrap().push((kind, sender));

            // A stand-in producer task, to observe teardown.
            let live = self.live_tasks.clone();
            live.fetch_add(1, Ordering::SeqCst);
            let task = tokio::spawn(async move {
                struct Guard(Arc<AtomicUsize>);
                impl Drop for Guard {
                    fn drop(&mut self) {
                        self.0.fetch_sub(1, Ordering::SeqCst);
                    }
                }
                let _guard = Guard(live);
                std::future::pending::<()>().await;
            });
            Ok(feed.with_task(task))
        }

        async fn close(self) {}
    }

    /// Let aborted tasks be dropped by the runtime.
    pub(crate) async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn filters() -> (LogFilter, LogFilter) {
        let contracts = ContractAddresses::default();
        (
            LogFilter::reward(&contracts, Address::repeat_byte(0xab)),
            LogFilter::new_round(&contracts),
        )
    }

    fn log(block: u64) -> ChainLog {
        ChainLog {
            block_number: Some(block),
            ..Default::default()
        }
    }

    #[test]
    fn test_reward_filter_is_scoped_to_participant() {
        let (reward, round) = filters();
        assert_eq!(reward.address, ContractAddresses::ARBITRUM_BONDING_MANAGER);
        assert_eq!(
            reward.topic1,
            Some(address_topic(Address::repeat_byte(0xab)))
        );
        assert_eq!(round.address, ContractAddresses::ARBITRUM_ROUNDS_MANAGER);
        assert_eq!(round.topic1, None);
    }

    #[tokio::test]
    async fn test_logs_then_fault() {
        let (sender, mut feed) = log_feed();
        assert!(sender.send(log(1)).await);
        assert!(sender.send(log(2)).await);
        sender.fail(FeedFault::new("connection reset"));

        assert_eq!(feed.next().await, Ok(log(1)));
        assert_eq!(feed.next().await, Ok(log(2)));
        assert_eq!(feed.next().await, Err(FeedFault::new("connection reset")));
        // The fault stays observable.
        assert_eq!(feed.next().await, Err(FeedFault::new("connection reset")));
    }

    #[tokio::test]
    async fn test_dropped_producer_is_a_fault() {
        let (sender, mut feed) = log_feed();
        drop(sender);
        assert_eq!(feed.next().await, Err(FeedFault::closed()));
    }

    #[tokio::test]
    async fn test_pair_labels_events_and_faults() {
        let connection = ScriptedConnection::default();
        let (reward_filter, round_filter) = filters();
        let mut pair = SubscriptionPair::open(&connection, &reward_filter, &round_filter)
            .await
            .unwrap();

        let reward = connection.take_sender(FeedKind::Reward).unwrap();
        let round = connection.take_sender(FeedKind::NewRound).unwrap();

        round.send(log(5)).await;
        assert_eq!(pair.next().await, FeedEvent::NewRound(log(5)));
        reward.send(log(6)).await;
        assert_eq!(pair.next().await, FeedEvent::Reward(log(6)));

        round.fail(FeedFault::new("EOF"));
        assert_eq!(
            pair.next().await,
            FeedEvent::Fault {
                feed: FeedKind::NewRound,
                fault: FeedFault::new("EOF"),
            }
        );

        pair.close();
        settle().await;
        assert_eq!(connection.live_tasks.load(Ordering::SeqCst), 0);
        assert!(reward.is_closed());
    }

    #[tokio::test]
    async fn test_first_subscription_failure() {
        let connection = ScriptedConnection {
            fail_on: Some(FeedKind::Reward),
            ..Default::default()
        };
        let (reward_filter, round_filter) = filters();
        let err = SubscriptionPair::open(&connection, &reward_filter, &round_filter)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SubscribeError::Open {
                feed: FeedKind::Reward,
                ..
            }
        ));
        assert!(connection.senders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_subscription_failure_tears_down_first() {
        let connection = ScriptedConnection {
            fail_on: Some(FeedKind::NewRound),
            ..Default::default()
        };
        let (reward_filter, round_filter) = filters();
        let err = SubscriptionPair::open(&connection, &reward_filter, &round_filter)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SubscribeError::Open {
                feed: FeedKind::NewRound,
                ..
            }
        ));

        settle().await;
        assert_eq!(connection.live_tasks.load(Ordering::SeqCst), 0);
        let reward = connection.take_sender(FeedKind::Reward).unwrap();
        assert!(reward.is_closed());
    }

    #[tokio::test]
    async fn test_forward_stream_reports_end_as_fault() {
        let (sender, mut feed) = log_feed();
        let stream = futures_util::stream::iter(vec![log(1), log(2)]);
        forward_stream(sender, stream, FeedKind::Reward).await;

        assert_eq!(feed.next().await, Ok(log(1)));
        assert_eq!(feed.next().await, Ok(log(2)));
        assert_eq!(
            feed.next().await,
            Err(FeedFault::new("subscription stream ended"))
        );
    }
}
