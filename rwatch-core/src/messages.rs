//! Alert texts.
//!
//! Messages use the lightweight markdown link syntax understood by every
//! channel (rendered natively by Telegram and Discord, converted to HTML
//! for email).

use crate::alerts::{AlertEvent, Severity};
use crate::endpoint::Endpoint;
use crate::events::{FeedKind, RewardCall};
use alloy::primitives::Address;
use std::time::Duration;

const ACCOUNT_EXPLORER: &str = "https://explorer.livepeer.org/accounts";
const TX_EXPLORER: &str = "https://arbiscan.io/tx";

/// Builds the alert for every watcher transition, for one participant.
#[derive(Debug, Clone)]
pub struct AlertTemplates {
    participant: Address,
}

impl AlertTemplates {
    pub fn new(participant: Address) -> Self {
        Self { participant }
    }

    pub fn participant(&self) -> Address {
        self.participant
    }

    /// `[0xabc…](explorer link)` with the address lowercased.
    fn participant_link(&self) -> String {
        let address = format!("{:#x}", self.participant);
        format!("[{address}]({ACCOUNT_EXPLORER}/{address}/delegating)")
    }

    pub fn monitoring_started(&self) -> AlertEvent {
        AlertEvent::new(
            format!(
                "🟢 Livepeer Reward watcher monitoring orchestrator {} on Arbitrum.",
                self.participant_link()
            ),
            Severity::Info,
        )
    }

    pub fn connection_restored(&self, endpoint: &Endpoint) -> AlertEvent {
        AlertEvent::new(
            format!(
                "✅ RPC connection restored to {}, resuming monitoring.",
                endpoint.masked()
            ),
            Severity::Success,
        )
    }

    pub fn reward_called(&self, round: u64, call: &RewardCall) -> AlertEvent {
        let tx = format!("{:#x}", call.transaction_hash);
        AlertEvent::new(
            format!(
                "✅ Reward called for {} in round {} at block {}, [tx {}]({}/{}).",
                self.participant_link(),
                round,
                call.block_number,
                tx,
                TX_EXPLORER,
                tx
            ),
            Severity::Success,
        )
    }

    pub fn new_round(&self, round: u64) -> AlertEvent {
        AlertEvent::new(format!("🔄 New round {round} started."), Severity::Info)
    }

    pub fn reward_missing(&self, round: u64, delay: Duration) -> AlertEvent {
        AlertEvent::new(
            format!(
                "❌ No reward called for {} in round {} after {}.",
                self.participant_link(),
                round,
                humantime::format_duration(delay)
            ),
            Severity::Warning,
        )
    }

    pub fn feed_fault(&self, feed: FeedKind, reason: &str) -> AlertEvent {
        AlertEvent::new(
            format!("⚠️ {feed} subscription error: {reason}"),
            Severity::Error,
        )
    }

    pub fn giving_up(&self, window: Duration) -> AlertEvent {
        AlertEvent::new(
            format!(
                "❌ Failed to connect to any RPC after {}, giving up and shutting down reward watcher!",
                humantime::format_duration(window)
            ),
            Severity::Fatal,
        )
    }
}
