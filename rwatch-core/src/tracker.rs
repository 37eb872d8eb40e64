//! Round/reward state machine.
//!
//! The tracker owns the [`RoundState`] and is driven by three inputs: a
//! reward call, a new round, and a periodic tick. Each input is applied to
//! completion and may yield one alert for the caller to dispatch. The
//! tracker never performs I/O itself, which keeps it deterministic under
//! test.

use crate::alerts::AlertEvent;
use crate::events::{NewRound, RewardCall};
use crate::messages::AlertTemplates;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Reward progress within the current round.
///
/// A warning can only have been sent while the reward was still missing,
/// so "called" and "warned" are never both the live state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RewardStatus {
    /// No reward seen yet and no warning sent.
    #[default]
    Pending,
    /// No reward seen; at least one warning has gone out.
    Warned,
    /// The participant called reward this round.
    Called,
}

/// What the watcher knows about the current round.
///
/// Starts empty on every process start; nothing before the first observed
/// event is assumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundState {
    current_round: u64,
    round_start: Option<Instant>,
    reward: RewardStatus,
}

impl RoundState {
    /// Last round number seen, 0 when none has been observed.
    pub fn current_round(&self) -> u64 {
        self.current_round
    }

    /// When the current round was observed to start.
    pub fn round_start(&self) -> Option<Instant> {
        self.round_start
    }

    pub fn reward_called(&self) -> bool {
        self.reward == RewardStatus::Called
    }

    pub fn warning_sent(&self) -> bool {
        self.reward == RewardStatus::Warned
    }

    pub fn reward_status(&self) -> RewardStatus {
        self.reward
    }

    /// Enter a new round. Round number, start time and reward status are
    /// replaced together.
    fn begin_round(&mut self, round: u64, now: Instant) {
        *self = Self {
            current_round: round,
            round_start: Some(now),
            reward: RewardStatus::Pending,
        };
    }
}

/// Tracker knobs. Each is independent of the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerOptions {
    /// Grace period after a round starts before a warning is due.
    pub delay: Duration,
    /// Warn on every tick past the delay instead of once per round.
    pub repeat_warnings: bool,
    pub success_alerts: bool,
    pub round_alerts: bool,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2 * 60 * 60),
            repeat_warnings: true,
            success_alerts: true,
            round_alerts: true,
        }
    }
}

/// Applies round, reward and tick inputs to a [`RoundState`].
pub struct RoundTracker {
    state: RoundState,
    options: TrackerOptions,
    templates: AlertTemplates,
}

impl RoundTracker {
    pub fn new(options: TrackerOptions, templates: AlertTemplates) -> Self {
        Self {
            state: RoundState::default(),
            options,
            templates,
        }
    }

    pub fn state(&self) -> &RoundState {
        &self.state
    }

    pub fn options(&self) -> &TrackerOptions {
        &self.options
    }

    /// The tracked participant called reward.
    ///
    /// Repeated calls within a round are idempotent. A warning already sent
    /// is not retracted; it simply stops repeating.
    pub fn on_reward(&mut self, call: &RewardCall) -> Option<AlertEvent> {
        self.state.reward = RewardStatus::Called;
        info!(
            round = self.state.current_round,
            block = call.block_number,
            tx = %call.transaction_hash,
            "Reward called"
        );

        self.options
            .success_alerts
            .then(|| self.templates.reward_called(self.state.current_round, call))
    }

    /// A new round started.
    ///
    /// The round number is taken as reported, even if it is not greater than
    /// the current one.
    pub fn on_new_round(&mut self, event: NewRound, now: Instant) -> Option<AlertEvent> {
        if self.state.current_round != 0 && event.round <= self.state.current_round {
            warn!(
                previous = self.state.current_round,
                round = event.round,
                "Round number did not increase, accepting as reported"
            );
        }
        self.state.begin_round(event.round, now);
        info!(round = event.round, "New round started");

        self.options
            .round_alerts
            .then(|| self.templates.new_round(event.round))
    }

    /// Periodic check for a missing reward.
    pub fn on_tick(&mut self, now: Instant) -> Option<AlertEvent> {
        let round_start = self.state.round_start?;
        let due = match self.state.reward {
            RewardStatus::Called => false,
            RewardStatus::Warned => self.options.repeat_warnings,
            RewardStatus::Pending => true,
        };
        if !due || now.saturating_duration_since(round_start) < self.options.delay {
            return None;
        }

        self.state.reward = RewardStatus::Warned;
        let alert = self
            .templates
            .reward_missing(self.state.current_round, self.options.delay);
        warn!(round = self.state.current_round, "{}", alert.message);
        Some(alert)
    }
}
