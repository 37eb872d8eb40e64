//! Configuration module for rwatch.
//!
//! Handles loading configuration from an optional TOML file, command-line
//! flags and environment variables, and validates the result before the
//! watcher starts.

pub mod file;

use crate::config::file::FileConfig;
use alloy::primitives::Address;
use rwatch_core::alerts::{DiscordConfig, EmailConfig, TelegramConfig, email::DEFAULT_SMTP_PORT};
use rwatch_core::connection::DEFAULT_ATTEMPT_TIMEOUT;
use rwatch_core::events::ContractAddresses;
use rwatch_core::{Endpoint, MonitorSettings, TrackerOptions};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Public Arbitrum One endpoint used when none is configured.
pub const DEFAULT_RPC: &str = "https://arb1.arbitrum.io/rpc";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid {field} address: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Values given on the command line or through the environment.
///
/// `None` (or an empty string) defers to the config file, then to the
/// built-in default.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub orchestrator: Option<String>,
    pub endpoints: Vec<String>,
    pub delay: Option<Duration>,
    pub check_interval: Option<Duration>,
    pub repeat: Option<bool>,
    pub disable_success_alerts: bool,
    pub disable_round_alerts: bool,
    pub enable_rpc_alerts: bool,
    pub max_retry_time: Option<Duration>,
    pub reconnect_backoff: Option<Duration>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub email_from: Option<String>,
    /// Comma separated recipient list.
    pub email_to: Option<String>,
}

/// Fully resolved watcher configuration.
#[derive(Debug)]
pub struct LoadedConfig {
    pub participant: Address,
    pub endpoints: Vec<Endpoint>,
    pub contracts: ContractAddresses,
    pub settings: MonitorSettings,
    pub dial_timeout: Duration,
    pub telegram: TelegramConfig,
    pub discord: DiscordConfig,
    pub email: EmailConfig,
}

impl LoadedConfig {
    /// At least one alert channel has everything it needs.
    pub fn has_channel(&self) -> bool {
        self.telegram.is_complete() || self.discord.is_complete() || self.email.is_complete()
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    overrides: Overrides,
}

impl ConfigLoader {
    pub fn new(config_path: Option<PathBuf>, overrides: Overrides) -> Self {
        Self {
            config_path,
            overrides,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file, if one was given
    /// 2. Apply command-line and environment overrides
    /// 3. Validate the result
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let file_config = match &self.config_path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                tracing::info!("Configuration loaded from {:?}", path);
                toml::from_str(&content)?
            }
            None => FileConfig::default(),
        };

        let loaded = self.merge(file_config)?;
        self.validate(&loaded)?;
        Ok(loaded)
    }

    fn merge(&self, file: FileConfig) -> Result<LoadedConfig, ConfigError> {
        let o = &self.overrides;
        let defaults = MonitorSettings::default();
        let tracker_defaults = TrackerOptions::default();

        let orchestrator = pick(&o.orchestrator, file.watcher.orchestrator.clone()).ok_or_else(|| {
            ConfigError::ValidationError("orchestrator address is required".to_string())
        })?;
        let participant = parse_address("orchestrator", &orchestrator)?;

        let endpoints = if !o.endpoints.is_empty() {
            o.endpoints.clone()
        } else if !file.rpc.endpoints.is_empty() {
            file.rpc.endpoints
        } else {
            tracing::info!("No RPC endpoint given, using the public default");
            vec![DEFAULT_RPC.to_string()]
        };
        let endpoints: Vec<Endpoint> = endpoints.into_iter().map(Endpoint::new).collect();

        let contracts = ContractAddresses {
            bonding_manager: match file.contracts.bonding_manager {
                Some(value) => parse_address("bonding manager", &value)?,
                None => ContractAddresses::ARBITRUM_BONDING_MANAGER,
            },
            rounds_manager: match file.contracts.rounds_manager {
                Some(value) => parse_address("rounds manager", &value)?,
                None => ContractAddresses::ARBITRUM_ROUNDS_MANAGER,
            },
        };

        let watcher = &file.watcher;
        let tracker = TrackerOptions {
            delay: o.delay.or(watcher.delay).unwrap_or(tracker_defaults.delay),
            repeat_warnings: o
                .repeat
                .or(watcher.repeat)
                .unwrap_or(tracker_defaults.repeat_warnings),
            success_alerts: !o.disable_success_alerts
                && watcher.success_alerts.unwrap_or(tracker_defaults.success_alerts),
            round_alerts: !o.disable_round_alerts
                && watcher.round_alerts.unwrap_or(tracker_defaults.round_alerts),
        };
        let settings = MonitorSettings {
            tracker,
            check_interval: o
                .check_interval
                .or(watcher.check_interval)
                .unwrap_or(defaults.check_interval),
            fault_alerts: o.enable_rpc_alerts || watcher.rpc_alerts.unwrap_or(defaults.fault_alerts),
            max_retry_window: o
                .max_retry_time
                .or(watcher.max_retry_time)
                .unwrap_or(defaults.max_retry_window),
            reconnect_backoff: o
                .reconnect_backoff
                .or(file.rpc.reconnect_backoff)
                .unwrap_or(defaults.reconnect_backoff),
            resubscribe_backoff: file
                .rpc
                .resubscribe_backoff
                .unwrap_or(defaults.resubscribe_backoff),
        };

        let telegram = TelegramConfig {
            bot_token: pick(&o.telegram_bot_token, file.telegram.bot_token).unwrap_or_default(),
            chat_id: pick(&o.telegram_chat_id, file.telegram.chat_id).unwrap_or_default(),
        };
        let discord = DiscordConfig {
            webhook_url: pick(&o.discord_webhook_url, file.discord.webhook_url)
                .unwrap_or_default(),
        };
        let email = EmailConfig {
            host: pick(&o.smtp_host, file.email.smtp_host).unwrap_or_default(),
            port: o.smtp_port.or(file.email.smtp_port).unwrap_or(DEFAULT_SMTP_PORT),
            username: pick(&o.smtp_user, file.email.smtp_user).unwrap_or_default(),
            password: pick(&o.smtp_pass, file.email.smtp_pass).unwrap_or_default(),
            from: pick(&o.email_from, file.email.from).unwrap_or_default(),
            to: match o.email_to.as_deref() {
                Some(list) if !list.trim().is_empty() => split_list(list),
                _ => file
                    .email
                    .to
                    .iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
        };

        Ok(LoadedConfig {
            participant,
            endpoints,
            contracts,
            settings,
            dial_timeout: file
                .rpc
                .dial_timeout
                .unwrap_or(DEFAULT_ATTEMPT_TIMEOUT),
            telegram,
            discord,
            email,
        })
    }

    fn validate(&self, config: &LoadedConfig) -> Result<(), ConfigError> {
        if config.settings.check_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "check interval must be greater than zero".to_string(),
            ));
        }

        warn_if_partial("Telegram", &config.telegram.bot_token, config.telegram.is_complete());
        warn_if_partial("Email", &config.email.host, config.email.is_complete());
        if !config.has_channel() {
            return Err(ConfigError::ValidationError(
                "no alert channel configured (Telegram, Discord or Email)".to_string(),
            ));
        }

        for endpoint in &config.endpoints {
            let raw = endpoint.as_str();
            if !(raw.starts_with("ws://") || raw.starts_with("wss://")) {
                tracing::warn!(
                    endpoint = %endpoint,
                    "Endpoint is not a websocket; log subscriptions may be unsupported"
                );
            }
        }
        Ok(())
    }
}

/// First non-blank value, command line before file.
fn pick(cli: &Option<String>, file: Option<String>) -> Option<String> {
    cli.clone()
        .into_iter()
        .chain(file)
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, ConfigError> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|_| ConfigError::InvalidAddress {
            field,
            value: value.to_string(),
        })
}

/// Split a comma-separated list, dropping blank entries.
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn warn_if_partial(channel: &str, key: &str, complete: bool) {
    if !key.is_empty() && !complete {
        tracing::warn!("{} is partially configured and will be disabled", channel);
    }
}
