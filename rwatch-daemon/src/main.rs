//! Livepeer Reward Watcher
//!
//! Watches one orchestrator on Arbitrum and alerts when it fails to call
//! reward within a grace period after a new round starts.

mod config;

use clap::Parser;
use config::{ConfigLoader, LoadedConfig, Overrides};
use rwatch_core::alerts::{AlertChannel, DiscordChannel, EmailChannel, TelegramChannel};
use rwatch_core::rpc::RpcDialer;
use rwatch_core::{AlertDispatcher, ConnectionManager, RewardMonitor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Livepeer Reward Watcher - alerts when an orchestrator misses its reward call
#[derive(Parser, Debug)]
#[command(name = "rwatch")]
#[command(version, about, long_about = None)]
struct Args {
    /// Orchestrator address to watch
    orchestrator: Option<String>,

    /// RPC endpoints, tried in order (websocket endpoints recommended)
    rpc: Vec<String>,

    /// Path to an optional TOML configuration file
    #[arg(short, long, env = "RWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Time after a round starts before warning (e.g. 2h)
    #[arg(long, value_parser = humantime::parse_duration)]
    delay: Option<Duration>,

    /// How often to check for a missing reward call (e.g. 1h)
    #[arg(long, value_parser = humantime::parse_duration)]
    check_interval: Option<Duration>,

    /// Repeat the warning on every check after the delay
    #[arg(long)]
    repeat: Option<bool>,

    /// Do not alert when reward is called
    #[arg(long)]
    disable_success_alerts: bool,

    /// Do not alert when a new round starts
    #[arg(long)]
    disable_round_alerts: bool,

    /// Alert on RPC subscription errors and recovery
    #[arg(long)]
    enable_rpc_alerts: bool,

    /// Give up after failing to connect for this long; 0s retries forever
    #[arg(long, value_parser = humantime::parse_duration)]
    max_retry_time: Option<Duration>,

    /// Wait between rounds of failed connection attempts
    #[arg(long, value_parser = humantime::parse_duration)]
    reconnect_backoff: Option<Duration>,

    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_bot_token: Option<String>,

    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    telegram_chat_id: Option<String>,

    #[arg(long, env = "DISCORD_WEBHOOK_URL", hide_env_values = true)]
    discord_webhook_url: Option<String>,

    #[arg(long, env = "SMTP_HOST")]
    smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT")]
    smtp_port: Option<u16>,

    #[arg(long, env = "SMTP_USER")]
    smtp_user: Option<String>,

    #[arg(long, env = "SMTP_PASS", hide_env_values = true)]
    smtp_pass: Option<String>,

    #[arg(long, env = "EMAIL_FROM")]
    email_from: Option<String>,

    /// Comma separated recipients
    #[arg(long, env = "EMAIL_TO")]
    email_to: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            orchestrator: self.orchestrator.clone(),
            endpoints: self.rpc.clone(),
            delay: self.delay,
            check_interval: self.check_interval,
            repeat: self.repeat,
            disable_success_alerts: self.disable_success_alerts,
            disable_round_alerts: self.disable_round_alerts,
            enable_rpc_alerts: self.enable_rpc_alerts,
            max_retry_time: self.max_retry_time,
            reconnect_backoff: self.reconnect_backoff,
            telegram_bot_token: self.telegram_bot_token.clone(),
            telegram_chat_id: self.telegram_chat_id.clone(),
            discord_webhook_url: self.discord_webhook_url.clone(),
            smtp_host: self.smtp_host.clone(),
            smtp_port: self.smtp_port,
            smtp_user: self.smtp_user.clone(),
            smtp_pass: self.smtp_pass.clone(),
            email_from: self.email_from.clone(),
            email_to: self.email_to.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.log_json);

    tracing::info!("Starting rwatch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(args.config.clone(), args.overrides());
    let config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let dispatcher = Arc::new(build_dispatcher(&config).map_err(|e| {
        tracing::error!("Failed to set up alert channels: {}", e);
        e
    })?);
    tracing::info!(
        channels = ?dispatcher.channel_names(),
        endpoints = ?config.endpoints,
        "Alert channels configured"
    );

    let connections = ConnectionManager::new(RpcDialer, config.endpoints, config.dial_timeout);
    let monitor = RewardMonitor::new(
        connections,
        dispatcher,
        config.participant,
        config.contracts,
        config.settings,
    )?;

    tracing::info!("Watching orchestrator {:#x}", config.participant);
    let Err(e) = monitor.run().await;
    tracing::error!("Reward watcher stopped: {}", e);
    Err(e.into())
}

/// One channel per fully configured destination.
fn build_dispatcher(config: &LoadedConfig) -> anyhow::Result<AlertDispatcher> {
    let mut channels: Vec<Box<dyn AlertChannel>> = Vec::new();
    if config.telegram.is_complete() {
        channels.push(Box::new(TelegramChannel::new(config.telegram.clone())));
    }
    if config.discord.is_complete() {
        channels.push(Box::new(DiscordChannel::new(config.discord.clone())));
    }
    if config.email.is_complete() {
        channels.push(Box::new(EmailChannel::new(config.email.clone())?));
    }
    Ok(AlertDispatcher::new(channels))
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,alloy=warn,lettre=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
