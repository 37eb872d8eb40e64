//! TOML file configuration structures.
//!
//! These structs directly map to the `rwatch.toml` file format. Every
//! section and every key is optional; anything left out falls back to the
//! command line, the environment, or the built-in default.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub watcher: WatcherConfig,
    pub rpc: RpcConfig,
    pub contracts: ContractsConfig,
    pub telegram: TelegramConfig,
    pub discord: DiscordConfig,
    pub email: EmailConfig,
}

/// Watcher configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatcherConfig {
    /// Orchestrator address to watch.
    pub orchestrator: Option<String>,
    /// Grace period after a round starts before warning (e.g. "2h").
    #[serde(with = "humantime_serde")]
    pub delay: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub check_interval: Option<Duration>,
    /// Warn on every check after the delay instead of once per round.
    pub repeat: Option<bool>,
    pub success_alerts: Option<bool>,
    pub round_alerts: Option<bool>,
    /// Alert on subscription faults and recovery.
    pub rpc_alerts: Option<bool>,
    /// Give up after this long without a live connection; "0s" never gives up.
    #[serde(with = "humantime_serde")]
    pub max_retry_time: Option<Duration>,
}

/// RPC configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RpcConfig {
    /// Endpoints, tried in order.
    pub endpoints: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub reconnect_backoff: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub resubscribe_backoff: Option<Duration>,
    /// Bound on dial + liveness probe per endpoint.
    #[serde(with = "humantime_serde")]
    pub dial_timeout: Option<Duration>,
}

/// Contract address overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContractsConfig {
    pub bonding_manager: Option<String>,
    pub rounds_manager: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscordConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub from: Option<String>,
    pub to: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[watcher]
orchestrator = "0x847791cBF03be716A7fe9Dc8c9Affe17Bd49Ae5e"
delay = "90m"
check_interval = "15m"
repeat = false
round_alerts = false
rpc_alerts = true
max_retry_time = "1h"

[rpc]
endpoints = ["wss://arb1.example/ws", "wss://backup.example/ws"]
reconnect_backoff = "10s"
dial_timeout = "3s"

[contracts]
rounds_manager = "0xdd6f56DcC28D3F5f27084381fE8Df634985cc39f"

[telegram]
bot_token = "123:abc"
chat_id = "-1001"

[email]
smtp_host = "smtp.example.com"
smtp_port = 465
from = "watcher@example.com"
to = ["ops@example.com"]
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.watcher.delay, Some(Duration::from_secs(90 * 60)));
        assert_eq!(config.watcher.check_interval, Some(Duration::from_secs(900)));
        assert_eq!(config.watcher.repeat, Some(false));
        assert_eq!(config.watcher.success_alerts, None);
        assert_eq!(config.rpc.endpoints.len(), 2);
        assert_eq!(config.rpc.resubscribe_backoff, None);
        assert_eq!(config.rpc.dial_timeout, Some(Duration::from_secs(3)));
        assert!(config.contracts.bonding_manager.is_none());
        assert_eq!(config.telegram.chat_id.as_deref(), Some("-1001"));
        assert!(config.discord.webhook_url.is_none());
        assert_eq!(config.email.smtp_port, Some(465));
        assert_eq!(config.email.to, vec!["ops@example.com"]);
    }

    #[test]
    fn test_empty_config_parsing() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.watcher.orchestrator.is_none());
        assert!(config.rpc.endpoints.is_empty());
        assert!(config.email.to.is_empty());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result: Result<FileConfig, _> = toml::from_str("[watcher]\ndelai = \"2h\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        let result: Result<FileConfig, _> = toml::from_str("[watcher]\ndelay = \"soon\"\n");
        assert!(result.is_err());
    }
}
