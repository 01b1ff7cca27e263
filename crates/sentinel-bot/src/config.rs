//! Application configuration.
//!
//! Loaded from TOML; every section and field has a default so a partial
//! file (or no file) still yields a runnable paper setup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use sentinel_core::ChannelName;
use sentinel_feed::{FeedConfig, RestConfig};
use sentinel_notify::{ChannelGateConfig, TelegramConfig};
use sentinel_position::MonitorConfig;

use crate::error::{AppError, AppResult};

pub const CONFIG_ENV: &str = "SENTINEL_CONFIG";
pub const ACCESS_TOKEN_ENV: &str = "SENTINEL_ACCESS_TOKEN";
pub const BOT_TOKEN_ENV: &str = "SENTINEL_BOT_TOKEN";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Orders are simulated, LIVE positions included.
    #[default]
    Paper,
    /// LIVE orders go to the broker.
    Live,
}

/// Broker REST credentials and endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_broker_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_broker_base_url() -> String {
    "https://api.dhan.co/v2".to_string()
}

fn default_broker_timeout_ms() -> u64 {
    3_000
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: default_broker_base_url(),
            client_id: String::new(),
            access_token: String::new(),
            timeout_ms: default_broker_timeout_ms(),
        }
    }
}

impl BrokerConfig {
    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.access_token.is_empty()
    }

    pub fn rest_config(&self) -> RestConfig {
        let mut config = RestConfig::new(&self.base_url, &self.client_id, &self.access_token);
        config.timeout = Duration::from_millis(self.timeout_ms);
        config
    }
}

/// WebSocket market feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketFeedConfig {
    /// Off by default; prices then come from REST polling only.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_feed_url")]
    pub url: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Cached ticks older than this are ignored.
    #[serde(default = "default_max_quote_age_ms")]
    pub max_quote_age_ms: u64,
}

fn default_feed_url() -> String {
    "wss://api-feed.dhan.co".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_max_quote_age_ms() -> u64 {
    10_000
}

impl Default for MarketFeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_feed_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_quote_age_ms: default_max_quote_age_ms(),
        }
    }
}

impl MarketFeedConfig {
    pub fn feed_config(&self, broker: &BrokerConfig) -> FeedConfig {
        FeedConfig {
            url: self.url.clone(),
            client_id: broker.client_id.clone(),
            access_token: broker.access_token.clone(),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }
}

/// Telegram Bot API delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_telegram_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_telegram_api_base() -> String {
    sentinel_notify::telegram::DEFAULT_API_BASE.to_string()
}

fn default_telegram_timeout_ms() -> u64 {
    2_000
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: default_telegram_api_base(),
            bot_token: String::new(),
            timeout_ms: default_telegram_timeout_ms(),
        }
    }
}

/// Named channels and the free-tier allowance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_free_channel")]
    pub free_channel: ChannelName,
    #[serde(default = "default_premium_channel")]
    pub premium_channel: ChannelName,
    #[serde(default = "default_free_daily_limit")]
    pub free_daily_limit: u32,
    /// Channel name → Telegram chat id.
    #[serde(default)]
    pub chats: HashMap<ChannelName, String>,
}

fn default_free_channel() -> ChannelName {
    ChannelName::from("Free Group")
}

fn default_premium_channel() -> ChannelName {
    ChannelName::from("VIP Channel")
}

fn default_free_daily_limit() -> u32 {
    1
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            free_channel: default_free_channel(),
            premium_channel: default_premium_channel(),
            free_daily_limit: default_free_daily_limit(),
            chats: HashMap::new(),
        }
    }
}

/// Backing document locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_positions_path")]
    pub positions_path: PathBuf,
    #[serde(default = "default_channel_stats_path")]
    pub channel_stats_path: PathBuf,
}

fn default_positions_path() -> PathBuf {
    PathBuf::from("data/positions.json")
}

fn default_channel_stats_path() -> PathBuf {
    PathBuf::from("data/channel_stats.json")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            positions_path: default_positions_path(),
            channel_stats_path: default_channel_stats_path(),
        }
    }
}

/// Scrip master location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentsConfig {
    #[serde(default = "default_master_path")]
    pub master_path: PathBuf,
    /// Downloaded when `master_path` does not exist.
    #[serde(default = "default_master_url")]
    pub master_url: String,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

fn default_master_path() -> PathBuf {
    PathBuf::from("data/instruments.csv")
}

fn default_master_url() -> String {
    sentinel_instruments::DEFAULT_MASTER_URL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    60
}

impl Default for InstrumentsConfig {
    fn default() -> Self {
        Self {
            master_path: default_master_path(),
            master_url: default_master_url(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

/// Metrics export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Write the Prometheus text exposition here periodically
    /// (node-exporter textfile collector). Disabled when absent.
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval_secs() -> u64 {
    15
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_file: None,
            metrics_interval_secs: default_metrics_interval_secs(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: OperatingMode,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub feed: MarketFeedConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub instruments: InstrumentsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load `path` (defaults when it does not exist), apply environment
    /// overrides and validate.
    pub fn load(path: &Path) -> AppResult<Self> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            warn!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };
        config.apply_overrides(
            std::env::var(ACCESS_TOKEN_ENV).ok(),
            std::env::var(BOT_TOKEN_ENV).ok(),
        );
        config.validate()?;
        Ok(config)
    }

    /// Replace secrets with values from the environment when set.
    pub fn apply_overrides(&mut self, access_token: Option<String>, bot_token: Option<String>) {
        if let Some(token) = access_token.filter(|t| !t.is_empty()) {
            self.broker.access_token = token;
        }
        if let Some(token) = bot_token.filter(|t| !t.is_empty()) {
            self.telegram.bot_token = token;
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        let durations = [
            ("monitor.interval_ms", self.monitor.interval_ms),
            ("monitor.price_timeout_ms", self.monitor.price_timeout_ms),
            ("broker.timeout_ms", self.broker.timeout_ms),
            ("feed.reconnect_delay_ms", self.feed.reconnect_delay_ms),
            ("feed.max_quote_age_ms", self.feed.max_quote_age_ms),
            ("telegram.timeout_ms", self.telegram.timeout_ms),
            (
                "instruments.download_timeout_secs",
                self.instruments.download_timeout_secs,
            ),
            ("telemetry.metrics_interval_secs", self.telemetry.metrics_interval_secs),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, value)| *value == 0) {
            return Err(AppError::Config(format!("{name} must be greater than zero")));
        }

        if self.channels.free_channel == self.channels.premium_channel {
            return Err(AppError::Config(
                "channels.free_channel and channels.premium_channel must differ".to_string(),
            ));
        }
        if self.telegram.enabled && !self.channels.chats.contains_key(&self.channels.premium_channel) {
            return Err(AppError::Config(format!(
                "premium channel '{}' has no entry in channels.chats",
                self.channels.premium_channel
            )));
        }
        if self.mode == OperatingMode::Live && !self.broker.has_credentials() {
            return Err(AppError::Config(
                "live mode requires broker.client_id and broker.access_token".to_string(),
            ));
        }
        Ok(())
    }

    pub fn gate_config(&self) -> ChannelGateConfig {
        ChannelGateConfig {
            free_channel: self.channels.free_channel.clone(),
            premium_channel: self.channels.premium_channel.clone(),
            free_daily_limit: self.channels.free_daily_limit,
        }
    }

    pub fn telegram_config(&self) -> TelegramConfig {
        let mut config = TelegramConfig::new(&self.telegram.bot_token, self.channels.chats.clone());
        config.api_base = self.telegram.api_base.clone();
        config.timeout = Duration::from_millis(self.telegram.timeout_ms);
        config
    }

    pub fn max_quote_age(&self) -> Duration {
        Duration::from_millis(self.feed.max_quote_age_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_position::FallbackPolicy;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_is_valid_paper_setup() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.mode, OperatingMode::Paper);
        assert_eq!(config.monitor.interval_ms, 1000);
        assert_eq!(config.channels.free_daily_limit, 1);
        assert!(!config.feed.enabled);
        assert_eq!(
            config.instruments.master_path,
            PathBuf::from("data/instruments.csv")
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            mode = "live"

            [broker]
            client_id = "1100"
            access_token = "secret"

            [monitor]
            interval_ms = 2000
            fallback = "skip"

            [telegram]
            enabled = true
            bot_token = "123:abc"

            [channels]
            free_daily_limit = 2

            [channels.chats]
            "Free Group" = "-1001111111"
            "VIP Channel" = "-1002222222"

            [instruments]
            master_path = "/srv/sentinel/instruments.csv"
        "#;
        let config = AppConfig::from_toml(toml).unwrap();
        assert_eq!(
            config.instruments.master_path,
            PathBuf::from("/srv/sentinel/instruments.csv")
        );
        assert_eq!(config.instruments.download_timeout_secs, 60);

        assert_eq!(config.mode, OperatingMode::Live);
        assert_eq!(config.monitor.interval_ms, 2000);
        assert_eq!(config.monitor.price_timeout_ms, 3000);
        assert_eq!(config.monitor.fallback, FallbackPolicy::Skip);
        assert_eq!(
            config.channels.chats.get(&ChannelName::from("VIP Channel")),
            Some(&"-1002222222".to_string())
        );
        assert_eq!(config.gate_config().free_daily_limit, 2);
        assert_eq!(config.telegram_config().timeout, Duration::from_secs(2));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = AppConfig::from_toml("[monitor]\ninterval_ms = 0").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("monitor.interval_ms"));
    }

    #[test]
    fn test_validate_rejects_missing_premium_chat() {
        let toml = r#"
            [telegram]
            enabled = true

            [channels.chats]
            "Free Group" = "-1001111111"
        "#;
        let config = AppConfig::from_toml(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_live_without_credentials() {
        let config = AppConfig::from_toml("mode = \"live\"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_replace_secrets() {
        let mut config = AppConfig::default();
        config.broker.access_token = "from-file".to_string();
        config.apply_overrides(Some("from-env".to_string()), Some(String::new()));

        assert_eq!(config.broker.access_token, "from-env");
        assert_eq!(config.telegram.bot_token, "");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.store.positions_path, PathBuf::from("data/positions.json"));
    }
}
