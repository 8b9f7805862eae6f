//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::types::{SymbolPair, TriggerParams};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// KuCoin venue configuration
    #[serde(default)]
    pub kucoin: KucoinConfig,
    /// Telegram alert channel (alerts go to the log when absent)
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    /// Database configuration (in-memory persistence and queue when absent)
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
    /// Triggers created at startup unless they already exist
    #[serde(default)]
    pub triggers: Vec<SeedTrigger>,
}

/// KuCoin venue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KucoinConfig {
    /// API key for signed requests
    #[serde(default)]
    pub api_key: Option<String>,
    /// API secret for signing requests
    #[serde(default)]
    pub api_secret: Option<String>,
    /// API passphrase
    #[serde(default)]
    pub api_passphrase: Option<String>,
    /// Base URL for the REST API
    #[serde(default = "default_kucoin_rest_url")]
    pub rest_url: String,
    /// Currency reference prices are expressed in
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
}

impl Default for KucoinConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            api_passphrase: None,
            rest_url: default_kucoin_rest_url(),
            quote_currency: default_quote_currency(),
        }
    }
}

impl KucoinConfig {
    /// Credentials, if all three parts are configured
    pub fn credentials(&self) -> Option<ApiCredentials> {
        match (&self.api_key, &self.api_secret, &self.api_passphrase) {
            (Some(key), Some(secret), Some(passphrase)) => Some(ApiCredentials::new(
                key.clone(),
                secret.clone(),
                passphrase.clone(),
            )),
            _ => None,
        }
    }
}

fn default_kucoin_rest_url() -> String {
    "https://api.kucoin.com".to_string()
}

fn default_quote_currency() -> String {
    "USDT".to_string()
}

/// Telegram bot used as the alert channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather
    pub bot_token: String,
    /// Chat that receives every alert
    pub admin_chat_id: String,
    /// Bot API base URL
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

/// Database configuration for trigger persistence and the durable queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
    /// Pause between polls of an empty event queue
    #[serde(default = "default_queue_poll_interval")]
    pub queue_poll_interval_ms: u64,
    /// Unacknowledged claims older than this are delivered again
    #[serde(default = "default_queue_visibility_timeout")]
    pub queue_visibility_timeout_seconds: u64,
}

impl DatabaseConfig {
    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_interval_ms)
    }

    pub fn queue_visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_visibility_timeout_seconds)
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_queue_poll_interval() -> u64 {
    250
}

fn default_queue_visibility_timeout() -> u64 {
    300
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Initial delay between reconnection attempts in milliseconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Upper bound of the reconnection backoff in milliseconds
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_ms: u64,
    /// Maximum consecutive reconnection attempts (0 = infinite)
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// How often reference prices are refreshed
    #[serde(default = "default_price_refresh_interval")]
    pub price_refresh_interval_seconds: u64,
    /// How often timelines are cleared and triggers re-armed
    #[serde(default = "default_housekeeping_interval")]
    pub housekeeping_interval_seconds: u64,
    /// Pause after the queue reports itself unavailable
    #[serde(default = "default_queue_retry_delay")]
    pub queue_retry_delay_ms: u64,
    /// Publish attempts per matching trade before it is dropped
    #[serde(default = "default_publish_retry_attempts")]
    pub publish_retry_attempts: u32,
    /// Buffer size of the raw trade channel
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,
    /// Send the trigger status report before each housekeeping reset
    #[serde(default)]
    pub send_status_report: bool,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            reconnect_delay_ms: default_reconnect_delay(),
            max_reconnect_delay_ms: default_max_reconnect_delay(),
            max_reconnect_attempts: 0,
            price_refresh_interval_seconds: default_price_refresh_interval(),
            housekeeping_interval_seconds: default_housekeeping_interval(),
            queue_retry_delay_ms: default_queue_retry_delay(),
            publish_retry_attempts: default_publish_retry_attempts(),
            channel_size: default_channel_size(),
            send_status_report: false,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl AppSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn price_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.price_refresh_interval_seconds)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval_seconds)
    }

    pub fn queue_retry_delay(&self) -> Duration {
        Duration::from_millis(self.queue_retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_reconnect_delay() -> u64 {
    1000
}

fn default_max_reconnect_delay() -> u64 {
    60_000
}

fn default_price_refresh_interval() -> u64 {
    300
}

fn default_housekeeping_interval() -> u64 {
    3600
}

fn default_queue_retry_delay() -> u64 {
    1000
}

fn default_publish_retry_attempts() -> u32 {
    3
}

fn default_channel_size() -> usize {
    1000
}

fn default_request_timeout() -> u64 {
    30
}

/// Trigger declared in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedTrigger {
    pub pair: SymbolPair,
    #[serde(flatten)]
    pub params: TriggerParams,
}

/// API credentials for signed requests
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

impl ApiCredentials {
    pub fn new(api_key: String, api_secret: String, passphrase: String) -> Self {
        Self {
            api_key,
            api_secret,
            passphrase,
        }
    }
}
