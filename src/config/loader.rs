//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{DetectorError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP__, e.g. `APP__KUCOIN__REST_URL`)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    // Pick up a .env file before reading the environment
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| DetectorError::Configuration(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| DetectorError::Configuration(e.to_string()))?;

    validate(&app_config)?;
    Ok(app_config)
}

/// Load configuration from a TOML string, without consulting the environment
pub fn load_from_str(toml: &str) -> Result<AppConfig> {
    let config = Config::builder()
        .add_source(File::from_str(toml, config::FileFormat::Toml))
        .build()
        .map_err(|e| DetectorError::Configuration(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| DetectorError::Configuration(e.to_string()))?;

    validate(&app_config)?;
    Ok(app_config)
}

fn validate(config: &AppConfig) -> Result<()> {
    let settings = &config.settings;
    if settings.reconnect_delay_ms == 0 {
        return Err(DetectorError::Configuration(
            "reconnect_delay_ms must be positive".to_string(),
        ));
    }
    if settings.max_reconnect_delay_ms < settings.reconnect_delay_ms {
        return Err(DetectorError::Configuration(
            "max_reconnect_delay_ms must not be lower than reconnect_delay_ms".to_string(),
        ));
    }
    if settings.price_refresh_interval_seconds == 0 || settings.housekeeping_interval_seconds == 0 {
        return Err(DetectorError::Configuration(
            "loop intervals must be positive".to_string(),
        ));
    }
    if settings.channel_size == 0 {
        return Err(DetectorError::Configuration(
            "channel_size must be positive".to_string(),
        ));
    }
    if let Some(db) = &config.database {
        if db.queue_poll_interval_ms == 0 || db.queue_visibility_timeout_seconds == 0 {
            return Err(DetectorError::Configuration(
                "queue_poll_interval_ms and queue_visibility_timeout_seconds must be positive"
                    .to_string(),
            ));
        }
    }
    for seed in &config.triggers {
        seed.params.validate().map_err(|e| {
            DetectorError::Configuration(format!("trigger {}: {}", seed.pair, e))
        })?;
    }
    Ok(())
}
