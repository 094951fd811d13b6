//! Shared configuration, errors and logging setup for Sologyr

pub mod config;
pub mod error;

pub use config::{
    Config, FeedConfig, ForecastConfig, LocationConfig, ValidationResult, WeatherConfig,
    WearableConfig,
};
pub use error::{AppError, ConfigError, NetworkError, ReqwestErrorExt};

use anyhow::Result;

/// Install the tracing subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    tracing::debug!("Logging initialized");
    Ok(())
}
