use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a summary of all errors joined with "; "
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Upstream feed endpoints
    pub feed: FeedConfig,

    /// Fixed location used for fetching
    #[serde(default)]
    pub location: LocationConfig,

    /// Forecast window assembly settings
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Wearable sync settings
    #[serde(default)]
    pub wearable: WearableConfig,

    /// Refresh settings
    #[serde(default)]
    pub weather: WeatherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Interval forecast feed (XML)
    pub forecast_url: String,

    /// Short-horizon precipitation feed (XML, same format)
    pub nowcast_url: String,

    /// Current-conditions snapshot (JSON), "lat,lon" is appended as a path
    /// segment. Disabled when absent.
    #[serde(default)]
    pub current_url: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    15
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            forecast_url: "https://api.met.no/weatherapi/locationforecast/1.9/".to_string(),
            nowcast_url: "https://api.met.no/weatherapi/nowcast/0.9/".to_string(),
            current_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// Locality shown on the watch
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: 59.913_269_4,
            longitude: 10.739_111_2,
            name: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Number of records in the assembled window, including "now"
    #[serde(default = "default_horizon_days")]
    pub horizon_days: usize,

    /// Display names for day-of-month 1..=31
    #[serde(default = "default_day_names")]
    pub day_names: Vec<String>,

    /// Display names for months January..=December
    #[serde(default = "default_month_names")]
    pub month_names: Vec<String>,

    #[serde(default = "default_label_separator")]
    pub label_separator: String,
}

fn default_horizon_days() -> usize {
    8
}

fn default_day_names() -> Vec<String> {
    (1..=31u32)
        .map(|day| {
            let suffix = match (day % 10, day % 100) {
                (1, n) if n != 11 => "st",
                (2, n) if n != 12 => "nd",
                (3, n) if n != 13 => "rd",
                _ => "th",
            };
            format!("{}{}", day, suffix)
        })
        .collect()
}

fn default_month_names() -> Vec<String> {
    [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ]
    .iter()
    .map(|m| m.to_string())
    .collect()
}

fn default_label_separator() -> String {
    "\n".to_string()
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            day_names: default_day_names(),
            month_names: default_month_names(),
            label_separator: default_label_separator(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WearableConfig {
    /// Delay between items of a bulk send
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Nacks tolerated before the device is considered gone
    #[serde(default = "default_nack_threshold")]
    pub nack_threshold: u32,

    /// Series entries further than this from local midnight are not sent
    #[serde(default = "default_display_window_minutes")]
    pub display_window_minutes: i64,

    #[serde(default = "default_max_precipitation_items")]
    pub max_precipitation_items: usize,

    #[serde(default = "default_max_nowcast_items")]
    pub max_nowcast_items: usize,

    /// Send precipitation and temperature series inside one begin/end
    /// bracket. Watch firmware that clears both series on every begin
    /// marker needs this.
    #[serde(default)]
    pub combined_forecast_bracket: bool,
}

fn default_pacing_ms() -> u64 {
    50
}

fn default_nack_threshold() -> u32 {
    5
}

fn default_display_window_minutes() -> i64 {
    // 144px at one pixel per half-hour, plus a little slack
    4500
}

fn default_max_precipitation_items() -> usize {
    128
}

fn default_max_nowcast_items() -> usize {
    16
}

impl Default for WearableConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
            nack_threshold: default_nack_threshold(),
            display_window_minutes: default_display_window_minutes(),
            max_precipitation_items: default_max_precipitation_items(),
            max_nowcast_items: default_max_nowcast_items(),
            combined_forecast_bracket: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Minimum age of the data before a refresh is issued
    pub update_frequency_minutes: u32,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            update_frequency_minutes: 180,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sologyr");

        Self {
            config_dir,
            feed: FeedConfig::default(),
            location: LocationConfig::default(),
            forecast: ForecastConfig::default(),
            wearable: WearableConfig::default(),
            weather: WeatherConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save_to_path(&config_path)?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            return Ok(config);
        }

        Self::load_from_path(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::Missing(path.display().to_string()))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::Malformed(e.to_string()))
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(config)
    }

    /// Validate a loaded configuration, failing on errors and logging warnings
    pub fn into_validated(self) -> Result<(Self, ValidationResult)> {
        let validation = self.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((self, validation))
    }

    /// Load configuration from the default location and validate it
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        Self::load()?.into_validated()
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        validate_url(&self.feed.forecast_url, "feed.forecast_url", &mut result);
        validate_url(&self.feed.nowcast_url, "feed.nowcast_url", &mut result);
        if let Some(current) = &self.feed.current_url {
            validate_url(current, "feed.current_url", &mut result);
        }

        if self.feed.request_timeout_secs == 0 {
            result.add_error("feed.request_timeout_secs", "Timeout must be greater than 0");
        }

        if !(-90.0..=90.0).contains(&self.location.latitude) {
            result.add_error("location.latitude", "Latitude must be within -90..90");
        }
        if !(-180.0..=180.0).contains(&self.location.longitude) {
            result.add_error("location.longitude", "Longitude must be within -180..180");
        }

        if self.forecast.horizon_days == 0 {
            result.add_error("forecast.horizon_days", "Horizon must be at least 1 day");
        } else if self.forecast.horizon_days > 9 {
            result.add_warning(
                "forecast.horizon_days",
                "The interval feed rarely covers more than 9 days",
            );
        }

        if self.forecast.day_names.len() < 31 {
            result.add_error(
                "forecast.day_names",
                format!(
                    "Expected 31 day names, got {}",
                    self.forecast.day_names.len()
                ),
            );
        }
        if self.forecast.month_names.len() < 12 {
            result.add_error(
                "forecast.month_names",
                format!(
                    "Expected 12 month names, got {}",
                    self.forecast.month_names.len()
                ),
            );
        }

        if self.wearable.display_window_minutes <= 0 {
            result.add_error(
                "wearable.display_window_minutes",
                "Display window must be positive",
            );
        } else if self.wearable.display_window_minutes > i64::from(i16::MAX) {
            result.add_error(
                "wearable.display_window_minutes",
                "Display window does not fit the 16-bit minute field",
            );
        }

        if self.weather.update_frequency_minutes == 0 {
            result.add_warning(
                "weather.update_frequency_minutes",
                "Periodic refresh disabled (0 minutes)",
            );
        } else if self.weather.update_frequency_minutes > i16::MAX as u32 {
            result.add_error(
                "weather.update_frequency_minutes",
                "Update frequency does not fit the 16-bit preference field",
            );
        }

        result
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_path()?)
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("sologyr");

        Ok(config_dir.join("config.toml"))
    }
}

fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                result.add_error(
                    field_name,
                    format!("URL must use http or https scheme, got: {}", url.scheme()),
                );
            }

            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }
        }
        Err(e) => {
            result.add_error(field_name, format!("Invalid URL: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_default_label_tables_are_complete() {
        let forecast = ForecastConfig::default();
        assert_eq!(forecast.day_names.len(), 31);
        assert_eq!(forecast.month_names.len(), 12);
        assert_eq!(forecast.day_names[0], "1st");
        assert_eq!(forecast.day_names[1], "2nd");
        assert_eq!(forecast.day_names[10], "11th");
        assert_eq!(forecast.day_names[21], "22nd");
        assert_eq!(forecast.month_names[11], "December");
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.feed.forecast_url = "ftp://api.met.no/feed".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_short_label_tables_are_errors() {
        let mut config = Config::default();
        config.forecast.day_names.truncate(30);
        config.forecast.month_names.truncate(11);
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "forecast.day_names"));
        assert!(result.errors.iter().any(|e| e.field == "forecast.month_names"));
    }

    #[test]
    fn test_zero_update_frequency_is_warning() {
        let mut config = Config::default();
        config.weather.update_frequency_minutes = 0;
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.field == "weather.update_frequency_minutes"));
    }

    #[test]
    fn test_into_validated_rejects_bad_latitude() {
        let mut config = Config::default();
        config.location.latitude = 123.0;
        let err = config.into_validated().unwrap_err();
        assert!(err.to_string().contains("location.latitude"));
    }

    #[test]
    fn test_config_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.location.name = Some("Oslo".to_string());
        config.wearable.pacing_ms = 75;
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.location.name.as_deref(), Some("Oslo"));
        assert_eq!(loaded.wearable.pacing_ms, 75);
        assert_eq!(loaded.forecast.day_names.len(), 31);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let toml_str = r#"
            config_dir = "/tmp/sologyr"

            [feed]
            forecast_url = "https://example.com/forecast"
            nowcast_url = "https://example.com/nowcast"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.forecast.horizon_days, 8);
        assert_eq!(config.wearable.nack_threshold, 5);
        assert_eq!(config.wearable.display_window_minutes, 4500);
        assert!(!config.wearable.combined_forecast_bracket);
        assert_eq!(config.weather.update_frequency_minutes, 180);
        assert_eq!(config.feed.request_timeout_secs, 15);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let err = Config::load_from_path("/nonexistent/sologyr.toml").unwrap_err();
        assert!(err.to_string().contains("No configuration"));
    }
}
