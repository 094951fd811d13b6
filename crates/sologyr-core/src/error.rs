//! Errors shared across the Sologyr crates.
//!
//! Feed parsing, window assembly and the watch link each have their own
//! precise error enums in their crates. What lives here is the network and
//! configuration vocabulary they share, and `AppError` for the service layer.

use thiserror::Error;

/// Error the service layer reports.
///
/// `user_message()` gives a line fit for a status display.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Fetch, parse or assembly failed. The previous forecast stays in place.
    #[error("Forecast update failed: {0}")]
    Feed(String),

    #[error("Watch link error: {0}")]
    Wearable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn feed(cause: impl std::fmt::Display) -> Self {
        AppError::Feed(cause.to_string())
    }

    pub fn wearable(cause: impl std::fmt::Display) -> Self {
        AppError::Wearable(cause.to_string())
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Feed(_) => "Forecast could not be updated. Showing the last known forecast.",
            AppError::Wearable(_) => "The watch is not receiving updates right now.",
            AppError::Io(_) => "Could not read or write a local file.",
            AppError::Other(_) => "Something went wrong. The next refresh will try again.",
        }
    }
}

/// Failure talking to a weather feed over HTTP
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Feed unreachable: {0}")]
    Unreachable(String),

    #[error("Feed request timed out")]
    TimedOut,

    #[error("Feed answered {status}: {reason}")]
    HttpStatus { status: u16, reason: String },

    #[error("Unreadable feed response: {0}")]
    MalformedBody(String),
}

impl NetworkError {
    /// Server-side trouble or a flaky link, as opposed to a bad request
    pub fn is_transient(&self) -> bool {
        match self {
            NetworkError::Unreachable(_) | NetworkError::TimedOut => true,
            NetworkError::HttpStatus { status, .. } => *status >= 500,
            NetworkError::MalformedBody(_) => false,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::Unreachable(_) => "The weather service cannot be reached. Check the network.",
            NetworkError::TimedOut => "The weather service is slow to answer.",
            NetworkError::HttpStatus { .. } if self.is_transient() => {
                "The weather service is having trouble. Trying again later."
            }
            NetworkError::HttpStatus { .. } => "The weather service rejected the request.",
            NetworkError::MalformedBody(_) => "The weather service sent data that could not be read.",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration at {0}")]
    Missing(String),

    #[error("Configuration rejected: {0}")]
    Invalid(String),

    #[error("Configuration is not valid TOML: {0}")]
    Malformed(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Missing(_) => "No configuration file found.",
            ConfigError::Invalid(_) => "The configuration has invalid values.",
            ConfigError::Malformed(_) => "The configuration file could not be parsed.",
        }
    }
}

/// Classify a reqwest failure
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            return NetworkError::TimedOut;
        }
        match self.status() {
            Some(status) => NetworkError::HttpStatus {
                status: status.as_u16(),
                reason: self.to_string(),
            },
            None if self.is_decode() || self.is_body() => {
                NetworkError::MalformedBody(self.to_string())
            }
            None => NetworkError::Unreachable(self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_error_converts_into_app_error() {
        let app_err: AppError = NetworkError::TimedOut.into();
        assert!(matches!(app_err, AppError::Network(NetworkError::TimedOut)));
        assert_eq!(
            app_err.user_message(),
            "The weather service is slow to answer."
        );
    }

    #[test]
    fn config_message_passes_through() {
        let app_err = AppError::Config(ConfigError::Invalid("horizon_days".into()));
        assert_eq!(app_err.user_message(), "The configuration has invalid values.");
    }

    #[test]
    fn server_errors_are_transient() {
        let outage = NetworkError::HttpStatus {
            status: 503,
            reason: "down".into(),
        };
        let rejected = NetworkError::HttpStatus {
            status: 404,
            reason: "gone".into(),
        };
        assert!(outage.is_transient());
        assert!(!rejected.is_transient());
        assert_ne!(outage.user_message(), rejected.user_message());
    }

    #[test]
    fn feed_error_keeps_cause() {
        let err = AppError::feed("not enough data");
        assert!(err.to_string().contains("not enough data"));
        assert!(err.user_message().contains("last known forecast"));
    }
}
