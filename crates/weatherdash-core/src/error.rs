//! Centralized error types for weatherdash.
//!
//! Every crate keeps its own `thiserror` enum and converts into [`AppError`]
//! at the boundary. `user_message()` is the short line a panel shows under
//! its last known weather; `Display` keeps the detail for the log.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Weather service error: {0}")]
    Weather(#[from] WeatherError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failures raised inside the dashboard itself
    #[error("Dashboard error: {0}")]
    Service(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Auth(e) => e.user_message(),
            AppError::Weather(e) => e.user_message(),
            AppError::Io(_) => "Could not read or write weatherdash files.",
            AppError::Service(_) | AppError::Other(_) => "The dashboard hit an internal error.",
        }
    }
}

/// Transport-level failures talking to the weather API or the proxy.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Weather host unreachable: {0}")]
    Unreachable(String),

    #[error("Weather request timed out")]
    Timeout,

    #[error("Upstream answered {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Weather payload could not be read: {0}")]
    Malformed(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::Unreachable(_) => "Weather host unreachable. Showing last known data.",
            NetworkError::Timeout => "Weather lookup took too long. Showing last known data.",
            NetworkError::Upstream { status, .. } if *status >= 500 => {
                "Weather provider is down. Showing last known data."
            }
            NetworkError::Upstream { .. } => "Weather provider rejected the lookup.",
            NetworkError::Malformed(_) => "Weather provider sent data the dashboard can't read.",
        }
    }
}

/// Problems with `config.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No platform config directory to hold weatherdash settings")]
    NoConfigDir,

    #[error("Cannot parse {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Config rejected: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NoConfigDir => "No place to store settings; set XDG_CONFIG_HOME.",
            ConfigError::Malformed { .. } => "config.toml is not valid TOML. Fix or delete it.",
            ConfigError::Invalid(_) => "config.toml has bad values. See the log for which.",
        }
    }
}

/// Session and preference errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Preference storage error: {0}")]
    StorageError(String),
}

impl AuthError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::NotAuthenticated => "Please sign in to change the refresh interval.",
            AuthError::StorageError(_) => "Refresh interval applied but could not be saved.",
        }
    }
}

/// Weather lookup errors.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("City not found: {0}")]
    CityNotFound(String),

    #[error("Weather API error: {0}")]
    ApiError(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl WeatherError {
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::CityNotFound(_) => "City not found. Pick another city.",
            WeatherError::ApiError(_) => "Weather service error. Showing last known data.",
            WeatherError::InvalidApiKey => "Weather API key is invalid. Check settings.",
            WeatherError::ServiceUnavailable => {
                "Weather service unavailable. Please try again later."
            }
        }
    }
}

/// Classify a reqwest failure.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            return NetworkError::Timeout;
        }
        if self.is_decode() || self.is_body() {
            return NetworkError::Malformed(self.to_string());
        }
        match self.status() {
            Some(status) => NetworkError::Upstream {
                status: status.as_u16(),
                message: self.to_string(),
            },
            None => NetworkError::Unreachable(self.to_string()),
        }
    }
}
