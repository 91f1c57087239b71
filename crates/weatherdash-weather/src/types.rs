use serde::{Deserialize, Serialize};
use std::fmt;

/// City id on openweathermap.org (e.g. `"2643743"` for London).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CityId(String);

impl CityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CityId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<u64> for CityId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// A city the dashboard offers as a selection button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub id: CityId,
    pub name: String,
}

impl City {
    pub fn new(id: impl Into<CityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Weather provider errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success status from the weather API or the proxy
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl WeatherError {
    /// Whether the request is worth repeating.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Parse(_) | Self::Url(_) => false,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            Self::Api { status, .. } => Some(*status),
            Self::Parse(_) | Self::Url(_) => None,
        }
    }
}
