//! Weather backend: async weather fetching for the panels.
//! All network work runs on the runtime; results come back via mpsc.

use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use weatherdash_weather::{FetchService, WeatherError as FetchError};

use crate::panel::FetchTicket;

/// Error type for weather operations
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherError {
    Network(String),
    NotFound(String),
    InvalidKey,
    Unavailable(String),
    InvalidResponse(String),
}

impl std::fmt::Display for WeatherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeatherError::Network(s) => write!(f, "Weather error: {}", s),
            WeatherError::NotFound(s) => write!(f, "City not found: {}", s),
            WeatherError::InvalidKey => write!(f, "Weather API key rejected"),
            WeatherError::Unavailable(s) => write!(f, "Weather service unavailable: {}", s),
            WeatherError::InvalidResponse(s) => write!(f, "Invalid weather response: {}", s),
        }
    }
}

impl std::error::Error for WeatherError {}

impl From<FetchError> for WeatherError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Api { status: 401, .. } => WeatherError::InvalidKey,
            FetchError::Api { status: 404, message } => WeatherError::NotFound(message),
            FetchError::Api { status, message } if status >= 500 => {
                WeatherError::Unavailable(format!("{} ({})", message, status))
            }
            FetchError::Parse(s) => WeatherError::InvalidResponse(s),
            other => WeatherError::Network(other.to_string()),
        }
    }
}

/// Messages sent from async operations back to the render loop
#[derive(Debug)]
pub enum WeatherServiceMessage {
    /// Result of one panel fetch
    FetchDone {
        ticket: FetchTicket,
        result: Result<Value, WeatherError>,
    },
}

/// Fetch the city named by `ticket` asynchronously.
/// Sends `FetchDone` on the channel when complete.
pub fn request_fetch(
    tx: &UnboundedSender<WeatherServiceMessage>,
    runtime: &Handle,
    fetcher: Arc<dyn FetchService>,
    ticket: FetchTicket,
) {
    let tx = tx.clone();
    runtime.spawn(async move {
        let result = fetcher.fetch(ticket.city()).await.map_err(|e| {
            tracing::warn!(
                "{} fetch for city {} failed: {}",
                fetcher.name(),
                ticket.city(),
                e
            );
            WeatherError::from(e)
        });
        if tx.send(WeatherServiceMessage::FetchDone { ticket, result }).is_err() {
            tracing::debug!("Render loop gone; dropping weather result");
        }
    });
}
