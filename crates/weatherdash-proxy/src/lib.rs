//! Server-side weather lookups.
//!
//! The server panel never talks to the weather API itself; it asks this proxy,
//! which performs the upstream request and hands the JSON back unchanged.
//!
//! Routes:
//! - `GET /weather/{id}` returns the upstream document for city `id`
//! - `GET /healthz` returns `ok`

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};
use weatherdash_core::{NetworkError, ReqwestErrorExt};
use weatherdash_weather::{CityId, FetchService, WeatherError};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid bind address {addr}: {source}")]
    InvalidAddress {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error("Failed to bind proxy: {0}")]
    Bind(#[from] warp::Error),
}

/// All proxy routes, backed by `fetcher`.
pub fn routes(
    fetcher: Arc<dyn FetchService>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let weather = warp::get()
        .and(warp::path("weather"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::any().map(move || fetcher.clone()))
        .and_then(handle_weather);

    let health = warp::get()
        .and(warp::path("healthz"))
        .and(warp::path::end())
        .map(|| "ok");

    weather.or(health)
}

async fn handle_weather(id: String, fetcher: Arc<dyn FetchService>) -> Result<Response, Infallible> {
    let id = CityId::new(id);
    tracing::debug!("Proxying weather lookup for city {}", id);

    match fetcher.fetch(&id).await {
        Ok(value) => Ok(warp::reply::json(&value).into_response()),
        Err(e) => {
            let (status, message) = error_reply(e);
            tracing::warn!("Weather lookup for city {} failed ({}): {}", id, status, message);
            Ok(warp::reply::with_status(warp::reply::json(&json!({ "error": message })), status)
                .into_response())
        }
    }
}

/// Status and message sent to the panel for an upstream failure.
///
/// Client errors from the weather API (unknown city, bad key) pass through;
/// anything else is a gateway failure.
fn error_reply(e: WeatherError) -> (StatusCode, String) {
    match e {
        WeatherError::Api { status, message } if (400..500).contains(&status) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, message)
        }
        WeatherError::Api { message, .. } => (StatusCode::BAD_GATEWAY, message),
        WeatherError::Network(e) => match e.into_network_error() {
            NetworkError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                NetworkError::Timeout.to_string(),
            ),
            other => (StatusCode::BAD_GATEWAY, other.to_string()),
        },
        WeatherError::Parse(message) => (StatusCode::BAD_GATEWAY, message),
        other @ WeatherError::Url(_) => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

/// Bind the proxy on `addr` (port 0 picks a free one).
///
/// Returns the bound address and the server future; the future completes once
/// `shutdown` fires.
pub fn serve(
    addr: &str,
    fetcher: Arc<dyn FetchService>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(SocketAddr, impl Future<Output = ()> + Send + 'static), ProxyError> {
    let addr: SocketAddr = addr.parse().map_err(|source| ProxyError::InvalidAddress {
        addr: addr.to_string(),
        source,
    })?;

    let (bound, server) = warp::serve(routes(fetcher)).try_bind_with_graceful_shutdown(
        addr,
        async move {
            let _ = shutdown.recv().await;
            tracing::info!("Weather proxy shutting down");
        },
    )?;

    tracing::info!("Weather proxy listening on http://{}", bound);
    Ok((bound, server))
}
