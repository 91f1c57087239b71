//! Weather lookups for weatherdash.
//!
//! A [`FetchService`] turns a city id into the raw JSON document the weather
//! API returns. [`OpenWeatherClient`] talks to the API directly (client panel);
//! [`ProxyClient`] goes through the server-side proxy (server panel).

pub mod cities;
pub mod provider;
pub mod proxy_client;
pub mod retry;
pub mod summary;
pub mod types;

pub use cities::default_cities;
pub use provider::{FetchService, OpenWeatherClient};
pub use proxy_client::ProxyClient;
pub use retry::RetryConfig;
pub use summary::WeatherSummary;
pub use types::*;
