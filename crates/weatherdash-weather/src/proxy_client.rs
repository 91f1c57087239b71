//! Fetch through the server-side proxy (`GET {proxy}/weather/{id}`).
//! The proxy does the upstream lookup and returns its JSON unchanged.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::provider::{read_json, with_trailing_slash, FetchService};
use crate::types::{CityId, WeatherError};

#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: Arc<Client>,
    base_url: Url,
}

impl ProxyClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, WeatherError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client: Arc::new(client),
            base_url: with_trailing_slash(base_url)?,
        })
    }

    pub fn weather_url(&self, id: &CityId) -> Result<Url, WeatherError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| WeatherError::Parse(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .push("weather")
            .push(id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl FetchService for ProxyClient {
    fn name(&self) -> &str {
        "proxy"
    }

    async fn fetch(&self, id: &CityId) -> Result<Value, WeatherError> {
        let url = self.weather_url(id)?;
        tracing::debug!("Fetching weather for city {} via proxy {}", id, url);

        let response = self.client.get(url).send().await?;
        read_json(response).await
    }
}
