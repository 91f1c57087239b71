use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::retry::{with_retry, RetryConfig};
use crate::types::{CityId, WeatherError};

const WEATHER_PATH: &str = "data/2.5/weather";
const USER_AGENT: &str = "weatherdash/0.1.0";

/// Looks up the current weather for a city.
///
/// Implementations return the weather document as raw JSON; panels store it
/// verbatim and views pick fields out with [`crate::WeatherSummary`].
#[async_trait]
pub trait FetchService: Send + Sync {
    /// Short label used in logs ("direct", "proxy")
    fn name(&self) -> &str;

    async fn fetch(&self, id: &CityId) -> Result<Value, WeatherError>;
}

/// Direct client for the OpenWeatherMap current-weather endpoint.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Arc<Client>,
    base_url: Url,
    api_key: Option<String>,
    units: String,
    retry: RetryConfig,
}

impl OpenWeatherClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            base_url: with_trailing_slash(base_url)?,
            api_key,
            units: "metric".to_string(),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Full URL for `id`, without the API key.
    pub fn weather_url(&self, id: &CityId) -> Result<Url, WeatherError> {
        let mut url = self.base_url.join(WEATHER_PATH)?;
        url.query_pairs_mut()
            .append_pair("id", id.as_str())
            .append_pair("units", &self.units);
        Ok(url)
    }

    async fn fetch_once(&self, url: &Url) -> Result<Value, WeatherError> {
        let mut request = self.client.get(url.clone());
        if let Some(key) = &self.api_key {
            request = request.query(&[("appid", key.as_str())]);
        }
        let response = request.send().await?;
        read_json(response).await
    }
}

#[async_trait]
impl FetchService for OpenWeatherClient {
    fn name(&self) -> &str {
        "direct"
    }

    async fn fetch(&self, id: &CityId) -> Result<Value, WeatherError> {
        let url = self.weather_url(id)?;
        tracing::debug!("Fetching weather for city {} from {}", id, url);

        let value = with_retry(&self.retry, || self.fetch_once(&url)).await?;

        tracing::debug!("Weather for city {} received", id);
        Ok(value)
    }
}

/// Parse a JSON body, turning non-success statuses into [`WeatherError::Api`].
///
/// OpenWeatherMap reports failures as `{"cod": "404", "message": "city not found"}`;
/// the proxy uses `{"error": "..."}`. Both are understood.
pub(crate) async fn read_json(response: Response) -> Result<Value, WeatherError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .or_else(|| v.get("error"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
        return Err(WeatherError::Api {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| WeatherError::Parse(e.to_string()))
}

pub(crate) fn with_trailing_slash(base: &str) -> Result<Url, WeatherError> {
    let mut url = Url::parse(base)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
