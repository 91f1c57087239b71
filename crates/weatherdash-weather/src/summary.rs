use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// The handful of fields a panel shows, picked out of the raw weather JSON.
///
/// Every field is optional; a payload missing a field still yields a summary.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeatherSummary {
    pub city: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub description: Option<String>,
    /// Observation time (the API reports unix seconds)
    pub observed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawWeather {
    name: Option<String>,
    main: Option<RawMain>,
    #[serde(default)]
    weather: Vec<RawCondition>,
    dt: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawMain {
    temp: Option<f64>,
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawCondition {
    description: Option<String>,
}

impl WeatherSummary {
    /// Returns `None` when `value` is not a weather object at all.
    pub fn from_value(value: &Value) -> Option<Self> {
        let raw: RawWeather = match serde_json::from_value(value.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!("Payload is not a weather document: {}", e);
                return None;
            }
        };

        Some(Self {
            city: raw.name.filter(|n| !n.is_empty()),
            temperature: raw.main.as_ref().and_then(|m| m.temp),
            humidity: raw.main.as_ref().and_then(|m| m.humidity),
            description: raw.weather.into_iter().find_map(|w| w.description),
            observed_at: raw.dt.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        })
    }

    /// One-line rendering, e.g. `London: 10.0°C, light rain (Mon, 3 Feb 2025, 14:00)`.
    pub fn headline(&self) -> String {
        let mut line = self.city.clone().unwrap_or_else(|| "Unknown".to_string());
        line.push(':');
        match self.temperature {
            Some(t) => line.push_str(&format!(" {:.1}°C", t)),
            None => line.push_str(" n/a"),
        }
        if let Some(desc) = &self.description {
            line.push_str(&format!(", {}", desc));
        }
        if let Some(at) = &self.observed_at {
            line.push_str(&format!(" ({})", at.format("%a, %-d %b %Y, %H:%M")));
        }
        line
    }
}
