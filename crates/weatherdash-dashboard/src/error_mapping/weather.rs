use crate::services::weather_service::WeatherError as UiWeatherError;
use weatherdash_core::{AppError, NetworkError, WeatherError};

impl From<UiWeatherError> for AppError {
    fn from(e: UiWeatherError) -> Self {
        match e {
            UiWeatherError::Network(s) => AppError::Weather(WeatherError::ApiError(s)),
            UiWeatherError::NotFound(s) => AppError::Weather(WeatherError::CityNotFound(s)),
            UiWeatherError::InvalidKey => AppError::Weather(WeatherError::InvalidApiKey),
            UiWeatherError::Unavailable(_) => AppError::Weather(WeatherError::ServiceUnavailable),
            UiWeatherError::InvalidResponse(s) => {
                AppError::Network(NetworkError::Malformed(s))
            }
        }
    }
}
