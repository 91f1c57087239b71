pub mod app;
pub mod config;
pub mod error;
pub mod interval;

pub use app::App;
pub use config::{
    CityConfig, Config, DashboardConfig, ProxyConfig, ValidationResult, WeatherConfig,
};
pub use error::{AppError, AuthError, ConfigError, NetworkError, ReqwestErrorExt, WeatherError};
pub use interval::Interval;

use anyhow::Result;

/// Initialize logging. Safe to call more than once.
pub fn init() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    tracing::info!("weatherdash core initialized");
    Ok(())
}
