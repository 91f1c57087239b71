use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use weatherdash_auth::{FilePreferenceStore, Session, User};
use weatherdash_core::{App, AppError, AuthError, Interval};
use weatherdash_dashboard::{cities_from_config, Dashboard, Fetchers, PanelKind};
use weatherdash_weather::{OpenWeatherClient, ProxyClient, RetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize core
    weatherdash_core::init()?;

    let app = App::new()?;
    let config = app.shared_config();
    tracing::info!("weatherdash started (config in {})", config.config_dir.display());

    let timeout = Duration::from_secs(config.weather.timeout_secs);
    let retry = RetryConfig {
        max_retries: config.weather.max_retries,
        ..RetryConfig::default()
    };
    let direct = Arc::new(
        OpenWeatherClient::new(
            &config.weather.api_url,
            config.weather.resolved_api_key(),
            timeout,
        )?
        .with_units(config.weather.units.clone())
        .with_retry(retry),
    );

    // Server-side method
    let (proxy_addr, proxy) =
        weatherdash_proxy::serve(&config.proxy.bind_addr, direct.clone(), app.subscribe_shutdown())?;
    let proxy_task = tokio::spawn(proxy);
    tracing::debug!("Proxy bound to {}", proxy_addr);

    let session = Arc::new(Session::signed_in(User::new(
        "local",
        std::env::var("USER").unwrap_or_else(|_| "local".to_string()),
    )));
    if let Some(user) = session.user() {
        tracing::info!("Signed in as {} (admin: {})", user.name, session.is_admin());
    }
    let preferences = Arc::new(FilePreferenceStore::in_config_dir(&config.config_dir));

    let dashboard = Arc::new(Dashboard::new(
        session,
        preferences,
        Fetchers {
            client: direct,
            server: Arc::new(ProxyClient::new(&config.proxy.public_url, timeout)?),
        },
        cities_from_config(&config.dashboard.cities),
        tokio::runtime::Handle::current(),
    ));

    let render = {
        let dashboard = dashboard.clone();
        let shutdown = app.subscribe_shutdown();
        tokio::spawn(async move { dashboard.run(shutdown).await })
    };

    dashboard.start();

    // `weatherdash <interval>` changes the stored refresh interval
    if let Some(arg) = std::env::args().nth(1) {
        let interval = Interval::from_preference(&arg);
        match dashboard.change_interval(interval) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("{}", AppError::from(AuthError::NotAuthenticated).user_message())
            }
            Err(e) => tracing::error!("{} ({})", e.user_message(), e),
        }
    }

    let first_city = dashboard.cities().first().map(|c| c.id.clone());
    let last_city = dashboard.cities().last().map(|c| c.id.clone());
    if let (Some(client), Some(server)) = (first_city, last_city) {
        dashboard.select_city(PanelKind::Client, client);
        dashboard.select_city(PanelKind::Server, server);
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    // Graceful shutdown
    app.shutdown();
    render.await??;
    proxy_task.await?;

    Ok(())
}
