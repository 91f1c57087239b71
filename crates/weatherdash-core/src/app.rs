use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::Config;

/// Application state and lifecycle manager.
///
/// Owns the loaded configuration and a shutdown broadcaster that long-running
/// tasks (proxy server, dashboard render loop) subscribe to.
pub struct App {
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
}

impl App {
    /// Create a new application instance from the on-disk configuration
    pub fn new() -> Result<Self> {
        let (config, _) = Config::load_validated()?;
        Ok(Self::with_config(config))
    }

    /// Create an application instance around an already loaded configuration
    pub fn with_config(config: Config) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            config: Arc::new(config),
            shutdown_tx,
        }
    }

    /// Get reference to application config
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared handle to the config for spawned services
    pub fn shared_config(&self) -> Arc<Config> {
        self.config.clone()
    }

    /// Subscribe to shutdown notifications.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal every subscriber to stop.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down application");
        if self.shutdown_tx.send(()).is_err() {
            tracing::debug!("No shutdown subscribers");
        }
    }
}
