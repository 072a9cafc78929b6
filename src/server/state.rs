//! Application state shared across all request handlers.

use std::sync::Arc;

use super::config::RelayConfig;
use super::stats::StatsStore;
use super::upstream::UpstreamClient;

/// Shared application state.
pub struct AppState {
    /// Relay configuration.
    pub config: Arc<RelayConfig>,
    /// Client for the upstream bot API.
    pub upstream: UpstreamClient,
    /// Visit and call counters.
    pub stats: StatsStore,
}

impl AppState {
    /// Create the state, opening the statistics database named in the config.
    ///
    /// # Errors
    /// Returns an error if the config is invalid, the HTTP client cannot be
    /// built or the database cannot be opened.
    pub async fn new(config: RelayConfig) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let stats = StatsStore::open(&config.stats_db)
            .await
            .map_err(|e| format!("Failed to open stats database {}: {e}", config.stats_db.display()))?;
        Self::with_stats(config, stats)
    }

    /// Create the state around an already opened statistics store.
    ///
    /// # Errors
    /// Returns an error if the config is invalid or the HTTP client cannot be built.
    pub fn with_stats(
        config: RelayConfig,
        stats: StatsStore,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        config.validate()?;
        let config = Arc::new(config);
        let upstream = UpstreamClient::new(Arc::clone(&config))?;
        Ok(Arc::new(Self {
            config,
            upstream,
            stats,
        }))
    }
}
