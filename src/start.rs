//! Startup helpers for the binaries.

use std::process::ExitCode;

use crate::server::{self, AppState, RelayConfig};

/// Environment variable overriding the listening port.
pub const PORT_ENV: &str = "STREAMCHAT_PORT";

/// Initialize `tracing` output: `RUST_LOG` directives plus `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();
}

/// Run the relay server (used by the `streamchat-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();
    tracing::info!("Starting streamchat relay v{}", env!("CARGO_PKG_VERSION"));

    let config = RelayConfig::from_env();
    tracing::info!("Upstream endpoint: {}", config.chat_endpoint());
    let port = get_port();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let result = rt.block_on(async {
        match AppState::new(config).await {
            Ok(state) => server::run_server_with_shutdown(state, port, shutdown_signal()).await,
            Err(e) => Err(e),
        }
    });

    if let Err(e) = result {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    tracing::info!("Server stopped");
    ExitCode::SUCCESS
}

/// Resolves on Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// Get configured server port: `STREAMCHAT_PORT`, then `PORT`, then the default.
#[must_use]
pub fn get_port() -> u16 {
    [PORT_ENV, "PORT"]
        .iter()
        .find_map(|name| std::env::var(name).ok()?.parse().ok())
        .unwrap_or(server::DEFAULT_PORT)
}
