pub mod api;
pub mod appointment; // Status state machine, booking, comments
pub mod authorization; // Token + permission guard
pub mod config;
pub mod core_state;
pub mod dashboard; // Staff dashboard aggregates
pub mod db;
pub mod documents; // Document validation workflow
pub mod models;
pub mod notifications; // Inbox records + external delivery
pub mod settings_cache;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Core(#[from] core_state::CoreError),
    #[error(transparent)]
    Server(#[from] api::ServerError),
}

/// Run the portal server until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let server_config = config::ServerConfig::from_env()?;
    let core = core_state::CoreState::from_config(&server_config);
    core.initialize()?;

    api::serve(
        Arc::new(core),
        server_config.bind,
        server_config.settings_ttl,
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
        },
    )
    .await?;
    Ok(())
}
