pub mod api;
pub mod config;
pub mod core_state;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod workflow;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Start the review service and block until Ctrl-C.
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let service_config = config::ServiceConfig::from_env()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let core = Arc::new(core_state::CoreState::open(service_config)?);
        let autosave = core.start_autosave();
        let mut server = api::start_api_server(core.clone(), core.config.bind_addr).await?;

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for shutdown signal: {e}");
        }
        tracing::info!("Shutting down");

        server.shutdown();
        server.stopped().await;
        autosave.shutdown().await;
        Ok::<_, Box<dyn std::error::Error>>(())
    })
}
