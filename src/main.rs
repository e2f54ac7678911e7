use anyhow::{Context, Result};
use credvault::api::create_router;
use credvault::bootstrap;
use credvault::config::VaultConfig;
use credvault::oauth::run_state_cleanup;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "credvault=info".into()),
        )
        .init();

    info!("Credvault starting...");

    let config = VaultConfig::load()?;
    config.validate()?;
    info!(
        backend = ?config.vault.backend,
        token_url = %config.oauth.token_url,
        refresh_buffer_seconds = config.oauth.refresh_buffer_seconds,
        "Configuration loaded"
    );

    let state = bootstrap::build_state(&config)?;

    let cleanup = tokio::spawn(run_state_cleanup(
        state.states.clone(),
        config.server.state_cleanup_interval_seconds,
    ));

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Credvault listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server error")?;

    cleanup.abort();
    info!("Credvault stopped");

    Ok(())
}
