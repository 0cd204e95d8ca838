use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tabletalk::{config::Config, routes::create_router, utils::init_logger, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;
    let _log_guard = init_logger(&config.logging);
    info!(
        server = ?config.server,
        provider = %config.llm.provider,
        model = %config.llm.model,
        fallback_key = config.llm.fallback_api_key.is_some(),
        "Configuration loaded"
    );

    // Create shared state
    let state = AppState::new(config.clone());
    state
        .sessions
        .spawn_idle_sweeper(Duration::from_secs(config.session.idle_timeout_secs));

    // Create router
    let app = create_router(state);

    // Start server
    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.port));
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
