use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use polychat::config::{ServerConfig, StreamConfig};
use polychat::context::NoopContext;
use polychat::coordinator::Coordinator;
use polychat::credentials::EnvCredentialResolver;
use polychat::providers::AdapterRegistry;
use polychat::server::{router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("polychat=info")),
        )
        .init();

    let server_config = ServerConfig::from_env();
    let http = reqwest::Client::new();
    let registry = Arc::new(AdapterRegistry::with_defaults(http));
    let coordinator = Arc::new(Coordinator::new(
        registry,
        Arc::new(EnvCredentialResolver),
        Arc::new(NoopContext),
        Arc::new(NoopContext),
        Arc::new(NoopContext),
        StreamConfig::default(),
    ));

    let app = router(AppState::new(coordinator));
    let listener = tokio::net::TcpListener::bind(server_config.bind_addr).await?;
    tracing::info!(addr = %server_config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
