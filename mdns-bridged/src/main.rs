mod api;
mod bridge;
mod config;
mod dns;
mod mdns;
mod refresher;
mod registry;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::bridge::Bridge;
use crate::config::Config;
use crate::dns::handler::{Handler, Refused};
use crate::mdns::browser::MdnsBrowser;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mdns_bridged=info"))
        )
        .init();

    tracing::info!("Starting mdns-bridged");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/mdns-bridge/bridge.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Create mDNS browser bound to the configured interface
    let browser = Arc::new(MdnsBrowser::new(&config.bridge.bind_address)?);

    let mut bridge = Bridge::new(&config, browser.clone());
    let handler: Arc<dyn Handler> = Arc::new(bridge.handler(Arc::new(Refused)));

    // Bind listeners before starting anything so a bad address fails fast
    let dns_socket = dns::server::bind(&config.dns.listen).await?;
    let api_listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind API to {}", config.api.listen))?;

    bridge.on_startup();

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    let dns_cancel = cancel.clone();
    let dns_handle = tokio::spawn(async move {
        if let Err(e) = dns::server::serve_udp(dns_socket, handler, dns_cancel).await {
            tracing::error!("DNS server error: {}", e);
        }
    });

    let app = api::routes::router(api::routes::AppState {
        registry: bridge.registry(),
        config: bridge.settings(),
    });
    tracing::info!("API listening on {}", config.api.listen);

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(api_listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    bridge.on_shutdown();
    cancel.cancel();

    bridge.stopped().await;
    let _ = tokio::join!(dns_handle, server_handle);

    if let Err(e) = browser.shutdown() {
        tracing::error!("{:#}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
