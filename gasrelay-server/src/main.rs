//! Gas-sponsorship relay HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p gasrelay-server --release
//!
//! # Run with custom config path
//! CONFIG=/path/to/config.toml cargo run -p gasrelay-server
//!
//! # Configure logging level
//! RUST_LOG=debug cargo run -p gasrelay-server
//! ```
//!
//! See [`gasrelay_server::config`] for the recognised environment variables.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use gasrelay_evm::{ChainConnection, DripGateway, RelayGateway};
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use gasrelay_server::config::RelayConfig;
use gasrelay_server::shutdown::{DRAIN_TIMEOUT, Shutdown};
use gasrelay_server::{RelayState, relay_router};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Relay server failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = RelayConfig::load()?;
    let rpc_url = config.rpc_url()?;
    let policy = config.drip_policy()?;
    let escrows = config.escrow_allow_list()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        rpc = %rpc_url,
        escrows = escrows.len(),
        "Loaded configuration"
    );

    let connection = ChainConnection::new(rpc_url, config.signer()?)
        .with_eip1559(config.eip1559)
        .with_request_timeout(config.request_timeout())
        .with_receipt_timeout(config.receipt_timeout());
    let connection = Arc::new(connection);

    let shutdown = Shutdown::listen()?;
    let state = RelayState::new(
        RelayGateway::new(Arc::clone(&connection)).with_allowed_escrows(escrows),
        DripGateway::new(connection, policy),
        shutdown.requests(),
    );

    let app = relay_router(state)
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::POST, Method::OPTIONS])
                .allow_headers(cors::Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Relay listening on http://{addr}");

    let token = shutdown.token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    if shutdown.drain(DRAIN_TIMEOUT).await {
        tracing::info!("Relay shut down gracefully");
    } else {
        tracing::warn!("Relay shut down with drips still in flight");
    }
    Ok(())
}
