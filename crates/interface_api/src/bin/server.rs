//! Billing API server binary
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin billing-api
//!
//! # Run with environment variables
//! API_HOST=0.0.0.0 API_PORT=8080 API_DATABASE_URL=postgres://... cargo run --bin billing-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `API_GATEWAY_BASE_URL` - Payment gateway API base URL
//! * `API_GATEWAY_API_KEY` - Payment gateway API key
//! * `API_GATEWAY_WEBHOOK_SECRET` - Shared secret for webhook signatures
//! * `API_SWEEP_INTERVAL_SECS` - Delay between background sweeps (default: 3600)
//! * `API_ABANDON_AFTER_SECS` - Stale-attempt threshold (default: 86400)

use std::sync::Arc;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_invoicing::{OverdueSweeper, SweeperConfig};
use infra_db::{create_pool, DatabaseConfig, PgInvoiceLedger};
use infra_gateway::{GatewayConfig, RestGateway};
use interface_api::{config::ApiConfig, create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().unwrap_or_default();
    init_tracing(&config.log_level);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "starting billing API server"
    );

    // Database
    let pool = create_pool(DatabaseConfig::new(&config.database_url)).await?;
    infra_db::migrator().run(&pool).await?;
    let ledger = Arc::new(PgInvoiceLedger::new(pool.clone()));

    // Payment gateway
    let mut gateway_config = GatewayConfig::new(
        &config.gateway_base_url,
        &config.gateway_api_key,
        &config.gateway_webhook_secret,
    );
    gateway_config.request_timeout = config.gateway_timeout();
    let gateway = Arc::new(RestGateway::new(gateway_config)?);

    // Background sweeps: overdue marking and stale-attempt recovery
    let sweeper = OverdueSweeper::new(
        ledger.clone(),
        SweeperConfig {
            batch_size: config.sweep_batch_size,
            abandon_after: config.abandon_after(),
            interval: config.sweep_interval(),
        },
    );
    tokio::spawn(sweeper.run());

    let state = AppState::new(ledger, gateway, Some(pool));
    let app = create_router(state, config.clone());

    let addr: SocketAddr = config.server_addr().parse()?;
    tracing::info!(%addr, "server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for Ctrl+C or SIGTERM so in-flight requests can complete
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}
