//! HTTP API layer
//!
//! REST surface for the billing system using Axum:
//!
//! - Invoice management (create, fetch, list, void)
//! - Payment intent creation for the client dashboard
//! - Client-side payment confirmation reports
//! - Signed gateway webhook intake
//!
//! Handlers depend on the domain ports (`InvoiceLedger`, `GatewayClient`)
//! rather than concrete adapters, so the router can be wired against
//! PostgreSQL and the real gateway in production or in-memory fakes in tests.

pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use domain_invoicing::{ConfirmationHandler, GatewayClient, InvoiceLedger, PaymentIntentOrchestrator};

use crate::config::ApiConfig;
use crate::handlers::{health, invoices, payments, webhooks};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn InvoiceLedger>,
    pub gateway: Arc<dyn GatewayClient>,
    pub orchestrator: Arc<PaymentIntentOrchestrator>,
    pub confirmations: Arc<ConfirmationHandler>,
    /// Present when backed by PostgreSQL; used by the readiness probe
    pub pool: Option<PgPool>,
    pub config: ApiConfig,
}

impl AppState {
    /// Wires the domain services over the given ledger and gateway
    pub fn new(
        ledger: Arc<dyn InvoiceLedger>,
        gateway: Arc<dyn GatewayClient>,
        pool: Option<PgPool>,
    ) -> Self {
        let orchestrator = Arc::new(PaymentIntentOrchestrator::new(
            ledger.clone(),
            gateway.clone(),
        ));
        let confirmations = Arc::new(ConfirmationHandler::new(ledger.clone(), gateway.clone()));
        Self {
            ledger,
            gateway,
            orchestrator,
            confirmations,
            pool,
            config: ApiConfig::default(),
        }
    }
}

/// Creates the main API router
pub fn create_router(mut state: AppState, config: ApiConfig) -> Router {
    state.config = config;
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    // Invoice routes
    let invoice_routes = Router::new()
        .route("/", post(invoices::create_invoice))
        .route("/", get(invoices::list_invoices))
        .route("/:id", get(invoices::get_invoice))
        .route("/:id/void", post(invoices::void_invoice))
        .route("/:id/attempts", get(invoices::list_attempts))
        .route("/:id/create-payment-intent", post(payments::create_payment_intent))
        .route("/:id/confirm-payment", post(payments::confirm_payment));

    // Gateway webhook intake; authenticated by signature, not session
    let webhook_routes = Router::new().route("/payment", post(webhooks::payment_webhook));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1/invoices", invoice_routes)
        .nest("/webhooks", webhook_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
