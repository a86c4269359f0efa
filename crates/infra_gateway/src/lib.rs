//! Payment gateway adapter
//!
//! Implements the invoicing domain's `GatewayClient` port against a REST
//! payment processor, plus HMAC-SHA256 verification for its webhook
//! deliveries.

pub mod rest;
pub mod signature;

pub use rest::{GatewayConfig, RestGateway};
pub use signature::WebhookVerifier;
