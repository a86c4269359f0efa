//! Shared test utilities for the billing system
//!
//! Builders for domain objects, a fully scripted gateway adapter, and webhook
//! signing helpers. Used across the workspace's unit and integration tests.

pub mod builders;
pub mod gateway;

pub use builders::InvoiceBuilder;
pub use gateway::{sign_webhook, ScriptedGateway, TEST_WEBHOOK_SECRET};
