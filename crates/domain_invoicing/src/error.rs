//! Invoicing domain errors

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::invoice::InvoiceStatus;

/// Errors that can occur in the invoicing domain
///
/// The taxonomy mirrors the propagation policy: validation and conflict
/// errors are resolved by the caller (resubmit with fresh data or version),
/// gateway errors surface to the client UI for user-driven retry, not-found
/// errors are defensive rejections, and invariant violations halt processing
/// for the affected invoice.
#[derive(Debug, Error)]
pub enum InvoicingError {
    /// Bad amount, currency, or dates; rejected synchronously
    #[error("Validation error: {0}")]
    Validation(String),

    /// Stale version; the caller must re-read and retry
    #[error("Version conflict on invoice {invoice}: expected {expected}, found {actual}")]
    Conflict {
        invoice: String,
        expected: u64,
        actual: u64,
    },

    /// The requested edge is not in the lifecycle graph
    #[error("Illegal transition for invoice {invoice}: {from:?} -> {to:?}")]
    IllegalTransition {
        invoice: String,
        from: InvoiceStatus,
        to: InvoiceStatus,
    },

    /// Unknown invoice or payment attempt reference
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate unique key (invoice number, gateway intent id)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// External gateway failure; invoice state is not corrupted
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A ledger-level invariant no longer holds; processing for the invoice
    /// is halted and an operator alert is raised. Never auto-corrected.
    #[error("Invariant violation on invoice {invoice}: {message}")]
    InvariantViolation { invoice: String, message: String },

    /// Storage-layer failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl InvoicingError {
    pub fn validation(message: impl Into<String>) -> Self {
        InvoicingError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        InvoicingError::NotFound(message.into())
    }

    /// True when the caller can resolve the error by re-reading and retrying
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, InvoicingError::Conflict { .. })
    }
}
