//! Invoicing domain
//!
//! This crate owns the invoice payment-confirmation protocol:
//!
//! - The invoice aggregate and its status state machine
//! - Payment attempts mirroring external gateway payment intents
//! - The [`InvoiceLedger`] port with a compare-and-swap `transition` as the
//!   single synchronization point for status changes
//! - The payment intent orchestrator (one in-flight attempt per invoice,
//!   deterministic idempotency keys)
//! - The confirmation handler reconciling client reports and gateway
//!   webhooks into one authoritative outcome
//! - The overdue and abandonment sweeps
//!
//! Persistence adapters implement [`InvoiceLedger`]; callers depend only on
//! the trait. An in-memory implementation lives here for tests and local use.

pub mod attempt;
pub mod error;
pub mod gateway;
pub mod invoice;
pub mod ledger;
pub mod orchestrator;
pub mod reconcile;
pub mod sweeper;

pub use attempt::{AttemptResolution, AttemptStatus, PaymentAttempt};
pub use error::InvoicingError;
pub use gateway::{GatewayClient, GatewayError, GatewayIntent, IntentState, SignatureError};
pub use invoice::{Invoice, InvoiceStatus, NewInvoice};
pub use ledger::{ActiveIntentChange, InMemoryLedger, InvoiceLedger, TransitionEffects};
pub use orchestrator::{IntentRef, PaymentIntentOrchestrator};
pub use reconcile::{ConfirmationHandler, ConfirmationSource, ObservedStatus, ReconcileOutcome};
pub use sweeper::{OverdueSweeper, SweepReport, SweeperConfig};
