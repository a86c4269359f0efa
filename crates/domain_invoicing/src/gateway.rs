//! Gateway client port
//!
//! The card-capture and tokenization machinery is an external black box. The
//! domain only depends on this capability trait; any conforming payment
//! processor adapter can be substituted (the REST adapter in `infra_gateway`,
//! the scripted one in `test_utils`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::Money;

/// Gateway-side view of a payment intent's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
    /// Awaiting client-side confirmation
    RequiresConfirmation,
    /// The gateway is processing the charge
    Processing,
    /// The gateway holds the funds
    Succeeded,
    /// The charge was declined
    Declined,
    /// The intent was cancelled gateway-side
    Canceled,
}

/// A payment intent as reported by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayIntent {
    /// Gateway-assigned intent handle
    pub intent_id: String,
    /// Secret the browser-side payment agent uses to confirm the intent
    pub client_secret: String,
    /// State at the time of the call
    pub state: IntentState,
}

/// Errors surfaced by gateway adapters
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway rejected the request outright
    #[error("Gateway rejected request: {0}")]
    Rejected(String),

    /// The call did not complete within the bounded timeout
    #[error("Gateway call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Transport-level failure reaching the gateway
    #[error("Gateway transport error: {0}")]
    Transport(String),

    /// The gateway does not know the referenced intent
    #[error("Unknown gateway intent: {0}")]
    UnknownIntent(String),
}

impl GatewayError {
    /// Returns true if the failure may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. } | GatewayError::Transport(_)
        )
    }
}

/// A forged or malformed webhook signature
///
/// Signature failures are dropped and logged, never retried by this system;
/// the gateway's own at-least-once delivery resends a correctly signed copy.
#[derive(Debug, Error)]
#[error("Webhook signature verification failed: {0}")]
pub struct SignatureError(pub String);

/// External payment processor capability
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Creates a payment intent for the given amount
    ///
    /// `idempotency_key` must be deterministic per attempt: the gateway
    /// deduplicates on it, so a network-level retry cannot create a second
    /// gateway-side intent.
    async fn create_intent(
        &self,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<GatewayIntent, GatewayError>;

    /// Confirms an intent (used by server-side confirmation flows)
    async fn confirm_intent(&self, intent_id: &str) -> Result<IntentState, GatewayError>;

    /// Queries the current state of an intent
    async fn get_intent_status(&self, intent_id: &str) -> Result<IntentState, GatewayError>;

    /// Verifies a webhook delivery's signature over the raw body bytes
    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<(), SignatureError>;
}
