//! Payment DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use domain_invoicing::{AttemptStatus, IntentRef, ObservedStatus, PaymentAttempt};

#[derive(Debug, Serialize)]
pub struct PaymentIntentResponse {
    pub invoice_id: Uuid,
    pub attempt_id: Uuid,
    pub gateway_intent_id: Option<String>,
    /// Secret the browser payment agent uses to confirm the intent; only
    /// returned on the call that created the intent
    pub client_secret: Option<String>,
    pub amount_minor_units: i64,
    pub currency: String,
}

impl From<IntentRef> for PaymentIntentResponse {
    fn from(intent: IntentRef) -> Self {
        Self {
            invoice_id: *intent.invoice_id.as_uuid(),
            attempt_id: *intent.attempt_id.as_uuid(),
            gateway_intent_id: intent.gateway_intent_id,
            client_secret: intent.client_secret,
            amount_minor_units: intent.amount_minor_units,
            currency: intent.currency.code().to_string(),
        }
    }
}

/// Client-side report of a payment outcome
#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub gateway_intent_id: String,
    pub status: ObservedStatus,
}

/// Gateway webhook payload
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub intent_id: String,
    pub status: ObservedStatus,
}

#[derive(Debug, Serialize)]
pub struct AttemptResponse {
    pub id: Uuid,
    pub ordinal: u32,
    pub gateway_intent_id: Option<String>,
    pub status: AttemptStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<PaymentAttempt> for AttemptResponse {
    fn from(attempt: PaymentAttempt) -> Self {
        Self {
            id: *attempt.id.as_uuid(),
            ordinal: attempt.ordinal,
            gateway_intent_id: attempt.gateway_intent_id,
            status: attempt.status,
            failure_reason: attempt.failure_reason,
            created_at: attempt.created_at,
            resolved_at: attempt.resolved_at,
        }
    }
}
