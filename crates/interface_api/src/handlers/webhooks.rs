//! Gateway webhook intake
//!
//! Deliveries are authenticated by HMAC signature over the raw body, checked
//! before any parsing. The gateway retries with at-least-once semantics, so
//! the handler must treat duplicates as success.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};

use domain_invoicing::{ConfirmationSource, InvoicingError, ReconcileOutcome};

use crate::dto::payments::WebhookEvent;
use crate::error::ApiError;
use crate::AppState;

/// Signature header set by the gateway on every delivery
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

/// Receives a payment event from the gateway
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ReconcileOutcome>), ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing webhook signature".to_string()))?;

    if let Err(err) = state.gateway.verify_webhook_signature(&body, signature) {
        tracing::warn!(error = %err, "rejected webhook with bad signature");
        return Err(err.into());
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("malformed webhook payload: {e}")))?;

    let outcome = state
        .confirmations
        .reconcile(&event.intent_id, event.status, ConfirmationSource::Webhook)
        .await
        .map_err(|err| {
            if matches!(err, InvoicingError::NotFound(_)) {
                // An intent this ledger never issued; logged for the operator,
                // 404 tells the gateway not to keep retrying forever
                tracing::warn!(
                    intent_id = %event.intent_id,
                    "webhook for unknown gateway intent"
                );
            }
            ApiError::from(err)
        })?;

    Ok((StatusCode::OK, Json(outcome)))
}
