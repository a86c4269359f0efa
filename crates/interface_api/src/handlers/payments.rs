//! Payment intent and confirmation handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use core_kernel::InvoiceId;
use domain_invoicing::{ConfirmationSource, ReconcileOutcome};

use crate::dto::payments::{ConfirmPaymentRequest, PaymentIntentResponse};
use crate::error::ApiError;
use crate::AppState;

/// Creates a payment intent for an invoice, or returns the in-flight one
///
/// Safe against double-clicks and retries: while an attempt is unresolved the
/// same intent is handed back and no second gateway charge can be set up.
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentIntentResponse>, ApiError> {
    let intent = state
        .orchestrator
        .create_or_reuse_intent(InvoiceId::from_uuid(id))
        .await?;
    Ok(Json(intent.into()))
}

/// Accepts the browser payment agent's report of the payment outcome
///
/// Success reports are advisory: the gateway is queried before the invoice is
/// marked paid, so a forged or premature report cannot settle anything.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<ReconcileOutcome>, ApiError> {
    let invoice_id = InvoiceId::from_uuid(id);
    let attempt = state
        .ledger
        .attempt_by_intent(&request.gateway_intent_id)
        .await?;
    if attempt.invoice_id != invoice_id {
        // The intent exists but belongs to another invoice; treat as unknown
        return Err(ApiError::NotFound(format!(
            "gateway intent {} for invoice {invoice_id}",
            request.gateway_intent_id
        )));
    }

    let outcome = state
        .confirmations
        .reconcile(
            &request.gateway_intent_id,
            request.status,
            ConfirmationSource::ClientReport,
        )
        .await?;
    Ok(Json(outcome))
}
