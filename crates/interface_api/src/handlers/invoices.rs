//! Invoice handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use core_kernel::{ClientId, InvoiceId, ProjectId};
use domain_invoicing::{InvoiceStatus, NewInvoice, TransitionEffects};

use crate::dto::invoices::{CreateInvoiceRequest, InvoiceResponse, ListInvoicesQuery};
use crate::dto::payments::AttemptResponse;
use crate::error::ApiError;
use crate::AppState;

/// Creates an invoice
///
/// Issued directly into `pending` unless the request asks for a draft.
pub async fn create_invoice(
    State(state): State<AppState>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), ApiError> {
    let currency = request
        .currency
        .parse()
        .map_err(|e| ApiError::Validation(format!("{e}")))?;

    let mut new = if request.draft {
        NewInvoice::draft(
            ClientId::from_uuid(request.client_id),
            request.title,
            request.amount_minor_units,
            currency,
            request.due_date,
        )
    } else {
        NewInvoice::pending(
            ClientId::from_uuid(request.client_id),
            request.title,
            request.amount_minor_units,
            currency,
            request.due_date,
        )
    };
    if let Some(project_id) = request.project_id {
        new = new.with_project(ProjectId::from_uuid(project_id));
    }

    let invoice = state.ledger.create(new).await?;
    tracing::info!(
        invoice_id = %invoice.id,
        invoice_number = %invoice.invoice_number,
        "invoice created"
    );
    Ok((StatusCode::CREATED, Json(invoice.into())))
}

/// Gets an invoice by id
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let invoice = state.ledger.get(InvoiceId::from_uuid(id)).await?;
    Ok(Json(invoice.into()))
}

/// Lists a client's invoices, newest first
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Vec<InvoiceResponse>>, ApiError> {
    let invoices = state
        .ledger
        .list_by_client(ClientId::from_uuid(query.client_id))
        .await?;
    Ok(Json(invoices.into_iter().map(Into::into).collect()))
}

/// Lists an invoice's payment attempts, oldest first
pub async fn list_attempts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AttemptResponse>>, ApiError> {
    let invoice_id = InvoiceId::from_uuid(id);
    // 404 for unknown invoices rather than an empty list
    state.ledger.get(invoice_id).await?;
    let attempts = state.ledger.attempts_for_invoice(invoice_id).await?;
    Ok(Json(attempts.into_iter().map(Into::into).collect()))
}

/// Administratively cancels an invoice
///
/// Legal from any non-terminal status; paid invoices cannot be voided.
pub async fn void_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let invoice_id = InvoiceId::from_uuid(id);
    let invoice = state.ledger.get(invoice_id).await?;

    let voided = state
        .ledger
        .transition(
            invoice_id,
            invoice.status,
            InvoiceStatus::Void,
            invoice.version,
            TransitionEffects::clear_active_intent(),
        )
        .await?;
    tracing::info!(invoice_id = %voided.id, "invoice voided");
    Ok(Json(voided.into()))
}
