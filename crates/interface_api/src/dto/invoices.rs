//! Invoice DTOs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use domain_invoicing::{Invoice, InvoiceStatus};

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub amount_minor_units: i64,
    /// ISO 4217 code, e.g. "USD"
    pub currency: String,
    pub due_date: NaiveDate,
    /// Hold the invoice in draft instead of issuing it immediately
    #[serde(default)]
    pub draft: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub client_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub amount_minor_units: i64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub due_date: NaiveDate,
    pub active_intent_id: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: *invoice.id.as_uuid(),
            invoice_number: invoice.invoice_number.clone(),
            client_id: *invoice.client_id.as_uuid(),
            project_id: invoice.project_id.map(|p| *p.as_uuid()),
            title: invoice.title.clone(),
            amount_minor_units: invoice.amount_minor_units(),
            currency: invoice.currency().code().to_string(),
            status: invoice.status,
            due_date: invoice.due_date,
            active_intent_id: invoice.active_intent_id.map(|a| *a.as_uuid()),
            paid_at: invoice.paid_at,
            version: invoice.version,
            created_at: invoice.created_at,
        }
    }
}
