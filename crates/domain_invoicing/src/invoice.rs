//! Invoice aggregate and status state machine
//!
//! The invoice lifecycle is a closed graph; [`InvoiceStatus::can_transition_to`]
//! is the single source of truth for legal edges and every status change goes
//! through the ledger's compare-and-swap `transition`.
//!
//! # Invariants
//!
//! - At most one payment attempt is in flight per invoice (`active_intent_id`)
//! - `Paid` implies exactly one confirmed attempt; amount, currency and
//!   `paid_at` are immutable afterwards
//! - `version` increments on every transition; stale writers fail

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{AttemptId, ClientId, Currency, InvoiceId, Money, ProjectId};

use crate::error::InvoicingError;

/// Invoice lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Being drafted by the admin; not yet payable
    Draft,
    /// Issued and awaiting payment
    Pending,
    /// A payment attempt is in flight
    Processing,
    /// Settled; terminal
    Paid,
    /// Past due date without payment
    Overdue,
    /// Quarantined after a fatal invariant violation; operator action required
    Failed,
    /// Administratively cancelled; terminal
    Void,
}

impl InvoiceStatus {
    /// Returns true if `self -> to` is a legal lifecycle edge
    ///
    /// These are the only transitions the ledger will ever apply:
    ///
    /// ```text
    /// draft      -> pending
    /// pending    -> processing | overdue
    /// processing -> paid | pending | failed
    /// overdue    -> processing
    /// any except paid, void -> void
    /// ```
    pub fn can_transition_to(&self, to: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        match (self, to) {
            (Draft, Pending) => true,
            (Pending, Processing) => true,
            (Pending, Overdue) => true,
            (Processing, Paid) => true,
            (Processing, Pending) => true,
            (Processing, Failed) => true,
            (Overdue, Processing) => true,
            (Paid, _) | (Void, _) => false,
            (_, Void) => true,
            _ => false,
        }
    }

    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Void)
    }

    /// Returns true if a payment intent may be created in this status
    pub fn is_payable(&self) -> bool {
        matches!(self, InvoiceStatus::Pending | InvoiceStatus::Overdue)
    }
}

/// A billing record for a fixed amount owed by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier
    pub id: InvoiceId,
    /// Human-readable invoice number, unique
    pub invoice_number: String,
    /// Client being billed
    pub client_id: ClientId,
    /// Optional related project
    pub project_id: Option<ProjectId>,
    /// Short description shown on the client dashboard
    pub title: String,
    /// Amount owed; strictly positive, immutable once paid
    pub amount: Money,
    /// Current lifecycle status
    pub status: InvoiceStatus,
    /// Payment due date
    pub due_date: NaiveDate,
    /// The in-flight payment attempt, if any
    pub active_intent_id: Option<AttemptId>,
    /// Set exactly once, on the transition to paid
    pub paid_at: Option<DateTime<Utc>>,
    /// Monotonic counter for optimistic concurrency control
    pub version: u64,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Returns the amount in integer minor units
    pub fn amount_minor_units(&self) -> i64 {
        self.amount.minor_units()
    }

    /// Returns the invoice currency
    pub fn currency(&self) -> Currency {
        self.amount.currency()
    }

    /// Returns true if the invoice is pending and past its due date
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.status == InvoiceStatus::Pending && self.due_date < today
    }
}

/// Data required to create an invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub client_id: ClientId,
    pub project_id: Option<ProjectId>,
    pub title: String,
    pub amount_minor_units: i64,
    pub currency: Currency,
    pub due_date: NaiveDate,
    /// Initial status; only Draft or Pending are accepted
    pub initial_status: InvoiceStatus,
}

impl NewInvoice {
    /// Creates a new-invoice request issued directly into `pending`
    pub fn pending(
        client_id: ClientId,
        title: impl Into<String>,
        amount_minor_units: i64,
        currency: Currency,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            client_id,
            project_id: None,
            title: title.into(),
            amount_minor_units,
            currency,
            due_date,
            initial_status: InvoiceStatus::Pending,
        }
    }

    /// Creates a new-invoice request held in `draft`
    pub fn draft(
        client_id: ClientId,
        title: impl Into<String>,
        amount_minor_units: i64,
        currency: Currency,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            initial_status: InvoiceStatus::Draft,
            ..Self::pending(client_id, title, amount_minor_units, currency, due_date)
        }
    }

    /// Sets the related project
    pub fn with_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Validates the request and materializes the invoice
    ///
    /// # Errors
    ///
    /// Returns a validation error if the amount is not strictly positive,
    /// the title is empty, or the initial status is not draft/pending.
    pub fn into_invoice(self) -> Result<Invoice, InvoicingError> {
        if self.amount_minor_units <= 0 {
            return Err(InvoicingError::validation(format!(
                "amount must be positive, got {} minor units",
                self.amount_minor_units
            )));
        }
        if self.title.trim().is_empty() {
            return Err(InvoicingError::validation("title must not be empty"));
        }
        if !matches!(
            self.initial_status,
            InvoiceStatus::Draft | InvoiceStatus::Pending
        ) {
            return Err(InvoicingError::validation(format!(
                "invoices are created in draft or pending, not {:?}",
                self.initial_status
            )));
        }

        let now = Utc::now();
        Ok(Invoice {
            id: InvoiceId::new_v7(),
            invoice_number: generate_invoice_number(),
            client_id: self.client_id,
            project_id: self.project_id,
            title: self.title,
            amount: Money::from_minor(self.amount_minor_units, self.currency),
            status: self.initial_status,
            due_date: self.due_date,
            active_intent_id: None,
            paid_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Generates a unique invoice number
fn generate_invoice_number() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("INV-{}", duration.as_nanos() % 10_000_000_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn new_pending() -> NewInvoice {
        NewInvoice::pending(
            ClientId::new(),
            "Sprint 4 delivery",
            10_000,
            Currency::USD,
            Utc::now().date_naive() + Days::new(2),
        )
    }

    #[test]
    fn test_create_pending_invoice() {
        let invoice = new_pending().into_invoice().unwrap();

        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.amount_minor_units(), 10_000);
        assert_eq!(invoice.currency(), Currency::USD);
        assert_eq!(invoice.version, 1);
        assert!(invoice.invoice_number.starts_with("INV-"));
        assert!(invoice.active_intent_id.is_none());
        assert!(invoice.paid_at.is_none());
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let mut req = new_pending();
        req.amount_minor_units = 0;
        assert!(matches!(
            req.into_invoice(),
            Err(InvoicingError::Validation(_))
        ));

        let mut req = new_pending();
        req.amount_minor_units = -500;
        assert!(matches!(
            req.into_invoice(),
            Err(InvoicingError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_empty_title() {
        let mut req = new_pending();
        req.title = "  ".to_string();
        assert!(matches!(
            req.into_invoice(),
            Err(InvoicingError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_illegal_initial_status() {
        let mut req = new_pending();
        req.initial_status = InvoiceStatus::Paid;
        assert!(matches!(
            req.into_invoice(),
            Err(InvoicingError::Validation(_))
        ));
    }

    #[test]
    fn test_legal_edges() {
        use InvoiceStatus::*;
        assert!(Draft.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Overdue));
        assert!(Processing.can_transition_to(Paid));
        assert!(Processing.can_transition_to(Pending));
        assert!(Processing.can_transition_to(Failed));
        assert!(Overdue.can_transition_to(Processing));
        assert!(Draft.can_transition_to(Void));
        assert!(Failed.can_transition_to(Void));
    }

    #[test]
    fn test_terminal_states_have_no_edges() {
        use InvoiceStatus::*;
        for to in [Draft, Pending, Processing, Paid, Overdue, Failed, Void] {
            assert!(!Paid.can_transition_to(to));
            assert!(!Void.can_transition_to(to));
        }
    }

    #[test]
    fn test_illegal_edges() {
        use InvoiceStatus::*;
        assert!(!Draft.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Paid));
        assert!(!Overdue.can_transition_to(Paid));
        assert!(!Overdue.can_transition_to(Overdue));
        assert!(!Pending.can_transition_to(Draft));
    }

    #[test]
    fn test_past_due() {
        let mut invoice = new_pending().into_invoice().unwrap();
        invoice.due_date = Utc::now().date_naive() - Days::new(1);

        assert!(invoice.is_past_due(Utc::now().date_naive()));

        invoice.status = InvoiceStatus::Processing;
        assert!(!invoice.is_past_due(Utc::now().date_naive()));
    }
}
