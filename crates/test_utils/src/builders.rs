//! Builders for domain objects
//!
//! Fluent builders with sensible defaults so a test only spells out the
//! fields it actually cares about.

use chrono::{Days, NaiveDate, Utc};

use core_kernel::{ClientId, Currency, ProjectId};
use domain_invoicing::{InvoiceStatus, NewInvoice};

/// Builder for [`NewInvoice`] requests
///
/// Defaults: 250.00 USD, due in 14 days, issued directly into `pending`.
#[derive(Debug, Clone)]
pub struct InvoiceBuilder {
    client_id: ClientId,
    project_id: Option<ProjectId>,
    title: String,
    amount_minor_units: i64,
    currency: Currency,
    due_date: NaiveDate,
    initial_status: InvoiceStatus,
}

impl Default for InvoiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InvoiceBuilder {
    pub fn new() -> Self {
        Self {
            client_id: ClientId::new(),
            project_id: None,
            title: "Monthly retainer".to_string(),
            amount_minor_units: 25_000,
            currency: Currency::USD,
            due_date: Utc::now().date_naive() + Days::new(14),
            initial_status: InvoiceStatus::Pending,
        }
    }

    pub fn client(mut self, client_id: ClientId) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn amount(mut self, minor_units: i64, currency: Currency) -> Self {
        self.amount_minor_units = minor_units;
        self.currency = currency;
        self
    }

    pub fn due_on(mut self, due_date: NaiveDate) -> Self {
        self.due_date = due_date;
        self
    }

    /// Sets the due date relative to today; negative means already past due
    pub fn due_in_days(mut self, days: i64) -> Self {
        let today = Utc::now().date_naive();
        self.due_date = if days >= 0 {
            today + Days::new(days as u64)
        } else {
            today - Days::new(days.unsigned_abs())
        };
        self
    }

    pub fn draft(mut self) -> Self {
        self.initial_status = InvoiceStatus::Draft;
        self
    }

    pub fn build(self) -> NewInvoice {
        NewInvoice {
            client_id: self.client_id,
            project_id: self.project_id,
            title: self.title,
            amount_minor_units: self.amount_minor_units,
            currency: self.currency,
            due_date: self.due_date,
            initial_status: self.initial_status,
        }
    }
}
