//! Invoice ledger port and in-memory implementation
//!
//! The ledger is the durable store of invoices and payment attempts and the
//! sole synchronization point for status changes: `transition` is an atomic
//! compare-and-swap on (status, version), and no direct status setter exists.
//!
//! Two implementations exist: the persistent PostgreSQL adapter in
//! `infra_db` and the [`InMemoryLedger`] here, used by tests and local runs.
//! Callers depend only on the trait.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use core_kernel::{AttemptId, ClientId, InvoiceId};

use crate::attempt::{AttemptResolution, AttemptStatus, PaymentAttempt};
use crate::error::InvoicingError;
use crate::invoice::{Invoice, InvoiceStatus, NewInvoice};

/// Requested change to an invoice's active intent reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveIntentChange {
    /// Point the invoice at a newly created attempt
    Set(AttemptId),
    /// Drop the reference (attempt resolved or abandoned)
    Clear,
}

/// Side effects applied atomically with a status transition
///
/// `paid_at` is not listed here: the ledger itself stamps it when the target
/// status is `Paid`, which keeps it impossible to set any other way.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionEffects {
    pub active_intent: Option<ActiveIntentChange>,
}

impl TransitionEffects {
    /// No side effects beyond the status change itself
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the active intent reference
    pub fn set_active_intent(attempt_id: AttemptId) -> Self {
        Self {
            active_intent: Some(ActiveIntentChange::Set(attempt_id)),
        }
    }

    /// Clears the active intent reference
    pub fn clear_active_intent() -> Self {
        Self {
            active_intent: Some(ActiveIntentChange::Clear),
        }
    }
}

/// Durable store of invoices and their payment attempts
#[async_trait]
pub trait InvoiceLedger: Send + Sync {
    /// Validates and persists a new invoice
    async fn create(&self, new: NewInvoice) -> Result<Invoice, InvoicingError>;

    /// Fetches an invoice by id
    async fn get(&self, id: InvoiceId) -> Result<Invoice, InvoicingError>;

    /// Lists a client's invoices, newest first
    async fn list_by_client(&self, client_id: ClientId) -> Result<Vec<Invoice>, InvoicingError>;

    /// Lists pending invoices due strictly before `cutoff`, bounded by `limit`
    async fn list_due_before(
        &self,
        cutoff: NaiveDate,
        limit: u32,
    ) -> Result<Vec<Invoice>, InvoicingError>;

    /// Atomically moves an invoice along a legal lifecycle edge
    ///
    /// Compare-and-swap semantics: the stored invoice must currently have
    /// exactly `from` status and `expected_version`, otherwise a conflict is
    /// returned and nothing changes. On success the version increments and
    /// `effects` are applied in the same atomic step.
    async fn transition(
        &self,
        id: InvoiceId,
        from: InvoiceStatus,
        to: InvoiceStatus,
        expected_version: u64,
        effects: TransitionEffects,
    ) -> Result<Invoice, InvoicingError>;

    /// Persists a new payment attempt
    async fn insert_attempt(
        &self,
        attempt: PaymentAttempt,
    ) -> Result<PaymentAttempt, InvoicingError>;

    /// Fetches an attempt by id
    async fn attempt(&self, id: AttemptId) -> Result<PaymentAttempt, InvoicingError>;

    /// Fetches an attempt by its gateway intent handle
    async fn attempt_by_intent(
        &self,
        gateway_intent_id: &str,
    ) -> Result<PaymentAttempt, InvoicingError>;

    /// Lists all attempts recorded against an invoice, oldest first
    async fn attempts_for_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<PaymentAttempt>, InvoicingError>;

    /// Records the gateway-assigned intent handle on an attempt
    async fn assign_gateway_intent(
        &self,
        attempt_id: AttemptId,
        gateway_intent_id: &str,
    ) -> Result<PaymentAttempt, InvoicingError>;

    /// Resolves an attempt; only legal while it is still `Created`
    ///
    /// Concurrent resolvers race on this compare-and-swap: exactly one wins,
    /// the others observe a conflict and must re-read the recorded outcome.
    async fn resolve_attempt(
        &self,
        attempt_id: AttemptId,
        resolution: AttemptResolution,
    ) -> Result<PaymentAttempt, InvoicingError>;

    /// Lists unresolved attempts created before `cutoff`, bounded by `limit`
    async fn list_stale_attempts(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PaymentAttempt>, InvoicingError>;
}

/// In-memory ledger
///
/// A single mutex over both maps makes every operation atomic, which is all
/// the CAS contract requires. Suitable for tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    invoices: HashMap<InvoiceId, Invoice>,
    attempts: HashMap<AttemptId, PaymentAttempt>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceLedger for InMemoryLedger {
    async fn create(&self, new: NewInvoice) -> Result<Invoice, InvoicingError> {
        let invoice = new.into_invoice()?;
        let mut state = self.state.lock().await;
        if state
            .invoices
            .values()
            .any(|i| i.invoice_number == invoice.invoice_number)
        {
            return Err(InvoicingError::AlreadyExists(format!(
                "invoice number {}",
                invoice.invoice_number
            )));
        }
        state.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn get(&self, id: InvoiceId) -> Result<Invoice, InvoicingError> {
        let state = self.state.lock().await;
        state
            .invoices
            .get(&id)
            .cloned()
            .ok_or_else(|| InvoicingError::not_found(format!("invoice {id}")))
    }

    async fn list_by_client(&self, client_id: ClientId) -> Result<Vec<Invoice>, InvoicingError> {
        let state = self.state.lock().await;
        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| i.client_id == client_id)
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invoices)
    }

    async fn list_due_before(
        &self,
        cutoff: NaiveDate,
        limit: u32,
    ) -> Result<Vec<Invoice>, InvoicingError> {
        let state = self.state.lock().await;
        let mut due: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| i.status == InvoiceStatus::Pending && i.due_date < cutoff)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn transition(
        &self,
        id: InvoiceId,
        from: InvoiceStatus,
        to: InvoiceStatus,
        expected_version: u64,
        effects: TransitionEffects,
    ) -> Result<Invoice, InvoicingError> {
        if !from.can_transition_to(to) {
            return Err(InvoicingError::IllegalTransition {
                invoice: id.to_string(),
                from,
                to,
            });
        }

        let mut state = self.state.lock().await;
        let invoice = state
            .invoices
            .get_mut(&id)
            .ok_or_else(|| InvoicingError::not_found(format!("invoice {id}")))?;

        if invoice.status != from || invoice.version != expected_version {
            return Err(InvoicingError::Conflict {
                invoice: id.to_string(),
                expected: expected_version,
                actual: invoice.version,
            });
        }

        let now = Utc::now();
        invoice.status = to;
        invoice.version += 1;
        invoice.updated_at = now;
        if to == InvoiceStatus::Paid {
            invoice.paid_at = Some(now);
        }
        match effects.active_intent {
            Some(ActiveIntentChange::Set(attempt_id)) => {
                invoice.active_intent_id = Some(attempt_id)
            }
            Some(ActiveIntentChange::Clear) => invoice.active_intent_id = None,
            None => {}
        }

        Ok(invoice.clone())
    }

    async fn insert_attempt(
        &self,
        attempt: PaymentAttempt,
    ) -> Result<PaymentAttempt, InvoicingError> {
        let mut state = self.state.lock().await;
        if !state.invoices.contains_key(&attempt.invoice_id) {
            return Err(InvoicingError::not_found(format!(
                "invoice {}",
                attempt.invoice_id
            )));
        }
        if state.attempts.contains_key(&attempt.id) {
            return Err(InvoicingError::AlreadyExists(format!(
                "attempt {}",
                attempt.id
            )));
        }
        // Ordinal uniqueness matches the relational schema: two callers racing
        // to open attempt N collide here, and the loser joins the winner.
        if state
            .attempts
            .values()
            .any(|a| a.invoice_id == attempt.invoice_id && a.ordinal == attempt.ordinal)
        {
            return Err(InvoicingError::AlreadyExists(format!(
                "attempt ordinal {} for invoice {}",
                attempt.ordinal, attempt.invoice_id
            )));
        }
        state.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    async fn attempt(&self, id: AttemptId) -> Result<PaymentAttempt, InvoicingError> {
        let state = self.state.lock().await;
        state
            .attempts
            .get(&id)
            .cloned()
            .ok_or_else(|| InvoicingError::not_found(format!("attempt {id}")))
    }

    async fn attempt_by_intent(
        &self,
        gateway_intent_id: &str,
    ) -> Result<PaymentAttempt, InvoicingError> {
        let state = self.state.lock().await;
        state
            .attempts
            .values()
            .find(|a| a.gateway_intent_id.as_deref() == Some(gateway_intent_id))
            .cloned()
            .ok_or_else(|| {
                InvoicingError::not_found(format!("gateway intent {gateway_intent_id}"))
            })
    }

    async fn attempts_for_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<PaymentAttempt>, InvoicingError> {
        let state = self.state.lock().await;
        let mut attempts: Vec<PaymentAttempt> = state
            .attempts
            .values()
            .filter(|a| a.invoice_id == invoice_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.ordinal);
        Ok(attempts)
    }

    async fn assign_gateway_intent(
        &self,
        attempt_id: AttemptId,
        gateway_intent_id: &str,
    ) -> Result<PaymentAttempt, InvoicingError> {
        let mut state = self.state.lock().await;
        if state
            .attempts
            .values()
            .any(|a| a.id != attempt_id && a.gateway_intent_id.as_deref() == Some(gateway_intent_id))
        {
            return Err(InvoicingError::AlreadyExists(format!(
                "gateway intent {gateway_intent_id}"
            )));
        }
        let attempt = state
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| InvoicingError::not_found(format!("attempt {attempt_id}")))?;
        attempt.gateway_intent_id = Some(gateway_intent_id.to_string());
        Ok(attempt.clone())
    }

    async fn resolve_attempt(
        &self,
        attempt_id: AttemptId,
        resolution: AttemptResolution,
    ) -> Result<PaymentAttempt, InvoicingError> {
        let mut state = self.state.lock().await;
        let attempt = state
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| InvoicingError::not_found(format!("attempt {attempt_id}")))?;

        if attempt.status != AttemptStatus::Created {
            return Err(InvoicingError::Conflict {
                invoice: attempt.invoice_id.to_string(),
                expected: 0,
                actual: 0,
            });
        }

        attempt.status = resolution.status();
        attempt.failure_reason = resolution.failure_reason().map(str::to_string);
        attempt.resolved_at = Some(Utc::now());
        Ok(attempt.clone())
    }

    async fn list_stale_attempts(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PaymentAttempt>, InvoicingError> {
        let state = self.state.lock().await;
        let mut stale: Vec<PaymentAttempt> = state
            .attempts
            .values()
            .filter(|a| a.status == AttemptStatus::Created && a.created_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|a| a.created_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;
    use core_kernel::Currency;

    fn new_pending() -> NewInvoice {
        NewInvoice::pending(
            ClientId::new(),
            "Retainer",
            25_000,
            Currency::USD,
            Utc::now().date_naive() + Days::new(14),
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let ledger = InMemoryLedger::new();
        let invoice = ledger.create(new_pending()).await.unwrap();

        let fetched = ledger.get(invoice.id).await.unwrap();
        assert_eq!(fetched.invoice_number, invoice.invoice_number);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_amount() {
        let ledger = InMemoryLedger::new();
        let mut req = new_pending();
        req.amount_minor_units = -1;

        assert!(matches!(
            ledger.create(req).await,
            Err(InvoicingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_transition_cas_success() {
        let ledger = InMemoryLedger::new();
        let invoice = ledger.create(new_pending()).await.unwrap();

        let updated = ledger
            .transition(
                invoice.id,
                InvoiceStatus::Pending,
                InvoiceStatus::Processing,
                invoice.version,
                TransitionEffects::none(),
            )
            .await
            .unwrap();

        assert_eq!(updated.status, InvoiceStatus::Processing);
        assert_eq!(updated.version, invoice.version + 1);
    }

    #[tokio::test]
    async fn test_transition_stale_version_conflicts() {
        let ledger = InMemoryLedger::new();
        let invoice = ledger.create(new_pending()).await.unwrap();

        ledger
            .transition(
                invoice.id,
                InvoiceStatus::Pending,
                InvoiceStatus::Processing,
                invoice.version,
                TransitionEffects::none(),
            )
            .await
            .unwrap();

        // Replaying with the old version must fail, not overwrite
        let result = ledger
            .transition(
                invoice.id,
                InvoiceStatus::Pending,
                InvoiceStatus::Processing,
                invoice.version,
                TransitionEffects::none(),
            )
            .await;
        assert!(matches!(result, Err(InvoicingError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_transition_rejects_illegal_edge() {
        let ledger = InMemoryLedger::new();
        let invoice = ledger.create(new_pending()).await.unwrap();

        let result = ledger
            .transition(
                invoice.id,
                InvoiceStatus::Pending,
                InvoiceStatus::Paid,
                invoice.version,
                TransitionEffects::none(),
            )
            .await;
        assert!(matches!(
            result,
            Err(InvoicingError::IllegalTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_paid_at_stamped_on_paid() {
        let ledger = InMemoryLedger::new();
        let invoice = ledger.create(new_pending()).await.unwrap();

        let processing = ledger
            .transition(
                invoice.id,
                InvoiceStatus::Pending,
                InvoiceStatus::Processing,
                invoice.version,
                TransitionEffects::none(),
            )
            .await
            .unwrap();
        let paid = ledger
            .transition(
                invoice.id,
                InvoiceStatus::Processing,
                InvoiceStatus::Paid,
                processing.version,
                TransitionEffects::clear_active_intent(),
            )
            .await
            .unwrap();

        assert!(paid.paid_at.is_some());
        assert!(paid.active_intent_id.is_none());
    }

    #[tokio::test]
    async fn test_attempt_resolution_is_one_way() {
        let ledger = InMemoryLedger::new();
        let invoice = ledger.create(new_pending()).await.unwrap();
        let attempt = ledger
            .insert_attempt(PaymentAttempt::new(invoice.id, 1))
            .await
            .unwrap();

        ledger
            .resolve_attempt(attempt.id, AttemptResolution::Confirmed)
            .await
            .unwrap();

        let second = ledger
            .resolve_attempt(
                attempt.id,
                AttemptResolution::Declined { reason: None },
            )
            .await;
        assert!(matches!(second, Err(InvoicingError::Conflict { .. })));

        let stored = ledger.attempt(attempt.id).await.unwrap();
        assert_eq!(stored.status, AttemptStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_duplicate_attempt_ordinal_rejected() {
        let ledger = InMemoryLedger::new();
        let invoice = ledger.create(new_pending()).await.unwrap();
        ledger
            .insert_attempt(PaymentAttempt::new(invoice.id, 1))
            .await
            .unwrap();

        let dup = ledger.insert_attempt(PaymentAttempt::new(invoice.id, 1)).await;
        assert!(matches!(dup, Err(InvoicingError::AlreadyExists(_))));

        // A different invoice may of course reuse the ordinal
        let other = ledger.create(new_pending()).await.unwrap();
        ledger
            .insert_attempt(PaymentAttempt::new(other.id, 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_attempt_by_intent() {
        let ledger = InMemoryLedger::new();
        let invoice = ledger.create(new_pending()).await.unwrap();
        let attempt = ledger
            .insert_attempt(PaymentAttempt::new(invoice.id, 1))
            .await
            .unwrap();
        ledger
            .assign_gateway_intent(attempt.id, "pi_123")
            .await
            .unwrap();

        let found = ledger.attempt_by_intent("pi_123").await.unwrap();
        assert_eq!(found.id, attempt.id);

        assert!(matches!(
            ledger.attempt_by_intent("pi_unknown").await,
            Err(InvoicingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_gateway_intent_rejected() {
        let ledger = InMemoryLedger::new();
        let invoice = ledger.create(new_pending()).await.unwrap();
        let a = ledger
            .insert_attempt(PaymentAttempt::new(invoice.id, 1))
            .await
            .unwrap();
        let b = ledger
            .insert_attempt(PaymentAttempt::new(invoice.id, 2))
            .await
            .unwrap();

        ledger.assign_gateway_intent(a.id, "pi_dup").await.unwrap();
        assert!(matches!(
            ledger.assign_gateway_intent(b.id, "pi_dup").await,
            Err(InvoicingError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_list_due_before() {
        let ledger = InMemoryLedger::new();
        let today = Utc::now().date_naive();

        let mut overdue_req = new_pending();
        overdue_req.due_date = today - Days::new(1);
        let overdue = ledger.create(overdue_req).await.unwrap();

        let _current = ledger.create(new_pending()).await.unwrap();

        let due = ledger.list_due_before(today, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, overdue.id);
    }
}
