//! Dual-path payment confirmation
//!
//! Two independent callers report the outcome of one charge: the browser-side
//! payment agent (client report) and the gateway's webhook delivery. Both
//! funnel into [`ConfirmationHandler::reconcile`], which is idempotent and
//! commutative with respect to call order and repetition.
//!
//! The webhook is the sole authoritative source for success: it alone
//! certifies the gateway holds the funds. A client report of success only
//! triggers an immediate verification query against the gateway; it is never
//! trusted on its own.

use std::sync::Arc;

use crate::attempt::{AttemptResolution, AttemptStatus, PaymentAttempt};
use crate::error::InvoicingError;
use crate::gateway::{GatewayClient, IntentState};
use crate::invoice::InvoiceStatus;
use crate::ledger::{InvoiceLedger, TransitionEffects};

/// Who is reporting the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationSource {
    /// The browser-side payment agent; advisory only
    ClientReport,
    /// The gateway's at-least-once webhook delivery; authoritative
    Webhook,
}

/// The outcome being reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedStatus {
    Succeeded,
    Declined,
    Canceled,
}

/// Result of a reconciliation call
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ReconcileOutcome {
    /// The attempt was confirmed and the invoice is paid
    Confirmed { invoice_status: InvoiceStatus },
    /// The attempt failed and the invoice is open for a fresh attempt
    Failed {
        attempt_status: AttemptStatus,
        invoice_status: InvoiceStatus,
    },
    /// The attempt had already been resolved; recorded outcome returned,
    /// no side effects re-applied
    AlreadyResolved { attempt_status: AttemptStatus },
    /// A client success report could not be corroborated by the gateway yet
    VerificationPending,
}

/// Reconciles client reports and gateway webhooks against the ledger
pub struct ConfirmationHandler {
    ledger: Arc<dyn InvoiceLedger>,
    gateway: Arc<dyn GatewayClient>,
}

/// Bounded retries for the invoice CAS after the attempt is resolved; the
/// attempt resolution itself is the uniqueness gate, so contention here is
/// only with unrelated writers (administrative void).
const TRANSITION_RETRIES: u32 = 3;

impl ConfirmationHandler {
    pub fn new(ledger: Arc<dyn InvoiceLedger>, gateway: Arc<dyn GatewayClient>) -> Self {
        Self { ledger, gateway }
    }

    /// Merges one reported outcome into the ledger
    ///
    /// Safe to call any number of times, in any order, from either source:
    /// once an attempt is resolved every further call returns the recorded
    /// outcome without side effects.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the intent does not belong to this ledger (defends
    ///   against forged client reports)
    /// - `InvariantViolation` when a second confirmed attempt would be
    ///   created; the invoice is quarantined and an operator alert raised
    pub async fn reconcile(
        &self,
        gateway_intent_id: &str,
        observed: ObservedStatus,
        source: ConfirmationSource,
    ) -> Result<ReconcileOutcome, InvoicingError> {
        let attempt = self.ledger.attempt_by_intent(gateway_intent_id).await?;

        if attempt.is_resolved() {
            // Redelivery is the recovery path for a crash between the attempt
            // resolution and the invoice transition: finish the invoice side
            // if it is still dangling before reporting the recorded outcome.
            self.heal_partial_resolution(&attempt).await?;
            tracing::debug!(
                gateway_intent_id,
                ?source,
                status = ?attempt.status,
                "reconcile no-op: attempt already resolved"
            );
            return Ok(ReconcileOutcome::AlreadyResolved {
                attempt_status: attempt.status,
            });
        }

        match (source, observed) {
            (ConfirmationSource::Webhook, ObservedStatus::Succeeded) => {
                self.apply_success(&attempt).await
            }
            (ConfirmationSource::ClientReport, ObservedStatus::Succeeded) => {
                self.verify_with_gateway(&attempt, gateway_intent_id).await
            }
            (_, ObservedStatus::Declined) => {
                self.apply_failure(
                    &attempt,
                    AttemptResolution::Declined {
                        reason: Some(format!("declined (reported by {source:?})")),
                    },
                )
                .await
            }
            (_, ObservedStatus::Canceled) => {
                self.apply_failure(
                    &attempt,
                    AttemptResolution::Abandoned {
                        reason: Some("canceled at gateway".to_string()),
                    },
                )
                .await
            }
        }
    }

    /// A client claimed success; ask the gateway before believing anything
    async fn verify_with_gateway(
        &self,
        attempt: &PaymentAttempt,
        gateway_intent_id: &str,
    ) -> Result<ReconcileOutcome, InvoicingError> {
        let state = self.gateway.get_intent_status(gateway_intent_id).await?;
        tracing::debug!(
            gateway_intent_id,
            ?state,
            "verified client success report against gateway"
        );

        match state {
            IntentState::Succeeded => self.apply_success(attempt).await,
            IntentState::Declined => {
                self.apply_failure(
                    attempt,
                    AttemptResolution::Declined {
                        reason: Some("declined (gateway verification)".to_string()),
                    },
                )
                .await
            }
            IntentState::Canceled => {
                self.apply_failure(
                    attempt,
                    AttemptResolution::Abandoned {
                        reason: Some("canceled at gateway".to_string()),
                    },
                )
                .await
            }
            IntentState::Processing | IntentState::RequiresConfirmation => {
                // Not corroborated; leave the attempt in flight. The webhook
                // or a later verification resolves it.
                Ok(ReconcileOutcome::VerificationPending)
            }
        }
    }

    /// Confirms the attempt and settles the invoice
    async fn apply_success(
        &self,
        attempt: &PaymentAttempt,
    ) -> Result<ReconcileOutcome, InvoicingError> {
        self.check_single_confirmation(attempt).await?;

        match self
            .ledger
            .resolve_attempt(attempt.id, AttemptResolution::Confirmed)
            .await
        {
            Ok(_) => {}
            Err(InvoicingError::Conflict { .. }) => {
                // A concurrent reconciler won; return its recorded outcome.
                let current = self.ledger.attempt(attempt.id).await?;
                return Ok(ReconcileOutcome::AlreadyResolved {
                    attempt_status: current.status,
                });
            }
            Err(other) => return Err(other),
        }

        let invoice = self
            .transition_with_retry(
                attempt,
                InvoiceStatus::Processing,
                InvoiceStatus::Paid,
                TransitionEffects::clear_active_intent(),
            )
            .await?;

        tracing::info!(
            invoice_id = %attempt.invoice_id,
            attempt_id = %attempt.id,
            "invoice paid"
        );
        Ok(ReconcileOutcome::Confirmed {
            invoice_status: invoice,
        })
    }

    /// Declines or abandons the attempt and reopens the invoice
    async fn apply_failure(
        &self,
        attempt: &PaymentAttempt,
        resolution: AttemptResolution,
    ) -> Result<ReconcileOutcome, InvoicingError> {
        let attempt_status = resolution.status();
        match self.ledger.resolve_attempt(attempt.id, resolution).await {
            Ok(_) => {}
            Err(InvoicingError::Conflict { .. }) => {
                let current = self.ledger.attempt(attempt.id).await?;
                return Ok(ReconcileOutcome::AlreadyResolved {
                    attempt_status: current.status,
                });
            }
            Err(other) => return Err(other),
        }

        let invoice = self
            .transition_with_retry(
                attempt,
                InvoiceStatus::Processing,
                InvoiceStatus::Pending,
                TransitionEffects::clear_active_intent(),
            )
            .await?;

        tracing::info!(
            invoice_id = %attempt.invoice_id,
            attempt_id = %attempt.id,
            status = ?attempt_status,
            "payment attempt failed; invoice reopened"
        );
        Ok(ReconcileOutcome::Failed {
            attempt_status,
            invoice_status: invoice,
        })
    }

    /// Completes the invoice transition a resolved attempt still owes
    ///
    /// Resolving an attempt and moving its invoice are two writes; a crash
    /// between them leaves the invoice in `Processing` pointing at a resolved
    /// attempt. Nothing else scans for that state, so the at-least-once
    /// redelivery of the confirmation is what converges it.
    async fn heal_partial_resolution(
        &self,
        attempt: &PaymentAttempt,
    ) -> Result<(), InvoicingError> {
        let invoice = self.ledger.get(attempt.invoice_id).await?;
        if invoice.status != InvoiceStatus::Processing
            || invoice.active_intent_id != Some(attempt.id)
        {
            return Ok(());
        }

        let to = match attempt.status {
            AttemptStatus::Confirmed => InvoiceStatus::Paid,
            _ => InvoiceStatus::Pending,
        };
        tracing::warn!(
            invoice_id = %attempt.invoice_id,
            attempt_id = %attempt.id,
            attempt_status = ?attempt.status,
            "resolved attempt left its invoice processing; completing the transition"
        );
        self.transition_with_retry(
            attempt,
            InvoiceStatus::Processing,
            to,
            TransitionEffects::clear_active_intent(),
        )
        .await?;
        Ok(())
    }

    /// Fatal check: a second confirmed attempt on one invoice is never
    /// auto-corrected. The invoice is quarantined and an alert raised.
    async fn check_single_confirmation(
        &self,
        attempt: &PaymentAttempt,
    ) -> Result<(), InvoicingError> {
        let siblings = self.ledger.attempts_for_invoice(attempt.invoice_id).await?;
        let confirmed = siblings
            .iter()
            .find(|a| a.id != attempt.id && a.status == AttemptStatus::Confirmed);

        if let Some(existing) = confirmed {
            tracing::error!(
                invoice_id = %attempt.invoice_id,
                confirmed_attempt = %existing.id,
                conflicting_attempt = %attempt.id,
                "OPERATOR ALERT: second confirmation for an already-paid invoice; halting processing"
            );
            let invoice = self.ledger.get(attempt.invoice_id).await?;
            if invoice.status == InvoiceStatus::Processing {
                // Quarantine so nothing else touches this invoice until an
                // operator decides the correct financial outcome.
                if let Err(err) = self
                    .ledger
                    .transition(
                        invoice.id,
                        InvoiceStatus::Processing,
                        InvoiceStatus::Failed,
                        invoice.version,
                        TransitionEffects::clear_active_intent(),
                    )
                    .await
                {
                    tracing::warn!(
                        invoice_id = %invoice.id,
                        error = %err,
                        "quarantine transition lost a race; invoice not moved to failed"
                    );
                }
            }
            return Err(InvoicingError::InvariantViolation {
                invoice: attempt.invoice_id.to_string(),
                message: format!(
                    "attempt {} is already confirmed; refusing to confirm {}",
                    existing.id, attempt.id
                ),
            });
        }
        Ok(())
    }

    /// Applies the invoice transition, absorbing benign version races
    async fn transition_with_retry(
        &self,
        attempt: &PaymentAttempt,
        from: InvoiceStatus,
        to: InvoiceStatus,
        effects: TransitionEffects,
    ) -> Result<InvoiceStatus, InvoicingError> {
        let mut last_conflict = None;
        for _ in 0..TRANSITION_RETRIES {
            let invoice = self.ledger.get(attempt.invoice_id).await?;
            if invoice.status != from {
                // Someone else completed the move (or voided the invoice);
                // the attempt resolution already holds, so report where the
                // invoice actually landed.
                return Ok(invoice.status);
            }
            match self
                .ledger
                .transition(invoice.id, from, to, invoice.version, effects)
                .await
            {
                Ok(updated) => return Ok(updated.status),
                Err(err @ InvoicingError::Conflict { .. }) => {
                    last_conflict = Some(err);
                }
                Err(other) => return Err(other),
            }
        }
        Err(last_conflict.unwrap_or_else(|| InvoicingError::Conflict {
            invoice: attempt.invoice_id.to_string(),
            expected: 0,
            actual: 0,
        }))
    }
}
