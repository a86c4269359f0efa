//! Payment intent orchestrator
//!
//! Creates or reuses a gateway payment intent for an invoice while enforcing
//! the one-in-flight-attempt rule. The invoice is CAS-claimed into
//! `Processing` before the gateway is called, so concurrent callers cannot
//! both reach the gateway: the loser of the claim race observes the conflict,
//! re-reads, and returns the winner's intent.

use std::sync::Arc;
use std::time::Duration;

use core_kernel::{Currency, InvoiceId};

use crate::attempt::{AttemptResolution, AttemptStatus, PaymentAttempt};
use crate::error::InvoicingError;
use crate::gateway::{GatewayClient, GatewayError};
use crate::invoice::{Invoice, InvoiceStatus};
use crate::ledger::{InvoiceLedger, TransitionEffects};

/// Default bound on the gateway create call
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle returned to the client dashboard for the browser payment agent
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IntentRef {
    pub invoice_id: InvoiceId,
    pub attempt_id: core_kernel::AttemptId,
    /// Gateway intent handle; absent if the create call timed out before the
    /// gateway answered (the abandonment sweep is the recovery path)
    pub gateway_intent_id: Option<String>,
    /// Secret the payment agent needs to confirm the intent gateway-side
    pub client_secret: Option<String>,
    pub amount_minor_units: i64,
    pub currency: Currency,
}

/// Orchestrates payment intent creation against the gateway
pub struct PaymentIntentOrchestrator {
    ledger: Arc<dyn InvoiceLedger>,
    gateway: Arc<dyn GatewayClient>,
    gateway_timeout: Duration,
}

impl PaymentIntentOrchestrator {
    pub fn new(ledger: Arc<dyn InvoiceLedger>, gateway: Arc<dyn GatewayClient>) -> Self {
        Self {
            ledger,
            gateway,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    /// Overrides the bounded timeout for gateway create calls
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    /// Creates a payment intent for the invoice, or returns the in-flight one
    ///
    /// Idempotent with respect to repeated client calls (double-click,
    /// retry-after-timeout): while an attempt is unresolved the same intent
    /// is handed back and the gateway is not called again.
    ///
    /// # Errors
    ///
    /// - `NotFound` for unknown invoices
    /// - `Conflict` when the invoice is not payable and has no in-flight
    ///   attempt (e.g. already paid or void)
    /// - `Gateway` when the external create call fails outright
    pub async fn create_or_reuse_intent(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<IntentRef, InvoicingError> {
        let invoice = self.ledger.get(invoice_id).await?;

        match invoice.status {
            InvoiceStatus::Processing => self.reuse_in_flight(&invoice).await,
            status if status.is_payable() => self.create_new_intent(invoice).await,
            status => Err(InvoicingError::IllegalTransition {
                invoice: invoice_id.to_string(),
                from: status,
                to: InvoiceStatus::Processing,
            }),
        }
    }

    /// Returns the existing unresolved attempt's intent
    async fn reuse_in_flight(&self, invoice: &Invoice) -> Result<IntentRef, InvoicingError> {
        let attempt_id = invoice.active_intent_id.ok_or_else(|| {
            InvoicingError::InvariantViolation {
                invoice: invoice.id.to_string(),
                message: "processing invoice has no active intent".to_string(),
            }
        })?;
        let attempt = self.ledger.attempt(attempt_id).await?;

        if attempt.status != AttemptStatus::Created {
            // The attempt resolved between our reads; the reconciler owns
            // the invoice now, so the caller must re-read and retry.
            return Err(InvoicingError::Conflict {
                invoice: invoice.id.to_string(),
                expected: invoice.version,
                actual: invoice.version,
            });
        }

        tracing::debug!(
            invoice_id = %invoice.id,
            attempt_id = %attempt.id,
            "reusing in-flight payment intent"
        );
        Ok(self.intent_ref(invoice, &attempt, None))
    }

    /// Claims the invoice and makes the single gateway create call
    async fn create_new_intent(&self, invoice: Invoice) -> Result<IntentRef, InvoicingError> {
        let ordinal = self.ledger.attempts_for_invoice(invoice.id).await?.len() as u32 + 1;
        let attempt = match self
            .ledger
            .insert_attempt(PaymentAttempt::new(invoice.id, ordinal))
            .await
        {
            Ok(attempt) => attempt,
            Err(InvoicingError::AlreadyExists(_)) => {
                // A concurrent caller inserted this ordinal between our reads;
                // that caller owns the claim. Join its attempt instead.
                let current = self.ledger.get(invoice.id).await?;
                if current.status == InvoiceStatus::Processing {
                    return self.reuse_in_flight(&current).await;
                }
                return Err(InvoicingError::Conflict {
                    invoice: invoice.id.to_string(),
                    expected: invoice.version,
                    actual: current.version,
                });
            }
            Err(other) => return Err(other),
        };

        // Claim before calling out: exactly one concurrent caller wins this
        // CAS, so exactly one gateway create call happens per new attempt.
        let claim = self
            .ledger
            .transition(
                invoice.id,
                invoice.status,
                InvoiceStatus::Processing,
                invoice.version,
                TransitionEffects::set_active_intent(attempt.id),
            )
            .await;

        match claim {
            Ok(_) => {}
            Err(InvoicingError::Conflict { .. }) => {
                // Lost the race; our attempt row never reached the gateway.
                self.ledger
                    .resolve_attempt(
                        attempt.id,
                        AttemptResolution::Abandoned {
                            reason: Some("lost intent-creation race".to_string()),
                        },
                    )
                    .await?;
                let current = self.ledger.get(invoice.id).await?;
                if current.status == InvoiceStatus::Processing {
                    return self.reuse_in_flight(&current).await;
                }
                return Err(InvoicingError::Conflict {
                    invoice: invoice.id.to_string(),
                    expected: invoice.version,
                    actual: current.version,
                });
            }
            Err(other) => return Err(other),
        }

        match tokio::time::timeout(
            self.gateway_timeout,
            self.gateway
                .create_intent(invoice.amount, &attempt.idempotency_key),
        )
        .await
        {
            Ok(Ok(intent)) => {
                let attempt = self
                    .ledger
                    .assign_gateway_intent(attempt.id, &intent.intent_id)
                    .await?;
                tracing::info!(
                    invoice_id = %invoice.id,
                    attempt_id = %attempt.id,
                    gateway_intent_id = %intent.intent_id,
                    ordinal,
                    "payment intent created"
                );
                Ok(self.intent_ref(&invoice, &attempt, Some(intent.client_secret)))
            }
            Ok(Err(err)) if err.is_transient() => {
                // The gateway may still have registered the intent; leave the
                // attempt created and the invoice processing. The abandonment
                // sweep reverts it if nothing ever arrives.
                tracing::warn!(
                    invoice_id = %invoice.id,
                    attempt_id = %attempt.id,
                    error = %err,
                    "gateway create call failed transiently; attempt left in flight"
                );
                Err(InvoicingError::Gateway(err))
            }
            Ok(Err(err)) => {
                self.revert_failed_attempt(&invoice, attempt.id, &err).await?;
                Err(InvoicingError::Gateway(err))
            }
            Err(_) => {
                let err = GatewayError::Timeout {
                    timeout_ms: self.gateway_timeout.as_millis() as u64,
                };
                tracing::warn!(
                    invoice_id = %invoice.id,
                    attempt_id = %attempt.id,
                    "gateway create call timed out; attempt left in flight"
                );
                Err(InvoicingError::Gateway(err))
            }
        }
    }

    /// Rolls back the claim after a definitive gateway rejection
    async fn revert_failed_attempt(
        &self,
        invoice: &Invoice,
        attempt_id: core_kernel::AttemptId,
        err: &GatewayError,
    ) -> Result<(), InvoicingError> {
        self.ledger
            .resolve_attempt(
                attempt_id,
                AttemptResolution::Abandoned {
                    reason: Some(err.to_string()),
                },
            )
            .await?;
        let current = self.ledger.get(invoice.id).await?;
        self.ledger
            .transition(
                invoice.id,
                InvoiceStatus::Processing,
                InvoiceStatus::Pending,
                current.version,
                TransitionEffects::clear_active_intent(),
            )
            .await?;
        tracing::info!(
            invoice_id = %invoice.id,
            attempt_id = %attempt_id,
            error = %err,
            "payment attempt reverted after gateway rejection"
        );
        Ok(())
    }

    fn intent_ref(
        &self,
        invoice: &Invoice,
        attempt: &PaymentAttempt,
        client_secret: Option<String>,
    ) -> IntentRef {
        IntentRef {
            invoice_id: invoice.id,
            attempt_id: attempt.id,
            gateway_intent_id: attempt.gateway_intent_id.clone(),
            client_secret,
            amount_minor_units: invoice.amount_minor_units(),
            currency: invoice.currency(),
        }
    }
}
