//! Periodic background sweeps
//!
//! Two maintenance passes keep the ledger honest without human attention:
//!
//! * the overdue sweep moves `Pending` invoices past their due date to
//!   `Overdue`, and
//! * the abandonment sweep closes out attempts whose payment session was
//!   started but never finished (browser closed, gateway create call timed
//!   out), reopening the invoice for a fresh attempt.
//!
//! Both passes are idempotent and safe to run concurrently with live payment
//! traffic: every mutation goes through the ledger's compare-and-swap, and a
//! lost race is counted as a skip, never retried within the pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};

use crate::attempt::AttemptResolution;
use crate::error::InvoicingError;
use crate::invoice::InvoiceStatus;
use crate::ledger::{InvoiceLedger, TransitionEffects};

/// Tuning for the background sweeps
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Maximum rows fetched per pass
    pub batch_size: u32,
    /// Age past which an unresolved attempt is considered walked away from
    pub abandon_after: Duration,
    /// Delay between passes in [`OverdueSweeper::run`]
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            abandon_after: Duration::from_secs(24 * 60 * 60),
            interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Counters from one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Rows moved to their swept state
    pub transitioned: u32,
    /// Rows skipped because a concurrent writer got there first
    pub skipped: u32,
}

/// Runs the overdue and abandonment sweeps against a ledger
pub struct OverdueSweeper {
    ledger: Arc<dyn InvoiceLedger>,
    config: SweeperConfig,
}

impl OverdueSweeper {
    pub fn new(ledger: Arc<dyn InvoiceLedger>, config: SweeperConfig) -> Self {
        Self { ledger, config }
    }

    /// Marks pending invoices whose due date has passed as overdue
    ///
    /// An invoice due on day N becomes overdue on day N+1: the due date
    /// itself is still payable on time.
    pub async fn sweep_overdue(&self, today: NaiveDate) -> Result<SweepReport, InvoicingError> {
        let due = self
            .ledger
            .list_due_before(today, self.config.batch_size)
            .await?;

        let mut report = SweepReport::default();
        for invoice in due {
            let result = self
                .ledger
                .transition(
                    invoice.id,
                    InvoiceStatus::Pending,
                    InvoiceStatus::Overdue,
                    invoice.version,
                    TransitionEffects::none(),
                )
                .await;
            match result {
                Ok(_) => report.transitioned += 1,
                Err(InvoicingError::Conflict { .. }) => {
                    // A payment started (or completed) between our read and
                    // the swap; the next pass re-evaluates if it still matters.
                    report.skipped += 1;
                }
                Err(other) => return Err(other),
            }
        }

        if report.transitioned > 0 || report.skipped > 0 {
            tracing::info!(
                transitioned = report.transitioned,
                skipped = report.skipped,
                "overdue sweep finished"
            );
        }
        Ok(report)
    }

    /// Abandons unresolved attempts older than the configured threshold
    ///
    /// Covers invoices stuck in `Processing` because the payer walked away
    /// mid-session or the gateway create call timed out before an intent
    /// handle was recorded.
    pub async fn sweep_abandoned(&self) -> Result<SweepReport, InvoicingError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.abandon_after)
                .map_err(|e| InvoicingError::Validation(format!("abandon_after overflow: {e}")))?;
        let stale = self
            .ledger
            .list_stale_attempts(cutoff, self.config.batch_size)
            .await?;

        let mut report = SweepReport::default();
        for attempt in stale {
            let resolved = self
                .ledger
                .resolve_attempt(
                    attempt.id,
                    AttemptResolution::Abandoned {
                        reason: Some("payment session expired".to_string()),
                    },
                )
                .await;
            match resolved {
                Ok(_) => {}
                Err(InvoicingError::Conflict { .. }) => {
                    // A reconciler resolved it first; nothing to clean up.
                    report.skipped += 1;
                    continue;
                }
                Err(other) => return Err(other),
            }

            match self.reopen_invoice(attempt.invoice_id).await {
                Ok(()) => report.transitioned += 1,
                Err(InvoicingError::Conflict { .. }) => report.skipped += 1,
                Err(other) => return Err(other),
            }
        }

        if report.transitioned > 0 || report.skipped > 0 {
            tracing::info!(
                transitioned = report.transitioned,
                skipped = report.skipped,
                "abandonment sweep finished"
            );
        }
        Ok(report)
    }

    /// Moves a processing invoice back to pending after its attempt died
    async fn reopen_invoice(&self, invoice_id: core_kernel::InvoiceId) -> Result<(), InvoicingError> {
        let invoice = self.ledger.get(invoice_id).await?;
        if invoice.status != InvoiceStatus::Processing {
            // Already moved on; the attempt resolution alone was the cleanup.
            return Ok(());
        }
        self.ledger
            .transition(
                invoice.id,
                InvoiceStatus::Processing,
                InvoiceStatus::Pending,
                invoice.version,
                TransitionEffects::clear_active_intent(),
            )
            .await?;
        tracing::info!(
            invoice_id = %invoice.id,
            "abandoned payment attempt cleared; invoice reopened"
        );
        Ok(())
    }

    /// Runs both sweeps on the configured interval until the task is dropped
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let today = Utc::now().date_naive();
            if let Err(err) = self.sweep_overdue(today).await {
                tracing::error!(error = %err, "overdue sweep failed");
            }
            if let Err(err) = self.sweep_abandoned().await {
                tracing::error!(error = %err, "abandonment sweep failed");
            }
        }
    }
}
