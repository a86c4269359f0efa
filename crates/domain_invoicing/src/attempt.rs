//! Payment attempts
//!
//! A [`PaymentAttempt`] is the ledger-local record mirroring one gateway
//! payment intent. At most one attempt per invoice is unresolved (`Created`)
//! at any time; resolution is a one-way door.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{AttemptId, InvoiceId};

/// Payment attempt status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Intent requested; outcome unknown
    Created,
    /// Gateway certified the charge succeeded
    Confirmed,
    /// Gateway reported the charge was declined
    Declined,
    /// Given up on: lost race, gateway cancellation, or stale session
    Abandoned,
}

impl AttemptStatus {
    /// Returns true once the attempt has a final outcome
    pub fn is_resolved(&self) -> bool {
        !matches!(self, AttemptStatus::Created)
    }
}

/// How an unresolved attempt is being closed out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResolution {
    Confirmed,
    Declined { reason: Option<String> },
    Abandoned { reason: Option<String> },
}

impl AttemptResolution {
    /// The status this resolution lands the attempt in
    pub fn status(&self) -> AttemptStatus {
        match self {
            AttemptResolution::Confirmed => AttemptStatus::Confirmed,
            AttemptResolution::Declined { .. } => AttemptStatus::Declined,
            AttemptResolution::Abandoned { .. } => AttemptStatus::Abandoned,
        }
    }

    /// The failure reason to record, if any
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            AttemptResolution::Confirmed => None,
            AttemptResolution::Declined { reason } | AttemptResolution::Abandoned { reason } => {
                reason.as_deref()
            }
        }
    }
}

/// A local record of one attempted charge against an invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAttempt {
    /// Unique identifier
    pub id: AttemptId,
    /// Invoice this attempt pays
    pub invoice_id: InvoiceId,
    /// 1-based position among the invoice's attempts
    pub ordinal: u32,
    /// Deterministic key passed to the gateway so a retried create call
    /// cannot produce a duplicate external charge
    pub idempotency_key: String,
    /// Intent handle assigned by the gateway; unique once set
    pub gateway_intent_id: Option<String>,
    /// Current status
    pub status: AttemptStatus,
    /// Why the attempt was declined or abandoned
    pub failure_reason: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// When the attempt reached a final status
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PaymentAttempt {
    /// Creates an unresolved attempt for an invoice
    ///
    /// The idempotency key is derived from `(invoice_id, ordinal)` only, so
    /// a network-level retry of the gateway create call maps to the same
    /// external intent.
    pub fn new(invoice_id: InvoiceId, ordinal: u32) -> Self {
        Self {
            id: AttemptId::new_v7(),
            invoice_id,
            ordinal,
            idempotency_key: derive_idempotency_key(invoice_id, ordinal),
            gateway_intent_id: None,
            status: AttemptStatus::Created,
            failure_reason: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Returns true once the attempt has a final outcome
    pub fn is_resolved(&self) -> bool {
        self.status.is_resolved()
    }
}

/// Derives the deterministic gateway idempotency key for an attempt
pub fn derive_idempotency_key(invoice_id: InvoiceId, ordinal: u32) -> String {
    format!("{}:{}", invoice_id.as_uuid(), ordinal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_attempt_is_unresolved() {
        let attempt = PaymentAttempt::new(InvoiceId::new_v7(), 1);

        assert_eq!(attempt.status, AttemptStatus::Created);
        assert!(!attempt.is_resolved());
        assert!(attempt.gateway_intent_id.is_none());
        assert!(attempt.resolved_at.is_none());
    }

    #[test]
    fn test_idempotency_key_is_deterministic() {
        let invoice_id = InvoiceId::new_v7();
        let a = PaymentAttempt::new(invoice_id, 2);
        let b = PaymentAttempt::new(invoice_id, 2);

        assert_eq!(a.idempotency_key, b.idempotency_key);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_idempotency_key_varies_by_ordinal() {
        let invoice_id = InvoiceId::new_v7();
        assert_ne!(
            derive_idempotency_key(invoice_id, 1),
            derive_idempotency_key(invoice_id, 2)
        );
    }

    #[test]
    fn test_resolution_status_mapping() {
        assert_eq!(AttemptResolution::Confirmed.status(), AttemptStatus::Confirmed);
        assert_eq!(
            AttemptResolution::Declined { reason: None }.status(),
            AttemptStatus::Declined
        );
        let abandoned = AttemptResolution::Abandoned {
            reason: Some("session expired".to_string()),
        };
        assert_eq!(abandoned.status(), AttemptStatus::Abandoned);
        assert_eq!(abandoned.failure_reason(), Some("session expired"));
    }
}
