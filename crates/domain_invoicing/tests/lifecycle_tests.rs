//! Invoice lifecycle properties
//!
//! Drives the ledger with randomized transition requests and checks that the
//! state machine's guarantees hold regardless of the order attempted.

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use domain_invoicing::{
    InMemoryLedger, InvoiceLedger, InvoiceStatus, InvoicingError, TransitionEffects,
};
use test_utils::InvoiceBuilder;

fn any_status() -> impl Strategy<Value = InvoiceStatus> {
    prop_oneof![
        Just(InvoiceStatus::Draft),
        Just(InvoiceStatus::Pending),
        Just(InvoiceStatus::Processing),
        Just(InvoiceStatus::Paid),
        Just(InvoiceStatus::Overdue),
        Just(InvoiceStatus::Failed),
        Just(InvoiceStatus::Void),
    ]
}

proptest! {
    /// No sequence of transition requests can move an invoice along an edge
    /// the state machine does not allow, and the version counter increments
    /// exactly once per applied transition.
    #[test]
    fn only_legal_edges_are_ever_applied(targets in prop::collection::vec(any_status(), 1..25)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let ledger = InMemoryLedger::new();
            let mut invoice = ledger.create(InvoiceBuilder::new().build()).await.unwrap();

            for to in targets {
                let result = ledger
                    .transition(invoice.id, invoice.status, to, invoice.version, TransitionEffects::none())
                    .await;
                match result {
                    Ok(updated) => {
                        prop_assert!(invoice.status.can_transition_to(to));
                        prop_assert_eq!(updated.status, to);
                        prop_assert_eq!(updated.version, invoice.version + 1);
                        invoice = updated;
                    }
                    Err(InvoicingError::IllegalTransition { .. }) => {
                        prop_assert!(!invoice.status.can_transition_to(to));
                        // Nothing may have changed
                        let current = ledger.get(invoice.id).await.unwrap();
                        prop_assert_eq!(current.status, invoice.status);
                        prop_assert_eq!(current.version, invoice.version);
                    }
                    Err(other) => return Err(TestCaseError::fail(format!("unexpected error: {other}"))),
                }
            }
            Ok(())
        })?;
    }

    /// Terminal statuses never admit an outgoing edge.
    #[test]
    fn terminal_statuses_are_absorbing(to in any_status()) {
        prop_assert!(!InvoiceStatus::Paid.can_transition_to(to));
        prop_assert!(!InvoiceStatus::Void.can_transition_to(to));
    }

    /// A status accepting new payment intents is never terminal.
    #[test]
    fn payable_implies_not_terminal(status in any_status()) {
        if status.is_payable() {
            prop_assert!(!status.is_terminal());
        }
    }
}

#[tokio::test]
async fn stale_writer_cannot_clobber_a_newer_transition() {
    let ledger = InMemoryLedger::new();
    let invoice = ledger.create(InvoiceBuilder::new().build()).await.unwrap();

    // First writer claims the invoice
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

    // A writer holding the pre-claim snapshot must fail
    let stale = ledger
        .transition(
            invoice.id,
            InvoiceStatus::Pending,
            InvoiceStatus::Overdue,
            invoice.version,
            TransitionEffects::none(),
        )
        .await;
    assert!(matches!(stale, Err(InvoicingError::Conflict { .. })));

    let current = ledger.get(invoice.id).await.unwrap();
    assert_eq!(current.status, InvoiceStatus::Processing);
}
