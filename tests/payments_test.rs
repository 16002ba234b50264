mod common;

use assert_matches::assert_matches;
use autoshop_api::{
    entities::{
        invoice::{InvoiceStatus, PaymentStatus},
        invoice_payment::PaymentMode,
    },
    errors::ServiceError,
    services::invoices::RecordPayment,
};
use common::{manager, staff, TestApp};
use proptest::prelude::*;
use uuid::Uuid;

fn cash(amount_cents: i64) -> RecordPayment {
    RecordPayment {
        amount_cents,
        mode: PaymentMode::Cash,
        transaction_id: None,
        notes: None,
    }
}

/// An approved invoice of `total_cents` for a fresh customer.
async fn approved_invoice(app: &TestApp, total_cents: i64) -> Uuid {
    let customer = app.seed_customer("Ravi", true).await;
    let visit = app.completed_visit(customer.id, "TN09CD4321").await;
    let invoice = app
        .invoice_for(visit.id, "engine-oil", total_cents, None)
        .await;
    app.state
        .services
        .invoices
        .approve(&manager(), invoice.id)
        .await
        .expect("approve invoice");
    invoice.id
}

#[tokio::test]
async fn partial_then_full_settlement() {
    let app = TestApp::new().await;
    let id = approved_invoice(&app, 50_000).await;
    let invoices = &app.state.services.invoices;

    let first = invoices.record_payment(&staff(), id, cash(30_000)).await.unwrap();
    assert_eq!(first.invoice.paid_cents, 30_000);
    assert_eq!(first.invoice.due_cents, 20_000);
    assert_eq!(first.invoice.payment_status, PaymentStatus::Partial);
    assert_eq!(first.payment.amount_cents, 30_000);

    let mut upi = cash(20_000);
    upi.mode = PaymentMode::Upi;
    upi.transaction_id = Some("UPI-7781".to_string());
    let second = invoices.record_payment(&staff(), id, upi).await.unwrap();
    assert_eq!(second.invoice.paid_cents, 50_000);
    assert_eq!(second.invoice.due_cents, 0);
    assert_eq!(second.invoice.payment_status, PaymentStatus::Paid);
    assert_eq!(second.invoice.payment_method, Some(PaymentMode::Upi));

    let ledger = invoices.list_payments(id).await.unwrap();
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger.iter().map(|p| p.amount_cents).sum::<i64>(), 50_000);

    let stored = invoices.get(id).await.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn overpayment_is_refused_without_side_effects() {
    let app = TestApp::new().await;
    let id = approved_invoice(&app, 50_000).await;
    let invoices = &app.state.services.invoices;

    assert_matches!(
        invoices.record_payment(&staff(), id, cash(50_001)).await,
        Err(ServiceError::ValidationError(msg)) if msg.contains("exceeds")
    );
    assert_matches!(
        invoices.record_payment(&staff(), id, cash(0)).await,
        Err(ServiceError::ValidationError(_))
    );

    let stored = invoices.get(id).await.unwrap();
    assert_eq!(stored.paid_cents, 0);
    assert_eq!(stored.due_cents, 50_000);
    assert!(invoices.list_payments(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn payments_need_an_approved_invoice() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Ravi", true).await;
    let visit = app.completed_visit(customer.id, "TN09CD4321").await;
    let pending = app.invoice_for(visit.id, "engine-oil", 50_000, None).await;
    assert_eq!(pending.status, InvoiceStatus::PendingApproval);
    let invoices = &app.state.services.invoices;

    assert_matches!(
        invoices.record_payment(&staff(), pending.id, cash(10_000)).await,
        Err(ServiceError::Conflict(_))
    );
    assert_matches!(
        invoices
            .set_payment_status(&staff(), pending.id, PaymentStatus::Paid, None)
            .await,
        Err(ServiceError::Conflict(_))
    );
    assert_matches!(
        invoices.record_payment(&staff(), Uuid::new_v4(), cash(10_000)).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn concurrent_payments_never_overdraw() {
    let app = TestApp::new().await;
    let id = approved_invoice(&app, 50_000).await;
    let invoices = &app.state.services.invoices;

    let actor = staff();
    let (a, b) = tokio::join!(
        invoices.record_payment(&actor, id, cash(30_000)),
        invoices.record_payment(&actor, id, cash(30_000)),
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(ServiceError::ValidationError(_)))));

    let stored = invoices.get(id).await.unwrap();
    assert_eq!(stored.paid_cents, 30_000);
    assert_eq!(stored.due_cents, 20_000);
    assert_eq!(invoices.list_payments(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn payment_status_can_be_set_wholesale() {
    let app = TestApp::new().await;
    let id = approved_invoice(&app, 50_000).await;
    let invoices = &app.state.services.invoices;

    let paid = invoices
        .set_payment_status(&staff(), id, PaymentStatus::Paid, Some(PaymentMode::Card))
        .await
        .unwrap();
    assert_eq!(paid.paid_cents, 50_000);
    assert_eq!(paid.due_cents, 0);
    assert_eq!(paid.payment_method, Some(PaymentMode::Card));

    let unpaid = invoices
        .set_payment_status(&staff(), id, PaymentStatus::Unpaid, None)
        .await
        .unwrap();
    assert_eq!(unpaid.paid_cents, 0);
    assert_eq!(unpaid.due_cents, 50_000);
    assert_eq!(unpaid.payment_method, None);

    assert_matches!(
        invoices
            .set_payment_status(&staff(), id, PaymentStatus::Partial, None)
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn ledger_always_balances(amounts in prop::collection::vec(1i64..40_000, 1..6)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let app = TestApp::new().await;
            let total = 60_000;
            let id = approved_invoice(&app, total).await;
            let invoices = &app.state.services.invoices;

            let mut accepted = 0;
            for amount in amounts {
                let before = invoices.get(id).await.unwrap();
                match invoices.record_payment(&staff(), id, cash(amount)).await {
                    Ok(receipt) => {
                        accepted += amount;
                        assert_eq!(receipt.invoice.paid_cents, before.paid_cents + amount);
                    }
                    Err(ServiceError::ValidationError(_)) => {
                        assert!(amount > before.due_cents);
                    }
                    Err(other) => panic!("unexpected error: {other}"),
                }

                let invoice = invoices.get(id).await.unwrap();
                assert_eq!(invoice.due_cents, invoice.total_cents - invoice.paid_cents);
                assert!(invoice.due_cents >= 0);
                assert_eq!(
                    invoice.payment_status,
                    PaymentStatus::from_amounts(invoice.paid_cents, invoice.due_cents)
                );
            }

            let invoice = invoices.get(id).await.unwrap();
            assert_eq!(invoice.paid_cents, accepted);
            let ledger: i64 = invoices
                .list_payments(id)
                .await
                .unwrap()
                .iter()
                .map(|p| p.amount_cents)
                .sum();
            assert_eq!(ledger, accepted);
        });
    }
}
