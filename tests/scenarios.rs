//! End-to-end wallet scenarios over the in-memory ledger and scripted
//! provider mocks: operation initiation, webhook reconciliation,
//! idempotence under duplicate delivery, and fanout behavior.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;

use wallet_engine::fanout::Fanout;
use wallet_engine::gateway::{
    AirtimeOutcome, MockAirtime, MockGateway, VerifiedStatus, VerifiedTransaction,
};
use wallet_engine::ledger::{
    BalanceUpdate, LedgerStore, MemoryLedger, TransactionStatus, DEFAULT_CURRENCY,
};
use wallet_engine::reconciler::{ReconcileOutcome, Reconciler};
use wallet_engine::wallet::WalletService;

const SECRET: &str = "verif-hash";

struct Harness {
    ledger: Arc<MemoryLedger>,
    gateway: Arc<MockGateway>,
    airtime: Arc<MockAirtime>,
    fanout: Fanout,
    service: WalletService,
    reconciler: Reconciler,
}

fn harness() -> Harness {
    let ledger = Arc::new(MemoryLedger::new());
    let gateway = Arc::new(MockGateway::new());
    let airtime = Arc::new(MockAirtime::new());
    let fanout = Fanout::new();
    let service = WalletService::new(
        ledger.clone(),
        gateway.clone(),
        airtime.clone(),
        fanout.clone(),
    );
    let reconciler = Reconciler::new(ledger.clone(), gateway.clone(), fanout.clone(), SECRET);
    Harness {
        ledger,
        gateway,
        airtime,
        fanout,
        service,
        reconciler,
    }
}

fn payment_webhook(reference: &str, user_id: i64, status: &str) -> serde_json::Value {
    json!({
        "reference": reference,
        "provider_transaction_id": "991100",
        "status": status,
        "signature": SECRET,
        "meta": { "user_id": user_id },
    })
}

fn verified(amount: Decimal) -> VerifiedTransaction {
    VerifiedTransaction {
        status: VerifiedStatus::Successful,
        amount,
        currency: DEFAULT_CURRENCY.to_string(),
    }
}

/// Balance 0; fund 1000 initiated; the success webhook lands twice.
/// The balance moves exactly once and only one fanout event goes out.
#[tokio::test]
async fn double_delivery_funds_once_with_one_fanout_event() {
    let h = harness();
    h.service.create_wallet(1).await.unwrap();
    h.gateway.set_next_reference("tx_ref-1-SCEN1").await;

    let initiated = h
        .service
        .fund(1, "user@example.com", dec!(1000), DEFAULT_CURRENCY)
        .await
        .unwrap();
    assert_eq!(initiated.reference, "tx_ref-1-SCEN1");

    let mut outcomes = h.fanout.subscribe();
    h.gateway.push_verify(Ok(verified(dec!(1000)))).await;

    let first = h
        .reconciler
        .process(&payment_webhook("tx_ref-1-SCEN1", 1, "successful"))
        .await;
    assert!(matches!(first, ReconcileOutcome::Applied(_)));

    let second = h
        .reconciler
        .process(&payment_webhook("tx_ref-1-SCEN1", 1, "successful"))
        .await;
    assert!(matches!(second, ReconcileOutcome::Skipped(_)));

    let wallet = h.service.wallet(1).await.unwrap();
    assert_eq!(wallet.balance, dec!(1000));
    assert!(!wallet.is_locked);

    // Exactly one event was published.
    let event = outcomes.try_recv().unwrap();
    assert_eq!(event.payload.status, "success");
    assert_eq!(event.payload.tx_ref, "tx_ref-1-SCEN1");
    assert_eq!(outcomes.try_recv().unwrap_err(), TryRecvError::Empty);
}

/// The amount actually applied is the provider-verified one, even when
/// it differs from the amount originally requested.
#[tokio::test]
async fn verified_amount_wins_over_requested() {
    let h = harness();
    h.service.create_wallet(1).await.unwrap();
    h.gateway.set_next_reference("tx_ref-1-SCEN2").await;

    h.service
        .fund(1, "user@example.com", dec!(1000), DEFAULT_CURRENCY)
        .await
        .unwrap();
    h.gateway.push_verify(Ok(verified(dec!(1250)))).await;

    let outcome = h
        .reconciler
        .process(&payment_webhook("tx_ref-1-SCEN2", 1, "successful"))
        .await;
    assert!(matches!(outcome, ReconcileOutcome::Applied(_)));

    let wallet = h.service.wallet(1).await.unwrap();
    assert_eq!(wallet.balance, dec!(1250));
}

/// Balance 500; withdraw 1000 is rejected before any external call:
/// the wallet stays unlocked and no transaction record exists.
#[tokio::test]
async fn insufficient_withdraw_rejected_before_lock() {
    let h = harness();
    let wallet = h.service.create_wallet(1).await.unwrap();
    h.ledger
        .update_balance(wallet.id, dec!(500), BalanceUpdate::Add)
        .await
        .unwrap();

    let err = h
        .service
        .withdraw(1, dec!(1000), DEFAULT_CURRENCY, "044", "0123456789")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_FUNDS");

    let wallet = h.service.wallet(1).await.unwrap();
    assert!(!wallet.is_locked);
    assert_eq!(wallet.balance, dec!(500));
    assert!(h.gateway.transfer_calls().await.is_empty());
}

/// Wallet locked by a funding attempt; the webhook reports failure.
/// The transaction fails, the wallet unlocks, the balance is unchanged,
/// and exactly one "failed" event is emitted.
#[tokio::test]
async fn failure_webhook_unlocks_with_unchanged_balance() {
    let h = harness();
    h.service.create_wallet(1).await.unwrap();
    h.gateway.set_next_reference("tx_ref-1-SCEN3").await;
    h.service
        .fund(1, "user@example.com", dec!(1000), DEFAULT_CURRENCY)
        .await
        .unwrap();

    let mut outcomes = h.fanout.subscribe();
    let outcome = h
        .reconciler
        .process(&payment_webhook("tx_ref-1-SCEN3", 1, "failed"))
        .await;
    assert!(matches!(outcome, ReconcileOutcome::Applied(_)));

    let tx = h
        .ledger
        .get_transaction_by_reference("tx_ref-1-SCEN3")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Failed);

    let wallet = h.service.wallet(1).await.unwrap();
    assert!(!wallet.is_locked);
    assert_eq!(wallet.balance, dec!(0));

    let event = outcomes.try_recv().unwrap();
    assert_eq!(event.payload.status, "failed");
    assert_eq!(outcomes.try_recv().unwrap_err(), TryRecvError::Empty);
}

/// Concurrent lock acquisitions on one wallet: exactly one wins.
#[tokio::test]
async fn concurrent_acquire_has_single_winner() {
    let ledger = Arc::new(MemoryLedger::new());
    let wallet = ledger.create_wallet(1, DEFAULT_CURRENCY).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let ledger = ledger.clone();
        let wallet_id = wallet.id;
        handles.push(tokio::spawn(
            async move { ledger.acquire_lock(wallet_id).await },
        ));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

/// A full funding round trip followed by a withdrawal round trip.
#[tokio::test]
async fn fund_then_withdraw_round_trip() {
    let h = harness();
    h.service.create_wallet(2).await.unwrap();

    // Fund 2000.
    h.gateway.set_next_reference("tx_ref-2-FUND").await;
    h.service
        .fund(2, "user@example.com", dec!(2000), DEFAULT_CURRENCY)
        .await
        .unwrap();
    h.gateway.push_verify(Ok(verified(dec!(2000)))).await;
    h.reconciler
        .process(&payment_webhook("tx_ref-2-FUND", 2, "successful"))
        .await;
    assert_eq!(h.service.wallet(2).await.unwrap().balance, dec!(2000));

    // Withdraw 600; resolved by a transfer webhook.
    h.gateway.set_next_reference("tx_ref-2-WD").await;
    let tx = h
        .service
        .withdraw(2, dec!(600), DEFAULT_CURRENCY, "044", "0123456789")
        .await
        .unwrap();
    assert_eq!(tx.reference, "tx_ref-2-WD");

    let transfer_event = json!({
        "signature": SECRET,
        "data": {
            "reference": "tx_ref-2-WD",
            "status": "SUCCESSFUL",
            "amount": 600,
            "currency": DEFAULT_CURRENCY,
            "meta": { "user_id": 2 },
        },
    });
    let outcome = h.reconciler.process(&transfer_event).await;
    assert!(matches!(outcome, ReconcileOutcome::Applied(_)));

    let wallet = h.service.wallet(2).await.unwrap();
    assert_eq!(wallet.balance, dec!(1400));
    assert!(!wallet.is_locked);
}

/// A verification mismatch never credits the wallet: the transaction is
/// failed and the lock released.
#[tokio::test]
async fn verification_mismatch_fails_transaction() {
    let h = harness();
    h.service.create_wallet(3).await.unwrap();
    h.gateway.set_next_reference("tx_ref-3-SHORT").await;
    h.service
        .fund(3, "user@example.com", dec!(1000), DEFAULT_CURRENCY)
        .await
        .unwrap();

    // Verified amount falls short of the recorded amount.
    h.gateway.push_verify(Ok(verified(dec!(100)))).await;
    let outcome = h
        .reconciler
        .process(&payment_webhook("tx_ref-3-SHORT", 3, "successful"))
        .await;
    assert!(matches!(outcome, ReconcileOutcome::Rejected(_)));

    let tx = h
        .ledger
        .get_transaction_by_reference("tx_ref-3-SHORT")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Failed);
    let wallet = h.service.wallet(3).await.unwrap();
    assert_eq!(wallet.balance, dec!(0));
    assert!(!wallet.is_locked);
}

/// A gateway outage during funding releases the lock; the wallet can be
/// funded again immediately.
#[tokio::test]
async fn gateway_outage_leaves_wallet_usable() {
    let h = harness();
    h.service.create_wallet(4).await.unwrap();

    h.gateway.fail_next_payment().await;
    let err = h
        .service
        .fund(4, "user@example.com", dec!(300), DEFAULT_CURRENCY)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "GATEWAY_UNAVAILABLE");

    // Second attempt proceeds.
    assert!(
        h.service
            .fund(4, "user@example.com", dec!(300), DEFAULT_CURRENCY)
            .await
            .is_ok()
    );
}

/// Synchronous airtime settlement debits the wallet and emits one
/// success event.
#[tokio::test]
async fn airtime_success_publishes_outcome() {
    let h = harness();
    let wallet = h.service.create_wallet(5).await.unwrap();
    h.ledger
        .update_balance(wallet.id, dec!(1000), BalanceUpdate::Add)
        .await
        .unwrap();

    h.airtime.push_outcome(AirtimeOutcome::Success).await;
    let mut outcomes = h.fanout.subscribe();
    let tx = h
        .service
        .purchase_airtime(5, "mtn", dec!(200), "08011111111")
        .await
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Success);

    let wallet = h.service.wallet(5).await.unwrap();
    assert_eq!(wallet.balance, dec!(800));
    assert!(!wallet.is_locked);

    let event = outcomes.try_recv().unwrap();
    assert_eq!(event.payload.status, "success");
    assert_eq!(event.payload.user_id, 5);
}

/// A tampered signature takes no state action even for a real pending
/// transaction.
#[tokio::test]
async fn tampered_signature_is_inert() {
    let h = harness();
    h.service.create_wallet(6).await.unwrap();
    h.gateway.set_next_reference("tx_ref-6-SIG").await;
    h.service
        .fund(6, "user@example.com", dec!(1000), DEFAULT_CURRENCY)
        .await
        .unwrap();

    let mut event = payment_webhook("tx_ref-6-SIG", 6, "successful");
    event["signature"] = json!("forged");
    let outcome = h.reconciler.process(&event).await;
    assert!(matches!(outcome, ReconcileOutcome::Rejected(_)));

    let tx = h
        .ledger
        .get_transaction_by_reference("tx_ref-6-SIG")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert!(h.service.wallet(6).await.unwrap().is_locked);
    // The forged event never reached the verification endpoint either.
    assert!(h.gateway.verify_calls().await.is_empty());
}
