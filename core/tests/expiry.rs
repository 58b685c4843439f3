//! Code expiry: the sweep moves overdue transactions to `expired`, after
//! which every confirmation is a terminal-state error.

use chrono::Duration;

use cashpay_core::engine::PayEngine;
use cashpay_core::error::PayError;
use cashpay_core::money::Amount;
use cashpay_core::profile::VerificationLevel;
use cashpay_core::transaction::TxnStatus;

fn dollars(d: f64) -> Amount {
    Amount::from_dollars(d).unwrap()
}

fn engine_with_txn() -> (PayEngine, String, String) {
    let mut engine = PayEngine::build_test(7).unwrap();
    engine
        .create_profile("rider-1", VerificationLevel::Verified)
        .unwrap();
    engine
        .create_profile("driver-1", VerificationLevel::Verified)
        .unwrap();
    let created = engine
        .create_transaction("booking-1", "rider-1", "driver-1", dollars(20.0))
        .unwrap();
    let code = created.transaction.confirmation_code.clone();
    (engine, created.transaction.txn_id, code)
}

#[test]
fn sweep_expires_unconfirmed_transactions() {
    let (mut engine, txn_id, code) = engine_with_txn();

    // TTL is ride window (120) + grace (15) minutes.
    engine.clock().advance(Duration::minutes(136));
    let expired = engine.expire_overdue().unwrap();
    assert_eq!(expired, vec![txn_id.clone()]);

    let txn = engine.get_transaction(&txn_id).unwrap();
    assert_eq!(txn.status, TxnStatus::Expired);

    let err = engine.driver_confirm(&txn_id, dollars(20.0), None).unwrap_err();
    assert!(matches!(
        err,
        PayError::TerminalState {
            status: TxnStatus::Expired,
            ..
        }
    ));
    let err = engine.rider_confirm(&txn_id, &code).unwrap_err();
    assert!(matches!(err, PayError::TerminalState { .. }));
}

#[test]
fn sweep_expires_single_confirmed_transactions_too() {
    let (mut engine, txn_id, _code) = engine_with_txn();
    engine.driver_confirm(&txn_id, dollars(20.0), None).unwrap();

    engine.clock().advance(Duration::minutes(200));
    let expired = engine.expire_overdue().unwrap();
    assert_eq!(expired.len(), 1);

    let events = engine.store.events_of_type("transaction_expired").unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].payload.contains("driver_confirmed"));
}

#[test]
fn sweep_leaves_live_transactions_alone() {
    let (mut engine, txn_id, _code) = engine_with_txn();

    engine.clock().advance(Duration::minutes(60));
    let expired = engine.expire_overdue().unwrap();
    assert!(expired.is_empty());
    assert_eq!(
        engine.get_transaction(&txn_id).unwrap().status,
        TxnStatus::PendingVerification
    );
}

#[test]
fn overdue_confirmation_expires_lazily_before_the_sweep_runs() {
    let (mut engine, txn_id, code) = engine_with_txn();

    engine.clock().advance(Duration::minutes(140));
    // No sweep yet — the confirmation itself must not slip through.
    let err = engine.rider_confirm(&txn_id, &code).unwrap_err();
    assert!(matches!(
        err,
        PayError::TerminalState {
            status: TxnStatus::Expired,
            ..
        }
    ));
    assert_eq!(
        engine.get_transaction(&txn_id).unwrap().status,
        TxnStatus::Expired
    );
}

#[test]
fn completed_transactions_never_expire() {
    let (mut engine, txn_id, code) = engine_with_txn();
    engine.driver_confirm(&txn_id, dollars(20.0), None).unwrap();
    engine.rider_confirm(&txn_id, &code).unwrap();

    engine.clock().advance(Duration::minutes(500));
    let expired = engine.expire_overdue().unwrap();
    assert!(expired.is_empty());
    assert_eq!(
        engine.get_transaction(&txn_id).unwrap().status,
        TxnStatus::Completed
    );
}
