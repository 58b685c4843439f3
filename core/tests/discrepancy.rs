//! Amount discrepancies: tolerated within $0.50, flagged and kept for audit
//! beyond it — without ever blocking the state machine.

use cashpay_core::engine::PayEngine;
use cashpay_core::money::Amount;
use cashpay_core::profile::VerificationLevel;
use cashpay_core::transaction::TxnStatus;

fn dollars(d: f64) -> Amount {
    Amount::from_dollars(d).unwrap()
}

fn engine_with_txn(amount: f64) -> (PayEngine, String, String) {
    let mut engine = PayEngine::build_test(42).unwrap();
    engine
        .create_profile("rider-1", VerificationLevel::Verified)
        .unwrap();
    engine
        .create_profile("driver-1", VerificationLevel::Verified)
        .unwrap();
    let created = engine
        .create_transaction("booking-1", "rider-1", "driver-1", dollars(amount))
        .unwrap();
    let code = created.transaction.confirmation_code.clone();
    (engine, created.transaction.txn_id, code)
}

#[test]
fn sixty_cent_discrepancy_is_flagged_but_still_completes() {
    // Expected $25.50, claimed $26.10: diff $0.60 > $0.50 tolerance.
    let (mut engine, txn_id, code) = engine_with_txn(25.50);

    let outcome = engine.driver_confirm(&txn_id, dollars(26.10), None).unwrap();
    assert!(outcome.discrepancy_flagged);
    assert_eq!(outcome.status, TxnStatus::DriverConfirmed);

    engine.rider_confirm(&txn_id, &code).unwrap();

    // Audit data survives completion.
    let txn = engine.get_transaction(&txn_id).unwrap();
    assert_eq!(txn.status, TxnStatus::Completed);
    assert_eq!(txn.actual_amount_claimed, Some(dollars(26.10)));
    assert_eq!(txn.discrepancy_cents, Some(60));
    assert!(txn.discrepancy_flagged);
}

#[test]
fn fifty_cent_discrepancy_is_within_tolerance() {
    let (mut engine, txn_id, _code) = engine_with_txn(25.50);

    let outcome = engine.driver_confirm(&txn_id, dollars(26.00), None).unwrap();
    assert!(!outcome.discrepancy_flagged);

    let txn = engine.get_transaction(&txn_id).unwrap();
    assert_eq!(txn.discrepancy_cents, Some(50));
    assert!(!txn.discrepancy_flagged);
}

#[test]
fn flagged_discrepancy_raises_the_risk_score() {
    let (mut engine, txn_id, _code) = engine_with_txn(25.50);
    let before = engine.get_transaction(&txn_id).unwrap().risk_score;

    engine.driver_confirm(&txn_id, dollars(26.10), None).unwrap();

    let after = engine.get_transaction(&txn_id).unwrap().risk_score;
    assert!(after > before, "risk {before} -> {after}");
}

#[test]
fn discrepancy_event_is_logged_with_the_claim() {
    let (mut engine, txn_id, _code) = engine_with_txn(25.50);
    engine.driver_confirm(&txn_id, dollars(26.10), None).unwrap();

    let events = engine.store.events_of_type("driver_confirmed").unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].payload.contains("\"discrepancy_flagged\":true"));
}
