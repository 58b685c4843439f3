//! Server-side attempt limiting: repeated bad codes lock the transaction
//! for a cooldown, counted on the server where a reinstall cannot reset it.

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
    let mut engine = PayEngine::build_test(37).unwrap();
    engine
        .create_profile("rider-1", VerificationLevel::Verified)
        .unwrap();
    engine
        .create_profile("driver-1", VerificationLevel::Verified)
        .unwrap();
    let created = engine
        .create_transaction("booking-1", "rider-1", "driver-1", dollars(18.0))
        .unwrap();
    let code = created.transaction.confirmation_code.clone();
    (engine, created.transaction.txn_id, code)
}

fn wrong_code(right: &str) -> String {
    if right == "999999" {
        "999998".to_string()
    } else {
        "999999".to_string()
    }
}

#[test]
fn mismatches_count_down_then_lock() {
    let (mut engine, txn_id, code) = engine_with_txn();
    let wrong = wrong_code(&code);

    // max_code_attempts = 5: four countdown errors, then the lock.
    for expected_remaining in [4u32, 3, 2, 1] {
        match engine.rider_confirm(&txn_id, &wrong).unwrap_err() {
            PayError::CodeMismatch { attempts_remaining } => {
                assert_eq!(attempts_remaining, expected_remaining)
            }
            other => panic!("expected CodeMismatch, got {other:?}"),
        }
    }
    let err = engine.rider_confirm(&txn_id, &wrong).unwrap_err();
    assert!(matches!(err, PayError::TooManyAttempts { .. }));
}

#[test]
fn lockout_rejects_even_the_correct_code() {
    let (mut engine, txn_id, code) = engine_with_txn();
    let wrong = wrong_code(&code);
    for _ in 0..5 {
        let _ = engine.rider_confirm(&txn_id, &wrong);
    }

    let err = engine.rider_confirm(&txn_id, &code).unwrap_err();
    assert!(matches!(err, PayError::TooManyAttempts { .. }));

    // Status never moved.
    assert_eq!(
        engine.get_transaction(&txn_id).unwrap().status,
        TxnStatus::PendingVerification
    );
}

#[test]
fn cooldown_lapse_allows_the_correct_code_again() {
    let (mut engine, txn_id, code) = engine_with_txn();
    let wrong = wrong_code(&code);
    for _ in 0..5 {
        let _ = engine.rider_confirm(&txn_id, &wrong);
    }

    // Cooldown is 30 minutes; the code TTL (135 min) has not lapsed yet.
    engine.clock().advance(Duration::minutes(31));
    let outcome = engine.rider_confirm(&txn_id, &code).unwrap();
    assert_eq!(outcome.status, TxnStatus::RiderConfirmed);
}

#[test]
fn rejections_are_logged_and_scored() {
    let (mut engine, txn_id, code) = engine_with_txn();
    let wrong = wrong_code(&code);
    let risk_before = engine.get_transaction(&txn_id).unwrap().risk_score;

    for _ in 0..3 {
        let _ = engine.rider_confirm(&txn_id, &wrong);
    }

    assert_eq!(engine.store.event_count("code_rejected").unwrap(), 3);
    let txn = engine.get_transaction(&txn_id).unwrap();
    assert_eq!(txn.code_attempts, 3);
    assert!(txn.risk_score > risk_before);
}
