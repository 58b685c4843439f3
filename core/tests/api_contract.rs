//! Wire contracts: request parsing, response shapes, and the error
//! taxonomy the client keys its retry behavior on.

use chrono::Duration;
use serde_json::Value;

use cashpay_core::api::{self, ApiRequest};
use cashpay_core::engine::PayEngine;

fn parse(json: &str) -> ApiRequest {
    serde_json::from_str(json).expect("request must parse")
}

fn engine_with_wallets() -> PayEngine {
    let mut engine = PayEngine::build_test(51).unwrap();
    for (user, level) in [("rider-1", "verified"), ("driver-1", "verified")] {
        let req = parse(&format!(
            r#"{{"op":"create_wallet","userId":"{user}","verificationLevel":"{level}"}}"#
        ));
        let response = api::dispatch(&mut engine, req);
        assert!(response.get("error").is_none(), "{response}");
    }
    engine
}

fn create_payment(engine: &mut PayEngine, amount: f64) -> Value {
    let req = parse(&format!(
        r#"{{"op":"create","bookingId":"booking-1","riderId":"rider-1","driverId":"driver-1","amount":{amount}}}"#
    ));
    api::dispatch(engine, req)
}

#[test]
fn create_returns_code_instructions_and_trust() {
    let mut engine = engine_with_wallets();
    let response = create_payment(&mut engine, 25.5);

    let txn_id = response["transactionId"].as_str().unwrap();
    assert!(txn_id.starts_with("txn-"));
    let code = response["riderCode"].as_str().unwrap();
    assert_eq!(code.len(), 6);
    assert!(code.bytes().all(|b| b.is_ascii_digit()));
    assert_eq!(response["trustScore"], 60);
    assert!(response["instructions"].as_str().unwrap().contains("$25.50"));
}

#[test]
fn confirm_flow_reports_status_and_next_step() {
    let mut engine = engine_with_wallets();
    let created = create_payment(&mut engine, 25.5);
    let txn_id = created["transactionId"].as_str().unwrap().to_string();
    let code = created["riderCode"].as_str().unwrap().to_string();

    let driver = api::dispatch(
        &mut engine,
        parse(&format!(
            r#"{{"op":"confirm_received","transactionId":"{txn_id}","actualAmount":25.5}}"#
        )),
    );
    assert_eq!(driver["status"], "driver_confirmed");
    assert_eq!(driver["nextStep"], "Waiting for rider confirmation");

    let rider = api::dispatch(
        &mut engine,
        parse(&format!(
            r#"{{"op":"confirm_paid","transactionId":"{txn_id}","confirmationCode":"{code}"}}"#
        )),
    );
    assert_eq!(rider["status"], "completed");
    assert!(rider.get("nextStep").is_none());
    assert_eq!(rider["message"], "Cash payment completed.");
}

#[test]
fn discrepant_driver_claim_is_called_out_in_the_message() {
    let mut engine = engine_with_wallets();
    let created = create_payment(&mut engine, 25.5);
    let txn_id = created["transactionId"].as_str().unwrap();

    let driver = api::dispatch(
        &mut engine,
        parse(&format!(
            r#"{{"op":"confirm_received","transactionId":"{txn_id}","actualAmount":26.1}}"#
        )),
    );
    assert!(driver["message"]
        .as_str()
        .unwrap()
        .contains("discrepancy recorded"));
}

#[test]
fn dispute_endpoint_returns_the_dispute_id() {
    let mut engine = engine_with_wallets();
    let created = create_payment(&mut engine, 25.5);
    let txn_id = created["transactionId"].as_str().unwrap();

    let response = api::dispatch(
        &mut engine,
        parse(&format!(
            r#"{{"op":"dispute","transactionId":"{txn_id}","reportedBy":"rider-1","reason":"wrong_amount","description":"Driver typed the wrong amount"}}"#
        )),
    );
    assert!(response["disputeId"].as_str().unwrap().starts_with("dsp-"));
    assert_eq!(response["status"], "open");
}

#[test]
fn wallet_payload_mirrors_the_client_shape() {
    let mut engine = engine_with_wallets();
    let response = api::dispatch(&mut engine, parse(r#"{"op":"wallet","userId":"rider-1"}"#));

    assert_eq!(response["userId"], "rider-1");
    assert_eq!(response["verificationLevel"], "verified");
    assert_eq!(response["trustScore"], 60);
    assert_eq!(response["dailyCashLimit"], 300.0);
    assert_eq!(response["dailyCashUsed"], 0.0);
    assert_eq!(response["dailyRemaining"], 300.0);
    assert_eq!(response["isSuspended"], false);
    assert!(response.get("suspensionReason").is_none());
}

#[test]
fn history_is_paginated_newest_first() {
    let mut engine = engine_with_wallets();
    for i in 0..3 {
        let req = parse(&format!(
            r#"{{"op":"create","bookingId":"booking-{i}","riderId":"rider-1","driverId":"driver-1","amount":10.0}}"#
        ));
        let response = api::dispatch(&mut engine, req);
        assert!(response.get("error").is_none(), "{response}");
        engine.clock().advance(Duration::minutes(1));
    }

    let response = api::dispatch(
        &mut engine,
        parse(r#"{"op":"history","userId":"rider-1","limit":2,"offset":0}"#),
    );
    assert_eq!(response["total"], 3);
    let items = response["transactions"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["bookingId"], "booking-2");
    assert_eq!(items[1]["bookingId"], "booking-1");
    assert_eq!(items[0]["counterpartyId"], "driver-1");
}

#[test]
fn history_filters_by_status() {
    let mut engine = engine_with_wallets();
    let created = create_payment(&mut engine, 12.0);
    let txn_id = created["transactionId"].as_str().unwrap().to_string();
    let code = created["riderCode"].as_str().unwrap().to_string();
    api::dispatch(
        &mut engine,
        parse(&format!(
            r#"{{"op":"confirm_received","transactionId":"{txn_id}","actualAmount":12.0}}"#
        )),
    );
    api::dispatch(
        &mut engine,
        parse(&format!(
            r#"{{"op":"confirm_paid","transactionId":"{txn_id}","confirmationCode":"{code}"}}"#
        )),
    );
    create_payment(&mut engine, 13.0);

    let completed = api::dispatch(
        &mut engine,
        parse(r#"{"op":"history","userId":"rider-1","status":"completed"}"#),
    );
    assert_eq!(completed["total"], 1);
    assert_eq!(
        completed["transactions"].as_array().unwrap()[0]["status"],
        "completed"
    );
}

#[test]
fn validation_errors_are_not_retryable() {
    let mut engine = engine_with_wallets();
    let response = create_payment(&mut engine, -5.0);
    assert_eq!(response["error"]["code"], "validation");
    assert_eq!(response["error"]["retryable"], false);
}

#[test]
fn eligibility_denials_carry_the_remediation_text() {
    let mut engine = engine_with_wallets();
    engine
        .store
        .suspend_profile("rider-1", "Suspended pending identity review")
        .unwrap();

    let response = create_payment(&mut engine, 10.0);
    assert_eq!(response["error"]["code"], "eligibility_denied");
    assert_eq!(
        response["error"]["error"],
        "Suspended pending identity review"
    );
}

#[test]
fn terminal_state_errors_map_to_their_class() {
    let mut engine = engine_with_wallets();
    let created = create_payment(&mut engine, 10.0);
    let txn_id = created["transactionId"].as_str().unwrap().to_string();

    engine.clock().advance(Duration::minutes(200));
    let response = api::dispatch(
        &mut engine,
        parse(&format!(
            r#"{{"op":"confirm_received","transactionId":"{txn_id}","actualAmount":10.0}}"#
        )),
    );
    assert_eq!(response["error"]["code"], "terminal_state");
    assert_eq!(response["error"]["retryable"], false);
}

#[test]
fn sweep_reports_expired_ids() {
    let mut engine = engine_with_wallets();
    let created = create_payment(&mut engine, 10.0);
    let txn_id = created["transactionId"].as_str().unwrap().to_string();

    engine.clock().advance(Duration::minutes(200));
    let response = api::dispatch(&mut engine, parse(r#"{"op":"sweep"}"#));
    let expired = response["expired"].as_array().unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0], txn_id.as_str());
}

#[test]
fn malformed_amounts_are_rejected_at_the_boundary() {
    let mut engine = engine_with_wallets();
    let response = create_payment(&mut engine, 10.001);
    assert_eq!(response["error"]["code"], "validation");
}
