//! Client-facing request/response contracts.
//!
//! Field names mirror the mobile client's JSON shapes (camelCase), so the
//! DTOs here are the wire format; everything else in the crate speaks cents
//! and typed enums. The daemon feeds parsed `ApiRequest`s to `dispatch` and
//! writes the returned JSON straight out.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::dispute::DisputeReason;
use crate::engine::{ConfirmOutcome, PayEngine};
use crate::error::PayError;
use crate::limits::{self, LimitWindow};
use crate::money::Amount;
use crate::profile::{TrustProfile, VerificationLevel};
use crate::transaction::{TxnStatus, TxnSummary};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ApiRequest {
    /// POST /payments/cash/create
    #[serde(rename_all = "camelCase")]
    Create {
        booking_id: String,
        rider_id: String,
        driver_id: String,
        amount: f64,
    },
    /// POST /payments/cash/{id}/confirm-received (driver)
    #[serde(rename_all = "camelCase")]
    ConfirmReceived {
        transaction_id: String,
        actual_amount: f64,
        location: Option<String>,
    },
    /// POST /payments/cash/{id}/confirm-paid (rider)
    #[serde(rename_all = "camelCase")]
    ConfirmPaid {
        transaction_id: String,
        confirmation_code: String,
    },
    /// POST /payments/cash/{id}/dispute
    #[serde(rename_all = "camelCase")]
    Dispute {
        transaction_id: String,
        reported_by: String,
        reason: String,
        description: String,
        evidence: Option<String>,
    },
    /// GET /payments/cash/wallet
    #[serde(rename_all = "camelCase")]
    Wallet { user_id: String },
    /// GET /payments/cash/history
    #[serde(rename_all = "camelCase")]
    History {
        user_id: String,
        limit: Option<i64>,
        offset: Option<i64>,
        status: Option<String>,
    },
    /// Wallet provisioning at account verification.
    #[serde(rename_all = "camelCase")]
    CreateWallet {
        user_id: String,
        verification_level: String,
    },
    /// Manual expiry sweep (the daemon also runs this on a timer).
    Sweep,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    pub transaction_id: String,
    /// Rider-only proof-of-payment token. Never present in driver responses.
    pub rider_code: String,
    pub instructions: String,
    pub trust_score: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub status: TxnStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeResponse {
    pub dispute_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub user_id: String,
    pub trust_score: u8,
    pub verification_level: VerificationLevel,
    pub phone_verified: bool,
    pub id_verified: bool,
    pub address_verified: bool,
    pub daily_cash_limit: f64,
    pub daily_cash_used: f64,
    pub daily_remaining: f64,
    pub weekly_cash_limit: f64,
    pub weekly_cash_used: f64,
    pub weekly_remaining: f64,
    pub monthly_cash_limit: f64,
    pub monthly_cash_used: f64,
    pub monthly_remaining: f64,
    pub is_suspended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspension_reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub transaction_id: String,
    pub booking_id: String,
    pub counterparty_id: String,
    pub amount: f64,
    pub status: TxnStatus,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub transactions: Vec<HistoryItem>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    /// Taxonomy class: validation | eligibility_denied | conflict |
    /// terminal_state | rate_limited | unavailable.
    pub code: &'static str,
    /// Whether retrying the same request can succeed.
    pub retryable: bool,
}

/// Map an engine error to its wire taxonomy class.
pub fn error_body(e: &PayError) -> ErrorBody {
    let (code, retryable) = match e {
        PayError::Validation(_)
        | PayError::CodeMismatch { .. }
        | PayError::ProfileNotFound { .. }
        | PayError::TransactionNotFound { .. }
        | PayError::DisputeNotFound { .. } => ("validation", false),
        PayError::EligibilityDenied { .. } => ("eligibility_denied", false),
        PayError::TerminalState { .. } => ("terminal_state", false),
        PayError::ConcurrencyConflict { .. } => ("conflict", true),
        PayError::TooManyAttempts { .. } => ("rate_limited", false),
        PayError::ProfileUnavailable(_)
        | PayError::Database(_)
        | PayError::Serialization(_)
        | PayError::Other(_) => ("unavailable", true),
    };
    ErrorBody {
        error: e.to_string(),
        code,
        retryable,
    }
}

/// Execute one request against the engine and render the response JSON.
pub fn dispatch(engine: &mut PayEngine, request: ApiRequest) -> serde_json::Value {
    match handle(engine, request) {
        Ok(value) => value,
        Err(e) => json!({ "error": error_body(&e) }),
    }
}

fn handle(engine: &mut PayEngine, request: ApiRequest) -> Result<serde_json::Value, PayError> {
    match request {
        ApiRequest::Create {
            booking_id,
            rider_id,
            driver_id,
            amount,
        } => {
            let amount = parse_amount(amount)?;
            let created = engine.create_transaction(&booking_id, &rider_id, &driver_id, amount)?;
            to_value(CreateResponse {
                transaction_id: created.transaction.txn_id.clone(),
                rider_code: created.transaction.confirmation_code.clone(),
                instructions: created.instructions,
                trust_score: created.trust_score,
            })
        }
        ApiRequest::ConfirmReceived {
            transaction_id,
            actual_amount,
            location,
        } => {
            let actual = parse_amount(actual_amount)?;
            let outcome = engine.driver_confirm(&transaction_id, actual, location.as_deref())?;
            to_value(driver_confirm_response(outcome))
        }
        ApiRequest::ConfirmPaid {
            transaction_id,
            confirmation_code,
        } => {
            let outcome = engine.rider_confirm(&transaction_id, &confirmation_code)?;
            to_value(rider_confirm_response(outcome))
        }
        ApiRequest::Dispute {
            transaction_id,
            reported_by,
            reason,
            description,
            evidence,
        } => {
            let reason = DisputeReason::parse(&reason).ok_or_else(|| {
                PayError::Validation(format!("unknown dispute reason: {reason}"))
            })?;
            let dispute = engine.report_dispute(
                &transaction_id,
                &reported_by,
                reason,
                &description,
                evidence.as_deref(),
            )?;
            to_value(DisputeResponse {
                dispute_id: dispute.dispute_id,
                status: dispute.status.as_str().to_string(),
                message: "Dispute recorded. The payment is frozen pending review.".to_string(),
            })
        }
        ApiRequest::Wallet { user_id } => {
            let profile = engine.wallet(&user_id)?;
            to_value(wallet_response(&profile))
        }
        ApiRequest::History {
            user_id,
            limit,
            offset,
            status,
        } => {
            let status = match status {
                Some(s) => Some(TxnStatus::parse(&s).ok_or_else(|| {
                    PayError::Validation(format!("unknown status filter: {s}"))
                })?),
                None => None,
            };
            let limit = limit.unwrap_or(20);
            let offset = offset.unwrap_or(0);
            let (items, total) = engine.history(&user_id, limit, offset, status)?;
            to_value(HistoryResponse {
                transactions: items.into_iter().map(history_item).collect(),
                total,
                limit: limit.clamp(1, 100),
                offset: offset.max(0),
            })
        }
        ApiRequest::CreateWallet {
            user_id,
            verification_level,
        } => {
            let level = VerificationLevel::parse(&verification_level).ok_or_else(|| {
                PayError::Validation(format!(
                    "unknown verification level: {verification_level}"
                ))
            })?;
            let profile = engine.create_profile(&user_id, level)?;
            to_value(wallet_response(&profile))
        }
        ApiRequest::Sweep => {
            let expired = engine.expire_overdue()?;
            Ok(json!({ "expired": expired }))
        }
    }
}

fn parse_amount(dollars: f64) -> Result<Amount, PayError> {
    let amount = Amount::from_dollars(dollars)
        .ok_or_else(|| PayError::Validation(format!("invalid amount: {dollars}")))?;
    if !amount.is_positive() {
        return Err(PayError::Validation(
            "Amount must be greater than zero".to_string(),
        ));
    }
    Ok(amount)
}

fn driver_confirm_response(outcome: ConfirmOutcome) -> ConfirmResponse {
    let mut message = if outcome.already_confirmed {
        "Already confirmed.".to_string()
    } else if outcome.completed {
        "Cash payment completed.".to_string()
    } else {
        "Receipt recorded.".to_string()
    };
    if outcome.discrepancy_flagged {
        message.push_str(" Amount discrepancy recorded for review.");
    }
    ConfirmResponse {
        status: outcome.status,
        message,
        next_step: (!outcome.completed).then(|| "Waiting for rider confirmation".to_string()),
    }
}

fn rider_confirm_response(outcome: ConfirmOutcome) -> ConfirmResponse {
    let message = if outcome.already_confirmed {
        "Already confirmed.".to_string()
    } else if outcome.completed {
        "Cash payment completed.".to_string()
    } else {
        "Payment confirmed.".to_string()
    };
    ConfirmResponse {
        status: outcome.status,
        message,
        next_step: (!outcome.completed).then(|| "Waiting for driver confirmation".to_string()),
    }
}

fn wallet_response(p: &TrustProfile) -> WalletResponse {
    WalletResponse {
        user_id: p.user_id.clone(),
        trust_score: p.trust_score,
        verification_level: p.verification_level,
        phone_verified: p.phone_verified,
        id_verified: p.id_verified,
        address_verified: p.address_verified,
        daily_cash_limit: p.daily_limit.to_dollars(),
        daily_cash_used: p.daily_used.to_dollars(),
        daily_remaining: limits::remaining(p, LimitWindow::Daily).to_dollars(),
        weekly_cash_limit: p.weekly_limit.to_dollars(),
        weekly_cash_used: p.weekly_used.to_dollars(),
        weekly_remaining: limits::remaining(p, LimitWindow::Weekly).to_dollars(),
        monthly_cash_limit: p.monthly_limit.to_dollars(),
        monthly_cash_used: p.monthly_used.to_dollars(),
        monthly_remaining: limits::remaining(p, LimitWindow::Monthly).to_dollars(),
        is_suspended: p.is_suspended,
        suspension_reason: p.suspension_reason.clone(),
    }
}

fn history_item(s: TxnSummary) -> HistoryItem {
    HistoryItem {
        transaction_id: s.txn_id,
        booking_id: s.booking_id,
        counterparty_id: s.counterparty,
        amount: s.amount.to_dollars(),
        status: s.status,
        created_at: s.created_at.to_rfc3339(),
    }
}

fn to_value<T: Serialize>(value: T) -> Result<serde_json::Value, PayError> {
    serde_json::to_value(value).map_err(Into::into)
}
