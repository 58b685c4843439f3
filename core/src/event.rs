//! The event log — every externally visible state change is appended here.
//!
//! RULE: Events record what happened; they are never read back to drive
//! business decisions. Review tooling and tests consume them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DisputeId, TxnId, UserId};

/// Every event the payment engine emits.
/// Variants are added as features land — never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayEvent {
    ProfileCreated {
        user_id: UserId,
        verification_level: String,
    },
    ProfileSuspended {
        user_id: UserId,
        reason: String,
    },
    TransactionCreated {
        txn_id: TxnId,
        booking_id: String,
        rider_id: UserId,
        driver_id: UserId,
        amount_cents: i64,
        risk_score: f64,
    },
    DriverConfirmed {
        txn_id: TxnId,
        actual_amount_cents: i64,
        discrepancy_cents: i64,
        discrepancy_flagged: bool,
    },
    RiderConfirmed {
        txn_id: TxnId,
    },
    TransactionCompleted {
        txn_id: TxnId,
        amount_cents: i64,
        platform_fee_cents: i64,
    },
    TransactionExpired {
        txn_id: TxnId,
        prior_status: String,
    },
    CodeRejected {
        txn_id: TxnId,
        attempts: u32,
        locked: bool,
    },
    DisputeOpened {
        dispute_id: DisputeId,
        txn_id: TxnId,
        reported_by: UserId,
        reason: String,
    },
    DisputeResolved {
        dispute_id: DisputeId,
        outcome: String,
    },
}

/// A persisted event-log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub at: DateTime<Utc>,
    /// Which path emitted the event: "engine" or "sweep".
    pub actor: String,
    pub event_type: String,
    pub payload: String,
}

/// Extract a stable string name from a PayEvent variant.
/// Used for the event_type column in event_log.
pub fn event_type_name(event: &PayEvent) -> &'static str {
    match event {
        PayEvent::ProfileCreated { .. } => "profile_created",
        PayEvent::ProfileSuspended { .. } => "profile_suspended",
        PayEvent::TransactionCreated { .. } => "transaction_created",
        PayEvent::DriverConfirmed { .. } => "driver_confirmed",
        PayEvent::RiderConfirmed { .. } => "rider_confirmed",
        PayEvent::TransactionCompleted { .. } => "transaction_completed",
        PayEvent::TransactionExpired { .. } => "transaction_expired",
        PayEvent::CodeRejected { .. } => "code_rejected",
        PayEvent::DisputeOpened { .. } => "dispute_opened",
        PayEvent::DisputeResolved { .. } => "dispute_resolved",
    }
}
