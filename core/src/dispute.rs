//! Disputes — freeze-and-escalate records raised by either party while a
//! transaction is still in flight. Opening one moves the transaction to
//! `disputed` immediately and permanently; resolution closes the dispute
//! record but never reopens the transaction into the confirmation flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DisputeId, TxnId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeReason {
    WrongAmount,
    NoPaymentReceived,
    Other,
}

impl DisputeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WrongAmount => "wrong_amount",
            Self::NoPaymentReceived => "no_payment_received",
            Self::Other => "other",
        }
    }

    /// Accepts the legacy client alias `driver_issue` for
    /// `no_payment_received`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wrong_amount" => Some(Self::WrongAmount),
            "no_payment_received" | "driver_issue" => Some(Self::NoPaymentReceived),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Resolved,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::UnderReview => "under_review",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "under_review" => Some(Self::UnderReview),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// Reviewer verdict, applied by the external resolution path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisputeOutcome {
    /// The complaint stands; the named party is at fault and takes the
    /// trust consequence.
    Upheld { against: UserId },
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub dispute_id: DisputeId,
    pub txn_id: TxnId,
    pub reported_by: UserId,
    pub reason: DisputeReason,
    /// Free text, stored verbatim for human review.
    pub description: String,
    pub evidence: Option<String>,
    pub status: DisputeStatus,
    pub outcome: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
