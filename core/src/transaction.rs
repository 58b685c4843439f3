//! Cash transaction records and the status lattice.
//!
//! Status only moves forward: pending → single-confirmed → completed, with
//! `disputed` reachable from any non-terminal state and `expired`/`failed`
//! as the other terminal exits. Transition legality lives here; the store
//! re-checks it with status-guarded updates so a lost race can never write
//! an illegal transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Amount;
use crate::types::{BookingId, TxnId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnStatus {
    PendingVerification,
    DriverConfirmed,
    RiderConfirmed,
    Completed,
    Disputed,
    Expired,
    Failed,
}

impl TxnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingVerification => "pending_verification",
            Self::DriverConfirmed => "driver_confirmed",
            Self::RiderConfirmed => "rider_confirmed",
            Self::Completed => "completed",
            Self::Disputed => "disputed",
            Self::Expired => "expired",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_verification" => Some(Self::PendingVerification),
            "driver_confirmed" => Some(Self::DriverConfirmed),
            "rider_confirmed" => Some(Self::RiderConfirmed),
            "completed" => Some(Self::Completed),
            "disputed" => Some(Self::Disputed),
            "expired" => Some(Self::Expired),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Disputed | Self::Expired | Self::Failed)
    }

    /// States the expiry sweep may still act on.
    pub fn is_expirable(&self) -> bool {
        matches!(
            self,
            Self::PendingVerification | Self::DriverConfirmed | Self::RiderConfirmed
        )
    }
}

impl fmt::Display for TxnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status after the driver's confirmation lands on `current`.
/// None: the transition is not legal from `current`.
pub fn after_driver_confirm(current: TxnStatus) -> Option<TxnStatus> {
    match current {
        TxnStatus::PendingVerification => Some(TxnStatus::DriverConfirmed),
        TxnStatus::RiderConfirmed => Some(TxnStatus::Completed),
        _ => None,
    }
}

/// Status after the rider's confirmation lands on `current`.
pub fn after_rider_confirm(current: TxnStatus) -> Option<TxnStatus> {
    match current {
        TxnStatus::PendingVerification => Some(TxnStatus::RiderConfirmed),
        TxnStatus::DriverConfirmed => Some(TxnStatus::Completed),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashTransaction {
    pub txn_id: TxnId,
    pub booking_id: BookingId,
    pub rider_id: UserId,
    pub driver_id: UserId,
    /// Expected amount, fixed at creation.
    pub amount: Amount,
    /// What the driver says was handed over. Set by driver confirmation.
    pub actual_amount_claimed: Option<Amount>,
    /// Finalized only on the completion transition.
    pub platform_fee: Option<Amount>,
    /// 6 ASCII digits, generated once at creation, immutable.
    pub confirmation_code: String,
    pub status: TxnStatus,
    pub rider_confirmed_at: Option<DateTime<Utc>>,
    pub driver_confirmed_at: Option<DateTime<Utc>>,
    pub driver_location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Per-transaction anomaly signal, audit-only. Never gates transitions.
    pub risk_score: f64,
    /// |actual - expected| in cents, recorded at driver confirmation.
    pub discrepancy_cents: Option<i64>,
    /// True when the discrepancy exceeded the configured tolerance.
    pub discrepancy_flagged: bool,
    pub code_attempts: u32,
    pub attempts_locked_until: Option<DateTime<Utc>>,
}

impl CashTransaction {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn discrepancy(&self) -> Option<Amount> {
        self.actual_amount_claimed
            .map(|actual| actual.abs_diff(self.amount))
    }
}

/// Row shape for history listings — the client never needs codes or audit
/// columns there.
#[derive(Debug, Clone, Serialize)]
pub struct TxnSummary {
    pub txn_id: TxnId,
    pub booking_id: BookingId,
    pub counterparty: UserId,
    pub amount: Amount,
    pub status: TxnStatus,
    pub created_at: DateTime<Utc>,
}
