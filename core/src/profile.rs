//! Trust profiles — per-user trust score, verification flags, and rolling
//! cash-usage counters.
//!
//! Usage counters carry a window anchor (the wall-clock start of the window
//! they belong to). `roll_forward` zeroes any counter whose anchor has
//! lapsed; it runs whenever a profile is loaded for a decision, so counters
//! are always current before the gate reads them.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LevelLimits;
use crate::money::Amount;
use crate::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationLevel {
    Basic,
    Verified,
    Premium,
}

impl VerificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Verified => "verified",
            Self::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(Self::Basic),
            "verified" => Some(Self::Verified),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustProfile {
    pub user_id: UserId,
    /// 0–100. Gates eligibility for higher cash amounts.
    pub trust_score: u8,
    pub verification_level: VerificationLevel,
    pub phone_verified: bool,
    pub id_verified: bool,
    pub address_verified: bool,

    pub daily_limit: Amount,
    pub daily_used: Amount,
    pub daily_anchor: NaiveDate,
    pub weekly_limit: Amount,
    pub weekly_used: Amount,
    pub weekly_anchor: NaiveDate,
    pub monthly_limit: Amount,
    pub monthly_used: Amount,
    pub monthly_anchor: NaiveDate,

    pub is_suspended: bool,
    pub suspension_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TrustProfile {
    pub fn new(
        user_id: UserId,
        level: VerificationLevel,
        limits: &LevelLimits,
        now: DateTime<Utc>,
    ) -> Self {
        let today = now.date_naive();
        Self {
            user_id,
            trust_score: limits.starting_trust,
            verification_level: level,
            phone_verified: true,
            id_verified: level != VerificationLevel::Basic,
            address_verified: level == VerificationLevel::Premium,
            daily_limit: Amount::from_cents(limits.daily_cents),
            daily_used: Amount::ZERO,
            daily_anchor: day_anchor(today),
            weekly_limit: Amount::from_cents(limits.weekly_cents),
            weekly_used: Amount::ZERO,
            weekly_anchor: week_anchor(today),
            monthly_limit: Amount::from_cents(limits.monthly_cents),
            monthly_used: Amount::ZERO,
            monthly_anchor: month_anchor(today),
            is_suspended: false,
            suspension_reason: None,
            created_at: now,
        }
    }

    /// Reset any usage counter whose window has rolled over.
    /// Returns true when something changed and the row needs persisting.
    pub fn roll_forward(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        let mut changed = false;

        let day = day_anchor(today);
        if day > self.daily_anchor {
            self.daily_used = Amount::ZERO;
            self.daily_anchor = day;
            changed = true;
        }
        let week = week_anchor(today);
        if week > self.weekly_anchor {
            self.weekly_used = Amount::ZERO;
            self.weekly_anchor = week;
            changed = true;
        }
        let month = month_anchor(today);
        if month > self.monthly_anchor {
            self.monthly_used = Amount::ZERO;
            self.monthly_anchor = month;
            changed = true;
        }
        changed
    }
}

/// Daily windows start at UTC midnight.
pub fn day_anchor(date: NaiveDate) -> NaiveDate {
    date
}

/// Weekly windows start on the ISO week's Monday.
pub fn week_anchor(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Monthly windows start on the 1st.
pub fn month_anchor(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}
