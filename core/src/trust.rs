//! Trust-score evaluation — maps a requested amount to the minimum trust
//! score required and compares it against a profile snapshot.
//!
//! Pure functions, no side effects. Callers reject non-positive amounts
//! before evaluation.

use crate::money::Amount;
use crate::profile::TrustProfile;

/// Minimum trust score required for a cash amount. Step function with
/// inclusive lower tiers: exactly $100.00 still requires 60.
pub fn required_trust(amount: Amount) -> u8 {
    let cents = amount.cents();
    if cents <= 10_00 {
        20
    } else if cents <= 50_00 {
        40
    } else if cents <= 100_00 {
        60
    } else if cents <= 500_00 {
        80
    } else {
        90
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustEvaluation {
    pub ok: bool,
    pub required_trust: u8,
    pub current_trust: u8,
}

pub fn evaluate(profile: &TrustProfile, amount: Amount) -> TrustEvaluation {
    let required = required_trust(amount);
    TrustEvaluation {
        ok: profile.trust_score >= required,
        required_trust: required,
        current_trust: profile.trust_score,
    }
}
