//! Rolling cash-limit tracking — read-only views over a profile's usage
//! counters. The counters themselves change only inside the state machine's
//! completion transition; window resets happen in `TrustProfile::roll_forward`.

use crate::money::Amount;
use crate::profile::TrustProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitWindow {
    Daily,
    Weekly,
    Monthly,
}

impl LimitWindow {
    /// Label used in user-facing denial text.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
        }
    }
}

/// Allowance left in one window, saturating at zero.
pub fn remaining(profile: &TrustProfile, window: LimitWindow) -> Amount {
    let (limit, used) = match window {
        LimitWindow::Daily => (profile.daily_limit, profile.daily_used),
        LimitWindow::Weekly => (profile.weekly_limit, profile.weekly_used),
        LimitWindow::Monthly => (profile.monthly_limit, profile.monthly_used),
    };
    limit.saturating_sub(used)
}

/// The window with the least allowance left.
pub fn tightest(profile: &TrustProfile) -> (LimitWindow, Amount) {
    let mut best = (LimitWindow::Daily, remaining(profile, LimitWindow::Daily));
    for window in [LimitWindow::Weekly, LimitWindow::Monthly] {
        let left = remaining(profile, window);
        if left < best.1 {
            best = (window, left);
        }
    }
    best
}

/// Would completing `amount` overrun any window? Returns the tightest
/// failing window and its remaining allowance, for the denial message.
pub fn would_exceed(profile: &TrustProfile, amount: Amount) -> Option<(LimitWindow, Amount)> {
    let mut worst: Option<(LimitWindow, Amount)> = None;
    for window in [LimitWindow::Daily, LimitWindow::Weekly, LimitWindow::Monthly] {
        let left = remaining(profile, window);
        if amount > left && worst.map_or(true, |(_, w)| left < w) {
            worst = Some((window, left));
        }
    }
    worst
}
