use serde::{Deserialize, Serialize};

use crate::profile::VerificationLevel;

/// Cash limits and starting trust for one verification level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelLimits {
    pub daily_cents: i64,
    pub weekly_cents: i64,
    pub monthly_cents: i64,
    pub starting_trust: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSchedule {
    pub basic: LevelLimits,
    pub verified: LevelLimits,
    pub premium: LevelLimits,
}

impl LimitSchedule {
    pub fn for_level(&self, level: VerificationLevel) -> &LevelLimits {
        match level {
            VerificationLevel::Basic => &self.basic,
            VerificationLevel::Verified => &self.verified,
            VerificationLevel::Premium => &self.premium,
        }
    }
}

/// Which confirmation-code issuer the engine is wired with.
/// Deterministic mode exists for tests and sandbox deployments — selection
/// happens here, never through environment flags in business logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CodeIssuerConfig {
    Random,
    Deterministic { seed: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayConfig {
    pub limits: LimitSchedule,
    /// Expected ride duration covered by a confirmation code.
    pub ride_window_minutes: i64,
    /// Slack after the ride window before the code expires.
    pub grace_minutes: i64,
    /// Absolute rider/driver amount difference tolerated without a
    /// discrepancy flag.
    pub discrepancy_tolerance_cents: i64,
    /// Platform fee in basis points, finalized on completion.
    pub platform_fee_bps: i64,
    /// Bad code entries allowed per transaction before lockout.
    pub max_code_attempts: u32,
    pub attempt_cooldown_minutes: i64,
    /// Non-terminal transactions one payer may hold at once.
    pub max_open_transactions: i64,
    /// Trust points removed from the losing party of an upheld dispute.
    pub dispute_trust_penalty: u8,
    /// Upheld disputes within the lookback that trigger suspension.
    pub suspension_dispute_threshold: i64,
    pub dispute_lookback_days: i64,
    /// Expiry sweep cadence for the runner binary.
    pub sweep_interval_secs: u64,
    pub code_issuer: CodeIssuerConfig,
}

impl PayConfig {
    /// Load from the data/ directory.
    /// In tests, use PayConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/payments/cash_payment.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PayConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            limits: LimitSchedule {
                basic: LevelLimits {
                    daily_cents: 100_00,
                    weekly_cents: 500_00,
                    monthly_cents: 1_500_00,
                    starting_trust: 35,
                },
                verified: LevelLimits {
                    daily_cents: 300_00,
                    weekly_cents: 1_500_00,
                    monthly_cents: 5_000_00,
                    starting_trust: 60,
                },
                premium: LevelLimits {
                    daily_cents: 1_000_00,
                    weekly_cents: 5_000_00,
                    monthly_cents: 20_000_00,
                    starting_trust: 85,
                },
            },
            ride_window_minutes: 120,
            grace_minutes: 15,
            discrepancy_tolerance_cents: 50,
            platform_fee_bps: 250,
            max_code_attempts: 5,
            attempt_cooldown_minutes: 30,
            max_open_transactions: 3,
            dispute_trust_penalty: 5,
            suspension_dispute_threshold: 3,
            dispute_lookback_days: 90,
            sweep_interval_secs: 60,
            code_issuer: CodeIssuerConfig::Deterministic { seed: 42 },
        }
    }

    pub fn code_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.ride_window_minutes + self.grace_minutes)
    }
}
