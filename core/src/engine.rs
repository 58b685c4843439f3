//! The payment engine — the heart of the cash reconciliation service.
//!
//! RULES:
//!   - The engine owns the store, the clock, and the code issuer; callers
//!     never touch them independently.
//!   - One engine instance is the single writer; every status transition is
//!     additionally status-guarded in SQL, so a lost race surfaces as a
//!     conflict instead of a silent overwrite.
//!   - Usage counters move only on the completion transition, atomically
//!     with the status flip and fee finalization.
//!   - Every externally visible state change is appended to the event log.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::clock::Clock;
use crate::code::{self, CodeIssuer};
use crate::config::PayConfig;
use crate::dispute::{Dispute, DisputeOutcome, DisputeReason, DisputeStatus};
use crate::eligibility::{self, EligibilityDecision};
use crate::error::{PayError, PayResult};
use crate::event::{event_type_name, EventLogEntry, PayEvent};
use crate::money::Amount;
use crate::profile::{TrustProfile, VerificationLevel};
use crate::risk;
use crate::store::{CompletionFacts, PayStore};
use crate::transaction::{self, CashTransaction, TxnStatus, TxnSummary};
use crate::types::TxnId;

/// Result of a create call. The confirmation code travels inside the
/// transaction record and is for the rider's eyes only — the API layer never
/// includes it in driver-facing responses.
#[derive(Debug, Clone)]
pub struct CreatedTransaction {
    pub transaction: CashTransaction,
    pub instructions: String,
    pub trust_score: u8,
}

/// Result of a confirmation call.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmOutcome {
    pub status: TxnStatus,
    pub completed: bool,
    pub discrepancy_flagged: bool,
    /// True when this party had already confirmed and the call was a no-op.
    pub already_confirmed: bool,
}

pub struct PayEngine {
    pub store: PayStore,
    clock: Clock,
    config: PayConfig,
    codes: Box<dyn CodeIssuer>,
}

impl PayEngine {
    pub fn new(store: PayStore, config: PayConfig, clock: Clock, codes: Box<dyn CodeIssuer>) -> Self {
        Self {
            store,
            clock,
            config,
            codes,
        }
    }

    /// Production wiring: system clock, issuer chosen by configuration.
    pub fn build(store: PayStore, config: PayConfig) -> Self {
        let codes = code::issuer_from_config(&config.code_issuer);
        Self::new(store, config, Clock::system(), codes)
    }

    /// Fully wired engine for tests: in-memory store, pinned clock,
    /// seeded code issuer, default test config.
    pub fn build_test(seed: u64) -> PayResult<Self> {
        let store = PayStore::in_memory()?;
        store.migrate()?;
        let clock = Clock::fixed(
            DateTime::parse_from_rfc3339("2025-03-12T12:00:00Z")
                .map_err(|e| PayError::Validation(e.to_string()))?
                .with_timezone(&Utc),
        );
        Ok(Self::new(
            store,
            PayConfig::default_test(),
            clock,
            Box::new(crate::code::SeededCodeIssuer::new(seed)),
        ))
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn config(&self) -> &PayConfig {
        &self.config
    }

    // ── Profiles ───────────────────────────────────────────────

    /// Provision a trust profile at account verification, seeding limits
    /// and starting trust from the per-level schedule.
    pub fn create_profile(
        &mut self,
        user_id: &str,
        level: VerificationLevel,
    ) -> PayResult<TrustProfile> {
        if self.store.profile_exists(user_id)? {
            return Err(PayError::Validation(format!(
                "profile already exists for user {user_id}"
            )));
        }
        let now = self.clock.now();
        let limits = self.config.limits.for_level(level);
        let profile = TrustProfile::new(user_id.to_string(), level, limits, now);
        self.store.insert_profile(&profile)?;
        self.append_event(
            "engine",
            &PayEvent::ProfileCreated {
                user_id: user_id.to_string(),
                verification_level: level.as_str().to_string(),
            },
        )?;
        log::info!("profile created for {user_id} at level {}", level.as_str());
        Ok(profile)
    }

    /// The wallet view: the profile with usage windows rolled forward to now.
    pub fn wallet(&mut self, user_id: &str) -> PayResult<TrustProfile> {
        self.load_payer_profile(user_id)
    }

    /// Pure eligibility check over a rolled-forward profile snapshot.
    pub fn check_eligibility(
        &mut self,
        user_id: &str,
        amount: Amount,
    ) -> PayResult<EligibilityDecision> {
        if !amount.is_positive() {
            return Err(PayError::Validation(
                "Amount must be greater than zero".to_string(),
            ));
        }
        let profile = self.load_payer_profile(user_id)?;
        Ok(eligibility::can_pay(&profile, amount))
    }

    /// Load a profile for a decision. A storage failure must surface as
    /// "cannot verify eligibility", never as an approval; a missing profile
    /// stays distinct so the client can prompt for wallet setup.
    fn load_payer_profile(&mut self, user_id: &str) -> PayResult<TrustProfile> {
        let mut profile = match self.store.get_profile(user_id) {
            Ok(p) => p,
            Err(e @ PayError::ProfileNotFound { .. }) => return Err(e),
            Err(PayError::Database(e)) => return Err(PayError::ProfileUnavailable(e.to_string())),
            Err(e) => return Err(e),
        };
        if profile.roll_forward(self.clock.now()) {
            self.store.save_profile_windows(&profile)?;
        }
        Ok(profile)
    }

    // ── Create ─────────────────────────────────────────────────

    pub fn create_transaction(
        &mut self,
        booking_id: &str,
        rider_id: &str,
        driver_id: &str,
        amount: Amount,
    ) -> PayResult<CreatedTransaction> {
        if booking_id.is_empty() || rider_id.is_empty() || driver_id.is_empty() {
            return Err(PayError::Validation(
                "bookingId, riderId and driverId are required".to_string(),
            ));
        }
        if rider_id == driver_id {
            return Err(PayError::Validation(
                "rider and driver must be different users".to_string(),
            ));
        }
        if !amount.is_positive() {
            return Err(PayError::Validation(
                "Amount must be greater than zero".to_string(),
            ));
        }

        let profile = self.load_payer_profile(rider_id)?;

        let open = self.store.open_transaction_count(rider_id)?;
        if open >= self.config.max_open_transactions {
            return Err(PayError::EligibilityDenied {
                reason: "Too many cash payments in progress. Complete or dispute an open payment first."
                    .to_string(),
            });
        }

        let decision = eligibility::can_pay(&profile, amount);
        if !decision.can_pay {
            let reason = decision
                .reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "Not eligible for cash payment".to_string());
            log::info!("cash payment denied for {rider_id}: {reason}");
            return Err(PayError::EligibilityDenied { reason });
        }

        let now = self.clock.now();
        let lookback = now - Duration::days(self.config.dispute_lookback_days);
        let disputes_90d = self.store.dispute_count_involving(rider_id, lookback)?;

        let txn = CashTransaction {
            txn_id: format!("txn-{}", Uuid::new_v4()),
            booking_id: booking_id.to_string(),
            rider_id: rider_id.to_string(),
            driver_id: driver_id.to_string(),
            amount,
            actual_amount_claimed: None,
            platform_fee: None,
            confirmation_code: self.codes.issue(),
            status: TxnStatus::PendingVerification,
            rider_confirmed_at: None,
            driver_confirmed_at: None,
            driver_location: None,
            created_at: now,
            expires_at: now + self.config.code_ttl(),
            risk_score: risk::initial_score(amount, disputes_90d),
            discrepancy_cents: None,
            discrepancy_flagged: false,
            code_attempts: 0,
            attempts_locked_until: None,
        };
        self.store.insert_transaction(&txn)?;
        self.append_event(
            "engine",
            &PayEvent::TransactionCreated {
                txn_id: txn.txn_id.clone(),
                booking_id: txn.booking_id.clone(),
                rider_id: txn.rider_id.clone(),
                driver_id: txn.driver_id.clone(),
                amount_cents: amount.cents(),
                risk_score: txn.risk_score,
            },
        )?;
        log::info!("created {} for booking {booking_id} ({amount})", txn.txn_id);

        let instructions = format!(
            "Pay the driver {amount} in cash, then confirm the payment with your 6-digit code. \
             Keep the code to yourself until the cash has changed hands."
        );
        Ok(CreatedTransaction {
            transaction: txn,
            instructions,
            trust_score: decision.trust_score,
        })
    }

    // ── Confirmations ──────────────────────────────────────────

    /// Driver reports cash received. The state machine records the claimed
    /// amount and any discrepancy; it never blocks on one — the client is
    /// responsible for the explicit over-tolerance override prompt before
    /// calling this.
    pub fn driver_confirm(
        &mut self,
        txn_id: &str,
        actual_amount: Amount,
        location: Option<&str>,
    ) -> PayResult<ConfirmOutcome> {
        if !actual_amount.is_positive() {
            return Err(PayError::Validation(
                "Amount must be greater than zero".to_string(),
            ));
        }
        let txn = self.store.get_transaction(txn_id)?;

        // Retried confirmation from the same party: no-op, current status —
        // even after the transaction reached a terminal state.
        if txn.driver_confirmed_at.is_some() {
            return Ok(ConfirmOutcome {
                status: txn.status,
                completed: txn.status == TxnStatus::Completed,
                discrepancy_flagged: txn.discrepancy_flagged,
                already_confirmed: true,
            });
        }
        let txn = self.ensure_live(txn)?;

        let new_status = transaction::after_driver_confirm(txn.status)
            .ok_or_else(|| PayError::ConcurrencyConflict {
                txn_id: txn_id.to_string(),
            })?;

        let discrepancy = actual_amount.abs_diff(txn.amount);
        let flagged = discrepancy.cents() > self.config.discrepancy_tolerance_cents;
        let risk_score = risk::discrepancy_bump(
            txn.risk_score,
            discrepancy,
            self.config.discrepancy_tolerance_cents,
        );

        let now = self.clock.now();
        let completion = self.completion_facts(&txn, new_status)?;
        let applied = self.store.confirm_driver(
            txn_id,
            now,
            actual_amount,
            location,
            discrepancy.cents(),
            flagged,
            risk_score,
            new_status,
            txn.status,
            completion.as_ref(),
        )?;
        if !applied {
            return Err(self.classify_guard_miss(txn_id)?);
        }

        self.append_event(
            "engine",
            &PayEvent::DriverConfirmed {
                txn_id: txn_id.to_string(),
                actual_amount_cents: actual_amount.cents(),
                discrepancy_cents: discrepancy.cents(),
                discrepancy_flagged: flagged,
            },
        )?;
        if flagged {
            log::warn!(
                "{txn_id}: driver claimed {actual_amount} against expected {} ({} off)",
                txn.amount,
                discrepancy
            );
        }
        if let Some(facts) = &completion {
            self.log_completion(txn_id, &txn, facts)?;
        }
        Ok(ConfirmOutcome {
            status: new_status,
            completed: new_status == TxnStatus::Completed,
            discrepancy_flagged: flagged,
            already_confirmed: false,
        })
    }

    /// Rider proves payment with the confirmation code. A mismatch is a
    /// typed error that leaves state untouched apart from the server-side
    /// attempt counter, so the call is safely retryable.
    pub fn rider_confirm(&mut self, txn_id: &str, confirmation_code: &str) -> PayResult<ConfirmOutcome> {
        if !code::is_well_formed(confirmation_code) {
            return Err(PayError::Validation(
                "Confirmation code must be exactly 6 digits".to_string(),
            ));
        }
        let txn = self.store.get_transaction(txn_id)?;

        if txn.rider_confirmed_at.is_some() {
            return Ok(ConfirmOutcome {
                status: txn.status,
                completed: txn.status == TxnStatus::Completed,
                discrepancy_flagged: txn.discrepancy_flagged,
                already_confirmed: true,
            });
        }
        let txn = self.ensure_live(txn)?;

        let now = self.clock.now();
        if let Some(locked_until) = txn.attempts_locked_until {
            if now < locked_until {
                return Err(PayError::TooManyAttempts {
                    retry_at: locked_until,
                });
            }
        }

        if confirmation_code != txn.confirmation_code {
            let attempts = txn.code_attempts + 1;
            let locking = attempts >= self.config.max_code_attempts;
            let locked_until = locking
                .then(|| now + Duration::minutes(self.config.attempt_cooldown_minutes));
            let risk_score = risk::bad_code_bump(txn.risk_score, attempts);
            self.store
                .record_code_rejection(txn_id, locked_until, risk_score)?;
            self.append_event(
                "engine",
                &PayEvent::CodeRejected {
                    txn_id: txn_id.to_string(),
                    attempts,
                    locked: locking,
                },
            )?;
            return Err(match locked_until {
                Some(retry_at) => PayError::TooManyAttempts { retry_at },
                None => PayError::CodeMismatch {
                    attempts_remaining: self.config.max_code_attempts - attempts,
                },
            });
        }

        let new_status = transaction::after_rider_confirm(txn.status)
            .ok_or_else(|| PayError::ConcurrencyConflict {
                txn_id: txn_id.to_string(),
            })?;
        let completion = self.completion_facts(&txn, new_status)?;
        let applied =
            self.store
                .confirm_rider(txn_id, now, new_status, txn.status, completion.as_ref())?;
        if !applied {
            return Err(self.classify_guard_miss(txn_id)?);
        }

        self.append_event(
            "engine",
            &PayEvent::RiderConfirmed {
                txn_id: txn_id.to_string(),
            },
        )?;
        if let Some(facts) = &completion {
            self.log_completion(txn_id, &txn, facts)?;
        }
        Ok(ConfirmOutcome {
            status: new_status,
            completed: new_status == TxnStatus::Completed,
            discrepancy_flagged: txn.discrepancy_flagged,
            already_confirmed: false,
        })
    }

    /// Build completion side effects when this confirmation is the second
    /// one. Rolls the payer's windows first so the increment lands in the
    /// current windows.
    fn completion_facts(
        &mut self,
        txn: &CashTransaction,
        new_status: TxnStatus,
    ) -> PayResult<Option<CompletionFacts>> {
        if new_status != TxnStatus::Completed {
            return Ok(None);
        }
        // Normalize windows before the atomic increment.
        let _ = self.load_payer_profile(&txn.rider_id)?;
        Ok(Some(CompletionFacts {
            payer: txn.rider_id.clone(),
            amount: txn.amount,
            platform_fee: txn.amount.fee_bps(self.config.platform_fee_bps),
        }))
    }

    fn log_completion(
        &mut self,
        txn_id: &str,
        txn: &CashTransaction,
        facts: &CompletionFacts,
    ) -> PayResult<()> {
        self.append_event(
            "engine",
            &PayEvent::TransactionCompleted {
                txn_id: txn_id.to_string(),
                amount_cents: txn.amount.cents(),
                platform_fee_cents: facts.platform_fee.cents(),
            },
        )?;
        log::info!("{txn_id} completed ({}, fee {})", txn.amount, facts.platform_fee);
        Ok(())
    }

    /// Load a transaction that must still accept changes, expiring it
    /// lazily if its deadline already passed.
    fn load_live_transaction(&mut self, txn_id: &str) -> PayResult<CashTransaction> {
        let txn = self.store.get_transaction(txn_id)?;
        self.ensure_live(txn)
    }

    /// Terminal states come back as TerminalState errors; a transaction past
    /// its deadline is expired on the spot rather than waiting for the sweep.
    fn ensure_live(&mut self, txn: CashTransaction) -> PayResult<CashTransaction> {
        if txn.is_terminal() {
            return Err(PayError::TerminalState {
                txn_id: txn.txn_id.clone(),
                status: txn.status,
            });
        }
        let now = self.clock.now();
        if now >= txn.expires_at && txn.status.is_expirable() {
            if self.store.mark_expired(&txn.txn_id)? {
                self.append_event(
                    "engine",
                    &PayEvent::TransactionExpired {
                        txn_id: txn.txn_id.clone(),
                        prior_status: txn.status.as_str().to_string(),
                    },
                )?;
            }
            return Err(PayError::TerminalState {
                txn_id: txn.txn_id.clone(),
                status: TxnStatus::Expired,
            });
        }
        Ok(txn)
    }

    /// A guarded update wrote zero rows: someone else moved the transaction
    /// first. Re-read to report the most precise error.
    fn classify_guard_miss(&self, txn_id: &str) -> PayResult<PayError> {
        let current = self.store.get_transaction(txn_id)?;
        if current.is_terminal() {
            Ok(PayError::TerminalState {
                txn_id: txn_id.to_string(),
                status: current.status,
            })
        } else {
            Ok(PayError::ConcurrencyConflict {
                txn_id: txn_id.to_string(),
            })
        }
    }

    // ── Disputes ───────────────────────────────────────────────

    /// Either party freezes the transaction. Allowed from any non-terminal
    /// state; the transaction stays `disputed` permanently.
    pub fn report_dispute(
        &mut self,
        txn_id: &str,
        reported_by: &str,
        reason: DisputeReason,
        description: &str,
        evidence: Option<&str>,
    ) -> PayResult<Dispute> {
        let txn = self.load_live_transaction(txn_id)?;
        if reported_by != txn.rider_id && reported_by != txn.driver_id {
            return Err(PayError::Validation(format!(
                "user {reported_by} is not a party to transaction {txn_id}"
            )));
        }

        if !self.store.mark_disputed(txn_id)? {
            return Err(self.classify_guard_miss(txn_id)?);
        }

        let dispute = Dispute {
            dispute_id: format!("dsp-{}", Uuid::new_v4()),
            txn_id: txn_id.to_string(),
            reported_by: reported_by.to_string(),
            reason,
            description: description.to_string(),
            evidence: evidence.map(String::from),
            status: DisputeStatus::Open,
            outcome: None,
            created_at: self.clock.now(),
            resolved_at: None,
        };
        self.store.insert_dispute(&dispute)?;
        self.append_event(
            "engine",
            &PayEvent::DisputeOpened {
                dispute_id: dispute.dispute_id.clone(),
                txn_id: txn_id.to_string(),
                reported_by: reported_by.to_string(),
                reason: reason.as_str().to_string(),
            },
        )?;
        log::warn!(
            "{txn_id} disputed by {reported_by}: {}",
            reason.as_str()
        );
        Ok(dispute)
    }

    /// Move an open dispute under review. External review tooling calls this
    /// when a human picks the case up.
    pub fn begin_dispute_review(&mut self, dispute_id: &str) -> PayResult<Dispute> {
        let dispute = self.store.get_dispute(dispute_id)?;
        if dispute.status != DisputeStatus::Open {
            return Err(PayError::Validation(format!(
                "dispute {dispute_id} is {}, not open",
                dispute.status.as_str()
            )));
        }
        self.store
            .set_dispute_status(dispute_id, DisputeStatus::UnderReview)?;
        self.store.get_dispute(dispute_id)
    }

    /// Apply the external reviewer's verdict. The dispute closes; the
    /// originating transaction remains `disputed` forever. An upheld verdict
    /// costs the at-fault party trust, and repeated upheld verdicts suspend
    /// them.
    pub fn resolve_dispute(
        &mut self,
        dispute_id: &str,
        outcome: DisputeOutcome,
    ) -> PayResult<Dispute> {
        let dispute = self.store.get_dispute(dispute_id)?;
        if dispute.status == DisputeStatus::Resolved {
            return Err(PayError::Validation(format!(
                "dispute {dispute_id} is already resolved"
            )));
        }
        let txn = self.store.get_transaction(&dispute.txn_id)?;
        let now = self.clock.now();

        let (outcome_str, at_fault) = match &outcome {
            DisputeOutcome::Upheld { against } => {
                if *against != txn.rider_id && *against != txn.driver_id {
                    return Err(PayError::Validation(format!(
                        "user {against} is not a party to transaction {}",
                        txn.txn_id
                    )));
                }
                ("upheld", Some(against.clone()))
            }
            DisputeOutcome::Rejected => ("rejected", None),
        };

        self.store
            .resolve_dispute(dispute_id, outcome_str, at_fault.as_deref(), now)?;

        if let Some(user) = &at_fault {
            self.store
                .apply_trust_penalty(user, self.config.dispute_trust_penalty)?;
            let lookback = now - Duration::days(self.config.dispute_lookback_days);
            let upheld = self.store.upheld_count_against(user, lookback)?;
            if upheld >= self.config.suspension_dispute_threshold {
                let reason = format!(
                    "Suspended after {upheld} upheld cash-payment disputes in {} days",
                    self.config.dispute_lookback_days
                );
                self.store.suspend_profile(user, &reason)?;
                self.append_event(
                    "engine",
                    &PayEvent::ProfileSuspended {
                        user_id: user.clone(),
                        reason,
                    },
                )?;
            }
        }

        self.append_event(
            "engine",
            &PayEvent::DisputeResolved {
                dispute_id: dispute_id.to_string(),
                outcome: outcome_str.to_string(),
            },
        )?;
        self.store.get_dispute(dispute_id)
    }

    // ── Expiry sweep ───────────────────────────────────────────

    /// Move every confirmable transaction past its deadline to `expired`.
    /// Run periodically by the daemon; cheap when nothing is overdue.
    pub fn expire_overdue(&mut self) -> PayResult<Vec<TxnId>> {
        let now = self.clock.now();
        let expired = self.store.expire_overdue(now)?;
        for (txn_id, prior) in &expired {
            self.append_event(
                "sweep",
                &PayEvent::TransactionExpired {
                    txn_id: txn_id.clone(),
                    prior_status: prior.as_str().to_string(),
                },
            )?;
        }
        if !expired.is_empty() {
            log::info!("expired {} overdue transactions", expired.len());
        }
        Ok(expired.into_iter().map(|(id, _)| id).collect())
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn history(
        &mut self,
        user_id: &str,
        limit: i64,
        offset: i64,
        status: Option<TxnStatus>,
    ) -> PayResult<(Vec<TxnSummary>, i64)> {
        let limit = limit.clamp(1, 100);
        let offset = offset.max(0);
        self.store
            .transaction_history(user_id, limit, offset, status)
    }

    pub fn get_transaction(&self, txn_id: &str) -> PayResult<CashTransaction> {
        self.store.get_transaction(txn_id)
    }

    pub fn get_dispute(&self, dispute_id: &str) -> PayResult<Dispute> {
        self.store.get_dispute(dispute_id)
    }

    // ── Event log ──────────────────────────────────────────────

    fn append_event(&self, actor: &str, event: &PayEvent) -> PayResult<()> {
        let entry = EventLogEntry {
            id: None,
            at: self.clock.now(),
            actor: actor.to_string(),
            event_type: event_type_name(event).to_string(),
            payload: serde_json::to_string(event)?,
        };
        self.store.append_event(&entry)
    }
}
