//! Store methods for the cash-transaction lifecycle.
//!
//! Confirmations are written with status-guarded updates; the completion
//! variant also folds the payer's usage counters and the platform fee into
//! the same SQLite transaction, so a crash can never record a completion
//! without its limit accounting.

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{parse_dt, parse_opt_dt, PayStore};
use crate::error::PayResult;
use crate::money::Amount;
use crate::transaction::{CashTransaction, TxnStatus, TxnSummary};
use crate::types::{TxnId, UserId};

/// Side effects that must land atomically with a completing confirmation.
#[derive(Debug, Clone)]
pub struct CompletionFacts {
    pub payer: UserId,
    pub amount: Amount,
    pub platform_fee: Amount,
}

impl PayStore {
    pub fn insert_transaction(&self, t: &CashTransaction) -> PayResult<()> {
        self.conn().execute(
            "INSERT INTO cash_transaction (
                txn_id, booking_id, rider_id, driver_id,
                amount_cents, actual_amount_cents, platform_fee_cents,
                confirmation_code, status,
                rider_confirmed_at, driver_confirmed_at, driver_location,
                created_at, expires_at, risk_score,
                discrepancy_cents, discrepancy_flagged,
                code_attempts, attempts_locked_until
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                &t.txn_id,
                &t.booking_id,
                &t.rider_id,
                &t.driver_id,
                t.amount.cents(),
                t.actual_amount_claimed.map(|a| a.cents()),
                t.platform_fee.map(|a| a.cents()),
                &t.confirmation_code,
                t.status.as_str(),
                t.rider_confirmed_at.map(|d| d.to_rfc3339()),
                t.driver_confirmed_at.map(|d| d.to_rfc3339()),
                t.driver_location.as_deref(),
                t.created_at.to_rfc3339(),
                t.expires_at.to_rfc3339(),
                t.risk_score,
                t.discrepancy_cents,
                t.discrepancy_flagged as i32,
                t.code_attempts as i64,
                t.attempts_locked_until.map(|d| d.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get_transaction(&self, txn_id: &str) -> PayResult<CashTransaction> {
        self.conn()
            .query_row(
                "SELECT txn_id, booking_id, rider_id, driver_id,
                        amount_cents, actual_amount_cents, platform_fee_cents,
                        confirmation_code, status,
                        rider_confirmed_at, driver_confirmed_at, driver_location,
                        created_at, expires_at, risk_score,
                        discrepancy_cents, discrepancy_flagged,
                        code_attempts, attempts_locked_until
                 FROM cash_transaction WHERE txn_id = ?1",
                params![txn_id],
                txn_row_mapper,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    crate::error::PayError::TransactionNotFound {
                        txn_id: txn_id.to_string(),
                    }
                }
                other => other.into(),
            })
    }

    /// Record the driver's confirmation. Guarded on `expect`; returns false
    /// when the row was no longer in that status (lost race or terminal).
    /// When `completion` is set, the payer's usage counters and the platform
    /// fee commit in the same transaction.
    #[allow(clippy::too_many_arguments)]
    pub fn confirm_driver(
        &self,
        txn_id: &str,
        at: DateTime<Utc>,
        actual: Amount,
        location: Option<&str>,
        discrepancy_cents: i64,
        discrepancy_flagged: bool,
        risk_score: f64,
        new_status: TxnStatus,
        expect: TxnStatus,
        completion: Option<&CompletionFacts>,
    ) -> PayResult<bool> {
        let tx = self.conn().unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE cash_transaction SET
                status = ?1, driver_confirmed_at = ?2,
                actual_amount_cents = ?3, driver_location = ?4,
                discrepancy_cents = ?5, discrepancy_flagged = ?6,
                risk_score = ?7,
                platform_fee_cents = COALESCE(?8, platform_fee_cents)
             WHERE txn_id = ?9 AND status = ?10",
            params![
                new_status.as_str(),
                at.to_rfc3339(),
                actual.cents(),
                location,
                discrepancy_cents,
                discrepancy_flagged as i32,
                risk_score,
                completion.map(|c| c.platform_fee.cents()),
                txn_id,
                expect.as_str(),
            ],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        if let Some(facts) = completion {
            apply_usage(&tx, facts)?;
        }
        tx.commit()?;
        Ok(true)
    }

    /// Record the rider's confirmation (code already validated by the
    /// engine). Same guard and completion semantics as `confirm_driver`.
    pub fn confirm_rider(
        &self,
        txn_id: &str,
        at: DateTime<Utc>,
        new_status: TxnStatus,
        expect: TxnStatus,
        completion: Option<&CompletionFacts>,
    ) -> PayResult<bool> {
        let tx = self.conn().unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE cash_transaction SET
                status = ?1, rider_confirmed_at = ?2,
                platform_fee_cents = COALESCE(?3, platform_fee_cents)
             WHERE txn_id = ?4 AND status = ?5",
            params![
                new_status.as_str(),
                at.to_rfc3339(),
                completion.map(|c| c.platform_fee.cents()),
                txn_id,
                expect.as_str(),
            ],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        if let Some(facts) = completion {
            apply_usage(&tx, facts)?;
        }
        tx.commit()?;
        Ok(true)
    }

    /// Count a rejected confirmation code and optionally start a lockout.
    /// Returns the new attempt count.
    pub fn record_code_rejection(
        &self,
        txn_id: &str,
        locked_until: Option<DateTime<Utc>>,
        risk_score: f64,
    ) -> PayResult<u32> {
        self.conn().execute(
            "UPDATE cash_transaction SET
                code_attempts = code_attempts + 1,
                attempts_locked_until = COALESCE(?1, attempts_locked_until),
                risk_score = ?2
             WHERE txn_id = ?3",
            params![locked_until.map(|d| d.to_rfc3339()), risk_score, txn_id],
        )?;
        let attempts: i64 = self.conn().query_row(
            "SELECT code_attempts FROM cash_transaction WHERE txn_id = ?1",
            params![txn_id],
            |row| row.get(0),
        )?;
        Ok(attempts as u32)
    }

    /// Move the transaction to `disputed` if it is still non-terminal.
    pub fn mark_disputed(&self, txn_id: &str) -> PayResult<bool> {
        let changed = self.conn().execute(
            "UPDATE cash_transaction SET status = 'disputed'
             WHERE txn_id = ?1
               AND status IN ('pending_verification', 'driver_confirmed', 'rider_confirmed')",
            params![txn_id],
        )?;
        Ok(changed > 0)
    }

    /// Expire every confirmable transaction past its deadline.
    /// Returns (id, prior status) pairs for event logging.
    pub fn expire_overdue(&self, now: DateTime<Utc>) -> PayResult<Vec<(TxnId, TxnStatus)>> {
        let tx = self.conn().unchecked_transaction()?;
        let overdue: Vec<(String, String)> = {
            let mut stmt = tx.prepare(
                "SELECT txn_id, status FROM cash_transaction
                 WHERE status IN ('pending_verification', 'driver_confirmed', 'rider_confirmed')
                   AND expires_at <= ?1",
            )?;
            let rows = stmt.query_map(params![now.to_rfc3339()], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        for (txn_id, _) in &overdue {
            tx.execute(
                "UPDATE cash_transaction SET status = 'expired' WHERE txn_id = ?1",
                params![txn_id],
            )?;
        }
        tx.commit()?;

        Ok(overdue
            .into_iter()
            .filter_map(|(id, status)| TxnStatus::parse(&status).map(|s| (id, s)))
            .collect())
    }

    /// Single guarded expiry, used when a confirmation arrives after the
    /// deadline but before the sweep has run.
    pub fn mark_expired(&self, txn_id: &str) -> PayResult<bool> {
        let changed = self.conn().execute(
            "UPDATE cash_transaction SET status = 'expired'
             WHERE txn_id = ?1
               AND status IN ('pending_verification', 'driver_confirmed', 'rider_confirmed')",
            params![txn_id],
        )?;
        Ok(changed > 0)
    }

    /// Non-terminal transactions currently held by a payer.
    pub fn open_transaction_count(&self, rider_id: &str) -> PayResult<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM cash_transaction
                 WHERE rider_id = ?1
                   AND status IN ('pending_verification', 'driver_confirmed', 'rider_confirmed')",
                params![rider_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// Newest-first transaction summaries for a user (either role), with the
    /// unfiltered total for pagination.
    pub fn transaction_history(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
        status: Option<TxnStatus>,
    ) -> PayResult<(Vec<TxnSummary>, i64)> {
        let status_str = status.map(|s| s.as_str().to_string());
        let total: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM cash_transaction
             WHERE (rider_id = ?1 OR driver_id = ?1)
               AND (?2 IS NULL OR status = ?2)",
            params![user_id, status_str],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn().prepare(
            "SELECT txn_id, booking_id,
                    CASE WHEN rider_id = ?1 THEN driver_id ELSE rider_id END,
                    amount_cents, status, created_at
             FROM cash_transaction
             WHERE (rider_id = ?1 OR driver_id = ?1)
               AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, txn_id DESC
             LIMIT ?3 OFFSET ?4",
        )?;
        let rows = stmt.query_map(params![user_id, status_str, limit, offset], |row| {
            let status: String = row.get(4)?;
            let created_at: String = row.get(5)?;
            Ok(TxnSummary {
                txn_id: row.get(0)?,
                booking_id: row.get(1)?,
                counterparty: row.get(2)?,
                amount: Amount::from_cents(row.get(3)?),
                status: TxnStatus::parse(&status).unwrap_or(TxnStatus::Failed),
                created_at: parse_dt(5, created_at)?,
            })
        })?;
        let summaries = rows.collect::<Result<Vec<_>, _>>()?;
        Ok((summaries, total))
    }

    // ── Test / summary helpers ─────────────────────────────────

    pub fn transaction_count(&self) -> PayResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM cash_transaction", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn transaction_count_by_status(&self, status: TxnStatus) -> PayResult<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM cash_transaction WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}

/// Fold the completed amount into all three of the payer's usage windows.
/// Runs inside the caller's transaction.
fn apply_usage(tx: &rusqlite::Transaction<'_>, facts: &CompletionFacts) -> rusqlite::Result<()> {
    tx.execute(
        "UPDATE trust_profile SET
            daily_used_cents = daily_used_cents + ?1,
            weekly_used_cents = weekly_used_cents + ?1,
            monthly_used_cents = monthly_used_cents + ?1
         WHERE user_id = ?2",
        params![facts.amount.cents(), &facts.payer],
    )?;
    Ok(())
}

fn txn_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<CashTransaction> {
    let status: String = row.get(8)?;
    let rider_confirmed_at: Option<String> = row.get(9)?;
    let driver_confirmed_at: Option<String> = row.get(10)?;
    let created_at: String = row.get(12)?;
    let expires_at: String = row.get(13)?;
    let locked_until: Option<String> = row.get(18)?;
    Ok(CashTransaction {
        txn_id: row.get(0)?,
        booking_id: row.get(1)?,
        rider_id: row.get(2)?,
        driver_id: row.get(3)?,
        amount: Amount::from_cents(row.get(4)?),
        actual_amount_claimed: row.get::<_, Option<i64>>(5)?.map(Amount::from_cents),
        platform_fee: row.get::<_, Option<i64>>(6)?.map(Amount::from_cents),
        confirmation_code: row.get(7)?,
        status: TxnStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                8,
                rusqlite::types::Type::Text,
                format!("unknown transaction status: {status}").into(),
            )
        })?,
        rider_confirmed_at: parse_opt_dt(9, rider_confirmed_at)?,
        driver_confirmed_at: parse_opt_dt(10, driver_confirmed_at)?,
        driver_location: row.get(11)?,
        created_at: parse_dt(12, created_at)?,
        expires_at: parse_dt(13, expires_at)?,
        risk_score: row.get(14)?,
        discrepancy_cents: row.get(15)?,
        discrepancy_flagged: row.get::<_, i32>(16)? != 0,
        code_attempts: row.get::<_, i64>(17)? as u32,
        attempts_locked_until: parse_opt_dt(18, locked_until)?,
    })
}
