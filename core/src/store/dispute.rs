//! Store methods for disputes.

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{parse_dt, parse_opt_dt, PayStore};
use crate::dispute::{Dispute, DisputeReason, DisputeStatus};
use crate::error::{PayError, PayResult};

impl PayStore {
    pub fn insert_dispute(&self, d: &Dispute) -> PayResult<()> {
        self.conn().execute(
            "INSERT INTO dispute (
                dispute_id, txn_id, reported_by, reason, description,
                evidence, status, outcome, at_fault, created_at, resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9, ?10)",
            params![
                &d.dispute_id,
                &d.txn_id,
                &d.reported_by,
                d.reason.as_str(),
                &d.description,
                d.evidence.as_deref(),
                d.status.as_str(),
                d.outcome.as_deref(),
                d.created_at.to_rfc3339(),
                d.resolved_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get_dispute(&self, dispute_id: &str) -> PayResult<Dispute> {
        self.conn()
            .query_row(
                "SELECT dispute_id, txn_id, reported_by, reason, description,
                        evidence, status, outcome, created_at, resolved_at
                 FROM dispute WHERE dispute_id = ?1",
                params![dispute_id],
                dispute_row_mapper,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => PayError::DisputeNotFound {
                    dispute_id: dispute_id.to_string(),
                },
                other => other.into(),
            })
    }

    pub fn set_dispute_status(&self, dispute_id: &str, status: DisputeStatus) -> PayResult<()> {
        self.conn().execute(
            "UPDATE dispute SET status = ?1 WHERE dispute_id = ?2",
            params![status.as_str(), dispute_id],
        )?;
        Ok(())
    }

    /// Close a dispute with the reviewer's verdict. `at_fault` names the
    /// party taking the trust consequence on an upheld outcome.
    pub fn resolve_dispute(
        &self,
        dispute_id: &str,
        outcome: &str,
        at_fault: Option<&str>,
        at: DateTime<Utc>,
    ) -> PayResult<()> {
        self.conn().execute(
            "UPDATE dispute SET status = 'resolved', outcome = ?1,
                                at_fault = ?2, resolved_at = ?3
             WHERE dispute_id = ?4",
            params![outcome, at_fault, at.to_rfc3339(), dispute_id],
        )?;
        Ok(())
    }

    /// Upheld disputes charged to a user since `since` — the suspension
    /// trigger input.
    pub fn upheld_count_against(&self, user_id: &str, since: DateTime<Utc>) -> PayResult<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM dispute
                 WHERE at_fault = ?1 AND status = 'resolved'
                   AND resolved_at >= ?2",
                params![user_id, since.to_rfc3339()],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// Disputes on any transaction the user was party to since `since`.
    /// Feeds the per-transaction risk baseline.
    pub fn dispute_count_involving(&self, user_id: &str, since: DateTime<Utc>) -> PayResult<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM dispute d
                 JOIN cash_transaction t ON d.txn_id = t.txn_id
                 WHERE (t.rider_id = ?1 OR t.driver_id = ?1)
                   AND d.created_at >= ?2",
                params![user_id, since.to_rfc3339()],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    // ── Test / summary helpers ─────────────────────────────────

    pub fn dispute_count(&self) -> PayResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM dispute", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn disputes_for_transaction(&self, txn_id: &str) -> PayResult<Vec<Dispute>> {
        let mut stmt = self.conn().prepare(
            "SELECT dispute_id, txn_id, reported_by, reason, description,
                    evidence, status, outcome, created_at, resolved_at
             FROM dispute WHERE txn_id = ?1
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![txn_id], dispute_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn dispute_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Dispute> {
    let reason: String = row.get(3)?;
    let status: String = row.get(6)?;
    let created_at: String = row.get(8)?;
    let resolved_at: Option<String> = row.get(9)?;
    Ok(Dispute {
        dispute_id: row.get(0)?,
        txn_id: row.get(1)?,
        reported_by: row.get(2)?,
        reason: DisputeReason::parse(&reason).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown dispute reason: {reason}").into(),
            )
        })?,
        description: row.get(4)?,
        evidence: row.get(5)?,
        status: DisputeStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                format!("unknown dispute status: {status}").into(),
            )
        })?,
        outcome: row.get(7)?,
        created_at: parse_dt(8, created_at)?,
        resolved_at: parse_opt_dt(9, resolved_at)?,
    })
}
