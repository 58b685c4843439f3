//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine calls store methods — it never executes SQL directly.
//!
//! Status transitions are written with guarded updates (`WHERE status = …`),
//! so a confirmation that lost a race can never overwrite a later state; the
//! caller sees the guard miss and maps it to a conflict or terminal error.

mod dispute;
mod transaction;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};

use crate::error::{PayError, PayResult};
use crate::event::EventLogEntry;
use crate::money::Amount;
use crate::profile::{TrustProfile, VerificationLevel};

pub use transaction::CompletionFacts;

pub struct PayStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl PayStore {
    pub fn open(path: &str) -> PayResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PayResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new isolated database.
    pub fn reopen(&self) -> PayResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PayResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_transactions.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_disputes.sql"))?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> PayResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (at, actor, event_type, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.at.to_rfc3339(),
                entry.actor,
                entry.event_type,
                entry.payload
            ],
        )?;
        Ok(())
    }

    pub fn event_count(&self, event_type: &str) -> PayResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
                params![event_type],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    pub fn events_of_type(&self, event_type: &str) -> PayResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, at, actor, event_type, payload
             FROM event_log WHERE event_type = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![event_type], |row| {
                let at: String = row.get(1)?;
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    at: parse_dt(1, at)?,
                    actor: row.get(2)?,
                    event_type: row.get(3)?,
                    payload: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Trust profiles ─────────────────────────────────────────

    pub fn insert_profile(&self, p: &TrustProfile) -> PayResult<()> {
        self.conn.execute(
            "INSERT INTO trust_profile (
                user_id, trust_score, verification_level,
                phone_verified, id_verified, address_verified,
                daily_limit_cents, daily_used_cents, daily_anchor,
                weekly_limit_cents, weekly_used_cents, weekly_anchor,
                monthly_limit_cents, monthly_used_cents, monthly_anchor,
                is_suspended, suspension_reason, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                &p.user_id,
                p.trust_score as i64,
                p.verification_level.as_str(),
                p.phone_verified as i32,
                p.id_verified as i32,
                p.address_verified as i32,
                p.daily_limit.cents(),
                p.daily_used.cents(),
                p.daily_anchor.to_string(),
                p.weekly_limit.cents(),
                p.weekly_used.cents(),
                p.weekly_anchor.to_string(),
                p.monthly_limit.cents(),
                p.monthly_used.cents(),
                p.monthly_anchor.to_string(),
                p.is_suspended as i32,
                p.suspension_reason.as_deref(),
                p.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_profile(&self, user_id: &str) -> PayResult<TrustProfile> {
        self.conn
            .query_row(
                "SELECT user_id, trust_score, verification_level,
                        phone_verified, id_verified, address_verified,
                        daily_limit_cents, daily_used_cents, daily_anchor,
                        weekly_limit_cents, weekly_used_cents, weekly_anchor,
                        monthly_limit_cents, monthly_used_cents, monthly_anchor,
                        is_suspended, suspension_reason, created_at
                 FROM trust_profile WHERE user_id = ?1",
                params![user_id],
                profile_row_mapper,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => PayError::ProfileNotFound {
                    user_id: user_id.to_string(),
                },
                other => other.into(),
            })
    }

    pub fn profile_exists(&self, user_id: &str) -> PayResult<bool> {
        self.conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM trust_profile WHERE user_id = ?1",
                params![user_id],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .map_err(Into::into)
    }

    /// Persist rolled-forward usage counters and window anchors.
    pub fn save_profile_windows(&self, p: &TrustProfile) -> PayResult<()> {
        self.conn.execute(
            "UPDATE trust_profile SET
                daily_used_cents = ?1, daily_anchor = ?2,
                weekly_used_cents = ?3, weekly_anchor = ?4,
                monthly_used_cents = ?5, monthly_anchor = ?6
             WHERE user_id = ?7",
            params![
                p.daily_used.cents(),
                p.daily_anchor.to_string(),
                p.weekly_used.cents(),
                p.weekly_anchor.to_string(),
                p.monthly_used.cents(),
                p.monthly_anchor.to_string(),
                &p.user_id,
            ],
        )?;
        Ok(())
    }

    pub fn suspend_profile(&self, user_id: &str, reason: &str) -> PayResult<()> {
        self.conn.execute(
            "UPDATE trust_profile SET is_suspended = 1, suspension_reason = ?1
             WHERE user_id = ?2",
            params![reason, user_id],
        )?;
        Ok(())
    }

    /// Clamp-subtract trust points (dispute consequences).
    pub fn apply_trust_penalty(&self, user_id: &str, penalty: u8) -> PayResult<()> {
        self.conn.execute(
            "UPDATE trust_profile
             SET trust_score = MAX(0, trust_score - ?1)
             WHERE user_id = ?2",
            params![penalty as i64, user_id],
        )?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn profile_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrustProfile> {
    let level: String = row.get(2)?;
    let daily_anchor: String = row.get(8)?;
    let weekly_anchor: String = row.get(11)?;
    let monthly_anchor: String = row.get(14)?;
    let created_at: String = row.get(17)?;
    Ok(TrustProfile {
        user_id: row.get(0)?,
        trust_score: row.get::<_, i64>(1)? as u8,
        verification_level: VerificationLevel::parse(&level).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown verification level: {level}").into(),
            )
        })?,
        phone_verified: row.get::<_, i32>(3)? != 0,
        id_verified: row.get::<_, i32>(4)? != 0,
        address_verified: row.get::<_, i32>(5)? != 0,
        daily_limit: Amount::from_cents(row.get(6)?),
        daily_used: Amount::from_cents(row.get(7)?),
        daily_anchor: parse_date(8, daily_anchor)?,
        weekly_limit: Amount::from_cents(row.get(9)?),
        weekly_used: Amount::from_cents(row.get(10)?),
        weekly_anchor: parse_date(11, weekly_anchor)?,
        monthly_limit: Amount::from_cents(row.get(12)?),
        monthly_used: Amount::from_cents(row.get(13)?),
        monthly_anchor: parse_date(14, monthly_anchor)?,
        is_suspended: row.get::<_, i32>(15)? != 0,
        suspension_reason: row.get(16)?,
        created_at: parse_dt(17, created_at)?,
    })
}

/// RFC 3339 text column → DateTime<Utc>, with a column-indexed conversion
/// error so bad rows are diagnosable.
pub(crate) fn parse_dt(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_opt_dt(idx: usize, s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_dt(idx, s)).transpose()
}

pub(crate) fn parse_date(idx: usize, s: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
