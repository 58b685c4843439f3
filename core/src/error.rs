use crate::transaction::TxnStatus;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed input — never retried.
    #[error("{0}")]
    Validation(String),

    /// Eligibility denial with user-facing remediation text.
    #[error("{reason}")]
    EligibilityDenied { reason: String },

    /// Profile could not be loaded; must never read as an approval.
    #[error("cannot verify eligibility: {0}")]
    ProfileUnavailable(String),

    #[error("no trust profile for user {user_id}")]
    ProfileNotFound { user_id: String },

    #[error("transaction {txn_id} not found")]
    TransactionNotFound { txn_id: String },

    #[error("dispute {dispute_id} not found")]
    DisputeNotFound { dispute_id: String },

    /// Confirming or disputing a transaction that already reached a
    /// terminal state — never retried.
    #[error("transaction {txn_id} is {status} and accepts no further changes")]
    TerminalState { txn_id: String, status: TxnStatus },

    /// Lost race on a simultaneous confirmation — safe to retry once.
    #[error("transaction {txn_id} was updated concurrently")]
    ConcurrencyConflict { txn_id: String },

    /// Confirmation code did not match the stored code. State is unchanged.
    #[error("confirmation code rejected ({attempts_remaining} attempts remaining)")]
    CodeMismatch { attempts_remaining: u32 },

    /// Server-side attempt lockout after repeated bad codes.
    #[error("too many failed codes; retry after {retry_at}")]
    TooManyAttempts { retry_at: DateTime<Utc> },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PayResult<T> = Result<T, PayError>;
