//! Shared primitive types used across the payment service.

/// A platform user (rider or driver).
pub type UserId = String;

/// The ride booking a cash payment settles.
pub type BookingId = String;

/// A cash transaction identifier (`txn-<uuid>`).
pub type TxnId = String;

/// A dispute identifier (`dsp-<uuid>`).
pub type DisputeId = String;
