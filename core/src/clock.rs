//! Wall-clock source — system time in production, manually advanced in tests.
//!
//! Rolling limit windows and code expiry both key off this clock, so tests
//! drive time explicitly instead of sleeping.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

pub enum Clock {
    System,
    Manual(Mutex<DateTime<Utc>>),
}

impl Clock {
    pub fn system() -> Self {
        Clock::System
    }

    /// A clock pinned to `at`, advanced only by `advance`/`set`.
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Clock::Manual(Mutex::new(at))
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Manual(at) => *at.lock().unwrap(),
        }
    }

    /// Advance a manual clock. Panics on the system clock — callers must
    /// only advance clocks they created with `fixed`.
    pub fn advance(&self, by: Duration) {
        match self {
            Clock::System => panic!("advance() called on system clock"),
            Clock::Manual(at) => *at.lock().unwrap() += by,
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        match self {
            Clock::System => panic!("set() called on system clock"),
            Clock::Manual(at) => *at.lock().unwrap() = to,
        }
    }
}
