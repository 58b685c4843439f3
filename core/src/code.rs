//! Confirmation-code issuance.
//!
//! RULE: Business logic never touches a platform RNG directly. The engine is
//! handed a CodeIssuer chosen by configuration: OS entropy in production, a
//! seeded stream for tests and sandbox runs. Codes are 6 ASCII digits,
//! uniform over the full 000000–999999 space.

use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

use crate::config::CodeIssuerConfig;

pub const CODE_LEN: usize = 6;
const CODE_SPACE: u32 = 1_000_000;

pub trait CodeIssuer: Send {
    fn issue(&mut self) -> String;
}

/// Production issuer — draws from the operating system's entropy source,
/// so codes are unpredictable across processes and restarts.
pub struct EntropyCodeIssuer;

impl CodeIssuer for EntropyCodeIssuer {
    fn issue(&mut self) -> String {
        let n = rand::rngs::OsRng.gen_range(0..CODE_SPACE);
        format!("{n:06}")
    }
}

/// Seeded issuer for tests and sandbox configurations. Same seed, same
/// code sequence.
pub struct SeededCodeIssuer {
    inner: Pcg64Mcg,
}

impl SeededCodeIssuer {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }
}

impl CodeIssuer for SeededCodeIssuer {
    fn issue(&mut self) -> String {
        let n = self.inner.gen_range(0..CODE_SPACE);
        format!("{n:06}")
    }
}

pub fn issuer_from_config(config: &CodeIssuerConfig) -> Box<dyn CodeIssuer> {
    match config {
        CodeIssuerConfig::Random => Box::new(EntropyCodeIssuer),
        CodeIssuerConfig::Deterministic { seed } => Box::new(SeededCodeIssuer::new(*seed)),
    }
}

/// Syntactic validity for client-entered codes: exactly six ASCII digits.
pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_issuer_is_reproducible() {
        let mut a = SeededCodeIssuer::new(7);
        let mut b = SeededCodeIssuer::new(7);
        for _ in 0..10 {
            assert_eq!(a.issue(), b.issue());
        }
    }

    #[test]
    fn issued_codes_are_six_digits() {
        let mut issuer = SeededCodeIssuer::new(1);
        for _ in 0..100 {
            let code = issuer.issue();
            assert!(is_well_formed(&code), "bad code: {code}");
        }
    }

    #[test]
    fn well_formed_rejects_junk() {
        assert!(is_well_formed("012345"));
        assert!(!is_well_formed("12345"));
        assert!(!is_well_formed("1234567"));
        assert!(!is_well_formed("12a456"));
        assert!(!is_well_formed(""));
    }
}
