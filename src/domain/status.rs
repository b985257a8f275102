//! Verdict taxonomy and the write-once fraud flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal classification of a purchase-verification attempt.
///
/// The set is closed and ordered by precedence: when more than one condition
/// could apply, the lower-numbered check wins because it is evaluated first.
/// Only `Valid` represents a monetized, non-fraudulent purchase; every other
/// verdict doubles as the fraud-flag kind armed on the owning identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Valid,
    InvalidUser,
    InvalidGame,
    InvalidBundle,
    InvalidReceipt,
    DuplicateIap,
}

impl Verdict {
    /// Numeric code as stored in the ledger.
    pub fn code(&self) -> i64 {
        match self {
            Verdict::Valid => 0,
            Verdict::InvalidUser => 1,
            Verdict::InvalidGame => 2,
            Verdict::InvalidBundle => 3,
            Verdict::InvalidReceipt => 4,
            Verdict::DuplicateIap => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Verdict::Valid),
            1 => Some(Verdict::InvalidUser),
            2 => Some(Verdict::InvalidGame),
            3 => Some(Verdict::InvalidBundle),
            4 => Some(Verdict::InvalidReceipt),
            5 => Some(Verdict::DuplicateIap),
            _ => None,
        }
    }

    /// Whether this verdict arms the identity's fraud flag.
    pub fn is_fraud(&self) -> bool {
        !matches!(self, Verdict::Valid)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Valid => "valid",
            Verdict::InvalidUser => "invalid_user",
            Verdict::InvalidGame => "invalid_game",
            Verdict::InvalidBundle => "invalid_bundle",
            Verdict::InvalidReceipt => "invalid_receipt",
            Verdict::DuplicateIap => "duplicate_iap",
        };
        write!(f, "{}", s)
    }
}

/// First detected abuse on an identity: kind and detection time.
///
/// Write-once; later fraud conditions never overwrite it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudFlag {
    pub kind: Verdict,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 0..6 {
            let verdict = Verdict::from_code(code).unwrap();
            assert_eq!(verdict.code(), code);
        }
        assert_eq!(Verdict::from_code(6), None);
        assert_eq!(Verdict::from_code(-1), None);
    }

    #[test]
    fn only_valid_is_clean() {
        assert!(!Verdict::Valid.is_fraud());
        for code in 1..6 {
            assert!(Verdict::from_code(code).unwrap().is_fraud());
        }
    }

    #[test]
    fn precedence_order_matches_codes() {
        assert!(Verdict::InvalidUser.code() < Verdict::InvalidGame.code());
        assert!(Verdict::InvalidGame.code() < Verdict::InvalidBundle.code());
        assert!(Verdict::InvalidBundle.code() < Verdict::InvalidReceipt.code());
        assert!(Verdict::InvalidReceipt.code() < Verdict::DuplicateIap.code());
    }
}
