//! Ledger sequence numbers for Stellar-family payment authorization windows.
//!
//! This module provides [`LedgerSequence`], the type used throughout the x402 protocol
//! to bound how long a signed payment transaction remains valid. Stellar ledgers close
//! roughly every [`LEDGER_CLOSE_SECONDS`] seconds and each close increments the ledger
//! sequence by one, so a sequence number is a natural, monotonic expiry unit.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::str::FromStr;

/// Average Stellar ledger close time, in seconds. Used to translate a requested
/// timeout (in seconds) into a number of ledgers for `validUntilLedger`.
pub const LEDGER_CLOSE_SECONDS: u64 = 5;

/// A Stellar ledger sequence number: a monotonically increasing integer identifying
/// a ledger close event.
///
/// # Serialization
///
/// Serialized as a stringified integer, matching the rest of the protocol's
/// amount and timestamp wire types, even though a `u32` fits safely inside a
/// JavaScript `Number` — this keeps every bounded-integer field on the wire
/// uniformly string-typed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct LedgerSequence(u32);

impl Serialize for LedgerSequence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for LedgerSequence {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let seq = s
            .parse::<u32>()
            .map_err(|_| serde::de::Error::custom("ledger sequence must be a non-negative integer"))?;
        Ok(LedgerSequence(seq))
    }
}

impl Display for LedgerSequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a string does not parse as a non-negative ledger sequence.
#[derive(Debug, thiserror::Error)]
#[error("invalid ledger sequence: {0}")]
pub struct InvalidLedgerSequence(pub String);

impl FromStr for LedgerSequence {
    type Err = InvalidLedgerSequence;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .map(LedgerSequence)
            .map_err(|_| InvalidLedgerSequence(s.to_string()))
    }
}

impl Add<u32> for LedgerSequence {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        LedgerSequence(self.0.saturating_add(rhs))
    }
}

impl LedgerSequence {
    /// Builds a [`LedgerSequence`] from a raw sequence number.
    pub fn from_u32(seq: u32) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence number.
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Computes the sequence at which a timeout of `timeout_seconds` expires, given the
    /// current sequence and the ledger family's average close time.
    ///
    /// `validUntilLedger = currentLedger + ceil(timeout / ledger_close_seconds)`.
    pub fn expiring_after(self, timeout_seconds: u32) -> Self {
        let ledgers = timeout_seconds.div_ceil(LEDGER_CLOSE_SECONDS as u32);
        self + ledgers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiring_after_rounds_up() {
        let current = LedgerSequence::from_u32(100);
        // 300s / 5s = 60 ledgers exactly
        assert_eq!(current.expiring_after(300).as_u32(), 160);
        // 301s / 5s = 60.2 -> rounds up to 61
        assert_eq!(current.expiring_after(301).as_u32(), 161);
    }

    #[test]
    fn serializes_as_string() {
        let seq = LedgerSequence::from_u32(42);
        let json = serde_json::to_string(&seq).unwrap();
        assert_eq!(json, "\"42\"");
        let back: LedgerSequence = serde_json::from_str(&json).unwrap();
        assert_eq!(back, seq);
    }
}
