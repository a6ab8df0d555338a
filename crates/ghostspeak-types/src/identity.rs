//! Identity types for GhostSpeak
//!
//! Account addresses are opaque base58 strings owned by the ledger. Record
//! identifiers are strongly typed wrappers around UUIDs so an escrow id can
//! never be passed where a proposal id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{GhostSpeakError, Result};

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Shortest and longest base58 encodings of a 32-byte public key
const ADDRESS_MIN_LEN: usize = 32;
const ADDRESS_MAX_LEN: usize = 44;

/// A ledger account address (wallet, agent, multisig, mint)
///
/// The core never derives or verifies addresses; it only checks that the
/// string looks like a base58-encoded public key so typos are caught before a
/// preview is computed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and validate an address
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() < ADDRESS_MIN_LEN || s.len() > ADDRESS_MAX_LEN {
            return Err(GhostSpeakError::invalid_input(
                "address",
                format!(
                    "expected {}-{} characters, got {}",
                    ADDRESS_MIN_LEN,
                    ADDRESS_MAX_LEN,
                    s.len()
                ),
            ));
        }
        if let Some(bad) = s.chars().find(|c| !BASE58_ALPHABET.contains(*c)) {
            return Err(GhostSpeakError::invalid_input(
                "address",
                format!("character '{}' is not base58", bad),
            ));
        }
        Ok(Self(s.to_string()))
    }

    /// Borrow the encoded address
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines (`Abcd…wxyz`)
    pub fn short(&self) -> String {
        let n = self.0.len();
        format!("{}…{}", &self.0[..4], &self.0[n - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = GhostSpeakError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Macro to generate ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from a string (with or without prefix)
            pub fn parse(s: &str) -> std::result::Result<Self, uuid::Error> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_id_type!(EscrowId, "escrow", "Unique identifier for an escrow");
define_id_type!(DisputeId, "dispute", "Unique identifier for a dispute raised on an escrow");
define_id_type!(PositionId, "stake", "Unique identifier for a staking position");
define_id_type!(ProposalId, "proposal", "Unique identifier for a governance proposal");
define_id_type!(MultisigTxId, "msigtx", "Unique identifier for a multisig transaction");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_accepts_base58() {
        let addr = Address::parse("11111111111111111111111111111111").unwrap();
        assert_eq!(addr.as_str().len(), 32);
        assert_eq!(addr.short(), "1111…1111");
    }

    #[test]
    fn test_address_rejects_bad_alphabet_and_length() {
        // '0', 'O', 'I' and 'l' are not part of base58
        assert!(Address::parse("0000000000000000000000000000000000").is_err());
        assert!(Address::parse("lllllllllllllllllllllllllllllllllll").is_err());
        assert!(Address::parse("abc").is_err());
        assert!(Address::parse(&"A".repeat(45)).is_err());
    }

    #[test]
    fn test_address_serde_validates() {
        let ok: std::result::Result<Address, _> =
            serde_json::from_str(&format!("\"{}\"", "B".repeat(40)));
        assert!(ok.is_ok());
        let bad: std::result::Result<Address, _> = serde_json::from_str("\"not-an-address\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_id_parsing() {
        let id = EscrowId::new();
        let s = id.to_string();
        assert!(s.starts_with("escrow_"));
        assert_eq!(EscrowId::parse(&s).unwrap(), id);
    }
}
