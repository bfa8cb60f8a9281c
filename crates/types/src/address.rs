use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::encoding::{decode_id, ParseError, ID_BYTES};

/// Account identifier of a registry participant.
///
/// The raw bytes are an Ed25519 public key. The all-zero value is the null
/// identity and is never a valid owner.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(pub [u8; ID_BYTES]);

impl AccountId {
    /// The null identity.
    pub const ZERO: AccountId = AccountId([0u8; ID_BYTES]);

    pub fn from_bytes(bytes: [u8; ID_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_BYTES] {
        &self.0
    }

    /// Whether this is the null identity.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ID_BYTES]
    }

    /// Encode as `0x` followed by 64 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        let mut encoded = String::with_capacity(2 + ID_BYTES * 2);
        encoded.push_str("0x");
        encoded.push_str(&hex::encode(self.0));
        encoded
    }

    /// Parse from hex, with or without the `0x` prefix.
    pub fn from_hex(input: &str) -> Result<Self, ParseError> {
        decode_id("account id", input).map(Self)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.to_hex())
    }
}

impl FromStr for AccountId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; ID_BYTES]> for AccountId {
    fn from(value: [u8; ID_BYTES]) -> Self {
        AccountId(value)
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for AccountId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}
