use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::encoding::{decode_id, ParseError, ID_BYTES};

/// 256-bit content fingerprint identifying a registered document.
///
/// The registry treats the value as an opaque key; how it was derived is the
/// client's concern.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(pub [u8; ID_BYTES]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; ID_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_BYTES] {
        &self.0
    }

    /// Lowercase hex, no prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from 64 hex characters; a leading `0x` is tolerated.
    pub fn from_hex(input: &str) -> Result<Self, ParseError> {
        decode_id("fingerprint", input).map(Self)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; ID_BYTES]> for Fingerprint {
    fn from(value: [u8; ID_BYTES]) -> Self {
        Fingerprint(value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_mixed_case_input() {
        let upper = "AA".repeat(31) + "01";
        let fp = Fingerprint::from_hex(&upper).unwrap();
        assert_eq!(fp.as_bytes()[0], 0xAA);
        assert_eq!(fp.as_bytes()[31], 0x01);
        assert_eq!(fp.to_hex(), upper.to_lowercase());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Fingerprint::from_hex("abc").is_err());
        assert!(Fingerprint::from_hex(&"a".repeat(66)).is_err());
    }

    #[test]
    fn ordering_follows_bytes() {
        let low = Fingerprint::from_bytes([0u8; ID_BYTES]);
        let high = Fingerprint::from_bytes([0xFF; ID_BYTES]);
        assert!(low < high);
    }
}
