//! Hex codecs shared by the fixed-width identifiers.

/// Number of raw bytes in a fingerprint or account identifier.
pub const ID_BYTES: usize = 32;
/// Length of the hexadecimal payload of an encoded identifier.
pub const ID_HEX_LENGTH: usize = ID_BYTES * 2;

/// Errors that can occur when parsing an identifier string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("{kind} must be {expected} hex characters, got {actual}")]
    InvalidLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{kind} is not valid hexadecimal: {reason}")]
    InvalidHex { kind: &'static str, reason: String },
}

/// Decode a 32-byte identifier from hex, accepting an optional `0x` prefix.
pub(crate) fn decode_id(kind: &'static str, input: &str) -> Result<[u8; ID_BYTES], ParseError> {
    let trimmed = input.trim();
    let payload = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if payload.len() != ID_HEX_LENGTH {
        return Err(ParseError::InvalidLength {
            kind,
            expected: ID_HEX_LENGTH,
            actual: payload.len(),
        });
    }

    let mut bytes = [0u8; ID_BYTES];
    hex::decode_to_slice(payload, &mut bytes).map_err(|e| ParseError::InvalidHex {
        kind,
        reason: e.to_string(),
    })?;
    Ok(bytes)
}
