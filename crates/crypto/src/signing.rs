//! Signed request messages.
//!
//! Remote callers prove their identity by signing a domain-separated digest
//! of the request. Variable-length fields are length-prefixed (u32 LE) so
//! two different requests can never produce the same preimage.

use docreg_types::{AccountId, Fingerprint};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::keys::KeyPair;

pub const REGISTER_DOMAIN: &[u8] = b"DOCREG_REGISTER";
pub const TRANSFER_DOMAIN: &[u8] = b"DOCREG_TRANSFER";

pub const SIGNATURE_BYTES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature must be {SIGNATURE_BYTES} bytes, got {0}")]
    InvalidLength(usize),
    #[error("signature is not valid hex")]
    InvalidHex,
    #[error("signer is not a valid Ed25519 public key")]
    InvalidPublicKey,
    #[error("signature does not match signer")]
    Mismatch,
}

fn push_len_prefixed(message: &mut Vec<u8>, field: &[u8]) {
    message.extend_from_slice(&(field.len() as u32).to_le_bytes());
    message.extend_from_slice(field);
}

/// Digest a registration request signs over.
pub fn registration_digest(
    fingerprint: &Fingerprint,
    metadata: &str,
    storage_pointer: &str,
    issued_at: u64,
) -> [u8; 32] {
    let mut message = Vec::with_capacity(
        REGISTER_DOMAIN.len() + 32 + 8 + metadata.len() + storage_pointer.len() + 8,
    );
    message.extend_from_slice(REGISTER_DOMAIN);
    message.extend_from_slice(fingerprint.as_bytes());
    push_len_prefixed(&mut message, metadata.as_bytes());
    push_len_prefixed(&mut message, storage_pointer.as_bytes());
    message.extend_from_slice(&issued_at.to_le_bytes());
    Sha256::digest(&message).into()
}

/// Digest a transfer request signs over.
pub fn transfer_digest(fingerprint: &Fingerprint, new_owner: &AccountId, issued_at: u64) -> [u8; 32] {
    let mut message = Vec::with_capacity(TRANSFER_DOMAIN.len() + 64 + 8);
    message.extend_from_slice(TRANSFER_DOMAIN);
    message.extend_from_slice(fingerprint.as_bytes());
    message.extend_from_slice(new_owner.as_bytes());
    message.extend_from_slice(&issued_at.to_le_bytes());
    Sha256::digest(&message).into()
}

/// Sign a digest and return the hex-encoded signature.
pub fn sign_digest_hex(key: &KeyPair, digest: &[u8; 32]) -> String {
    hex::encode(key.sign(digest))
}

/// Decode a hex signature.
pub fn decode_signature(input: &str) -> Result<[u8; SIGNATURE_BYTES], SignatureError> {
    let bytes = hex::decode(input.trim()).map_err(|_| SignatureError::InvalidHex)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| SignatureError::InvalidLength(len))
}

/// Check that `signer` signed `digest`.
pub fn verify_signature(
    signer: &AccountId,
    digest: &[u8; 32],
    signature: &[u8],
) -> Result<(), SignatureError> {
    if signature.len() != SIGNATURE_BYTES {
        return Err(SignatureError::InvalidLength(signature.len()));
    }

    let verifying_key =
        VerifyingKey::from_bytes(signer.as_bytes()).map_err(|_| SignatureError::InvalidPublicKey)?;
    let signature = Signature::from_slice(signature).map_err(|_| SignatureError::Mismatch)?;

    verifying_key
        .verify(digest, &signature)
        .map_err(|_| SignatureError::Mismatch)
}
