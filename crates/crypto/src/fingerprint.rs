//! Client-side fingerprint derivation.
//!
//! A fingerprint is `SHA-256(document ‖ metadata ‖ nonce)`. The nonce is a
//! fresh UUID v4 string, so the same bytes can be registered again under a
//! new fingerprint; a caller that hits `AlreadyRegistered` simply derives
//! again. The registry never re-derives or checks this construction.

use docreg_types::Fingerprint;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A fingerprint together with the nonce that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedFingerprint {
    pub fingerprint: Fingerprint,
    pub nonce: String,
}

/// Fresh random nonce.
pub fn fresh_nonce() -> String {
    Uuid::new_v4().to_string()
}

/// Deterministic derivation from explicit inputs.
pub fn derive_with_nonce(document: &[u8], metadata: &str, nonce: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(document);
    hasher.update(metadata.as_bytes());
    hasher.update(nonce.as_bytes());
    Fingerprint::from_bytes(hasher.finalize().into())
}

/// Derive a fingerprint with a fresh nonce.
pub fn derive(document: &[u8], metadata: &str) -> DerivedFingerprint {
    let nonce = fresh_nonce();
    let fingerprint = derive_with_nonce(document, metadata, &nonce);
    DerivedFingerprint { fingerprint, nonce }
}
