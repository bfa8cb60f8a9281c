//! Cryptographic helpers for the document registry.
//!
//! - [`fingerprint`]: client-side document fingerprint derivation
//! - [`keys`]: Ed25519 key pairs whose public key is the account id
//! - [`signing`]: domain-separated request digests and signature checks

pub mod fingerprint;
pub mod keys;
pub mod signing;

pub use fingerprint::{derive, derive_with_nonce, fresh_nonce, DerivedFingerprint};
pub use keys::KeyPair;
pub use signing::{
    decode_signature, registration_digest, sign_digest_hex, transfer_digest, verify_signature,
    SignatureError,
};
