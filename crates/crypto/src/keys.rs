//! Ed25519 key pairs for registry participants.
//!
//! An account's [`AccountId`] is its Ed25519 verifying key.

use anyhow::{anyhow, Context, Result};
use docreg_types::AccountId;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;

/// Signing key plus its verifying key.
#[derive(Debug, Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new key pair
    pub fn generate() -> Self {
        let mut secret_key = [0u8; 32];
        OsRng.fill_bytes(&mut secret_key);
        Self::from_secret_bytes(&secret_key)
    }

    /// Rebuild a key pair from its 32-byte secret.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Parse a hex-encoded secret, as written by `docreg-cli keygen`.
    pub fn from_secret_hex(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let payload = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(payload).context("secret key is not valid hex")?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| anyhow!("secret key must be 32 bytes, got {}", b.len()))?;
        Ok(Self::from_secret_bytes(&secret))
    }

    /// Hex encoding of the secret key.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// The account identifier for this key.
    pub fn account_id(&self) -> AccountId {
        AccountId::from_bytes(self.verifying_key.to_bytes())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Verify a signature
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> Result<()> {
        let sig = Signature::from_bytes(signature);
        self.verifying_key.verify(message, &sig)?;
        Ok(())
    }
}
