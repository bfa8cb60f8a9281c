//! Error types for the document registry

use docreg_types::Fingerprint;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Document already registered: {fingerprint}")]
    AlreadyRegistered { fingerprint: Fingerprint },

    #[error("Document not found: {fingerprint}")]
    NotFound { fingerprint: Fingerprint },

    #[error("Unauthorized: caller is not the owner of {fingerprint}")]
    Unauthorized { fingerprint: Fingerprint },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transfer to current owner rejected: {fingerprint}")]
    NoOpTransfer { fingerprint: Fingerprint },

    #[error("Registry invariant violated: {0}")]
    Inconsistent(String),

    #[error("Registry storage error: {0}")]
    Storage(String),
}

impl RegistryError {
    /// Stable machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::AlreadyRegistered { .. } => "already_registered",
            RegistryError::NotFound { .. } => "not_found",
            RegistryError::Unauthorized { .. } => "unauthorized",
            RegistryError::InvalidInput(_) => "invalid_input",
            RegistryError::NoOpTransfer { .. } => "noop_transfer",
            RegistryError::Inconsistent(_) => "inconsistent",
            RegistryError::Storage(_) => "storage_error",
        }
    }
}

impl From<sled::Error> for RegistryError {
    fn from(err: sled::Error) -> Self {
        RegistryError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Storage(format!("serialization: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
