//! Events emitted on committed mutations.

use docreg_types::{AccountId, Fingerprint};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    DocumentRegistered {
        fingerprint: Fingerprint,
        owner: AccountId,
        registered_at: u64,
    },
    OwnershipTransferred {
        fingerprint: Fingerprint,
        previous_owner: AccountId,
        new_owner: AccountId,
    },
}

impl RegistryEvent {
    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            RegistryEvent::DocumentRegistered { fingerprint, .. } => fingerprint,
            RegistryEvent::OwnershipTransferred { fingerprint, .. } => fingerprint,
        }
    }
}
