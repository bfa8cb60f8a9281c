use serde::{Deserialize, Serialize};

use crate::address::AccountId;
use crate::fingerprint::Fingerprint;

/// A registered document.
///
/// Every field except `owner` is write-once. `owner` changes only through an
/// ownership transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Primary key.
    pub fingerprint: Fingerprint,

    /// Current owner; never [`AccountId::ZERO`].
    pub owner: AccountId,

    /// Registration time in unix seconds.
    pub registered_at: u64,

    /// Caller-supplied description (document type, issuer, ...). Never empty.
    pub metadata: String,

    /// Locator of off-system content, e.g. a content-addressed storage id.
    /// Empty when no content is tracked.
    #[serde(default)]
    pub storage_pointer: String,
}

impl DocumentRecord {
    /// Whether a storage pointer was supplied at registration.
    pub fn has_content(&self) -> bool {
        !self.storage_pointer.is_empty()
    }
}
