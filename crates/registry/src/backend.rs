//! Storage backends for the registry.
//!
//! A backend applies each mutation to both the record store and the owner
//! index as one unit: either both change or neither does. Serialization of
//! mutations against reads is the job of [`crate::DocumentRegistry`].

use docreg_types::{AccountId, DocumentRecord, Fingerprint};

use crate::errors::{RegistryError, Result};
use crate::index::OwnerIndex;
use crate::store::RecordStore;

/// Trait for registry storage backends.
pub trait RegistryBackend: Send + Sync {
    /// Fetch a record by fingerprint.
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<DocumentRecord>>;

    /// Store a new record and add it to its owner's bucket.
    fn insert(&mut self, record: DocumentRecord) -> Result<()>;

    /// Change the owner of a record and move it between owner buckets.
    /// Returns the previous owner.
    fn set_owner(&mut self, fingerprint: &Fingerprint, new_owner: AccountId) -> Result<AccountId>;

    /// Every record in insertion order.
    fn list_all(&self) -> Result<Vec<DocumentRecord>>;

    /// A window of [`RegistryBackend::list_all`].
    fn list_page(&self, offset: usize, limit: usize) -> Result<Vec<DocumentRecord>>;

    /// Fingerprints currently held by `owner`.
    fn fingerprints_by_owner(&self, owner: &AccountId) -> Result<Vec<Fingerprint>>;

    /// Number of records.
    fn len(&self) -> Result<usize>;

    /// `registered_at` of the most recently inserted record.
    fn last_registered_at(&self) -> Result<Option<u64>>;

    /// Persist buffered writes, if the backend buffers any.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory backend (tests and ephemeral deployments).
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    store: RecordStore,
    index: OwnerIndex,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryBackend for MemoryBackend {
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<DocumentRecord>> {
        Ok(self.store.get(fingerprint).cloned())
    }

    fn insert(&mut self, record: DocumentRecord) -> Result<()> {
        let owner = record.owner;
        let fingerprint = record.fingerprint;
        self.store.insert(record)?;
        self.index.add(owner, fingerprint);
        Ok(())
    }

    fn set_owner(&mut self, fingerprint: &Fingerprint, new_owner: AccountId) -> Result<AccountId> {
        let current = self
            .store
            .get(fingerprint)
            .map(|record| record.owner)
            .ok_or(RegistryError::NotFound {
                fingerprint: *fingerprint,
            })?;

        // Check before mutating so a broken index never leaves a half-applied move.
        if !self.index.contains(&current, fingerprint) {
            return Err(RegistryError::Inconsistent(format!(
                "{fingerprint} missing from index bucket of {current}"
            )));
        }

        let previous = self.store.set_owner(fingerprint, new_owner)?;
        self.index.move_entry(&previous, new_owner, *fingerprint);
        Ok(previous)
    }

    fn list_all(&self) -> Result<Vec<DocumentRecord>> {
        Ok(self.store.list_all())
    }

    fn list_page(&self, offset: usize, limit: usize) -> Result<Vec<DocumentRecord>> {
        Ok(self.store.list_page(offset, limit))
    }

    fn fingerprints_by_owner(&self, owner: &AccountId) -> Result<Vec<Fingerprint>> {
        Ok(self.index.list_by_owner(owner))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.store.len())
    }

    fn last_registered_at(&self) -> Result<Option<u64>> {
        Ok(self.store.last().map(|record| record.registered_at))
    }
}
