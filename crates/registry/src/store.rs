//! In-memory record store.
//!
//! Records live in a fingerprint-keyed map; a separate vector keeps the
//! insertion order for enumeration.

use std::collections::HashMap;

use docreg_types::{AccountId, DocumentRecord, Fingerprint};

use crate::errors::{RegistryError, Result};

#[derive(Debug, Default, Clone)]
pub struct RecordStore {
    /// Fingerprint → record
    records: HashMap<Fingerprint, DocumentRecord>,
    /// Fingerprints, oldest first
    order: Vec<Fingerprint>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&DocumentRecord> {
        self.records.get(fingerprint)
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.records.contains_key(fingerprint)
    }

    /// Store a new record. Existing records are never overwritten.
    pub fn insert(&mut self, record: DocumentRecord) -> Result<()> {
        if self.contains(&record.fingerprint) {
            return Err(RegistryError::AlreadyRegistered {
                fingerprint: record.fingerprint,
            });
        }
        self.order.push(record.fingerprint);
        self.records.insert(record.fingerprint, record);
        Ok(())
    }

    /// Replace the owner of an existing record, returning the previous owner.
    pub fn set_owner(&mut self, fingerprint: &Fingerprint, new_owner: AccountId) -> Result<AccountId> {
        let record = self
            .records
            .get_mut(fingerprint)
            .ok_or(RegistryError::NotFound {
                fingerprint: *fingerprint,
            })?;
        Ok(std::mem::replace(&mut record.owner, new_owner))
    }

    /// Snapshot of every record in insertion order.
    pub fn list_all(&self) -> Vec<DocumentRecord> {
        self.list_page(0, self.order.len())
    }

    /// A window of [`RecordStore::list_all`].
    pub fn list_page(&self, offset: usize, limit: usize) -> Vec<DocumentRecord> {
        self.order
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|fp| self.records.get(fp).cloned())
            .collect()
    }

    /// Most recently inserted record.
    pub fn last(&self) -> Option<&DocumentRecord> {
        self.order.last().and_then(|fp| self.records.get(fp))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
