//! Owner → fingerprints index.

use std::collections::HashMap;

use docreg_types::{AccountId, Fingerprint};

/// Fingerprints currently held by each owner, in acquisition order.
#[derive(Debug, Default, Clone)]
pub struct OwnerIndex {
    by_owner: HashMap<AccountId, Vec<Fingerprint>>,
}

impl OwnerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `owner` acquired `fingerprint`.
    pub fn add(&mut self, owner: AccountId, fingerprint: Fingerprint) {
        let bucket = self.by_owner.entry(owner).or_default();
        if !bucket.contains(&fingerprint) {
            bucket.push(fingerprint);
        }
    }

    pub fn contains(&self, owner: &AccountId, fingerprint: &Fingerprint) -> bool {
        self.by_owner
            .get(owner)
            .map(|bucket| bucket.contains(fingerprint))
            .unwrap_or(false)
    }

    /// Move `fingerprint` from `old_owner`'s bucket to `new_owner`'s.
    ///
    /// Callers check [`OwnerIndex::contains`] first; the new bucket is
    /// updated whether or not `old_owner` held the entry.
    pub fn move_entry(
        &mut self,
        old_owner: &AccountId,
        new_owner: AccountId,
        fingerprint: Fingerprint,
    ) {
        if let Some(bucket) = self.by_owner.get_mut(old_owner) {
            bucket.retain(|fp| fp != &fingerprint);
            if bucket.is_empty() {
                self.by_owner.remove(old_owner);
            }
        }
        self.add(new_owner, fingerprint);
    }

    pub fn list_by_owner(&self, owner: &AccountId) -> Vec<Fingerprint> {
        self.by_owner.get(owner).cloned().unwrap_or_default()
    }
}
