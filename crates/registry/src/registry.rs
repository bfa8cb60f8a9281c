//! Document registry state machine.
//!
//! Owns a [`RegistryBackend`] behind a single read/write lock. Mutations take
//! the write lock and run to completion; reads take the read lock and always
//! see the state as of the last committed mutation.

use std::sync::Arc;

use docreg_time::Clock;
use docreg_types::{AccountId, DocumentRecord, Fingerprint};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::backend::{MemoryBackend, RegistryBackend};
use crate::errors::{RegistryError, Result};
use crate::events::RegistryEvent;

pub const DEFAULT_EVENT_CAPACITY: usize = 1024;
pub const DEFAULT_MAX_METADATA_BYTES: usize = 1024;
pub const DEFAULT_MAX_STORAGE_POINTER_BYTES: usize = 512;

/// Tunables for a [`DocumentRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Buffered events per subscriber before it starts lagging.
    pub event_capacity: usize,
    pub max_metadata_bytes: usize,
    pub max_storage_pointer_bytes: usize,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_metadata_bytes: DEFAULT_MAX_METADATA_BYTES,
            max_storage_pointer_bytes: DEFAULT_MAX_STORAGE_POINTER_BYTES,
        }
    }
}

pub struct DocumentRegistry {
    backend: RwLock<Box<dyn RegistryBackend>>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<RegistryEvent>,
    options: RegistryOptions,
}

impl DocumentRegistry {
    pub fn new<B: RegistryBackend + 'static>(backend: B, clock: Arc<dyn Clock>) -> Self {
        Self::with_options(backend, clock, RegistryOptions::default())
    }

    pub fn with_options<B: RegistryBackend + 'static>(
        backend: B,
        clock: Arc<dyn Clock>,
        options: RegistryOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        Self {
            backend: RwLock::new(Box::new(backend)),
            clock,
            events,
            options,
        }
    }

    /// Registry over a fresh [`MemoryBackend`].
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(MemoryBackend::new(), clock)
    }

    /// Receive every event committed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Register `fingerprint` to `caller`.
    ///
    /// Fails with `InvalidInput` for empty or oversized metadata, an oversized
    /// storage pointer, or a zero caller; with `AlreadyRegistered` when the
    /// fingerprint exists. Nothing is retried here: on `AlreadyRegistered`
    /// the caller derives a fresh fingerprint and resubmits.
    pub fn register(
        &self,
        fingerprint: Fingerprint,
        metadata: impl Into<String>,
        storage_pointer: impl Into<String>,
        caller: AccountId,
    ) -> Result<DocumentRecord> {
        let metadata = metadata.into();
        let storage_pointer = storage_pointer.into();
        self.validate_registration(&metadata, &storage_pointer, &caller)?;

        let mut backend = self.backend.write();

        if backend.get(&fingerprint)?.is_some() {
            debug!(%fingerprint, "registration rejected: already registered");
            return Err(RegistryError::AlreadyRegistered { fingerprint });
        }

        // registered_at never decreases along insertion order.
        let floor = backend.last_registered_at()?.unwrap_or(0);
        let registered_at = self.clock.now().max(floor);

        let record = DocumentRecord {
            fingerprint,
            owner: caller,
            registered_at,
            metadata,
            storage_pointer,
        };
        backend.insert(record.clone())?;

        info!(
            %fingerprint,
            owner = %caller,
            registered_at,
            has_content = record.has_content(),
            "document registered"
        );
        let _ = self.events.send(RegistryEvent::DocumentRegistered {
            fingerprint,
            owner: caller,
            registered_at,
        });

        Ok(record)
    }

    /// Look up a registration. `None` means the fingerprint has no owner.
    pub fn verify(&self, fingerprint: &Fingerprint) -> Result<Option<DocumentRecord>> {
        self.backend.read().get(fingerprint)
    }

    /// Every record, oldest first.
    pub fn list_all(&self) -> Result<Vec<DocumentRecord>> {
        self.backend.read().list_all()
    }

    /// A window of [`DocumentRegistry::list_all`].
    pub fn list_page(&self, offset: usize, limit: usize) -> Result<Vec<DocumentRecord>> {
        self.backend.read().list_page(offset, limit)
    }

    /// Records currently owned by `owner`.
    pub fn list_by_owner(&self, owner: &AccountId) -> Result<Vec<DocumentRecord>> {
        let backend = self.backend.read();
        backend
            .fingerprints_by_owner(owner)?
            .into_iter()
            .map(|fingerprint| match backend.get(&fingerprint)? {
                Some(record) if record.owner == *owner => Ok(record),
                Some(record) => Err(RegistryError::Inconsistent(format!(
                    "{fingerprint} indexed under {owner} but owned by {}",
                    record.owner
                ))),
                None => Err(RegistryError::Inconsistent(format!(
                    "{fingerprint} indexed under {owner} but has no record"
                ))),
            })
            .collect()
    }

    /// Hand `fingerprint` over from `caller` to `new_owner`.
    ///
    /// Check order: existence, then caller authorization, then the new owner.
    /// A transfer to the current owner is rejected as `NoOpTransfer` and
    /// emits nothing.
    pub fn transfer_ownership(
        &self,
        fingerprint: Fingerprint,
        new_owner: AccountId,
        caller: AccountId,
    ) -> Result<()> {
        let mut backend = self.backend.write();

        let current = backend
            .get(&fingerprint)?
            .ok_or(RegistryError::NotFound { fingerprint })?
            .owner;

        if caller != current {
            debug!(%fingerprint, %caller, "transfer rejected: caller is not owner");
            return Err(RegistryError::Unauthorized { fingerprint });
        }
        if new_owner.is_zero() {
            return Err(RegistryError::InvalidInput(
                "new owner must not be the zero identity".into(),
            ));
        }
        if new_owner == current {
            return Err(RegistryError::NoOpTransfer { fingerprint });
        }

        let previous_owner = backend.set_owner(&fingerprint, new_owner)?;

        info!(%fingerprint, from = %previous_owner, to = %new_owner, "ownership transferred");
        let _ = self.events.send(RegistryEvent::OwnershipTransferred {
            fingerprint,
            previous_owner,
            new_owner,
        });

        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        self.backend.read().len()
    }

    pub fn flush(&self) -> Result<()> {
        self.backend.read().flush()
    }

    fn validate_registration(
        &self,
        metadata: &str,
        storage_pointer: &str,
        caller: &AccountId,
    ) -> Result<()> {
        if caller.is_zero() {
            return Err(RegistryError::InvalidInput(
                "caller must not be the zero identity".into(),
            ));
        }
        if metadata.trim().is_empty() {
            return Err(RegistryError::InvalidInput("metadata must not be empty".into()));
        }
        if metadata.len() > self.options.max_metadata_bytes {
            return Err(RegistryError::InvalidInput(format!(
                "metadata exceeds {} bytes",
                self.options.max_metadata_bytes
            )));
        }
        if storage_pointer.len() > self.options.max_storage_pointer_bytes {
            return Err(RegistryError::InvalidInput(format!(
                "storage pointer exceeds {} bytes",
                self.options.max_storage_pointer_bytes
            )));
        }
        Ok(())
    }
}
