//! Sled-backed registry backend.
//!
//! Trees:
//! - `records`: fingerprint → JSON record
//! - `order`: insertion sequence (u64 BE) → fingerprint
//! - `owners`: owner ‖ fingerprint → ()
//! - `metadata`: `next_seq` counter, which is also the record count
//!
//! Every mutation runs as a single multi-tree sled transaction, so a crash
//! or a rejected precondition never leaves the owner index out of step with
//! the records.

use std::path::Path;

use docreg_types::{AccountId, DocumentRecord, Fingerprint, ID_BYTES};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError, Transactional,
};
use sled::{Db, IVec, Tree};
use tracing::debug;

use crate::backend::RegistryBackend;
use crate::errors::{RegistryError, Result};

const NEXT_SEQ_KEY: &[u8] = b"next_seq";

type TxResult<T> = ConflictableTransactionResult<T, RegistryError>;

pub struct SledBackend {
    db: Db,
    records: Tree,
    order: Tree,
    owners: Tree,
    metadata: Tree,
}

fn owner_key(owner: &AccountId, fingerprint: &Fingerprint) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_BYTES * 2);
    key.extend_from_slice(owner.as_bytes());
    key.extend_from_slice(fingerprint.as_bytes());
    key
}

fn fingerprint_from_slice(raw: &[u8]) -> Result<Fingerprint> {
    let bytes: [u8; ID_BYTES] = raw
        .try_into()
        .map_err(|_| {
            RegistryError::Storage(format!("corrupt fingerprint key of {} bytes", raw.len()))
        })?;
    Ok(Fingerprint::from_bytes(bytes))
}

fn decode_seq(raw: &IVec) -> Result<u64> {
    let bytes: [u8; 8] = raw
        .as_ref()
        .try_into()
        .map_err(|_| RegistryError::Storage("corrupt sequence counter".into()))?;
    Ok(u64::from_be_bytes(bytes))
}

fn abort<T>(err: RegistryError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

fn map_tx_error(err: TransactionError<RegistryError>) -> RegistryError {
    match err {
        TransactionError::Abort(inner) => inner,
        TransactionError::Storage(storage) => storage.into(),
    }
}

impl SledBackend {
    /// Open (or create) a registry database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Temporary database removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let records = db.open_tree("records")?;
        let order = db.open_tree("order")?;
        let owners = db.open_tree("owners")?;
        let metadata = db.open_tree("metadata")?;
        debug!(records = records.len(), "opened sled registry");
        Ok(Self {
            db,
            records,
            order,
            owners,
            metadata,
        })
    }

    fn decode_record(&self, raw: &[u8]) -> Result<DocumentRecord> {
        Ok(serde_json::from_slice(raw)?)
    }

    fn records_for(
        &self,
        fingerprints: impl Iterator<Item = Result<Fingerprint>>,
    ) -> Result<Vec<DocumentRecord>> {
        fingerprints
            .map(|fp| {
                let fp = fp?;
                self.get(&fp)?.ok_or_else(|| {
                    RegistryError::Inconsistent(format!("{fp} listed in order but has no record"))
                })
            })
            .collect()
    }
}

impl RegistryBackend for SledBackend {
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<DocumentRecord>> {
        self.records
            .get(&fingerprint.as_bytes()[..])?
            .map(|raw| self.decode_record(&raw))
            .transpose()
    }

    fn insert(&mut self, record: DocumentRecord) -> Result<()> {
        let fp_key = record.fingerprint.as_bytes().to_vec();
        let index_key = owner_key(&record.owner, &record.fingerprint);
        let value = serde_json::to_vec(&record)?;
        let fingerprint = record.fingerprint;

        (&self.records, &self.order, &self.owners, &self.metadata)
            .transaction(
                |(records, order, owners, metadata)| -> TxResult<()> {
                    if records.get(fp_key.as_slice())?.is_some() {
                        return abort(RegistryError::AlreadyRegistered { fingerprint });
                    }

                    let seq = match metadata.get(NEXT_SEQ_KEY)? {
                        Some(raw) => match decode_seq(&raw) {
                            Ok(seq) => seq,
                            Err(err) => return abort(err),
                        },
                        None => 0,
                    };

                    records.insert(fp_key.as_slice(), value.as_slice())?;
                    order.insert(&seq.to_be_bytes()[..], fp_key.as_slice())?;
                    owners.insert(index_key.as_slice(), &b""[..])?;
                    metadata.insert(NEXT_SEQ_KEY, &(seq + 1).to_be_bytes()[..])?;
                    Ok(())
                },
            )
            .map_err(map_tx_error)
    }

    fn set_owner(&mut self, fingerprint: &Fingerprint, new_owner: AccountId) -> Result<AccountId> {
        let fp_key = fingerprint.as_bytes().to_vec();
        let fingerprint = *fingerprint;

        (&self.records, &self.owners)
            .transaction(
                |(records, owners)| -> TxResult<AccountId> {
                    let Some(raw) = records.get(fp_key.as_slice())? else {
                        return abort(RegistryError::NotFound { fingerprint });
                    };
                    let mut record: DocumentRecord = match serde_json::from_slice(&raw) {
                        Ok(record) => record,
                        Err(err) => return abort(err.into()),
                    };

                    let previous = record.owner;
                    if owners
                        .remove(owner_key(&previous, &fingerprint).as_slice())?
                        .is_none()
                    {
                        return abort(RegistryError::Inconsistent(format!(
                            "{fingerprint} missing from index bucket of {previous}"
                        )));
                    }

                    record.owner = new_owner;
                    let value = match serde_json::to_vec(&record) {
                        Ok(value) => value,
                        Err(err) => return abort(err.into()),
                    };
                    records.insert(fp_key.as_slice(), value)?;
                    owners.insert(owner_key(&new_owner, &fingerprint).as_slice(), &b""[..])?;
                    Ok(previous)
                },
            )
            .map_err(map_tx_error)
    }

    fn list_all(&self) -> Result<Vec<DocumentRecord>> {
        self.records_for(
            self.order
                .iter()
                .values()
                .map(|raw| fingerprint_from_slice(&raw?)),
        )
    }

    fn list_page(&self, offset: usize, limit: usize) -> Result<Vec<DocumentRecord>> {
        self.records_for(
            self.order
                .iter()
                .values()
                .skip(offset)
                .take(limit)
                .map(|raw| fingerprint_from_slice(&raw?)),
        )
    }

    fn fingerprints_by_owner(&self, owner: &AccountId) -> Result<Vec<Fingerprint>> {
        self.owners
            .scan_prefix(&owner.as_bytes()[..])
            .keys()
            .map(|key| {
                let key = key?;
                fingerprint_from_slice(&key[ID_BYTES..])
            })
            .collect()
    }

    fn len(&self) -> Result<usize> {
        // Records are never removed, so the next sequence number is the count.
        let seq = match self.metadata.get(NEXT_SEQ_KEY)? {
            Some(raw) => decode_seq(&raw)?,
            None => 0,
        };
        usize::try_from(seq)
            .map_err(|_| RegistryError::Storage(format!("sequence counter {seq} out of range")))
    }

    fn last_registered_at(&self) -> Result<Option<u64>> {
        let Some((_, raw)) = self.order.last()? else {
            return Ok(None);
        };
        let fp = fingerprint_from_slice(&raw)?;
        Ok(self.get(&fp)?.map(|record| record.registered_at))
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
