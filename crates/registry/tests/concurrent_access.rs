//! Registry behaviour under concurrent writers and readers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use docreg_registry::{
    DocumentRegistry, MemoryBackend, RegistryBackend, RegistryError, RegistryEvent, SledBackend,
};
use docreg_time::ManualClock;
use docreg_types::{AccountId, Fingerprint};

const T0: u64 = 1_700_000_000;
const DOCUMENTS: u8 = 8;
const OWNERS: u8 = 4;

fn fp(byte: u8) -> Fingerprint {
    Fingerprint::from_bytes([byte; 32])
}

fn account(byte: u8) -> AccountId {
    AccountId::from_bytes([byte; 32])
}

fn registry_over<B: RegistryBackend + 'static>(backend: B) -> Arc<DocumentRegistry> {
    Arc::new(DocumentRegistry::new(backend, Arc::new(ManualClock::new(T0))))
}

fn for_each_backend(check: impl Fn(Arc<DocumentRegistry>)) {
    check(registry_over(MemoryBackend::new()));
    check(registry_over(
        SledBackend::temporary().expect("temporary sled db"),
    ));
}

/// Every record sits in exactly one owner bucket, the one naming its owner.
fn assert_index_matches_records(registry: &DocumentRegistry) {
    let records = registry.list_all().unwrap();
    let mut buckets_seen: HashMap<Fingerprint, usize> = HashMap::new();
    for owner in 1..=OWNERS {
        for record in registry.list_by_owner(&account(owner)).unwrap() {
            assert_eq!(record.owner, account(owner));
            *buckets_seen.entry(record.fingerprint).or_default() += 1;
        }
    }
    assert_eq!(buckets_seen.len(), records.len());
    for record in &records {
        assert_eq!(buckets_seen.get(&record.fingerprint), Some(&1));
    }
}

#[test]
fn racing_registrations_admit_exactly_one_owner() {
    for_each_backend(|registry| {
        let writers = 6u8;
        let barrier = Arc::new(Barrier::new(writers as usize));

        let handles: Vec<_> = (1..=writers)
            .map(|writer| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let mut won = Vec::new();
                    for byte in 0..DOCUMENTS * 2 {
                        match registry.register(fp(byte), "deed", "", account(writer)) {
                            Ok(_) => won.push(byte),
                            Err(RegistryError::AlreadyRegistered { .. }) => {}
                            Err(err) => panic!("unexpected error: {err}"),
                        }
                    }
                    (writer, won)
                })
            })
            .collect();

        let mut winners: HashMap<u8, u8> = HashMap::new();
        for handle in handles {
            let (writer, won) = handle.join().unwrap();
            for byte in won {
                assert!(
                    winners.insert(byte, writer).is_none(),
                    "fingerprint {byte} registered twice"
                );
            }
        }

        assert_eq!(winners.len(), (DOCUMENTS * 2) as usize);
        assert_eq!(registry.count().unwrap(), (DOCUMENTS * 2) as usize);
        for (byte, writer) in winners {
            assert_eq!(registry.verify(&fp(byte)).unwrap().unwrap().owner, account(writer));
        }

        let timestamps: Vec<u64> = registry
            .list_all()
            .unwrap()
            .iter()
            .map(|record| record.registered_at)
            .collect();
        assert!(timestamps.windows(2).all(|pair| pair[0] <= pair[1]));
    });
}

#[test]
fn readers_never_observe_half_applied_transfers() {
    for_each_backend(|registry| {
        for byte in 0..DOCUMENTS {
            registry.register(fp(byte), "deed", "", account(1)).unwrap();
        }
        let mut events = registry.subscribe();

        let writers = 4usize;
        let readers = 3usize;
        let barrier = Arc::new(Barrier::new(writers + readers));
        let done = Arc::new(AtomicBool::new(false));

        let writer_handles: Vec<_> = (0..writers)
            .map(|writer| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let mut committed = 0usize;
                    for step in 0..100usize {
                        let byte = ((writer * 3 + step) % DOCUMENTS as usize) as u8;
                        let target = account(((writer + step) % OWNERS as usize) as u8 + 1);
                        let Some(current) = registry.verify(&fp(byte)).unwrap() else {
                            panic!("registered document disappeared");
                        };
                        // Another writer may move it between the read and the transfer.
                        match registry.transfer_ownership(fp(byte), target, current.owner) {
                            Ok(()) => committed += 1,
                            Err(RegistryError::Unauthorized { .. })
                            | Err(RegistryError::NoOpTransfer { .. }) => {}
                            Err(err) => panic!("unexpected error: {err}"),
                        }
                    }
                    committed
                })
            })
            .collect();

        let reader_handles: Vec<_> = (0..readers)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    barrier.wait();
                    while !done.load(Ordering::Acquire) {
                        let all = registry.list_all().unwrap();
                        assert_eq!(all.len(), DOCUMENTS as usize);

                        for owner in 1..=OWNERS {
                            // An index entry out of step with its record surfaces as Inconsistent.
                            for record in registry.list_by_owner(&account(owner)).unwrap() {
                                assert_eq!(record.owner, account(owner));
                            }
                        }

                        for byte in 0..DOCUMENTS {
                            let record = registry.verify(&fp(byte)).unwrap().unwrap();
                            assert!((1..=OWNERS).any(|owner| record.owner == account(owner)));
                            assert_eq!(record.metadata, "deed");
                        }
                    }
                })
            })
            .collect();

        let committed: usize = writer_handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .sum();
        done.store(true, Ordering::Release);
        for handle in reader_handles {
            handle.join().unwrap();
        }

        assert_index_matches_records(&registry);

        // Events arrive in commit order, so each transfer starts from the
        // owner the previous one left behind.
        let mut owners: HashMap<Fingerprint, AccountId> =
            (0..DOCUMENTS).map(|byte| (fp(byte), account(1))).collect();
        let mut transfers = 0usize;
        while let Ok(event) = events.try_recv() {
            match event {
                RegistryEvent::OwnershipTransferred {
                    fingerprint,
                    previous_owner,
                    new_owner,
                } => {
                    assert_eq!(owners.get(&fingerprint), Some(&previous_owner));
                    owners.insert(fingerprint, new_owner);
                    transfers += 1;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(transfers, committed);
        for (fingerprint, owner) in owners {
            assert_eq!(registry.verify(&fingerprint).unwrap().unwrap().owner, owner);
        }
    });
}
