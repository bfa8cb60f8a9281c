//! Registry behaviour checked against both storage backends.

use std::sync::Arc;

use docreg_registry::{
    DocumentRegistry, MemoryBackend, RegistryBackend, RegistryError, SledBackend,
};
use docreg_time::{Clock, ManualClock};
use docreg_types::{AccountId, Fingerprint};
use tempfile::tempdir;

const T0: u64 = 1_700_000_000;

fn fp(byte: u8) -> Fingerprint {
    Fingerprint::from_bytes([byte; 32])
}

fn account(byte: u8) -> AccountId {
    AccountId::from_bytes([byte; 32])
}

fn with_backend<B: RegistryBackend + 'static>(backend: B) -> (DocumentRegistry, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    (DocumentRegistry::new(backend, clock.clone()), clock)
}

/// Run `check` once per backend.
fn for_each_backend(check: impl Fn(&DocumentRegistry, &ManualClock)) {
    let (memory, clock) = with_backend(MemoryBackend::new());
    check(&memory, &*clock);

    let (sled, clock) = with_backend(SledBackend::temporary().expect("temporary sled db"));
    check(&sled, &*clock);
}

#[test]
fn register_then_verify_returns_inputs() {
    for_each_backend(|registry, clock| {
        let before = clock.now();
        registry
            .register(fp(1), "land deed", "bafybeigdyr", account(0xA))
            .unwrap();

        let record = registry.verify(&fp(1)).unwrap().expect("registered");
        assert_eq!(record.owner, account(0xA));
        assert_eq!(record.metadata, "land deed");
        assert_eq!(record.storage_pointer, "bafybeigdyr");
        assert!(record.registered_at >= before);
    });
}

#[test]
fn double_registration_keeps_first_record() {
    for_each_backend(|registry, _| {
        registry.register(fp(1), "first", "p1", account(1)).unwrap();
        let err = registry
            .register(fp(1), "second", "p2", account(2))
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered { fingerprint: fp(1) });

        let record = registry.verify(&fp(1)).unwrap().unwrap();
        assert_eq!(record.owner, account(1));
        assert_eq!(record.metadata, "first");
        assert_eq!(record.storage_pointer, "p1");
        assert!(registry.list_by_owner(&account(2)).unwrap().is_empty());
    });
}

#[test]
fn invalid_input_is_reported_before_duplicate() {
    for_each_backend(|registry, _| {
        registry.register(fp(1), "deed", "", account(1)).unwrap();
        let err = registry.register(fp(1), "", "", account(1)).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidInput(_)));
    });
}

#[test]
fn non_owner_transfer_leaves_record_unchanged() {
    for_each_backend(|registry, _| {
        let original = registry.register(fp(1), "deed", "", account(1)).unwrap();
        let err = registry
            .transfer_ownership(fp(1), account(3), account(2))
            .unwrap_err();
        assert_eq!(err, RegistryError::Unauthorized { fingerprint: fp(1) });
        assert_eq!(registry.verify(&fp(1)).unwrap(), Some(original));
    });
}

#[test]
fn zero_caller_transfer_is_unauthorized() {
    for_each_backend(|registry, _| {
        registry.register(fp(1), "deed", "", account(1)).unwrap();
        let err = registry
            .transfer_ownership(fp(1), account(2), AccountId::ZERO)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Unauthorized { .. }));
    });
}

#[test]
fn transfer_moves_owner_index_entry() {
    for_each_backend(|registry, _| {
        registry.register(fp(1), "deed", "", account(1)).unwrap();
        registry.register(fp(2), "will", "", account(1)).unwrap();
        registry
            .transfer_ownership(fp(1), account(2), account(1))
            .unwrap();

        assert_eq!(registry.verify(&fp(1)).unwrap().unwrap().owner, account(2));
        let held_by_a: Vec<_> = registry
            .list_by_owner(&account(1))
            .unwrap()
            .into_iter()
            .map(|r| r.fingerprint)
            .collect();
        assert_eq!(held_by_a, vec![fp(2)]);
        let held_by_b = registry.list_by_owner(&account(2)).unwrap();
        assert_eq!(held_by_b.len(), 1);
        assert_eq!(held_by_b[0].fingerprint, fp(1));
        assert_eq!(held_by_b[0].owner, account(2));
    });
}

#[test]
fn transfer_preserves_everything_but_owner() {
    for_each_backend(|registry, clock| {
        let original = registry.register(fp(1), "deed", "Qm1", account(1)).unwrap();
        clock.advance(3_600);
        registry
            .transfer_ownership(fp(1), account(2), account(1))
            .unwrap();

        let after = registry.verify(&fp(1)).unwrap().unwrap();
        assert_eq!(after.registered_at, original.registered_at);
        assert_eq!(after.metadata, original.metadata);
        assert_eq!(after.storage_pointer, original.storage_pointer);
    });
}

#[test]
fn list_all_follows_insertion_order() {
    for_each_backend(|registry, clock| {
        assert!(registry.list_all().unwrap().is_empty());

        let bytes = [7u8, 3, 9, 1, 5];
        for byte in bytes {
            registry
                .register(fp(byte), format!("doc {byte}"), "", account(1))
                .unwrap();
            clock.advance(1);
        }

        let listed: Vec<u8> = registry
            .list_all()
            .unwrap()
            .iter()
            .map(|r| r.fingerprint.as_bytes()[0])
            .collect();
        assert_eq!(listed, bytes.to_vec());
        assert_eq!(registry.count().unwrap(), bytes.len());

        let page: Vec<u8> = registry
            .list_page(1, 2)
            .unwrap()
            .iter()
            .map(|r| r.fingerprint.as_bytes()[0])
            .collect();
        assert_eq!(page, vec![3, 9]);
        assert!(registry.list_page(10, 2).unwrap().is_empty());
    });
}

#[test]
fn repeated_verify_is_stable() {
    for_each_backend(|registry, _| {
        registry.register(fp(1), "deed", "", account(1)).unwrap();
        let first = registry.verify(&fp(1)).unwrap();
        let second = registry.verify(&fp(1)).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.verify(&fp(2)).unwrap(), None);
    });
}

#[test]
fn passport_scenario() {
    for_each_backend(|registry, _| {
        let mut bytes = [0xAA; 32];
        bytes[31] = 0x01;
        let passport = Fingerprint::from_bytes(bytes);
        let alice = AccountId::from_hex(&format!("{:0>64}", "aaa")).unwrap();
        let bob = AccountId::from_hex(&format!("0x{:0>64}", "bbb")).unwrap();

        registry.register(passport, "passport", "Qm123", alice).unwrap();
        let record = registry.verify(&passport).unwrap().unwrap();
        assert_eq!(record.owner, alice);
        assert_eq!(record.metadata, "passport");
        assert_eq!(record.storage_pointer, "Qm123");

        registry.transfer_ownership(passport, bob, alice).unwrap();
        assert_eq!(registry.verify(&passport).unwrap().unwrap().owner, bob);

        let err = registry
            .transfer_ownership(passport, alice, alice)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Unauthorized { .. }));
    });
}

#[test]
fn sled_registry_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("registry");

    {
        let (registry, _) = with_backend(SledBackend::open(&path).unwrap());
        registry.register(fp(4), "a", "", account(1)).unwrap();
        registry.register(fp(2), "b", "Qm", account(1)).unwrap();
        registry
            .transfer_ownership(fp(4), account(2), account(1))
            .unwrap();
        registry.flush().unwrap();
    }

    let clock = Arc::new(ManualClock::new(T0 - 100));
    let registry = DocumentRegistry::new(SledBackend::open(&path).unwrap(), clock);

    let order: Vec<_> = registry
        .list_all()
        .unwrap()
        .into_iter()
        .map(|r| r.fingerprint)
        .collect();
    assert_eq!(order, vec![fp(4), fp(2)]);
    assert_eq!(registry.verify(&fp(4)).unwrap().unwrap().owner, account(2));
    assert_eq!(registry.list_by_owner(&account(1)).unwrap().len(), 1);

    // A clock that went backwards across restarts cannot reorder timestamps.
    let third = registry.register(fp(9), "c", "", account(3)).unwrap();
    assert_eq!(third.registered_at, T0);
}
