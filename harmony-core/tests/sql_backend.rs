//! The registry over the SQLite backend

use harmony_core::clock::SystemClock;
use harmony_core::config::StoreBackend;
use harmony_core::error::{Classify, ErrorKind};
use harmony_core::handle::{DisplayName, HandleAllocator, Namespace, DEFAULT_MAX_ATTEMPTS};
use harmony_core::store::{ReservationStore, SqlStore, Store};
use harmony_core::test_utils::{assert_mirrored, test_config};
use harmony_core::{Harmony, Role};
use std::collections::BTreeSet;
use std::sync::Arc;

fn open(dir: &tempfile::TempDir) -> Harmony {
    let store: Arc<dyn Store> = Arc::new(SqlStore::open(dir.path().join("harmony.db"), 4).unwrap());
    Harmony::with_store(test_config(), store, Arc::new(SystemClock))
}

#[tokio::test]
async fn test_membership_flow_persists() {
    let dir = tempfile::tempdir().unwrap();
    let (alice, bob, community) = {
        let harmony = open(&dir);
        let alice = harmony.identity.register("alice", "alice@example.com").await.unwrap();
        let bob = harmony.identity.register("bob", "bob@example.com").await.unwrap();
        let community = harmony
            .registry
            .create_community("Test", &alice.handle, Some("https://img.example/t.png".into()))
            .await
            .unwrap();
        harmony.registry.join(&community.id, &bob.handle).await.unwrap();
        (alice, bob, community)
    };

    // Reopen: everything comes back from disk
    let harmony = open(&dir);
    let stored = harmony.registry.community(&community.id).await.unwrap();
    assert_eq!(stored.image.as_deref(), Some("https://img.example/t.png"));
    assert_eq!(stored.role_of(&bob.handle), Some(Role::Member));
    assert_mirrored(
        harmony.store.as_ref(),
        &[alice.handle.clone(), bob.handle.clone()],
        &[community.id.clone()],
    )
    .await;

    let err = harmony.registry.join(&community.id, &bob.handle).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    harmony.registry.leave(&community.id, &bob.handle).await.unwrap();
    let bob = harmony.identity.account(&bob.id).await.unwrap();
    assert!(bob.memberships.is_empty());
}

#[tokio::test]
async fn test_handles_survive_deletion() {
    let dir = tempfile::tempdir().unwrap();
    let harmony = open(&dir);

    let first = harmony.identity.register("alice", "one@example.com").await.unwrap();
    harmony.registry.delete_account(&first.id).await.unwrap();

    // Same mail may register again, but never gets the old code back
    let second = harmony.identity.register("alice", "one@example.com").await.unwrap();
    assert_ne!(first.handle, second.handle);
}

#[tokio::test]
async fn test_from_config_opens_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.store.backend = StoreBackend::Sqlite;
    config.store.database_path = dir.path().join("nested").join("harmony.db");

    let harmony = Harmony::from_config(config).unwrap();
    harmony.identity.register("alice", "alice@example.com").await.unwrap();
    assert!(dir.path().join("nested").join("harmony.db").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_allocations_on_disk_are_distinct() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqlStore::open(dir.path().join("harmony.db"), 4).unwrap());
    let allocator = Arc::new(HandleAllocator::new(store.clone(), DEFAULT_MAX_ATTEMPTS));
    let name = DisplayName::parse("Test").unwrap();

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let allocator = allocator.clone();
            let name = name.clone();
            tokio::spawn(async move { allocator.allocate(Namespace::Accounts, &name).await })
        })
        .collect();

    let mut codes = BTreeSet::new();
    for task in futures::future::join_all(tasks).await {
        let handle = task.unwrap().unwrap();
        assert!(codes.insert(handle.code()), "code {} issued twice", handle.code());
    }
    assert_eq!(codes.len(), 50);

    let reservation = store
        .load_reservation(Namespace::Accounts, &name)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reservation.codes, codes);
}
