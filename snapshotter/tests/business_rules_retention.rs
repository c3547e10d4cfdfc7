//! Business Rule Tests: Retention
//!
//! Cleanup keeps the newest `keep_count` unprotected successful attempts and
//! never deletes anything carrying the persisted flag.

mod common;

use async_trait::async_trait;
use common::fixtures::*;
use snapshotter::errors::{Result, SnapshotError};
use snapshotter::storage::ObjectStore;
use snapshotter::{Database, RetentionManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn retention(test_db: &TestDatabase, store: &Arc<MockObjectStore>, dry_run: bool) -> RetentionManager {
    RetentionManager::new(
        test_db.db(),
        store.clone() as Arc<dyn ObjectStore>,
        dry_run,
    )
}

async fn seed_heights(test_db: &TestDatabase, heights: &[u64]) -> Vec<i64> {
    let mut ids = Vec::new();
    for height in heights {
        ids.push(
            test_db
                .seed_successful_attempt(*height, &[targets::GETH, targets::RETH])
                .await
                .unwrap(),
        );
    }
    ids
}

#[tokio::test]
async fn test_oldest_unprotected_attempts_deleted() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = Arc::new(MockObjectStore::new("snapshots"));
    let ids = seed_heights(&test_db, &[1000, 2000, 3000, 4000, 5000]).await;

    let report = retention(&test_db, &store, false)
        .run_cleanup_cycle(3)
        .await
        .unwrap();

    assert_eq!(report.attempts_deleted, 2);
    assert_eq!(report.targets_deleted, 4);
    assert!(report.first_error.is_none());

    let mut deleted = store.deleted_prefixes();
    deleted.sort();
    assert_eq!(
        deleted,
        vec![
            "mainnet/geth-1/1000",
            "mainnet/geth-1/2000",
            "mainnet/reth-1/1000",
            "mainnet/reth-1/2000",
        ]
    );

    let db = test_db.db();
    for (index, id) in ids.iter().enumerate() {
        let attempt = db.get_attempt(*id).await.unwrap().unwrap();
        assert_eq!(attempt.deleted, index < 2, "attempt at index {}", index);
        assert!(attempt.targets.iter().all(|t| t.deleted == (index < 2)));
    }
}

#[tokio::test]
async fn test_nothing_to_do_within_keep_count() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = Arc::new(MockObjectStore::new("snapshots"));
    seed_heights(&test_db, &[1000, 2000]).await;

    let report = retention(&test_db, &store, false)
        .run_cleanup_cycle(3)
        .await
        .unwrap();

    assert_eq!(report.attempts_deleted, 0);
    assert!(store.deleted_prefixes().is_empty());
}

#[tokio::test]
async fn test_persisted_attempts_never_deleted_nor_counted() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = Arc::new(MockObjectStore::new("snapshots"));
    let ids = seed_heights(&test_db, &[1000, 2000, 3000]).await;
    let db = test_db.db();

    // The oldest run is protected; it does not use up a keep slot either
    db.set_attempt_persisted(ids[0], true).await.unwrap();

    let report = retention(&test_db, &store, false)
        .run_cleanup_cycle(1)
        .await
        .unwrap();

    assert_eq!(report.attempts_deleted, 1);
    let oldest = db.get_attempt(ids[0]).await.unwrap().unwrap();
    assert!(!oldest.deleted);
    assert!(oldest.targets.iter().all(|t| !t.deleted && t.persisted));
    assert!(db.get_attempt(ids[1]).await.unwrap().unwrap().deleted);
    assert!(!db.get_attempt(ids[2]).await.unwrap().unwrap().deleted);
    assert!(store
        .deleted_prefixes()
        .iter()
        .all(|p| !p.ends_with("/1000")));
}

#[tokio::test]
async fn test_persisted_target_survives_attempt_deletion() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = Arc::new(MockObjectStore::new("snapshots"));
    let ids = seed_heights(&test_db, &[1000, 2000]).await;
    let db = test_db.db();
    let protected = db.get_attempt(ids[0]).await.unwrap().unwrap().targets[1].clone();
    db.set_target_persisted(protected.id, true).await.unwrap();

    let report = retention(&test_db, &store, false)
        .run_cleanup_cycle(1)
        .await
        .unwrap();

    assert_eq!(report.targets_deleted, 1);
    assert_eq!(report.attempts_deleted, 1);
    assert_eq!(store.deleted_prefixes(), vec!["mainnet/geth-1/1000"]);

    let target = db.get_target(protected.id).await.unwrap().unwrap();
    assert!(target.persisted);
    assert!(!target.deleted);
}

#[tokio::test]
async fn test_storage_failure_keeps_attempt() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = Arc::new(MockObjectStore::new("snapshots"));
    let ids = seed_heights(&test_db, &[1000, 2000]).await;
    store.fail_prefix("mainnet/reth-1/1000");

    let report = retention(&test_db, &store, false)
        .run_cleanup_cycle(1)
        .await
        .unwrap();

    assert_eq!(report.attempts_deleted, 0);
    assert_eq!(report.targets_deleted, 1);
    assert!(matches!(report.first_error, Some(SnapshotError::Storage(_))));

    let attempt = test_db.db().get_attempt(ids[0]).await.unwrap().unwrap();
    assert!(!attempt.deleted);
    let geth = attempt.targets.iter().find(|t| t.alias == targets::GETH).unwrap();
    let reth = attempt.targets.iter().find(|t| t.alias == targets::RETH).unwrap();
    assert!(geth.deleted);
    assert!(!reth.deleted);

    // Next cycle only retries what is left
    let report = retention(&test_db, &store, false)
        .run_cleanup_cycle(1)
        .await
        .unwrap();
    assert_eq!(report.targets_deleted, 0);
    assert!(report.first_error.is_some());
}

#[tokio::test]
async fn test_missing_bucket_is_reported() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = Arc::new(MockObjectStore::unconfigured());
    let ids = seed_heights(&test_db, &[1000, 2000]).await;

    let report = retention(&test_db, &store, false)
        .run_cleanup_cycle(1)
        .await
        .unwrap();

    assert_eq!(report.targets_deleted, 0);
    assert!(matches!(report.first_error, Some(SnapshotError::Storage(_))));
    assert!(!test_db.db().get_attempt(ids[0]).await.unwrap().unwrap().deleted);
}

#[tokio::test]
async fn test_dry_run_only_logs() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = Arc::new(MockObjectStore::new("snapshots"));
    let ids = seed_heights(&test_db, &[1000, 2000, 3000]).await;

    let report = retention(&test_db, &store, true)
        .run_cleanup_cycle(1)
        .await
        .unwrap();

    assert_eq!(report.attempts_deleted, 0);
    assert_eq!(report.targets_deleted, 0);
    assert!(report.first_error.is_none());
    assert!(store.deleted_prefixes().is_empty());

    for id in ids {
        let attempt = test_db.db().get_attempt(id).await.unwrap().unwrap();
        assert!(!attempt.deleted);
        assert!(attempt.targets.iter().all(|t| !t.deleted));
    }
}

#[tokio::test]
async fn test_failed_attempts_are_ignored() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = Arc::new(MockObjectStore::new("snapshots"));
    let failed = test_db.seed_failed_attempt(500, "boom").await.unwrap();
    seed_heights(&test_db, &[1000]).await;

    let report = retention(&test_db, &store, false)
        .run_cleanup_cycle(1)
        .await
        .unwrap();

    assert_eq!(report.attempts_deleted, 0);
    assert!(!test_db.db().get_attempt(failed).await.unwrap().unwrap().deleted);
}

/// Store that persists an attempt through the audit store while the first
/// prefix deletion is in flight, the way an operator would from the API.
struct PersistDuringDelete {
    inner: MockObjectStore,
    db: Arc<Database>,
    attempt_id: i64,
    fired: AtomicBool,
}

#[async_trait]
impl ObjectStore for PersistDuringDelete {
    async fn put_object(&self, key: &str, content: Vec<u8>) -> Result<()> {
        self.inner.put_object(key, content).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.db.set_attempt_persisted(self.attempt_id, true).await?;
        }
        self.inner.delete_prefix(prefix).await
    }

    fn bucket_name(&self) -> &str {
        self.inner.bucket_name()
    }

    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }

    fn region(&self) -> &str {
        self.inner.region()
    }

    fn root_prefix(&self) -> &str {
        self.inner.root_prefix()
    }
}

#[tokio::test]
async fn test_attempt_persisted_mid_cycle_keeps_remaining_storage() {
    let test_db = TestDatabase::new().await.unwrap();
    let ids = seed_heights(&test_db, &[1000, 2000]).await;
    let db = test_db.db();
    let store = Arc::new(PersistDuringDelete {
        inner: MockObjectStore::new("snapshots"),
        db: db.clone(),
        attempt_id: ids[0],
        fired: AtomicBool::new(false),
    });

    let report = RetentionManager::new(db.clone(), store.clone() as Arc<dyn ObjectStore>, false)
        .run_cleanup_cycle(1)
        .await
        .unwrap();

    // Only the target claimed before the persist reached storage
    assert_eq!(store.inner.deleted_prefixes(), vec!["mainnet/geth-1/1000"]);
    assert_eq!(report.targets_deleted, 1);
    assert_eq!(report.attempts_deleted, 0);
    assert!(report.first_error.is_none());

    let attempt = db.get_attempt(ids[0]).await.unwrap().unwrap();
    assert!(attempt.persisted);
    assert!(!attempt.deleted);
    let geth = attempt.targets.iter().find(|t| t.alias == targets::GETH).unwrap();
    let reth = attempt.targets.iter().find(|t| t.alias == targets::RETH).unwrap();
    assert!(geth.deleted && !geth.persisted);
    assert!(reth.persisted && !reth.deleted);
    assert!(attempt.targets.iter().all(|t| !(t.persisted && t.deleted)));
}

#[tokio::test]
async fn test_failed_storage_delete_releases_claim() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = Arc::new(MockObjectStore::new("snapshots"));
    let ids = seed_heights(&test_db, &[1000, 2000]).await;
    store.fail_prefix("mainnet/geth-1/1000");

    retention(&test_db, &store, false)
        .run_cleanup_cycle(1)
        .await
        .unwrap();

    let db = test_db.db();
    let attempt = db.get_attempt(ids[0]).await.unwrap().unwrap();
    let geth = attempt.targets.iter().find(|t| t.alias == targets::GETH).unwrap();
    assert!(!geth.deleted);

    // Released rows can be persisted again
    assert!(db.set_target_persisted(geth.id, true).await.unwrap());
    assert!(db.get_target(geth.id).await.unwrap().unwrap().persisted);
}
