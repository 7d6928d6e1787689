use std::fs;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use studio_core::{
    HistoryEntry, ItemStatus, Metadata, OperationKind, OriginalFile, ProcessingSteps, StepLabel,
    TrackedItem,
};
use studio_engine::storage::{
    DirectoryBackend, LegacyFileBackend, MemoryBackend, PersistedCollection, StorageBackend,
    StorageChain, StorageError, COLLECTION_FILE, LEGACY_STATE_FILE,
};
use tempfile::TempDir;

fn worked_item(id: u64) -> TrackedItem {
    TrackedItem::restore(
        id,
        OriginalFile::new(format!("item-{id}.png"), "image/png", vec![0u8, 1, 2, 254, 255]),
        Some("data:image/png;base64,AAAA".to_string()),
        Some("http://svc/outputs/scaled.png".to_string()),
        ItemStatus::Done,
        Metadata {
            title: "Blue mug".to_string(),
            keywords: "mug".to_string(),
            ..Metadata::default()
        },
        [OperationKind::Upscale, OperationKind::Scale]
            .into_iter()
            .collect::<ProcessingSteps>(),
        vec![
            HistoryEntry {
                prior: None,
                step: StepLabel::Known(OperationKind::Upscale),
            },
            HistoryEntry {
                prior: Some("http://svc/outputs/upscaled.png".to_string()),
                step: StepLabel::Unrecognized("vectorize".to_string()),
            },
        ],
    )
}

fn fresh_item(id: u64) -> TrackedItem {
    TrackedItem::new(id, OriginalFile::new("fresh.jpg", "image/jpeg", vec![9u8; 4]))
}

fn ranked(backends: &[&Arc<MemoryBackend>]) -> StorageChain {
    let backends = backends
        .iter()
        .map(|&backend| backend.clone() as Arc<dyn StorageBackend>)
        .collect();
    StorageChain::new(backends)
}

fn collection(items: &[TrackedItem]) -> PersistedCollection {
    PersistedCollection::from_items(items)
}

#[tokio::test]
async fn directory_backend_round_trips_items_exactly() {
    let temp = TempDir::new().unwrap();
    let backend = DirectoryBackend::new(temp.path(), u64::MAX);
    let items = vec![worked_item(1), fresh_item(2)];

    backend.save(&collection(&items)).await.unwrap();
    assert!(temp.path().join(COLLECTION_FILE).is_file());

    let loaded = backend.load().await.unwrap().expect("saved collection");
    assert_eq!(loaded.into_items(), items);
}

#[tokio::test]
async fn legacy_backend_round_trips_items_exactly() {
    let temp = TempDir::new().unwrap();
    let backend = LegacyFileBackend::new(temp.path());
    let items = vec![worked_item(7)];

    backend.save(&collection(&items)).await.unwrap();
    assert!(temp.path().join(LEGACY_STATE_FILE).is_file());

    let loaded = backend.load().await.unwrap().expect("saved collection");
    assert_eq!(loaded.into_items(), items);
}

#[tokio::test]
async fn empty_history_and_absent_urls_survive_a_round_trip() {
    let temp = TempDir::new().unwrap();
    let backend = DirectoryBackend::new(temp.path(), u64::MAX);
    let items = vec![fresh_item(3)];

    backend.save(&collection(&items)).await.unwrap();
    let raw = fs::read_to_string(temp.path().join(COLLECTION_FILE)).unwrap();
    assert!(raw.contains("\"history\":[]"));
    assert!(raw.contains("\"historySteps\":[]"));
    assert!(!raw.contains("processedUrl"));

    let restored = backend.load().await.unwrap().unwrap().into_items();
    assert_eq!(restored, items);
}

#[tokio::test]
async fn missing_files_load_as_nothing() {
    let temp = TempDir::new().unwrap();
    assert!(DirectoryBackend::new(temp.path(), 10).load().await.unwrap().is_none());
    assert!(LegacyFileBackend::new(temp.path()).load().await.unwrap().is_none());
}

#[tokio::test]
async fn legacy_backend_enforces_capacity() {
    let temp = TempDir::new().unwrap();
    let backend = LegacyFileBackend::with_capacity(temp.path(), 64);

    let err = backend
        .save(&collection(&[worked_item(1)]))
        .await
        .expect_err("too big for 64 bytes");
    assert!(err.is_quota_exceeded());
    assert!(!temp.path().join(LEGACY_STATE_FILE).exists());
    assert!(backend.quota().await.unwrap().is_none());
}

#[tokio::test]
async fn directory_quota_reports_file_usage() {
    let temp = TempDir::new().unwrap();
    let backend = DirectoryBackend::new(temp.path(), 1_000_000);
    backend.save(&collection(&[worked_item(1)])).await.unwrap();

    let size = fs::metadata(temp.path().join(COLLECTION_FILE)).unwrap().len();
    let quota = backend.quota().await.unwrap().expect("directory reports quota");
    assert_eq!(quota.used_bytes, size);
    assert_eq!(quota.available_bytes, 1_000_000 - size);
    assert!(!quota.estimated);
}

#[tokio::test]
async fn directory_quota_counts_materialized_results() {
    let temp = TempDir::new().unwrap();
    let backend = DirectoryBackend::new(temp.path(), 1_000_000);
    backend.save(&collection(&[fresh_item(1)])).await.unwrap();
    fs::create_dir_all(temp.path().join("work")).unwrap();
    fs::write(temp.path().join("work").join("result-1.png"), vec![0u8; 500]).unwrap();

    let document = fs::metadata(temp.path().join(COLLECTION_FILE)).unwrap().len();
    let quota = backend.quota().await.unwrap().unwrap();
    assert_eq!(quota.used_bytes, document + 500);
}

#[tokio::test]
async fn directory_quota_of_missing_dir_is_zero() {
    let temp = TempDir::new().unwrap();
    let backend = DirectoryBackend::new(temp.path().join("never-created"), 10);
    let quota = backend.quota().await.unwrap().unwrap();
    assert_eq!(quota.used_bytes, 0);
    assert_eq!(quota.available_bytes, 10);
}

#[tokio::test]
async fn load_migrates_legacy_data_into_primary() {
    let primary = Arc::new(MemoryBackend::new("primary"));
    let legacy = Arc::new(
        MemoryBackend::new("legacy").with_collection(collection(&[worked_item(4)])),
    );
    let chain = ranked(&[&primary, &legacy]);

    let loaded = chain.load().await.expect("legacy data");
    assert_eq!(loaded.items.len(), 1);
    assert_eq!(primary.stored().await, Some(loaded));
    assert_eq!(legacy.stored().await, None);
}

#[tokio::test]
async fn deleted_items_stay_deleted_after_migration() {
    let primary = Arc::new(MemoryBackend::new("primary"));
    let legacy = Arc::new(
        MemoryBackend::new("legacy").with_collection(collection(&[fresh_item(7)])),
    );
    let chain = ranked(&[&primary, &legacy]);

    assert!(chain.load().await.is_some());
    chain.save(&collection(&[])).await.unwrap();

    assert_eq!(chain.load().await, None);
    assert_eq!(primary.stored().await, Some(collection(&[])));
}

#[tokio::test]
async fn empty_primary_collection_is_authoritative() {
    let primary = Arc::new(MemoryBackend::new("primary").with_collection(collection(&[])));
    let legacy = Arc::new(
        MemoryBackend::new("legacy").with_collection(collection(&[fresh_item(3)])),
    );
    let chain = ranked(&[&primary, &legacy]);

    assert_eq!(chain.load().await, None);
    assert!(legacy.stored().await.is_some());
}

#[tokio::test]
async fn failed_migration_keeps_the_source_copy() {
    let primary = Arc::new(MemoryBackend::new("primary"));
    primary.fail_saves(true);
    let legacy = Arc::new(
        MemoryBackend::new("legacy").with_collection(collection(&[fresh_item(5)])),
    );
    let chain = ranked(&[&primary, &legacy]);

    assert!(chain.load().await.is_some());
    assert!(legacy.stored().await.is_some());
}

#[tokio::test]
async fn load_prefers_primary_and_skips_failing_backends() {
    let primary = Arc::new(MemoryBackend::new("primary"));
    primary.fail_loads(true);
    let legacy = Arc::new(
        MemoryBackend::new("legacy").with_collection(collection(&[fresh_item(2)])),
    );
    let chain = ranked(&[&primary, &legacy]);

    let loaded = chain.load().await.expect("falls through to legacy");
    assert_eq!(loaded.items[0].id, 2);
}

#[tokio::test]
async fn save_falls_back_when_primary_is_full() {
    let primary = Arc::new(MemoryBackend::new("primary").with_capacity(16));
    let legacy = Arc::new(MemoryBackend::new("legacy"));
    let chain = ranked(&[&primary, &legacy]);
    let snapshot = collection(&[worked_item(1)]);

    let report = chain.save(&snapshot).await.unwrap();
    assert_eq!(report.backend, "legacy");
    assert!(report.fell_back);
    assert_eq!(primary.stored().await, None);
    assert_eq!(legacy.stored().await, Some(snapshot));
}

#[tokio::test]
async fn fallback_save_is_what_the_next_load_sees() {
    let one_item = collection(&[fresh_item(1)]);
    let fits_one = serde_json::to_vec(&one_item).unwrap().len() as u64;
    let primary = Arc::new(MemoryBackend::new("primary").with_capacity(fits_one));
    let legacy = Arc::new(MemoryBackend::new("legacy"));
    let chain = ranked(&[&primary, &legacy]);

    assert_eq!(chain.save(&one_item).await.unwrap().backend, "primary");
    let report = chain
        .save(&collection(&[fresh_item(1), fresh_item(2)]))
        .await
        .unwrap();
    assert_eq!(report.backend, "legacy");
    assert!(report.fell_back);
    assert_eq!(primary.stored().await, None);

    let reloaded = chain.load().await.expect("fallback copy");
    let ids: Vec<u64> = reloaded.items.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn quota_failure_wins_when_every_backend_fails() {
    let primary = Arc::new(MemoryBackend::new("primary"));
    primary.fail_saves(true);
    let legacy = Arc::new(MemoryBackend::new("legacy").with_capacity(8));
    let chain = ranked(&[&primary, &legacy]);

    let err = chain.save(&collection(&[worked_item(1)])).await.unwrap_err();
    assert!(matches!(err, StorageError::QuotaExceeded { ref backend, .. } if backend == "legacy"));
}

#[tokio::test]
async fn exhausted_carries_last_failure() {
    let primary = Arc::new(MemoryBackend::new("primary"));
    let legacy = Arc::new(MemoryBackend::new("legacy"));
    primary.fail_saves(true);
    legacy.fail_saves(true);
    let chain = ranked(&[&primary, &legacy]);

    let err = chain.save(&collection(&[fresh_item(1)])).await.unwrap_err();
    match err {
        StorageError::Exhausted { last } => {
            assert!(last.to_string().starts_with("legacy"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn quota_is_estimated_when_no_backend_reports() {
    let only = Arc::new(MemoryBackend::new("legacy").without_quota());
    let chain = ranked(&[&only]).with_estimate_capacity(1_000_000);
    let snapshot = collection(&[worked_item(1)]);
    chain.save(&snapshot).await.unwrap();

    let expected = serde_json::to_vec(&snapshot).unwrap().len() as u64;
    let quota = chain.quota().await;
    assert!(quota.estimated);
    assert_eq!(quota.used_bytes, expected);
    assert_eq!(quota.available_bytes, 1_000_000 - expected);
}

#[tokio::test]
async fn clear_wipes_every_backend() {
    let temp = TempDir::new().unwrap();
    let directory = Arc::new(DirectoryBackend::new(temp.path(), u64::MAX));
    let legacy = Arc::new(LegacyFileBackend::new(temp.path()));
    directory.save(&collection(&[fresh_item(1)])).await.unwrap();
    legacy.save(&collection(&[fresh_item(1)])).await.unwrap();

    let backends: Vec<Arc<dyn StorageBackend>> = vec![directory, legacy];
    let chain = StorageChain::new(backends);
    chain.clear().await.unwrap();
    assert!(chain.load().await.is_none());
    assert!(!temp.path().join(COLLECTION_FILE).exists());
    assert!(!temp.path().join(LEGACY_STATE_FILE).exists());
}

#[tokio::test]
async fn no_backends_is_an_error() {
    let chain = StorageChain::new(Vec::new());
    assert!(matches!(
        chain.save(&PersistedCollection::default()).await,
        Err(StorageError::NoBackends)
    ));
}
