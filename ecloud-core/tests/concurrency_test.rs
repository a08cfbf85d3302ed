//! Concurrent access to one store

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ecloud_core::content::md5_hex;
use ecloud_core::{
    ByteRange, ContentKey, ContentRouter, ContentStore, DataProviderProperties, DataProviderRegistry,
    DataSetStore, ErrorKind, FileUpload, InMemoryContentStore, Notifier, PutResult, RecordService,
    RecordStore, Result, StorageBackend, Store, StoreError, VersionId,
};

async fn shared_store() -> Arc<Store> {
    let store = Store::in_memory().await.unwrap();
    store
        .service()
        .providers()
        .create("P1", DataProviderProperties::default())
        .await
        .unwrap();
    Arc::new(store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_persist_single_winner() {
    for _ in 0..20 {
        let store = shared_store().await;
        let draft = store
            .service()
            .create_representation("R1", "edm", "P1")
            .await
            .unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let version = draft.version;
                tokio::spawn(async move { store.service().persist("R1", "edm", &version).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(rep) => {
                    winners += 1;
                    assert_eq!(rep.version, VersionId::Persistent(1));
                }
                Err(e) => assert_eq!(e.kind(), ErrorKind::ImmutabilityViolation),
            }
        }
        assert_eq!(winners, 1);

        let versions = store.service().list_versions("R1", "edm").await.unwrap();
        assert_eq!(versions.len(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_drafts_get_distinct_ids() {
    let store = shared_store().await;
    let handles: Vec<_> = (0..32)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .service()
                    .create_representation("R1", "edm", "P1")
                    .await
                    .unwrap()
                    .version
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        assert!(ids.insert(handle.await.unwrap()));
    }
    assert_eq!(ids.len(), 32);
    assert!(ids.contains(&VersionId::Draft { base: 1, pre: 32 }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_upload_racing_persist() {
    for round in 0..20 {
        let store = shared_store().await;
        let service = store.service();
        let draft = service.create_representation("R1", "edm", "P1").await.unwrap();

        let uploader = {
            let store = store.clone();
            let version = draft.version;
            tokio::spawn(async move {
                store
                    .service()
                    .put_content("R1", "edm", &version, FileUpload::new("a.txt", "text/plain", "data"))
                    .await
            })
        };
        let persister = {
            let store = store.clone();
            let version = draft.version;
            tokio::spawn(async move { store.service().persist("R1", "edm", &version).await })
        };

        let upload = uploader.await.unwrap();
        let persisted = persister.await.unwrap().unwrap();
        let stored = service
            .get_representation("R1", "edm", Some(&persisted.version))
            .await
            .unwrap();

        match upload {
            // the file made it in before the version became immutable
            Ok(_) => assert_eq!(stored.files.len(), 1, "round {}", round),
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::ImmutabilityViolation, "round {}", round);
                assert!(stored.files.is_empty(), "round {}", round);
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_uploads_to_one_draft() {
    let store = shared_store().await;
    let draft = store
        .service()
        .create_representation("R1", "edm", "P1")
        .await
        .unwrap();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            let version = draft.version;
            tokio::spawn(async move {
                let upload = FileUpload::new(format!("f{}.txt", i), "text/plain", format!("body {}", i));
                store.service().put_content("R1", "edm", &version, upload).await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let rep = store
        .service()
        .get_representation("R1", "edm", Some(&draft.version))
        .await
        .unwrap();
    assert_eq!(rep.files.len(), 16);
}

/// In-memory content with slow copies and deletes. Deletes fail while
/// `fail_deletes` is set.
#[derive(Default)]
struct SlowStore {
    inner: InMemoryContentStore,
    copy_delay: Duration,
    delete_delay: Duration,
    fail_deletes: AtomicBool,
}

#[async_trait]
impl ContentStore for SlowStore {
    async fn put(&self, key: &ContentKey, data: Bytes, declared_md5: Option<&str>) -> Result<PutResult> {
        self.inner.put(key, data, declared_md5).await
    }

    async fn get(&self, key: &ContentKey, range: ByteRange) -> Result<Bytes> {
        self.inner.get(key, range).await
    }

    async fn exists(&self, key: &ContentKey) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn copy(&self, src: &ContentKey, dst: &ContentKey) -> Result<()> {
        tokio::time::sleep(self.copy_delay).await;
        self.inner.copy(src, dst).await
    }

    async fn rename(&self, src: &ContentKey, dst: &ContentKey) -> Result<()> {
        self.inner.rename(src, dst).await
    }

    async fn delete(&self, key: &ContentKey) -> Result<()> {
        tokio::time::sleep(self.delete_delay).await;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk unavailable")));
        }
        self.inner.delete(key).await
    }
}

async fn service_over(object: Arc<SlowStore>) -> Arc<RecordService> {
    let records = Arc::new(RecordStore::new());
    let providers = Arc::new(DataProviderRegistry::new());
    providers
        .create("P1", DataProviderProperties::default())
        .await
        .unwrap();
    let data_sets = Arc::new(DataSetStore::new(records.clone(), providers.clone(), Notifier::null()));
    let content = ContentRouter::new(object, Arc::new(InMemoryContentStore::new()));
    Arc::new(RecordService::new(records, providers, data_sets, content, Notifier::null()))
}

async fn slow_copy_service() -> Arc<RecordService> {
    service_over(Arc::new(SlowStore {
        copy_delay: Duration::from_millis(200),
        ..Default::default()
    }))
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_copy_racing_replace_keeps_hash_consistent() {
    let service = slow_copy_service().await;
    let draft = service.create_representation("R1", "edm", "P1").await.unwrap();
    service
        .put_content("R1", "edm", &draft.version, FileUpload::new("a.txt", "text/plain", "old"))
        .await
        .unwrap();

    let copier = {
        let service = service.clone();
        let version = draft.version;
        tokio::spawn(async move { service.copy_representation("R1", "edm", &version).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    service
        .put_content(
            "R1",
            "edm",
            &draft.version,
            FileUpload::new("a.txt", "text/plain", "NEW CONTENT"),
        )
        .await
        .unwrap();

    let copy = copier.await.unwrap().unwrap();
    let (md5, data) = service
        .get_content_with_md5("R1", "edm", &copy.version, "a.txt")
        .await
        .unwrap();
    assert_eq!(md5, md5_hex(&data));
    assert_eq!(data, Bytes::from_static(b"old"));
    assert_eq!(copy.files[0].content_length, 3);

    let (md5, data) = service
        .get_content_with_md5("R1", "edm", &draft.version, "a.txt")
        .await
        .unwrap();
    assert_eq!(data, Bytes::from_static(b"NEW CONTENT"));
    assert_eq!(md5, md5_hex(&data));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_copy_racing_delete_does_not_bring_representation_back() {
    let service = slow_copy_service().await;
    let draft = service.create_representation("R1", "edm", "P1").await.unwrap();
    service
        .put_content("R1", "edm", &draft.version, FileUpload::new("a.txt", "text/plain", "old"))
        .await
        .unwrap();

    let copier = {
        let service = service.clone();
        let version = draft.version;
        tokio::spawn(async move { service.copy_representation("R1", "edm", &version).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    service.delete_representation("R1", "edm").await.unwrap();

    let copy = copier.await.unwrap().unwrap();
    assert!(matches!(
        service.get_representation("R1", "edm", None).await,
        Err(e) if e.is_not_found()
    ));
    let key = ContentKey::for_file(&copy, "a.txt");
    assert!(!service
        .content()
        .store(StorageBackend::Object)
        .exists(&key)
        .await
        .unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_upload_during_version_delete_is_rejected() {
    let service = service_over(Arc::new(SlowStore {
        delete_delay: Duration::from_millis(200),
        ..Default::default()
    }))
    .await;
    let draft = service.create_representation("R1", "edm", "P1").await.unwrap();
    service
        .put_content("R1", "edm", &draft.version, FileUpload::new("a.txt", "text/plain", "a"))
        .await
        .unwrap();

    let deleter = {
        let service = service.clone();
        let version = draft.version;
        tokio::spawn(async move { service.delete_version("R1", "edm", &version).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // the version lock is free while bytes are being deleted
    let read = tokio::time::timeout(
        Duration::from_millis(100),
        service.get_representation("R1", "edm", Some(&draft.version)),
    )
    .await;
    assert!(read.is_ok());
    let upload = service
        .put_content("R1", "edm", &draft.version, FileUpload::new("b.txt", "text/plain", "b"))
        .await;
    assert!(matches!(upload, Err(StoreError::VersionNotFound { .. })));

    deleter.await.unwrap().unwrap();
    assert!(matches!(
        service.get_representation("R1", "edm", Some(&draft.version)).await,
        Err(StoreError::VersionNotFound { .. })
    ));
}

#[tokio::test]
async fn test_failed_content_delete_keeps_draft_usable() {
    let object = Arc::new(SlowStore::default());
    let service = service_over(object.clone()).await;
    let draft = service.create_representation("R1", "edm", "P1").await.unwrap();
    service
        .put_content("R1", "edm", &draft.version, FileUpload::new("a.txt", "text/plain", "a"))
        .await
        .unwrap();

    object.fail_deletes.store(true, Ordering::SeqCst);
    let err = service.delete_version("R1", "edm", &draft.version).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    object.fail_deletes.store(false, Ordering::SeqCst);

    let stored = service
        .put_content("R1", "edm", &draft.version, FileUpload::new("b.txt", "text/plain", "b"))
        .await
        .unwrap();
    assert_eq!(stored.representation.files.len(), 2);
    service.delete_version("R1", "edm", &draft.version).await.unwrap();
}
