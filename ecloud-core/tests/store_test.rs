//! On-disk store tests

use bytes::Bytes;
use ecloud_core::{
    ByteRange, DataProviderProperties, FileUpload, StorageBackend, Store, StoreConfig, StoreError,
    VersionId,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_reopen_restores_metadata_and_content() {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig::for_directory(temp_dir.path());

    let persisted = {
        let store = Store::open(config.clone()).await.unwrap();
        let service = store.service();
        service
            .providers()
            .create("P1", DataProviderProperties::default())
            .await
            .unwrap();
        let draft = service.create_representation("R1", "edm", "P1").await.unwrap();
        service
            .put_content("R1", "edm", &draft.version, FileUpload::new("a.xml", "text/xml", "<a/>"))
            .await
            .unwrap();
        service
            .put_content(
                "R1",
                "edm",
                &draft.version,
                FileUpload::new("b.bin", "application/octet-stream", "bb").with_storage(StorageBackend::Database),
            )
            .await
            .unwrap();
        let persisted = service.persist("R1", "edm", &draft.version).await.unwrap();
        service.data_sets().create_data_set("P1", "ds", Some("test")).await.unwrap();
        service
            .data_sets()
            .add_assignment("P1", "ds", "R1", "edm", Some(&persisted.version))
            .await
            .unwrap();
        store.save_snapshot().await.unwrap();
        persisted
    };

    let store = Store::open(config).await.unwrap();
    let service = store.service();
    let restored = service.get_representation("R1", "edm", None).await.unwrap();
    assert_eq!(restored, persisted);

    let a = service
        .get_content("R1", "edm", &persisted.version, "a.xml", ByteRange::full())
        .await
        .unwrap();
    assert_eq!(a, Bytes::from_static(b"<a/>"));
    let b = service
        .get_content("R1", "edm", &persisted.version, "b.bin", ByteRange::full())
        .await
        .unwrap();
    assert_eq!(b, Bytes::from_static(b"bb"));

    let listed = service.list_data_set("P1", "ds", None, None).await.unwrap();
    assert_eq!(listed.results.len(), 1);

    // allocation continues where it stopped
    let next = service.create_representation("R1", "edm", "P1").await.unwrap();
    assert_eq!(next.version, VersionId::Draft { base: 2, pre: 1 });
}

#[tokio::test]
async fn test_without_snapshot_path_nothing_is_saved() {
    let store = Store::in_memory().await.unwrap();
    store.save_snapshot().await.unwrap();
    assert!(store.snapshot().await.records.is_empty());
}

#[tokio::test]
async fn test_reject_empty_persist_from_config() {
    let config = StoreConfig {
        reject_empty_persist: true,
        ..StoreConfig::default()
    };
    let store = Store::open(config).await.unwrap();
    let service = store.service();
    service
        .providers()
        .create("P1", DataProviderProperties::default())
        .await
        .unwrap();
    let draft = service.create_representation("R1", "edm", "P1").await.unwrap();
    assert!(matches!(
        service.persist("R1", "edm", &draft.version).await,
        Err(StoreError::CannotPersistEmptyRepresentation(_))
    ));
}
