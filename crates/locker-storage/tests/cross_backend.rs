//! Copies between real backends through the global registry

use std::sync::Arc;

use bytes::Bytes;
use locker_core::{
    COPIED_FROM, Locator, MetadataResultExt, RawUpload, Storage, StorageError, StorageHandle,
    StorageOptions, StorageRegistry, Upload, copy,
};
use locker_storage::{DiskStorage, RamStorage, S3Config, S3Storage};
use object_store::memory::InMemory;
use serde_json::json;
use tempfile::TempDir;

async fn disk(name: &str) -> (TempDir, StorageHandle) {
    let dir = TempDir::new().unwrap();
    let storage = DiskStorage::new(name, dir.path()).await.unwrap();
    (dir, Arc::new(storage))
}

fn s3(name: &str) -> StorageHandle {
    Arc::new(S3Storage::with_store(
        name,
        Arc::new(InMemory::new()),
        S3Config::default(),
    ))
}

#[tokio::test]
async fn test_copy_ram_to_disk_by_name() {
    let registry = StorageRegistry::global();
    let ram: StorageHandle = Arc::new(RamStorage::new("ItRam"));
    let (_dir, disk) = disk("ItDisk").await;
    registry.register(ram.clone());
    registry.register(disk.clone());

    let id = ram
        .put(
            &RawUpload::new("Hi, I'm a file", "hi.txt"),
            &StorageOptions::default(),
        )
        .await
        .unwrap();
    let source = Locator::new(id, "ItRam").unwrap();

    let copied = copy(&source, "ItDisk", &StorageOptions::default())
        .await
        .unwrap();

    assert_eq!(copied.id(), "hi.txt");
    assert_eq!(copied.storage().identity(), "locker::storage::ItDisk");
    assert_eq!(
        copied.metadata().get(COPIED_FROM),
        Some(&json!("locker::storage::ItRam"))
    );
    assert_eq!(copied.contents().await.unwrap(), Bytes::from("Hi, I'm a file"));
    assert!(copied.path().unwrap().exists());

    // The source stays readable
    assert_eq!(source.contents().await.unwrap(), Bytes::from("Hi, I'm a file"));
}

#[tokio::test]
async fn test_copy_disk_to_s3_and_persist() {
    let registry = StorageRegistry::global();
    let (_dir, disk) = disk("ItDisk2").await;
    let s3 = s3("ItS3");
    registry.register(disk.clone());
    registry.register(s3.clone());

    let id = disk
        .put(
            &RawUpload::new("report body", "report.txt"),
            &StorageOptions::new().with_prefix("reports"),
        )
        .await
        .unwrap();
    let source = Locator::new(id, "ItDisk2").unwrap();

    let copied = copy(&source, s3.clone(), &StorageOptions::new().with_name("archive/r.txt"))
        .await
        .add_metadata("owner", "ops")
        .unwrap();

    assert_eq!(copied.id(), "archive/r.txt");
    assert_eq!(copied.metadata().get("owner"), Some(&json!("ops")));
    assert!(copied.path().is_none());

    // A locator holding a live handle persists as its canonical name and
    // comes back resolvable by name
    let persisted = serde_json::to_value(&copied).unwrap();
    assert_eq!(persisted["storage"], json!("locker::storage::ItS3"));
    let restored: Locator = serde_json::from_value(persisted).unwrap();
    assert!(!restored.storage().is_handle());
    assert_eq!(restored, copied);
    assert_eq!(restored.contents().await.unwrap(), Bytes::from("report body"));
}

#[tokio::test]
async fn test_move_is_copy_then_delete() {
    let registry = StorageRegistry::global();
    let ram: StorageHandle = Arc::new(RamStorage::new("ItRamMove"));
    let s3 = s3("ItS3Move");
    registry.register(ram.clone());
    registry.register(s3.clone());

    let id = ram
        .put(&RawUpload::new("moving", "m.bin"), &StorageOptions::default())
        .await
        .unwrap();
    let source = Locator::new(id, ram.clone()).unwrap();

    let moved = copy(&source, "ItS3Move", &StorageOptions::default())
        .await
        .unwrap();
    source.delete(&StorageOptions::default()).await.unwrap();

    assert_eq!(moved.contents().await.unwrap(), Bytes::from("moving"));
    assert!(matches!(
        source.contents().await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_copy_refuses_existing_destination() {
    let registry = StorageRegistry::new();
    let ram: StorageHandle = Arc::new(RamStorage::new("Src"));
    let dst: StorageHandle = Arc::new(RamStorage::new("Dst"));
    registry.register(ram.clone());
    registry.register(dst.clone());

    let opts = StorageOptions::default();
    let id = ram.put(&RawUpload::new("v1", "same"), &opts).await.unwrap();
    dst.put(&RawUpload::new("old", "same"), &opts).await.unwrap();
    let source = Locator::new(id, "Src").unwrap();

    let err = registry.copy(&source, "Dst", &opts).await.unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists(_)));

    let copied = registry
        .copy(&source, "Dst", &StorageOptions::new().with_force(true))
        .await
        .unwrap();
    assert_eq!(
        copied.resolve_in(&registry).unwrap().read(copied.id(), &opts).await.unwrap(),
        Bytes::from("v1")
    );
}

#[tokio::test]
#[should_panic(expected = "use Storage::duplicate")]
async fn test_copy_same_backend_panics() {
    let registry = StorageRegistry::new();
    let ram: StorageHandle = Arc::new(RamStorage::new("Only"));
    registry.register(ram.clone());

    let source = Locator::new("x", "Only").unwrap();
    let _ = registry.copy(&source, ram, &StorageOptions::default()).await;
}
