//! Backend configuration
//!
//! Each `[[storages]]` table names a storage and selects its backend with
//! the `backend` key; remaining keys are backend-specific.

use locker_core::{StorageError, StorageHandle, StorageRegistry, canonical_name};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::disk::DiskStorage;
use crate::ram::RamStorage;
use crate::s3::{S3Config, S3Storage};

/// One configured storage
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub name: String,
    #[serde(flatten)]
    pub backend: BackendConfig,
}

/// Backend selection
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BackendConfig {
    Disk(DiskConfig),
    S3(S3Config),
    Ram(RamConfig),
}

/// Disk backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DiskConfig {
    #[serde(default = "default_disk_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            root: default_disk_root(),
            base_url: None,
        }
    }
}

/// RAM backend configuration (no options)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RamConfig {}

fn default_disk_root() -> PathBuf {
    PathBuf::from("./data/uploads")
}

impl StorageConfig {
    pub fn disk(name: impl Into<String>, config: DiskConfig) -> Self {
        Self {
            name: name.into(),
            backend: BackendConfig::Disk(config),
        }
    }

    pub fn ram(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: BackendConfig::Ram(RamConfig::default()),
        }
    }

    pub fn s3(name: impl Into<String>, config: S3Config) -> Self {
        Self {
            name: name.into(),
            backend: BackendConfig::S3(config),
        }
    }

    /// Construct the configured backend
    pub async fn build(&self) -> Result<StorageHandle, StorageError> {
        if self.name.trim().is_empty() {
            return Err(StorageError::Configuration(
                "storage name must not be empty".to_string(),
            ));
        }

        let handle: StorageHandle = match &self.backend {
            BackendConfig::Disk(disk) => {
                let mut storage = DiskStorage::new(&self.name, &disk.root).await?;
                if let Some(base_url) = &disk.base_url {
                    storage = storage.with_base_url(base_url);
                }
                Arc::new(storage)
            }
            BackendConfig::S3(s3) => Arc::new(S3Storage::new(&self.name, s3.clone()).await?),
            BackendConfig::Ram(_) => Arc::new(RamStorage::new(&self.name)),
        };
        Ok(handle)
    }
}

/// Build every configured storage and register it in `registry`
///
/// Returns the canonical names registered, in configuration order. Fails
/// without registering anything if two entries share a name.
pub async fn register_all(
    configs: &[StorageConfig],
    registry: &StorageRegistry,
) -> Result<Vec<String>, StorageError> {
    let mut seen = HashSet::new();
    for config in configs {
        if !seen.insert(canonical_name(&config.name)) {
            return Err(StorageError::Configuration(format!(
                "duplicate storage name: {}",
                config.name
            )));
        }
    }

    let mut names = Vec::with_capacity(configs.len());
    for config in configs {
        let handle = config.build().await?;
        names.push(canonical_name(handle.name()));
        registry.register(handle);
    }

    info!("Registered {} storages", names.len());
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use locker_core::{RawUpload, StorageOptions};
    use tempfile::TempDir;

    #[derive(Deserialize)]
    struct File {
        storages: Vec<StorageConfig>,
    }

    #[test]
    fn test_parse_backends() {
        let file: File = toml::from_str(
            r#"
            [[storages]]
            name = "Disk"
            backend = "disk"
            root = "/var/lib/locker"
            base_url = "http://localhost:8080/uploads"

            [[storages]]
            name = "S3"
            backend = "s3"
            bucket = "uploads"
            region = "eu-west-1"
            allow_http = true

            [[storages]]
            name = "Ram"
            backend = "ram"
            "#,
        )
        .unwrap();

        assert_eq!(file.storages.len(), 3);
        match &file.storages[0].backend {
            BackendConfig::Disk(disk) => {
                assert_eq!(disk.root, PathBuf::from("/var/lib/locker"));
                assert_eq!(disk.base_url.as_deref(), Some("http://localhost:8080/uploads"));
            }
            other => panic!("expected disk, got {:?}", other),
        }
        match &file.storages[1].backend {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "uploads");
                assert_eq!(s3.region, "eu-west-1");
                assert!(s3.allow_http);
                assert!(s3.endpoint.is_none());
            }
            other => panic!("expected s3, got {:?}", other),
        }
        assert!(matches!(file.storages[2].backend, BackendConfig::Ram(_)));
    }

    #[test]
    fn test_disk_defaults() {
        let file: File = toml::from_str(
            r#"
            [[storages]]
            name = "Disk"
            backend = "disk"
            "#,
        )
        .unwrap();

        match &file.storages[0].backend {
            BackendConfig::Disk(disk) => assert_eq!(disk.root, default_disk_root()),
            other => panic!("expected disk, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_backend() {
        let result: Result<File, _> = toml::from_str(
            r#"
            [[storages]]
            name = "Tape"
            backend = "tape"
            "#,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_register_all() {
        let dir = TempDir::new().unwrap();
        let registry = StorageRegistry::new();
        let configs = vec![
            StorageConfig::disk(
                "Disk",
                DiskConfig {
                    root: dir.path().join("uploads"),
                    base_url: None,
                },
            ),
            StorageConfig::ram("Ram"),
        ];

        let names = register_all(&configs, &registry).await.unwrap();
        assert_eq!(names, vec!["locker::storage::Disk", "locker::storage::Ram"]);
        assert_eq!(registry.names(), names);

        let disk = registry.get("Disk").unwrap();
        let id = disk
            .put(&RawUpload::new("hello", "h.txt"), &StorageOptions::default())
            .await
            .unwrap();
        assert_eq!(
            tokio::fs::read(dir.path().join("uploads").join(&id)).await.unwrap(),
            Bytes::from("hello")
        );
    }

    #[tokio::test]
    async fn test_register_all_rejects_duplicates() {
        let registry = StorageRegistry::new();
        let configs = vec![
            StorageConfig::ram("Scratch"),
            StorageConfig::ram("locker::storage::Scratch"),
        ];

        let err = register_all(&configs, &registry).await.unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
        assert!(registry.names().is_empty());
    }

    #[tokio::test]
    async fn test_build_rejects_empty_name() {
        let err = StorageConfig::ram("  ").build().await.err().unwrap();
        assert!(matches!(err, StorageError::Configuration(_)));
    }
}
