//! In-memory storage backend

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream};
use locker_core::storage::{derive_key, duplicate_key, validate_key};
use locker_core::{ByteStream, Storage, StorageError, StorageOptions, Upload};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Size of the chunks yielded by [`RamStorage::stream`]
pub const RAM_CHUNK_SIZE: usize = 64 * 1024;

/// In-memory storage backend
///
/// Objects are kept in a map keyed by their derived key and are lost when
/// the storage is dropped. Useful as a scratch cache and in tests.
pub struct RamStorage {
    name: String,
    objects: RwLock<HashMap<String, Bytes>>,
}

impl RamStorage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn get(&self, id: &str) -> Result<Bytes, StorageError> {
        self.objects
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    /// Insert unless the key is taken and `force` is unset
    fn insert(&self, key: &str, data: Bytes, options: &StorageOptions) -> Result<(), StorageError> {
        let mut objects = self.objects.write();
        if !options.force && objects.contains_key(key) {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        objects.insert(key.to_string(), data);
        Ok(())
    }
}

#[async_trait]
impl Storage for RamStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(
        &self,
        upload: &dyn Upload,
        options: &StorageOptions,
    ) -> Result<String, StorageError> {
        let key = derive_key(upload, options);
        validate_key(&key)?;
        if !options.force && self.objects.read().contains_key(&key) {
            return Err(StorageError::AlreadyExists(key));
        }

        let mut stream = upload.stream().await?;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }

        debug!("Storing {} bytes in memory as {}", buffer.len(), key);
        // Checked again under the write lock; another put may have raced us
        self.insert(&key, buffer.freeze(), options)?;
        Ok(key)
    }

    async fn read(&self, id: &str, _options: &StorageOptions) -> Result<Bytes, StorageError> {
        self.get(id)
    }

    async fn stream(
        &self,
        id: &str,
        _options: &StorageOptions,
    ) -> Result<ByteStream, StorageError> {
        let data = self.get(id)?;
        let chunks = (0..data.len())
            .step_by(RAM_CHUNK_SIZE)
            .map(move |start| {
                let end = (start + RAM_CHUNK_SIZE).min(data.len());
                Ok::<_, StorageError>(data.slice(start..end))
            });
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn delete(&self, id: &str, _options: &StorageOptions) -> Result<(), StorageError> {
        self.objects.write().remove(id);
        Ok(())
    }

    fn path(&self, _id: &str, _options: &StorageOptions) -> Option<PathBuf> {
        None
    }

    fn url(&self, _id: &str, _options: &StorageOptions) -> Option<String> {
        None
    }

    async fn duplicate(
        &self,
        id: &str,
        options: &StorageOptions,
    ) -> Result<String, StorageError> {
        let data = self.get(id)?;
        let key = duplicate_key(id, &uuid::Uuid::new_v4().to_string(), options);
        validate_key(&key)?;
        self.insert(&key, data, options)?;
        Ok(key)
    }
}
