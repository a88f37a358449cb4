//! In-crate storage double for unit tests

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::StorageError;
use crate::storage::{
    ByteStream, Storage, StorageHandle, StorageOptions, derive_key, duplicate_key,
};
use crate::upload::Upload;

/// Hash map storage that counts I/O calls
pub struct MemStorage {
    name: String,
    objects: Mutex<HashMap<String, Bytes>>,
    pub io_calls: AtomicUsize,
    pub fail_puts: bool,
}

impl MemStorage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            objects: Mutex::new(HashMap::new()),
            io_calls: AtomicUsize::new(0),
            fail_puts: false,
        }
    }

    pub fn handle(name: &str) -> StorageHandle {
        Arc::new(Self::new(name))
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_puts: true,
            ..Self::new(name)
        })
    }

    pub fn calls(&self) -> usize {
        self.io_calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.io_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for MemStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(
        &self,
        upload: &dyn Upload,
        options: &StorageOptions,
    ) -> Result<String, StorageError> {
        self.touch();
        if self.fail_puts {
            return Err(StorageError::backend(&self.name, "disk full"));
        }
        let key = derive_key(upload, options);
        if !options.force && self.objects.lock().contains_key(&key) {
            return Err(StorageError::AlreadyExists(key));
        }
        let mut stream = upload.stream().await?;
        let mut data = Vec::new();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk?);
        }
        self.objects.lock().insert(key.clone(), Bytes::from(data));
        Ok(key)
    }

    async fn read(&self, id: &str, _options: &StorageOptions) -> Result<Bytes, StorageError> {
        self.touch();
        self.objects
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn stream(
        &self,
        id: &str,
        options: &StorageOptions,
    ) -> Result<ByteStream, StorageError> {
        let data = self.read(id, options).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok::<_, StorageError>(data) })))
    }

    async fn delete(&self, id: &str, _options: &StorageOptions) -> Result<(), StorageError> {
        self.touch();
        self.objects.lock().remove(id);
        Ok(())
    }

    fn path(&self, id: &str, _options: &StorageOptions) -> Option<PathBuf> {
        Some(PathBuf::from(format!("/mem/{}", id)))
    }

    fn url(&self, id: &str, _options: &StorageOptions) -> Option<String> {
        Some(format!("mem://{}/{}", self.name, id))
    }

    async fn duplicate(
        &self,
        id: &str,
        options: &StorageOptions,
    ) -> Result<String, StorageError> {
        let data = self.read(id, options).await?;
        let key = duplicate_key(id, "dup", options);
        self.objects.lock().insert(key.clone(), data);
        Ok(key)
    }
}
