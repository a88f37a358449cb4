//! Upload sources
//!
//! Anything that can be handed to [`Storage::put`](crate::Storage::put)
//! implements [`Upload`]: it yields its contents, a display name, and
//! optionally a local path that backends can copy from directly.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use std::path::PathBuf;

use crate::error::StorageError;
use crate::storage::ByteStream;

#[async_trait]
pub trait Upload: Send + Sync {
    /// Full contents of the upload
    async fn contents(&self) -> Result<Bytes, StorageError>;

    /// Display name; used to derive a key when none is given explicitly
    fn name(&self) -> String;

    /// Local filesystem path backing this upload, if any
    fn path(&self) -> Option<PathBuf>;

    /// Contents as a stream of chunks
    async fn stream(&self) -> Result<ByteStream, StorageError> {
        let contents = self.contents().await?;
        Ok(Box::pin(stream::once(async move { Ok::<_, StorageError>(contents) })))
    }
}

/// In-memory upload: a buffer, a name, and optionally the path it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUpload {
    pub content: Bytes,
    pub name: String,
    pub path: Option<PathBuf>,
}

impl RawUpload {
    pub fn new(content: impl Into<Bytes>, name: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            name: name.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

#[async_trait]
impl Upload for RawUpload {
    async fn contents(&self) -> Result<Bytes, StorageError> {
        Ok(self.content.clone())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn path(&self) -> Option<PathBuf> {
        self.path.clone()
    }
}

/// Single-pass upload over a byte stream
///
/// The stream can be taken once, either through [`Upload::stream`] or
/// [`Upload::contents`]; later calls fail with
/// [`StorageError::StreamConsumed`].
pub struct StreamUpload {
    name: String,
    stream: Mutex<Option<ByteStream>>,
}

impl StreamUpload {
    pub fn new(name: impl Into<String>, stream: ByteStream) -> Self {
        Self {
            name: name.into(),
            stream: Mutex::new(Some(stream)),
        }
    }

    fn take(&self) -> Result<ByteStream, StorageError> {
        self.stream.lock().take().ok_or(StorageError::StreamConsumed)
    }
}

impl std::fmt::Debug for StreamUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamUpload")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Upload for StreamUpload {
    async fn contents(&self) -> Result<Bytes, StorageError> {
        let mut stream = self.take()?;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn path(&self) -> Option<PathBuf> {
        None
    }

    async fn stream(&self) -> Result<ByteStream, StorageError> {
        self.take()
    }
}
