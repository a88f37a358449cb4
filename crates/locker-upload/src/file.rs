//! Local file upload source

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use locker_core::{ByteStream, StorageError, Upload};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::BufReader;
use tracing::debug;

/// A file on local disk, e.g. a multipart temp file, with the name the
/// client gave it
#[derive(Debug, Clone)]
pub struct FileUpload {
    path: PathBuf,
    filename: String,
    content_type: Option<String>,
}

impl FileUpload {
    pub fn new(path: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            filename: filename.into(),
            content_type: None,
        }
    }

    /// Use the file's own name as the client filename
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(path, filename)
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

#[async_trait]
impl Upload for FileUpload {
    async fn contents(&self) -> Result<Bytes, StorageError> {
        debug!("Reading upload from {:?}", self.path);
        Ok(Bytes::from(fs::read(&self.path).await?))
    }

    fn name(&self) -> String {
        self.filename.clone()
    }

    fn path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }

    async fn stream(&self) -> Result<ByteStream, StorageError> {
        let file = File::open(&self.path).await?;
        let stream = tokio_util::io::ReaderStream::new(BufReader::new(file));
        Ok(Box::pin(stream.map(|result| result.map_err(StorageError::Io))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_upload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload-1234.tmp");
        tokio::fs::write(&path, b"multipart body").await.unwrap();

        let upload = FileUpload::new(&path, "photo.jpg").with_content_type("image/jpeg");
        assert_eq!(upload.name(), "photo.jpg");
        assert_eq!(Upload::path(&upload), Some(path.clone()));
        assert_eq!(upload.content_type(), Some("image/jpeg"));
        assert_eq!(upload.contents().await.unwrap(), Bytes::from("multipart body"));

        let mut stream = upload.stream().await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"multipart body");
    }

    #[test]
    fn test_from_path() {
        let upload = FileUpload::from_path("/tmp/report.pdf");
        assert_eq!(upload.name(), "report.pdf");
        assert!(upload.content_type().is_none());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let upload = FileUpload::new("/nonexistent/locker/file", "file");
        assert!(matches!(upload.contents().await, Err(StorageError::Io(_))));
        assert!(upload.stream().await.is_err());
    }
}
