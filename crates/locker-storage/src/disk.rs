//! Local disk storage backend

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use locker_core::storage::{derive_key, duplicate_key, validate_key};
use locker_core::{ByteStream, Storage, StorageError, StorageOptions, Upload};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

/// Local disk storage backend
///
/// Objects live at `<root>/<id>`, where the id is the derived key
/// (`<prefix>/<name>`).
pub struct DiskStorage {
    name: String,
    root: PathBuf,
    base_url: Option<String>,
}

impl DiskStorage {
    /// Create a disk backend rooted at `root`, creating the directory
    pub async fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        let root = fs::canonicalize(&root).await?;

        let name = name.into();
        info!("Initialized disk storage {} at {:?}", name, root);

        Ok(Self {
            name,
            root,
            base_url: None,
        })
    }

    /// Serve URLs as `<base_url>/<id>`
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for an id
    fn object_path(&self, id: &str) -> Result<PathBuf, StorageError> {
        validate_key(id)?;
        Ok(self.root.join(id))
    }

    fn map_not_found(id: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
        move |e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::NotFound(id.to_string())
            } else {
                StorageError::Io(e)
            }
        }
    }

    /// Fail unless `force` is set or nothing exists at `path`
    async fn check_overwrite(
        &self,
        key: &str,
        path: &Path,
        options: &StorageOptions,
    ) -> Result<(), StorageError> {
        if !options.force && fs::try_exists(path).await? {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        Ok(())
    }

    /// Temp file next to `path`, so the final rename stays on one filesystem
    fn temp_path(path: &Path) -> PathBuf {
        let mut file_name = path.file_name().unwrap_or_default().to_os_string();
        file_name.push(format!(".{}.tmp", uuid::Uuid::new_v4()));
        path.with_file_name(file_name)
    }

    /// Copy through a temp file so `source` may be `path` itself
    async fn copy_file(&self, source: &Path, path: &Path) -> std::io::Result<u64> {
        let temp_path = Self::temp_path(path);
        let copied = match fs::copy(source, &temp_path).await {
            Ok(copied) => copied,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&temp_path).await
                    && cleanup.kind() != ErrorKind::NotFound
                {
                    warn!("Failed to remove temp file {:?}: {}", temp_path, cleanup);
                }
                return Err(e);
            }
        };

        fs::rename(&temp_path, path).await?;
        Ok(copied)
    }

    async fn write_stream(&self, path: &Path, mut stream: ByteStream) -> Result<u64, StorageError> {
        let temp_path = Self::temp_path(path);
        let mut file = File::create(&temp_path).await?;
        let mut written = 0u64;

        let result = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                written += chunk.len() as u64;
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok::<_, StorageError>(())
        }
        .await;
        drop(file);

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                warn!("Failed to remove temp file {:?}: {}", temp_path, cleanup);
            }
            return Err(e);
        }

        fs::rename(&temp_path, path).await?;
        Ok(written)
    }
}

#[async_trait]
impl Storage for DiskStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(
        &self,
        upload: &dyn Upload,
        options: &StorageOptions,
    ) -> Result<String, StorageError> {
        let key = derive_key(upload, options);
        let path = self.object_path(&key)?;
        self.check_overwrite(&key, &path, options).await?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        match upload.path() {
            Some(source) => {
                debug!("Copying {:?} to {:?}", source, path);
                self.copy_file(&source, &path).await?;
            }
            None => {
                debug!("Writing upload stream to {:?}", path);
                let written = self.write_stream(&path, upload.stream().await?).await?;
                debug!("Wrote {} bytes to {:?}", written, path);
            }
        }

        Ok(key)
    }

    async fn read(&self, id: &str, _options: &StorageOptions) -> Result<Bytes, StorageError> {
        let path = self.object_path(id)?;
        debug!("Reading object from {:?}", path);

        let data = fs::read(&path).await.map_err(Self::map_not_found(id))?;
        Ok(Bytes::from(data))
    }

    async fn stream(
        &self,
        id: &str,
        _options: &StorageOptions,
    ) -> Result<ByteStream, StorageError> {
        let path = self.object_path(id)?;
        debug!("Streaming object from {:?}", path);

        let file = File::open(&path).await.map_err(Self::map_not_found(id))?;
        let reader = BufReader::new(file);
        let stream = tokio_util::io::ReaderStream::new(reader);

        Ok(Box::pin(stream.map(|result| result.map_err(StorageError::Io))))
    }

    async fn delete(&self, id: &str, _options: &StorageOptions) -> Result<(), StorageError> {
        let path = self.object_path(id)?;
        debug!("Deleting object at {:?}", path);

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn path(&self, id: &str, _options: &StorageOptions) -> Option<PathBuf> {
        self.object_path(id).ok()
    }

    fn url(&self, id: &str, _options: &StorageOptions) -> Option<String> {
        validate_key(id).ok()?;
        self.base_url
            .as_ref()
            .map(|base| format!("{}/{}", base, id))
    }

    async fn duplicate(
        &self,
        id: &str,
        options: &StorageOptions,
    ) -> Result<String, StorageError> {
        let source = self.object_path(id)?;
        let key = duplicate_key(id, &uuid::Uuid::new_v4().to_string(), options);
        let target = self.object_path(&key)?;
        self.check_overwrite(&key, &target, options).await?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        debug!("Duplicating {:?} to {:?}", source, target);
        self.copy_file(&source, &target)
            .await
            .map_err(Self::map_not_found(id))?;

        Ok(key)
    }
}
