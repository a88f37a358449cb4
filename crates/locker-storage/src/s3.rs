//! S3-compatible storage backend
//!
//! Uses the `object_store` crate to store objects in an S3-compatible
//! bucket. Supports AWS S3, MinIO, and other S3-compatible services.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt};
use locker_core::storage::{derive_key, duplicate_key, validate_key};
use locker_core::{ByteStream, Storage, StorageError, StorageOptions, Upload};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, Attributes, MultipartUpload, ObjectStore, PutMultipartOpts, PutOptions, PutPayload,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Minimum S3 multipart part size; objects below it go up in a single put
pub const PART_SIZE: usize = 5 * 1024 * 1024;

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// S3 region (e.g., "us-east-1")
    pub region: String,
    /// S3 endpoint URL (for MinIO or other S3-compatible services)
    pub endpoint: Option<String>,
    /// AWS access key ID
    pub access_key_id: Option<String>,
    /// AWS secret access key
    pub secret_access_key: Option<String>,
    /// Prefix for all objects (optional)
    pub prefix: Option<String>,
    /// Allow HTTP (not HTTPS) connections
    pub allow_http: bool,
    /// Public base URL for objects, e.g. a CDN in front of the bucket
    pub public_url: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: "locker".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            prefix: None,
            allow_http: false,
            public_url: None,
        }
    }
}

/// S3 storage backend
///
/// Objects live at `<prefix>/<id>` in the bucket. Ids returned by `put`
/// exclude the configured prefix.
pub struct S3Storage {
    name: String,
    store: Arc<dyn ObjectStore>,
    config: S3Config,
}

impl S3Storage {
    /// Create a new S3 storage backend
    pub async fn new(name: impl Into<String>, config: S3Config) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(access_key) = &config.access_key_id {
            builder = builder.with_access_key_id(access_key);
        }
        if let Some(secret_key) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret_key);
        }
        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder.build().map_err(|e| {
            StorageError::Configuration(format!("Failed to create S3 client: {}", e))
        })?;

        let name = name.into();
        info!(
            "Initialized S3 storage {}: bucket={}, region={}, endpoint={:?}, prefix={:?}",
            name, config.bucket, config.region, config.endpoint, config.prefix
        );

        Ok(Self::with_store(name, Arc::new(store), config))
    }

    /// Wrap an existing object store client
    pub fn with_store(
        name: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        config: S3Config,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            config,
        }
    }

    /// Bucket path for an id
    fn object_path(&self, id: &str) -> Result<ObjectPath, StorageError> {
        validate_key(id)?;
        let full = match self.config.prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, id),
            _ => id.to_string(),
        };
        ObjectPath::parse(&full).map_err(|e| StorageError::InvalidKey(format!("{}: {}", id, e)))
    }

    fn map_error(id: &str) -> impl FnOnce(object_store::Error) -> StorageError + '_ {
        move |e| match e {
            object_store::Error::NotFound { .. } => StorageError::NotFound(id.to_string()),
            e => StorageError::ObjectStore(e.to_string()),
        }
    }

    async fn exists(&self, id: &str, path: &ObjectPath) -> Result<bool, StorageError> {
        match self.store.head(path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(Self::map_error(id)(e)),
        }
    }

    async fn check_overwrite(
        &self,
        key: &str,
        path: &ObjectPath,
        options: &StorageOptions,
    ) -> Result<(), StorageError> {
        if !options.force && self.exists(key, path).await? {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        Ok(())
    }

    /// Content type from `extra["content_type"]`, else guessed from the key
    fn attributes(key: &str, options: &StorageOptions) -> Attributes {
        let content_type = options
            .extra_str("content_type")
            .map(str::to_string)
            .or_else(|| mime_guess::from_path(key).first().map(|m| m.to_string()));

        let mut attributes = Attributes::new();
        if let Some(content_type) = content_type {
            attributes.insert(Attribute::ContentType, content_type.into());
        }
        attributes
    }

    /// Upload `first` and the rest of `stream` as a multipart upload,
    /// aborting it on any failure
    async fn put_multipart(
        &self,
        path: &ObjectPath,
        attributes: Attributes,
        first: Bytes,
        mut stream: ByteStream,
    ) -> Result<u64, StorageError> {
        let opts = PutMultipartOpts {
            attributes,
            ..Default::default()
        };
        let mut upload = self
            .store
            .put_multipart_opts(path, opts)
            .await
            .map_err(|e| StorageError::ObjectStore(format!("Failed to start multipart upload: {}", e)))?;

        let mut written = first.len() as u64;
        let result = async {
            upload
                .put_part(PutPayload::from(first))
                .await
                .map_err(|e| StorageError::ObjectStore(format!("Failed to upload part: {}", e)))?;

            let mut buffer = BytesMut::with_capacity(PART_SIZE);
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                written += chunk.len() as u64;
                buffer.extend_from_slice(&chunk);

                if buffer.len() >= PART_SIZE {
                    upload
                        .put_part(PutPayload::from(buffer.split().freeze()))
                        .await
                        .map_err(|e| {
                            StorageError::ObjectStore(format!("Failed to upload part: {}", e))
                        })?;
                }
            }

            if !buffer.is_empty() {
                upload
                    .put_part(PutPayload::from(buffer.freeze()))
                    .await
                    .map_err(|e| {
                        StorageError::ObjectStore(format!("Failed to upload final part: {}", e))
                    })?;
            }

            upload.complete().await.map_err(|e| {
                StorageError::ObjectStore(format!("Failed to complete multipart upload: {}", e))
            })?;
            Ok::<_, StorageError>(())
        }
        .await;

        if let Err(e) = result {
            if let Err(abort) = upload.abort().await {
                warn!("Failed to abort multipart upload for {:?}: {}", path, abort);
            }
            return Err(e);
        }

        Ok(written)
    }
}

#[async_trait]
impl Storage for S3Storage {
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

        let attributes = Self::attributes(&key, options);
        let mut stream = upload.stream().await?;

        // Buffer up to one part to decide between a single put and multipart
        let mut buffer = BytesMut::new();
        while buffer.len() < PART_SIZE {
            match stream.next().await {
                Some(chunk) => buffer.extend_from_slice(&chunk?),
                None => {
                    debug!("Writing {} bytes to S3: {:?}", buffer.len(), path);
                    let opts = PutOptions {
                        attributes,
                        ..Default::default()
                    };
                    self.store
                        .put_opts(&path, PutPayload::from(buffer.freeze()), opts)
                        .await
                        .map_err(|e| StorageError::ObjectStore(e.to_string()))?;
                    return Ok(key);
                }
            }
        }

        debug!("Writing multipart upload to S3: {:?}", path);
        let written = self
            .put_multipart(&path, attributes, buffer.freeze(), stream)
            .await?;
        debug!("Wrote {} bytes to S3: {:?}", written, path);

        Ok(key)
    }

    async fn read(&self, id: &str, _options: &StorageOptions) -> Result<Bytes, StorageError> {
        let path = self.object_path(id)?;
        debug!("Reading object from S3: {:?}", path);

        let result = self.store.get(&path).await.map_err(Self::map_error(id))?;
        result
            .bytes()
            .await
            .map_err(|e| StorageError::ObjectStore(format!("Failed to read bytes: {}", e)))
    }

    async fn stream(
        &self,
        id: &str,
        _options: &StorageOptions,
    ) -> Result<ByteStream, StorageError> {
        let path = self.object_path(id)?;
        debug!("Streaming object from S3: {:?}", path);

        let result = self.store.get(&path).await.map_err(Self::map_error(id))?;
        let stream = result
            .into_stream()
            .map_err(|e| StorageError::ObjectStore(format!("Stream error: {}", e)));

        Ok(Box::pin(stream))
    }

    async fn delete(&self, id: &str, _options: &StorageOptions) -> Result<(), StorageError> {
        let path = self.object_path(id)?;
        debug!("Deleting object from S3: {:?}", path);

        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(StorageError::ObjectStore(e.to_string())),
        }
    }

    fn path(&self, _id: &str, _options: &StorageOptions) -> Option<PathBuf> {
        None
    }

    fn url(&self, id: &str, _options: &StorageOptions) -> Option<String> {
        let path = self.object_path(id).ok()?;
        let url = match (&self.config.public_url, &self.config.endpoint) {
            (Some(base), _) => format!("{}/{}", base.trim_end_matches('/'), path),
            (None, Some(endpoint)) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.config.bucket,
                path
            ),
            (None, None) => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.config.bucket, self.config.region, path
            ),
        };
        Some(url)
    }

    async fn duplicate(
        &self,
        id: &str,
        options: &StorageOptions,
    ) -> Result<String, StorageError> {
        let source = self.object_path(id)?;
        if !self.exists(id, &source).await? {
            return Err(StorageError::NotFound(id.to_string()));
        }

        let key = duplicate_key(id, &uuid::Uuid::new_v4().to_string(), options);
        let target = self.object_path(&key)?;
        self.check_overwrite(&key, &target, options).await?;

        debug!("Copying S3 object {:?} to {:?}", source, target);
        self.store
            .copy(&source, &target)
            .await
            .map_err(Self::map_error(id))?;

        Ok(key)
    }
}
