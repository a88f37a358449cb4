//! Storage backend trait

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::StorageError;
use crate::upload::Upload;

/// Type alias for a boxed stream of bytes
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Shared handle to a live storage backend
pub type StorageHandle = Arc<dyn Storage>;

/// Options accepted by every storage operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageOptions {
    /// Prefix prepended to derived keys
    pub prefix: Option<String>,
    /// Overwrite an existing object on put
    pub force: bool,
    /// Name used instead of the upload's own name when deriving a key
    pub name: Option<String>,
    /// Backend-specific extras (e.g. `content_type`)
    pub extra: BTreeMap<String, Value>,
}

impl StorageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// String-valued extra, if present
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// Layer `overrides` on top of `self`: set fields in `overrides` win,
    /// extras are merged key by key.
    ///
    /// `force` is sticky: it is set when either side sets it, so an
    /// override cannot clear a `force` from `self`.
    pub fn merged_with(&self, overrides: &StorageOptions) -> StorageOptions {
        let mut merged = self.clone();
        if overrides.prefix.is_some() {
            merged.prefix = overrides.prefix.clone();
        }
        if overrides.name.is_some() {
            merged.name = overrides.name.clone();
        }
        merged.force = self.force || overrides.force;
        merged
            .extra
            .extend(overrides.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// Storage backend trait
///
/// A backend owns an id namespace. Ids returned by `put` are opaque to
/// callers and are only meaningful to the backend that produced them.
/// Backends never overwrite an existing object unless `force` is set.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Short identity of this backend (e.g. "Disk"); see
    /// [`canonical_name`](crate::registry::canonical_name)
    fn name(&self) -> &str;

    /// Store an upload and return its id
    async fn put(&self, upload: &dyn Upload, options: &StorageOptions)
        -> Result<String, StorageError>;

    /// Read an object fully into memory
    async fn read(&self, id: &str, options: &StorageOptions) -> Result<Bytes, StorageError>;

    /// Stream an object
    ///
    /// The returned stream is single-pass; dropping it early releases any
    /// underlying handle.
    async fn stream(&self, id: &str, options: &StorageOptions)
        -> Result<ByteStream, StorageError>;

    /// Delete an object. Deleting an absent object succeeds.
    async fn delete(&self, id: &str, options: &StorageOptions) -> Result<(), StorageError>;

    /// Local filesystem path for an object, if the backend has one
    fn path(&self, id: &str, options: &StorageOptions) -> Option<PathBuf>;

    /// URL for an object, if the backend can produce one
    fn url(&self, id: &str, options: &StorageOptions) -> Option<String>;

    /// Duplicate an object within this backend and return the new id
    async fn duplicate(&self, id: &str, options: &StorageOptions)
        -> Result<String, StorageError>;
}

impl std::fmt::Debug for dyn Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Storage({})", self.name())
    }
}

/// Derive a storage key from the upload name (or `options.name`) and prefix
pub fn derive_key(upload: &dyn Upload, options: &StorageOptions) -> String {
    let name = options.name.clone().unwrap_or_else(|| upload.name());
    join_key(options.prefix.as_deref(), &name)
}

/// Join a prefix and a name with a single `/`
pub fn join_key(prefix: Option<&str>, name: &str) -> String {
    let name = name.trim_start_matches('/');
    match prefix.map(|p| p.trim_matches('/')) {
        Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, name),
        _ => name.to_string(),
    }
}

/// Reject keys that are empty, absolute, or escape the namespace
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    if key.starts_with('/') || key.starts_with('\\') {
        return Err(StorageError::InvalidKey(format!("absolute key: {}", key)));
    }
    if key.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(StorageError::InvalidKey(format!(
            "key escapes storage root: {}",
            key
        )));
    }
    Ok(())
}

/// Last path segment of a key
pub fn key_basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Key for a same-backend duplicate: `options.name` if set, otherwise
/// `<unique>-<basename>` under the prefix
pub fn duplicate_key(id: &str, unique: &str, options: &StorageOptions) -> String {
    let name = options
        .name
        .clone()
        .unwrap_or_else(|| format!("{}-{}", unique, key_basename(id)));
    join_key(options.prefix.as_deref(), &name)
}
