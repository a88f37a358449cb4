//! Locators
//!
//! A [`Locator`] names a stored object: the backend-defined id, the storage
//! that owns it, and free-form metadata. Locators are plain values; dropping
//! one never touches the stored object.
//!
//! Persisted shape:
//!
//! ```json
//! {"id": "avatars/hi.png", "storage": "locker::storage::Disk", "metadata": {"name": "hi.png"}}
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{LocatorError, StorageError};
use crate::registry::{StorageRegistry, canonical_name, storage_identity};
use crate::storage::{ByteStream, StorageHandle, StorageOptions};
use crate::upload::Upload;

/// Locator metadata: unordered string keys to arbitrary JSON values
pub type Metadata = BTreeMap<String, Value>;

/// Which storage owns a locator's id
#[derive(Clone)]
pub enum StorageRef {
    /// Serialized storage name, resolved through a registry
    Named(String),
    /// Live backend
    Handle(StorageHandle),
}

impl StorageRef {
    /// Canonical qualified name of the referenced storage
    pub fn identity(&self) -> String {
        match self {
            StorageRef::Named(name) => canonical_name(name),
            StorageRef::Handle(handle) => storage_identity(handle),
        }
    }

    pub fn is_handle(&self) -> bool {
        matches!(self, StorageRef::Handle(_))
    }
}

impl From<&str> for StorageRef {
    fn from(name: &str) -> Self {
        StorageRef::Named(name.to_string())
    }
}

impl From<String> for StorageRef {
    fn from(name: String) -> Self {
        StorageRef::Named(name)
    }
}

impl From<StorageHandle> for StorageRef {
    fn from(handle: StorageHandle) -> Self {
        StorageRef::Handle(handle)
    }
}

impl From<&StorageHandle> for StorageRef {
    fn from(handle: &StorageHandle) -> Self {
        StorageRef::Handle(Arc::clone(handle))
    }
}

impl PartialEq for StorageRef {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl std::fmt::Debug for StorageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageRef::Named(name) => f.debug_tuple("Named").field(name).finish(),
            StorageRef::Handle(handle) => f.debug_tuple("Handle").field(&handle.name()).finish(),
        }
    }
}

impl Serialize for StorageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.identity())
    }
}

/// Untyped attribute value accepted by [`Locator::from_attributes`]
#[derive(Clone, Debug)]
pub enum AttrValue {
    Value(Value),
    Storage(StorageHandle),
}

impl From<Value> for AttrValue {
    fn from(value: Value) -> Self {
        AttrValue::Value(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Value(Value::String(value.to_string()))
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Value(Value::String(value))
    }
}

impl From<StorageHandle> for AttrValue {
    fn from(handle: StorageHandle) -> Self {
        AttrValue::Storage(handle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct Locator {
    id: String,
    storage: StorageRef,
    metadata: Metadata,
}

impl Locator {
    /// Build a locator with empty metadata
    pub fn new(id: impl Into<String>, storage: impl Into<StorageRef>) -> Result<Self, LocatorError> {
        let id = id.into();
        if id.is_empty() {
            return Err(LocatorError::EmptyId);
        }
        let storage = storage.into();
        if matches!(&storage, StorageRef::Named(name) if name.trim().is_empty()) {
            return Err(LocatorError::InvalidStorageRef);
        }
        Ok(Self {
            id,
            storage,
            metadata: Metadata::new(),
        })
    }

    /// Build a locator from untyped attributes: a map or any sequence of
    /// key/value pairs. Recognized keys are `id`, `storage` and `metadata`;
    /// anything else is ignored.
    pub fn from_attributes<I, K>(attributes: I) -> Result<Self, LocatorError>
    where
        I: IntoIterator<Item = (K, AttrValue)>,
        K: AsRef<str>,
    {
        let mut id = None;
        let mut storage = None;
        let mut metadata = None;

        for (key, value) in attributes {
            match key.as_ref() {
                "id" => id = Some(value),
                "storage" => storage = Some(value),
                "metadata" => metadata = Some(value),
                _ => {}
            }
        }

        let (Some(id), Some(storage)) = (id, storage) else {
            return Err(LocatorError::MissingKeys);
        };

        let id = match id {
            AttrValue::Value(Value::String(id)) => id,
            _ => return Err(LocatorError::InvalidId),
        };

        let storage = match storage {
            AttrValue::Storage(handle) => StorageRef::Handle(handle),
            AttrValue::Value(Value::String(name)) => StorageRef::Named(name),
            _ => return Err(LocatorError::InvalidStorageRef),
        };

        let metadata = match metadata {
            None | Some(AttrValue::Value(Value::Null)) => Metadata::new(),
            Some(AttrValue::Value(Value::Object(map))) => map.into_iter().collect(),
            Some(_) => return Err(LocatorError::InvalidMetadata),
        };

        Ok(Self::new(id, storage)?.with_metadata(metadata))
    }

    /// Like [`Locator::from_attributes`], for callers that treat invalid
    /// attributes as a programming error.
    ///
    /// # Panics
    ///
    /// Panics with the validation message if the attributes are invalid.
    #[track_caller]
    pub fn from_attributes_strict<I, K>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, AttrValue)>,
        K: AsRef<str>,
    {
        match Self::from_attributes(attributes) {
            Ok(locator) => locator,
            Err(e) => panic!("invalid locator: {}", e),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn storage(&self) -> &StorageRef {
        &self.storage
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Replace the whole metadata map
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set a single metadata entry, keeping every other key
    pub fn add_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Shallow-merge a map or a list of pairs into the metadata; incoming
    /// keys win on conflict
    pub fn merge_metadata<I, K, V>(mut self, data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.metadata
            .extend(data.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Resolve the owning storage through the process-wide registry
    pub fn resolve(&self) -> Result<StorageHandle, StorageError> {
        self.resolve_in(StorageRegistry::global())
    }

    pub fn resolve_in(&self, registry: &StorageRegistry) -> Result<StorageHandle, StorageError> {
        registry.resolve(&self.storage)
    }

    /// Delete the stored object. The locator itself stays valid as a value.
    pub async fn delete(&self, options: &StorageOptions) -> Result<(), StorageError> {
        self.resolve()?.delete(&self.id, options).await
    }

    pub fn url(&self, options: &StorageOptions) -> Option<String> {
        self.resolve().ok()?.url(&self.id, options)
    }
}

impl TryFrom<Value> for Locator {
    type Error = LocatorError;

    /// Accepts a JSON object or an array of `[key, value]` pairs
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => {
                Locator::from_attributes(map.into_iter().map(|(k, v)| (k, AttrValue::Value(v))))
            }
            Value::Array(items) => {
                let pairs = items
                    .into_iter()
                    .map(|item| match item {
                        Value::Array(pair) => match <[Value; 2]>::try_from(pair) {
                            Ok([Value::String(key), value]) => Ok((key, AttrValue::Value(value))),
                            _ => Err(LocatorError::MalformedAttributes),
                        },
                        _ => Err(LocatorError::MalformedAttributes),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Locator::from_attributes(pairs)
            }
            _ => Err(LocatorError::MalformedAttributes),
        }
    }
}

#[async_trait]
impl Upload for Locator {
    async fn contents(&self) -> Result<Bytes, StorageError> {
        let storage = self.resolve()?;
        storage.read(&self.id, &StorageOptions::default()).await
    }

    /// `metadata.name` when it is a string, otherwise the id
    fn name(&self) -> String {
        self.metadata
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.id.clone())
    }

    fn path(&self) -> Option<PathBuf> {
        self.resolve()
            .ok()?
            .path(&self.id, &StorageOptions::default())
    }

    async fn stream(&self) -> Result<ByteStream, StorageError> {
        let storage = self.resolve()?;
        storage.stream(&self.id, &StorageOptions::default()).await
    }
}
