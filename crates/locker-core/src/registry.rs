//! Storage registry
//!
//! Maps canonical storage names to live backends. Locators persisted with a
//! storage *name* are turned back into a backend here; nothing is ever
//! constructed during resolution, only looked up.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::locator::StorageRef;
use crate::storage::StorageHandle;

/// Namespace every canonical storage name lives under
pub const STORAGE_NAMESPACE: &str = "locker::storage::";

static GLOBAL: LazyLock<StorageRegistry> = LazyLock::new(StorageRegistry::new);

/// Normalize a storage name to its canonical qualified form.
///
/// Idempotent: `"Disk"`, `"locker::storage::Disk"` and
/// `"locker::storage::locker::storage::Disk"` all map to
/// `"locker::storage::Disk"`.
pub fn canonical_name(name: &str) -> String {
    let mut bare = name.trim();
    while let Some(rest) = bare.strip_prefix(STORAGE_NAMESPACE) {
        bare = rest;
    }
    format!("{}{}", STORAGE_NAMESPACE, bare)
}

/// Canonical identity of a live backend
pub fn storage_identity(storage: &StorageHandle) -> String {
    canonical_name(storage.name())
}

/// Name-to-backend lookup table
#[derive(Default)]
pub struct StorageRegistry {
    storages: RwLock<HashMap<String, StorageHandle>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry, populated at startup
    pub fn global() -> &'static StorageRegistry {
        &GLOBAL
    }

    /// Register a backend under its canonical name, returning any backend
    /// it replaced
    pub fn register(&self, storage: StorageHandle) -> Option<StorageHandle> {
        let name = storage_identity(&storage);
        info!("Registered storage {}", name);
        self.storages.write().insert(name, storage)
    }

    pub fn unregister(&self, name: &str) -> Option<StorageHandle> {
        self.storages.write().remove(&canonical_name(name))
    }

    /// Look up a backend by (possibly unqualified) name
    pub fn get(&self, name: &str) -> Result<StorageHandle, StorageError> {
        let canonical = canonical_name(name);
        self.storages
            .read()
            .get(&canonical)
            .cloned()
            .ok_or(StorageError::InvalidStorage(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.storages.read().contains_key(&canonical_name(name))
    }

    /// Canonical names of every registered backend, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.storages.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a storage reference to a live backend.
    ///
    /// Handles are returned unchanged without consulting the table.
    pub fn resolve(&self, storage: &StorageRef) -> Result<StorageHandle, StorageError> {
        match storage {
            StorageRef::Handle(handle) => Ok(Arc::clone(handle)),
            StorageRef::Named(name) => {
                debug!("Resolving storage {}", name);
                self.get(name)
            }
        }
    }
}

impl std::fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageRegistry")
            .field("storages", &self.names())
            .finish()
    }
}
