//! Role-based uploader
//!
//! Maps roles such as `"cache"` or `"store"` to storages so callers can
//! write `uploader.store(&upload, "cache", &opts)` without knowing which
//! backend sits behind each role.

use std::collections::HashMap;

use tracing::debug;

use crate::error::StorageError;
use crate::locator::{Locator, StorageRef};
use crate::registry::StorageRegistry;
use crate::storage::{StorageHandle, StorageOptions};
use crate::upload::Upload;

pub struct Uploader {
    storages: HashMap<String, StorageRef>,
    defaults: StorageOptions,
    registry: Option<&'static StorageRegistry>,
}

#[derive(Default)]
pub struct UploaderBuilder {
    storages: HashMap<String, StorageRef>,
    defaults: StorageOptions,
    registry: Option<&'static StorageRegistry>,
}

impl UploaderBuilder {
    /// Assign a storage to a role
    pub fn storage(mut self, role: impl Into<String>, storage: impl Into<StorageRef>) -> Self {
        self.storages.insert(role.into(), storage.into());
        self
    }

    /// Options applied to every call; per-call prefix, name and extras
    /// win, while `force` is set if either side sets it
    /// (see [`StorageOptions::merged_with`])
    pub fn options(mut self, defaults: StorageOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Resolve named storages through `registry` instead of the global one
    pub fn registry(mut self, registry: &'static StorageRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Uploader {
        Uploader {
            storages: self.storages,
            defaults: self.defaults,
            registry: self.registry,
        }
    }
}

impl Uploader {
    pub fn builder() -> UploaderBuilder {
        UploaderBuilder::default()
    }

    fn registry(&self) -> &StorageRegistry {
        self.registry.unwrap_or_else(StorageRegistry::global)
    }

    /// Storage assigned to `role`
    pub fn storage_for(&self, role: &str) -> Result<StorageHandle, StorageError> {
        let storage = self
            .storages
            .get(role)
            .ok_or_else(|| StorageError::UnknownRole(role.to_string()))?;
        self.registry().resolve(storage)
    }

    /// Roles this uploader knows, sorted
    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.storages.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }

    /// Put `upload` into the role's storage and return a locator with the
    /// upload's name recorded as `name` metadata
    pub async fn store(
        &self,
        upload: &dyn Upload,
        role: &str,
        options: &StorageOptions,
    ) -> Result<Locator, StorageError> {
        let storage = self.storage_for(role)?;
        let options = self.defaults.merged_with(options);
        let name = upload.name();

        debug!("Storing {} as {} in {}", name, role, storage.name());

        let id = storage.put(upload, &options).await?;
        Ok(Locator::new(id, storage)?.add_metadata("name", name))
    }

    /// Copy an already stored locator into the role's storage
    ///
    /// Without an explicit name the copy keeps the source id minus the
    /// effective prefix, so the prefix is not applied twice.
    pub async fn promote(
        &self,
        locator: &Locator,
        role: &str,
        options: &StorageOptions,
    ) -> Result<Locator, StorageError> {
        let storage = self.storage_for(role)?;
        let mut options = self.defaults.merged_with(options);
        let name = locator.name();

        if options.name.is_none() {
            let id = locator.id();
            let relative = options
                .prefix
                .as_deref()
                .map(|prefix| prefix.trim_matches('/'))
                .filter(|prefix| !prefix.is_empty())
                .and_then(|prefix| id.strip_prefix(prefix))
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(id);
            options.name = Some(relative.to_string());
        }

        self.registry()
            .copy(locator, storage, &options)
            .await
            .map(|copied| copied.add_metadata("name", name))
    }
}
