//! Cross-storage copy
//!
//! Streams an object from the storage that owns a locator into another
//! storage and returns a locator for the new object. Copying never deletes
//! the source; a "move" is a copy followed by an explicit delete.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::StorageError;
use crate::locator::{Locator, StorageRef};
use crate::registry::{StorageRegistry, storage_identity};
use crate::storage::StorageOptions;
use crate::upload::{StreamUpload, Upload};

/// Metadata key recording the storage a copy was made from
pub const COPIED_FROM: &str = "copied_from";

/// Copy through the process-wide registry; see [`StorageRegistry::copy`]
pub async fn copy(
    locator: &Locator,
    destination: impl Into<StorageRef>,
    options: &StorageOptions,
) -> Result<Locator, StorageError> {
    StorageRegistry::global()
        .copy(locator, destination, options)
        .await
}

impl StorageRegistry {
    /// Copy the object named by `locator` into `destination`.
    ///
    /// The source is streamed into `destination.put` without buffering the
    /// whole object. Unless `options.name` is set, the source id is offered
    /// as the name so the destination derives the same key. The returned
    /// locator carries only `copied_from` metadata. Destination errors are
    /// returned unchanged; a partially written object is left in place.
    ///
    /// # Panics
    ///
    /// Panics, before any I/O, if source and destination resolve to the same
    /// storage. Same-storage copies go through [`Storage::duplicate`].
    ///
    /// [`Storage::duplicate`]: crate::Storage::duplicate
    pub async fn copy(
        &self,
        locator: &Locator,
        destination: impl Into<StorageRef>,
        options: &StorageOptions,
    ) -> Result<Locator, StorageError> {
        let source = self.resolve(locator.storage())?;
        let destination = self.resolve(&destination.into())?;

        let source_name = storage_identity(&source);
        let destination_name = storage_identity(&destination);
        if Arc::ptr_eq(&source, &destination) || source_name == destination_name {
            panic!(
                "cannot copy {} within {}; use Storage::duplicate for same-storage copies",
                locator.id(),
                source_name
            );
        }

        debug!(
            "Copying {} from {} to {}",
            locator.id(),
            source_name,
            destination_name
        );

        let mut put_options = options.clone();
        put_options
            .name
            .get_or_insert_with(|| locator.id().to_string());

        let stream = source
            .stream(locator.id(), &StorageOptions::default())
            .await?;
        let upload = StreamUpload::new(locator.name(), stream);
        let id = destination.put(&upload, &put_options).await?;

        info!(
            "Copied {} from {} to {} as {}",
            locator.id(),
            source_name,
            destination_name,
            id
        );

        Ok(Locator::new(id, destination)?.add_metadata(COPIED_FROM, source_name))
    }
}
