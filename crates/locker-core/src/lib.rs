//! Locker core
//!
//! This crate defines the contracts shared by every Locker backend:
//! the [`Upload`] and [`Storage`] traits, the [`Locator`] value naming a
//! stored object, storage name resolution, and cross-storage copy.

pub mod copy;
pub mod error;
pub mod locator;
pub mod metadata;
pub mod registry;
pub mod storage;
pub mod upload;
pub mod uploader;

#[cfg(test)]
mod test_support;

pub use copy::{COPIED_FROM, copy};
pub use error::{LocatorError, StorageError};
pub use locator::{AttrValue, Locator, Metadata, StorageRef};
pub use metadata::MetadataResultExt;
pub use registry::{STORAGE_NAMESPACE, StorageRegistry, canonical_name, storage_identity};
pub use storage::{ByteStream, Storage, StorageHandle, StorageOptions};
pub use upload::{RawUpload, StreamUpload, Upload};
pub use uploader::{Uploader, UploaderBuilder};
