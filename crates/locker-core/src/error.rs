//! Locker error types

use thiserror::Error;

/// Errors raised while building a [`Locator`](crate::Locator) from untyped
/// attributes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocatorError {
    #[error("data must contain id and storage keys")]
    MissingKeys,

    #[error("id must be a string")]
    InvalidId,

    #[error("id must not be empty")]
    EmptyId,

    #[error("storage must be a string or a storage handle")]
    InvalidStorageRef,

    #[error("metadata must be a map")]
    InvalidMetadata,

    #[error("attributes must be a map or a list of key/value pairs")]
    MalformedAttributes,
}

#[derive(Error, Debug)]
pub enum StorageError {
    /// The storage identifier does not name a registered backend
    #[error("Invalid storage: {0}")]
    InvalidStorage(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    /// Opaque failure reported by a backend, prefixed with its name
    #[error("{storage}: {message}")]
    Backend { storage: String, message: String },

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Upload stream was already consumed")]
    StreamConsumed,

    #[error("Unknown uploader role: {0}")]
    UnknownRole(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid locator: {0}")]
    Locator(#[from] LocatorError),
}

impl StorageError {
    /// Wrap an opaque backend failure with the backend's name
    pub fn backend(storage: impl Into<String>, message: impl ToString) -> Self {
        StorageError::Backend {
            storage: storage.into(),
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}
