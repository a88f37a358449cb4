//! Locker upload sources
//!
//! [`Upload`](locker_core::Upload) implementations for content that lives
//! outside a storage: files on local disk and remote URIs.

pub mod error;
pub mod file;
pub mod uri;

pub use error::FetchError;
pub use file::FileUpload;
pub use uri::{DEFAULT_FETCH_TIMEOUT, UriUpload};
