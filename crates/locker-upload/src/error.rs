//! Fetch error types

use locker_core::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { status: u16, url: String },
}

impl From<FetchError> for StorageError {
    fn from(err: FetchError) -> Self {
        StorageError::Upload(err.to_string())
    }
}
