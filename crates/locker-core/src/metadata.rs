//! Metadata merging over fallible results
//!
//! Lets a metadata update be chained straight after a fallible step:
//!
//! ```
//! use locker_core::{Locator, MetadataResultExt};
//!
//! let failed: Result<Locator, String> = Err("boom".to_string());
//! assert_eq!(failed.merge_metadata([("b", 2)]), Err("boom".to_string()));
//! ```

use serde_json::Value;

use crate::locator::Locator;

pub trait MetadataResultExt: Sized {
    /// Set a single metadata entry on a successful locator; errors pass
    /// through unchanged
    fn add_metadata(self, key: impl Into<String>, value: impl Into<Value>) -> Self;

    /// Merge a map or list of pairs into a successful locator's metadata;
    /// errors pass through unchanged
    fn merge_metadata<I, K, V>(self, data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>;
}

impl<E> MetadataResultExt for Result<Locator, E> {
    fn add_metadata(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.map(|locator| locator.add_metadata(key, value))
    }

    fn merge_metadata<I, K, V>(self, data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.map(|locator| locator.merge_metadata(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use serde_json::json;

    #[test]
    fn test_error_passes_through() {
        let failed: Result<Locator, &str> = Err("boom");
        assert_eq!(failed.merge_metadata([("b", 2)]), Err("boom"));

        let failed: Result<Locator, StorageError> = Err(StorageError::NotFound("x".to_string()));
        let result = failed.add_metadata("b", 2);
        assert!(matches!(result, Err(StorageError::NotFound(id)) if id == "x"));
    }

    #[test]
    fn test_ok_is_merged() {
        let ok: Result<Locator, &str> = Ok(Locator::new("abc", "Disk").unwrap());
        let locator = ok
            .add_metadata("a", 1)
            .merge_metadata(vec![("b".to_string(), json!({"nested": true}))])
            .unwrap();

        assert_eq!(locator.metadata().get("a"), Some(&json!(1)));
        assert_eq!(locator.metadata().get("b"), Some(&json!({"nested": true})));
    }
}
