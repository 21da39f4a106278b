//! Typed cache store on top of a [`StorageBackend`]
//!
//! Values are serialized to JSON on save and decoded on load. A stored entry
//! that cannot be decoded is reported as [`CacheError::Corrupt`] rather than
//! as a miss, so callers can tell "nothing cached" from "cached but broken".

use serde::{de::DeserializeOwned, Serialize};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::backend::StorageBackend;

/// Errors raised by [`CacheStore`]
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend failed to read the entry
    #[error("Cache read error for key '{key}': {source}")]
    Read {
        key: String,
        #[source]
        source: io::Error,
    },

    /// The entry exists but is not valid for the requested type
    #[error("Cache entry for key '{key}' is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backend failed to persist the entry
    #[error("Cache write error for key '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: io::Error,
    },

    /// The value could not be serialized
    #[error("Cache write error for key '{key}': cannot serialize value: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backend failed to remove the entry
    #[error("Cache delete error for key '{key}': {source}")]
    Delete {
        key: String,
        #[source]
        source: io::Error,
    },

    /// The backend failed to wipe the store
    #[error("Cache clear error: {0}")]
    Clear(#[source] io::Error),
}

/// Key-value cache that survives restarts when backed by files
///
/// The store is key-agnostic; callers pick their own keys.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn StorageBackend>,
}

impl CacheStore {
    /// Creates a store over `backend`
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Serializes `value` and stores it under `key`
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(value).map_err(|source| CacheError::Serialize {
            key: key.to_string(),
            source,
        })?;

        self.backend
            .set_item(key, &json)
            .map_err(|source| CacheError::Write {
                key: key.to_string(),
                source,
            })?;

        debug!(key, "saved cache entry");
        Ok(())
    }

    /// Loads and decodes the value under `key`
    ///
    /// # Returns
    /// * `Ok(Some(value))` if the entry exists and decodes
    /// * `Ok(None)` if there is no entry
    /// * `Err(CacheError::Corrupt)` if the entry exists but does not decode
    /// * `Err(CacheError::Read)` if the backend fails
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let content = self
            .backend
            .get_item(key)
            .map_err(|source| CacheError::Read {
                key: key.to_string(),
                source,
            })?;

        let Some(content) = content else {
            debug!(key, "no cache entry");
            return Ok(None);
        };

        let value = serde_json::from_str(&content).map_err(|source| CacheError::Corrupt {
            key: key.to_string(),
            source,
        })?;

        debug!(key, "cache entry found");
        Ok(Some(value))
    }

    /// Returns true if an entry exists under `key`, without decoding it
    pub fn contains(&self, key: &str) -> Result<bool, CacheError> {
        self.backend
            .get_item(key)
            .map(|content| content.is_some())
            .map_err(|source| CacheError::Read {
                key: key.to_string(),
                source,
            })
    }

    /// Removes the entry under `key`; absent keys are not an error
    pub fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.backend
            .remove_item(key)
            .map_err(|source| CacheError::Delete {
                key: key.to_string(),
                source,
            })?;

        debug!(key, "removed cache entry");
        Ok(())
    }

    /// Wipes every entry in the store
    pub fn clear_all(&self) -> Result<(), CacheError> {
        self.backend.clear().map_err(CacheError::Clear)?;
        debug!("cleared all cache entries");
        Ok(())
    }
}
