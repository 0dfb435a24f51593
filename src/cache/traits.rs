//! Storage abstractions standing in for the browser's key-value and
//! structured stores.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Flat string key-value store (session tokens, offline queues, markers).
pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;

  fn set(&self, key: &str, value: &str) -> Result<()>;

  fn delete(&self, key: &str) -> Result<()>;

  /// Remove every key.
  fn clear(&self) -> Result<()>;
}

impl dyn KeyValueStore {
  /// Read and decode a JSON value. Storage and decode failures are logged
  /// and reported as a miss.
  pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let raw = match self.get(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        tracing::error!(key, error = %e, "failed to read from key-value store");
        return None;
      }
    };

    match serde_json::from_str(&raw) {
      Ok(value) => Some(value),
      Err(e) => {
        tracing::error!(key, error = %e, "stored value is not valid JSON");
        None
      }
    }
  }

  /// Encode and store a JSON value, logging failures.
  pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
    let encoded = match serde_json::to_string(value) {
      Ok(encoded) => encoded,
      Err(e) => {
        tracing::error!(key, error = %e, "failed to encode value");
        return false;
      }
    };

    match self.set(key, &encoded) {
      Ok(()) => true,
      Err(e) => {
        tracing::error!(key, error = %e, "failed to write to key-value store");
        false
      }
    }
  }

  /// Delete a key, logging failures.
  pub fn remove(&self, key: &str) {
    if let Err(e) = self.delete(key) {
      tracing::error!(key, error = %e, "failed to delete from key-value store");
    }
  }
}

/// A versioned, expiring record in the structured store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
  pub data: serde_json::Value,
  pub timestamp: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
  pub version: String,
}

/// Structured store with named object stores, keyed by logical cache key.
pub trait ObjectStore: Send + Sync {
  fn get_object(&self, store: &str, key: &str) -> Result<Option<StoredObject>>;

  fn put_object(&self, store: &str, key: &str, object: &StoredObject) -> Result<()>;

  fn delete_object(&self, store: &str, key: &str) -> Result<()>;

  /// Remove every object in `store`.
  fn clear_objects(&self, store: &str) -> Result<()>;
}

/// Result of a cache lookup, tagged with where the data came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Unexpired, version-compatible cached data
  Cache,
}
