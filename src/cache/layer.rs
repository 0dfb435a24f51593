//! Versioned object cache with expiry, layered over an `ObjectStore`.

use chrono::{Duration, Utc};
use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;

use super::traits::{CacheResult, ObjectStore, StoredObject};

/// Schema version stamped on every entry; entries with another version are
/// treated as misses and evicted.
pub const CACHE_VERSION: &str = "1.0.0";

const CACHE_STORE: &str = "cache";

/// Cache layer that manages expiry/version checks and fetch fallbacks.
///
/// Every failure inside the layer is logged and degrades to a miss, so a
/// broken cache never blocks a fetch.
pub struct CacheLayer {
  storage: Arc<dyn ObjectStore>,
  default_ttl: Duration,
  version: String,
}

impl CacheLayer {
  pub fn new(storage: Arc<dyn ObjectStore>) -> Self {
    Self {
      storage,
      default_ttl: Duration::minutes(5),
      version: CACHE_VERSION.to_string(),
    }
  }

  #[allow(dead_code)]
  pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
    self.default_ttl = ttl;
    self
  }

  /// Store `data` under `key` for `ttl` (default 5 minutes).
  pub fn set<T: Serialize>(&self, key: &str, data: &T, ttl: Option<Duration>) {
    if let Err(e) = self.try_set(key, data, ttl) {
      tracing::warn!(key, error = %e, "failed to cache data");
    }
  }

  fn try_set<T: Serialize>(&self, key: &str, data: &T, ttl: Option<Duration>) -> Result<()> {
    let now = Utc::now();
    let object = StoredObject {
      data: serde_json::to_value(data)?,
      timestamp: now,
      expires_at: now + ttl.unwrap_or(self.default_ttl),
      version: self.version.clone(),
    };
    self.storage.put_object(CACHE_STORE, key, &object)
  }

  /// Look up `key`. Version mismatches and expired entries are evicted and
  /// reported as a miss.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<CacheResult<T>> {
    let object = match self.storage.get_object(CACHE_STORE, key) {
      Ok(Some(object)) => object,
      Ok(None) => return None,
      Err(e) => {
        tracing::warn!(key, error = %e, "failed to retrieve cached data");
        return None;
      }
    };

    if object.version != self.version {
      tracing::debug!(key, version = %object.version, "evicting entry from old cache version");
      self.delete(key);
      return None;
    }

    if Utc::now() > object.expires_at {
      tracing::debug!(key, "evicting expired entry");
      self.delete(key);
      return None;
    }

    match serde_json::from_value(object.data) {
      Ok(data) => Some(CacheResult::from_cache(data, object.timestamp)),
      Err(e) => {
        tracing::warn!(key, error = %e, "cached entry no longer matches its type");
        self.delete(key);
        None
      }
    }
  }

  pub fn delete(&self, key: &str) {
    if let Err(e) = self.storage.delete_object(CACHE_STORE, key) {
      tracing::warn!(key, error = %e, "failed to delete cached data");
    }
  }

  pub fn clear(&self) {
    if let Err(e) = self.storage.clear_objects(CACHE_STORE) {
      tracing::warn!(error = %e, "failed to clear cache");
    }
  }

  /// Serve from cache, or run `fetcher` and cache its result.
  pub async fn get_or_fetch<T, E, F, Fut>(
    &self,
    key: &str,
    ttl: Option<Duration>,
    fetcher: F,
  ) -> std::result::Result<CacheResult<T>, E>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
  {
    if let Some(cached) = self.get(key) {
      return Ok(cached);
    }

    let data = fetcher().await?;
    self.set(key, &data, ttl);
    Ok(CacheResult::from_network(data))
  }

  /// Warm lookups for the keys a dashboard needs first. Returns how many
  /// of them were present and fresh.
  pub fn preload_essential(&self, user_id: &str) -> usize {
    essential_keys(user_id)
      .iter()
      .filter(|key| self.get::<serde_json::Value>(key).is_some())
      .count()
  }
}

/// Logical cache keys for data every session starts with.
pub fn essential_keys(user_id: &str) -> Vec<String> {
  vec![
    format!("user-{}", user_id),
    format!("enrollments-{}", user_id),
    format!("analytics-{}", user_id),
    "trending-courses".to_string(),
    "categories".to_string(),
  ]
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      default_ttl: self.default_ttl,
      version: self.version.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::MemoryStorage;
  use crate::cache::CacheSource;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn layer() -> (Arc<MemoryStorage>, CacheLayer) {
    let storage = Arc::new(MemoryStorage::new());
    let layer = CacheLayer::new(storage.clone());
    (storage, layer)
  }

  #[test]
  fn test_set_then_get() {
    let (_, cache) = layer();
    cache.set("categories", &vec!["rust", "go"], None);

    let hit = cache.get::<Vec<String>>("categories").unwrap();
    assert_eq!(hit.data, vec!["rust", "go"]);
    assert_eq!(hit.source, CacheSource::Cache);
  }

  #[test]
  fn test_expired_entry_is_evicted() {
    let (storage, cache) = layer();
    let past = Utc::now() - Duration::minutes(10);
    storage
      .put_object(
        CACHE_STORE,
        "stale",
        &StoredObject {
          data: serde_json::json!(1),
          timestamp: past,
          expires_at: past + Duration::minutes(5),
          version: CACHE_VERSION.to_string(),
        },
      )
      .unwrap();

    assert!(cache.get::<i32>("stale").is_none());
    assert!(storage.get_object(CACHE_STORE, "stale").unwrap().is_none());
  }

  #[test]
  fn test_version_mismatch_is_evicted() {
    let (storage, cache) = layer();
    let now = Utc::now();
    storage
      .put_object(
        CACHE_STORE,
        "old",
        &StoredObject {
          data: serde_json::json!(1),
          timestamp: now,
          expires_at: now + Duration::minutes(5),
          version: "0.9.0".to_string(),
        },
      )
      .unwrap();

    assert!(cache.get::<i32>("old").is_none());
    assert!(storage.get_object(CACHE_STORE, "old").unwrap().is_none());
  }

  #[tokio::test]
  async fn test_get_or_fetch_only_fetches_on_miss() {
    let (_, cache) = layer();
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
      let result = cache
        .get_or_fetch("trending-courses", None, || async {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok::<_, String>(vec![1, 2])
        })
        .await
        .unwrap();
      assert_eq!(result.data, vec![1, 2]);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_get_or_fetch_propagates_fetch_error() {
    let (_, cache) = layer();
    let result: std::result::Result<CacheResult<i32>, String> = cache
      .get_or_fetch("k", None, || async { Err("offline".to_string()) })
      .await;
    assert_eq!(result.unwrap_err(), "offline");
    assert!(cache.get::<i32>("k").is_none());
  }

  #[test]
  fn test_preload_counts_fresh_keys() {
    let (_, cache) = layer();
    cache.set("user-u1", &"profile", None);
    cache.set("categories", &vec!["a"], None);

    assert_eq!(cache.preload_essential("u1"), 2);
    assert_eq!(cache.preload_essential("u2"), 1);
  }
}
