use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::http::error::ApiError;
use crate::http::transport::Handler;
use crate::http::types::{ApiRequest, ApiResponse, Method};

/// Cacheable path prefixes and how long their responses stay fresh.
const CACHE_RULES: &[(&str, Duration)] = &[
  ("courses", Duration::from_secs(10 * 60)),
  ("categories", Duration::from_secs(30 * 60)),
  ("instructors", Duration::from_secs(15 * 60)),
];

const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
  path: String,
  response: ApiResponse,
  stored_at: Instant,
  ttl: Duration,
}

impl CacheEntry {
  fn is_fresh(&self, now: Instant) -> bool {
    now.duration_since(self.stored_at) < self.ttl
  }
}

/// In-memory TTL cache for GET responses on allow-listed resources.
///
/// Entries are never swept; an expired entry is dropped by the next read
/// that finds it.
pub struct CacheInterceptor {
  inner: Arc<dyn Handler>,
  entries: Mutex<HashMap<String, CacheEntry>>,
  invalidate_on_write: bool,
}

impl CacheInterceptor {
  pub fn new(inner: Arc<dyn Handler>, invalidate_on_write: bool) -> Self {
    Self {
      inner,
      entries: Mutex::new(HashMap::new()),
      invalidate_on_write,
    }
  }

  /// Drop every entry.
  pub fn clear(&self) {
    self.lock().clear();
    tracing::debug!("response cache cleared");
  }

  /// Drop entries whose path starts with `prefix`. Returns how many went.
  pub fn clear_for(&self, prefix: &str) -> usize {
    let prefix = prefix.trim_start_matches('/');
    let mut entries = self.lock();
    let before = entries.len();
    entries.retain(|_, entry| !entry.path.starts_with(prefix));
    let removed = before - entries.len();
    if removed > 0 {
      tracing::debug!(prefix, removed, "response cache entries cleared");
    }
    removed
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
    self
      .entries
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn lookup(&self, key: &str) -> Option<ApiResponse> {
    let mut entries = self.lock();
    let entry = entries.get(key)?;
    if entry.is_fresh(Instant::now()) {
      return Some(entry.response.clone());
    }
    entries.remove(key);
    None
  }

  fn store(&self, key: String, req: &ApiRequest, response: &ApiResponse) {
    let entry = CacheEntry {
      path: req.path.clone(),
      response: response.clone(),
      stored_at: Instant::now(),
      ttl: ttl_for(&req.path),
    };
    self.lock().insert(key, entry);
  }
}

#[async_trait]
impl Handler for CacheInterceptor {
  async fn handle(&self, req: ApiRequest) -> Result<ApiResponse, ApiError> {
    if req.method != Method::Get {
      let resource = req.resource().to_string();
      let resp = self.inner.handle(req).await?;
      if self.invalidate_on_write && resp.is_success() {
        self.clear_for(&resource);
      }
      return Ok(resp);
    }

    if !is_cacheable(&req.path) {
      return self.inner.handle(req).await;
    }

    let key = cache_key(&req);
    if let Some(cached) = self.lookup(&key) {
      tracing::debug!(path = %req.path, "serving from cache");
      return Ok(cached);
    }

    let resp = self.inner.handle(req.clone()).await?;
    if resp.is_success() {
      self.store(key, &req, &resp);
      tracing::debug!(path = %req.path, "cached response");
    }
    Ok(resp)
  }
}

fn is_cacheable(path: &str) -> bool {
  CACHE_RULES
    .iter()
    .any(|(prefix, _)| path.starts_with(prefix))
}

fn ttl_for(path: &str) -> Duration {
  CACHE_RULES
    .iter()
    .find(|(prefix, _)| path.starts_with(prefix))
    .map(|(_, ttl)| *ttl)
    .unwrap_or(DEFAULT_TTL)
}

/// SHA-256 of `METHOD:path:params`, params in canonical (sorted) order.
fn cache_key(req: &ApiRequest) -> String {
  let params = serde_json::to_string(&req.params).unwrap_or_default();
  let mut hasher = Sha256::new();
  hasher.update(format!("{}:{}:{}", req.method, req.path, params).as_bytes());
  hex::encode(hasher.finalize())
}
