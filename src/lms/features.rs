use std::collections::BTreeMap;
use tokio::sync::watch;

use crate::http::ApiClient;

/// Feature flags: local defaults from config with remote values from
/// `config/features` merged on top.
pub struct FeatureFlags {
  defaults: BTreeMap<String, bool>,
  flags: watch::Sender<BTreeMap<String, bool>>,
}

impl FeatureFlags {
  pub fn new(defaults: BTreeMap<String, bool>) -> Self {
    Self {
      flags: watch::Sender::new(defaults.clone()),
      defaults,
    }
  }

  /// Fetch remote flags. On failure the local defaults stay in effect.
  pub async fn load_remote(&self, http: &ApiClient) {
    match http.get::<BTreeMap<String, bool>>("config/features").await {
      Ok(remote) => {
        let mut merged = self.defaults.clone();
        merged.extend(remote);
        tracing::debug!(flags = merged.len(), "loaded remote feature flags");
        self.flags.send_replace(merged);
      }
      Err(e) => tracing::warn!(error = %e, "failed to load remote config, using defaults"),
    }
  }

  /// Unknown features are disabled.
  pub fn is_enabled(&self, feature: &str) -> bool {
    self.flags.borrow().get(feature).copied().unwrap_or(false)
  }

  /// Local override, e.g. from a keybinding.
  pub fn set(&self, feature: &str, enabled: bool) {
    self.flags.send_modify(|flags| {
      flags.insert(feature.to_string(), enabled);
    });
  }

  pub fn snapshot(&self) -> BTreeMap<String, bool> {
    self.flags.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<BTreeMap<String, bool>> {
    self.flags.subscribe()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::testing::MockTransport;
  use crate::http::{ApiError, Method};
  use serde_json::json;
  use std::sync::Arc;

  fn defaults() -> BTreeMap<String, bool> {
    [("analytics".to_string(), true), ("chatSupport".to_string(), true)]
      .into_iter()
      .collect()
  }

  #[tokio::test]
  async fn test_remote_flags_override_defaults() {
    let mock = Arc::new(MockTransport::new());
    mock.ok(
      Method::Get,
      "config/features",
      json!({"analytics": false, "darkMode": true}),
    );
    let flags = FeatureFlags::new(defaults());

    flags.load_remote(&ApiClient::new(mock)).await;
    assert!(!flags.is_enabled("analytics"));
    assert!(flags.is_enabled("chatSupport"));
    assert!(flags.is_enabled("darkMode"));
    assert!(!flags.is_enabled("paymentGateway"));
  }

  #[tokio::test]
  async fn test_remote_failure_keeps_defaults() {
    let mock = Arc::new(MockTransport::new());
    mock.on(
      Method::Get,
      "config/features",
      Err(ApiError::Network("down".into())),
    );
    let flags = FeatureFlags::new(defaults());

    flags.load_remote(&ApiClient::new(mock)).await;
    assert_eq!(flags.snapshot(), defaults());

    flags.set("analytics", false);
    assert!(!flags.is_enabled("analytics"));
  }
}
