use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub websocket: WebSocketConfig,
  pub sync: SyncConfig,
  pub cache: CacheConfig,
  /// Local feature flags; remote flags from `config/features` are merged over these
  pub features: BTreeMap<String, bool>,
  /// Default tracing filter when RUST_LOG is unset
  pub log_level: String,
  /// Custom title for header (defaults to the API host)
  pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub url: String,
  pub auth_url: String,
  pub websocket_url: String,
  pub timeout_secs: u64,
  /// Extra attempts for GET requests that failed transiently
  pub retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
  pub reconnect_interval_secs: u64,
  pub max_reconnect_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Purge cached GETs under the same resource after a successful write
  pub invalidate_on_write: bool,
}

impl Default for Config {
  fn default() -> Self {
    let features = [
      ("notifications", true),
      ("analytics", true),
      ("offlineMode", true),
      ("chatSupport", true),
      ("darkMode", true),
      ("multiLanguage", false),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    Self {
      api: ApiConfig::default(),
      websocket: WebSocketConfig::default(),
      sync: SyncConfig::default(),
      cache: CacheConfig::default(),
      features,
      log_level: "info".to_string(),
      title: None,
    }
  }
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:3000/api".to_string(),
      auth_url: "http://localhost:3000/auth".to_string(),
      websocket_url: "ws://localhost:3000".to_string(),
      timeout_secs: 30,
      retries: 2,
    }
  }
}

impl Default for WebSocketConfig {
  fn default() -> Self {
    Self {
      reconnect_interval_secs: 5,
      max_reconnect_attempts: 5,
    }
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self { interval_secs: 30 }
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      invalidate_on_write: true,
    }
  }
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

impl WebSocketConfig {
  pub fn reconnect_interval(&self) -> Duration {
    Duration::from_secs(self.reconnect_interval_secs)
  }
}

impl SyncConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./lms.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/lms/config.yaml
  ///
  /// Without a file the development defaults are used. Environment
  /// overrides are applied last.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        tracing::debug!("no config file found, using defaults");
        Config::default()
      }
    };

    config.apply_env_overrides(|key| std::env::var(key).ok());
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("lms.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("lms").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("LMS_API_URL") {
      self.api.url = url;
    }
    if let Some(url) = lookup("LMS_AUTH_URL") {
      self.api.auth_url = url;
    }
    if let Some(url) = lookup("LMS_WS_URL") {
      self.api.websocket_url = url;
    }
  }

  /// Header title: configured title or the API host.
  pub fn display_title(&self) -> String {
    if let Some(title) = &self.title {
      return title.clone();
    }
    url::Url::parse(&self.api.url)
      .ok()
      .and_then(|u| u.host_str().map(str::to_string))
      .unwrap_or_else(|| "lms".to_string())
  }

  /// Login credentials from environment variables.
  ///
  /// Reads LMS_EMAIL and LMS_PASSWORD.
  pub fn get_credentials() -> Result<(String, String)> {
    let email = std::env::var("LMS_EMAIL")
      .map_err(|_| eyre!("Email not found. Set LMS_EMAIL or pass --email."))?;
    let password = std::env::var("LMS_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set LMS_PASSWORD environment variable."))?;
    Ok((email, password))
  }
}

/// Directory for the storage database and log files.
pub fn data_dir() -> Result<PathBuf> {
  dirs::data_dir()
    .map(|d| d.join("lms"))
    .ok_or_else(|| eyre!("Could not determine data directory"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_without_file() {
    let config = Config::default();
    assert_eq!(config.api.url, "http://localhost:3000/api");
    assert_eq!(config.api.timeout(), Duration::from_secs(30));
    assert_eq!(config.api.retries, 2);
    assert_eq!(config.websocket.max_reconnect_attempts, 5);
    assert_eq!(config.sync.interval(), Duration::from_secs(30));
    assert!(config.cache.invalidate_on_write);
    assert_eq!(config.features.get("offlineMode"), Some(&true));
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::from_yaml(
      r#"
api:
  url: https://api.example.com/api
websocket:
  max_reconnect_attempts: 3
cache:
  invalidate_on_write: false
features:
  analytics: false
"#,
    )
    .unwrap();

    assert_eq!(config.api.url, "https://api.example.com/api");
    assert_eq!(config.api.auth_url, "http://localhost:3000/auth");
    assert_eq!(config.websocket.max_reconnect_attempts, 3);
    assert_eq!(config.websocket.reconnect_interval(), Duration::from_secs(5));
    assert!(!config.cache.invalidate_on_write);
    assert_eq!(config.features.get("analytics"), Some(&false));
    assert_eq!(config.features.get("notifications"), None);
    assert_eq!(config.display_title(), "api.example.com");
  }

  #[test]
  fn test_env_overrides() {
    let mut config = Config::default();
    config.apply_env_overrides(|key| match key {
      "LMS_WS_URL" => Some("wss://ws.example.com".to_string()),
      _ => None,
    });
    assert_eq!(config.api.websocket_url, "wss://ws.example.com");
    assert_eq!(config.api.url, "http://localhost:3000/api");
  }

  #[test]
  fn test_explicit_missing_path_is_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/lms.yaml"))).is_err());
  }

  #[test]
  fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lms.yaml");
    std::fs::write(&path, "title: Campus\nsync:\n  interval_secs: 10\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.display_title(), "Campus");
    assert_eq!(config.sync.interval_secs, 10);
  }
}
