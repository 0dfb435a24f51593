//! SQLite and in-memory storage backends.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::{KeyValueStore, ObjectStore, StoredObject};

/// SQLite-backed implementation of both store traits.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the storage database at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open (or create) the storage database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open storage at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Non-persistent database, used for `--ephemeral` runs and tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory storage: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(STORAGE_SCHEMA)
      .map_err(|e| eyre!("Failed to run storage migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  pub fn default_path() -> Result<PathBuf> {
    Ok(crate::config::data_dir()?.join("storage.db"))
  }

  fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

const STORAGE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS object_store (
    store TEXT NOT NULL,
    key TEXT NOT NULL,
    data BLOB NOT NULL,
    timestamp TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    version TEXT NOT NULL,
    PRIMARY KEY (store, key)
);
"#;

impl KeyValueStore for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.conn()?;
    conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read key {}: {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write key {}: {}", key, e))?;
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute("DELETE FROM kv_store WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete key {}: {}", key, e))?;
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute("DELETE FROM kv_store", [])
      .map_err(|e| eyre!("Failed to clear key-value store: {}", e))?;
    Ok(())
  }
}

impl ObjectStore for SqliteStorage {
  fn get_object(&self, store: &str, key: &str) -> Result<Option<StoredObject>> {
    let conn = self.conn()?;
    let row: Option<(Vec<u8>, String, String, String)> = conn
      .query_row(
        "SELECT data, timestamp, expires_at, version FROM object_store
         WHERE store = ? AND key = ?",
        params![store, key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read object {}/{}: {}", store, key, e))?;

    let Some((data, timestamp, expires_at, version)) = row else {
      return Ok(None);
    };

    let data =
      serde_json::from_slice(&data).map_err(|e| eyre!("Failed to decode object data: {}", e))?;

    Ok(Some(StoredObject {
      data,
      timestamp: parse_datetime(&timestamp)?,
      expires_at: parse_datetime(&expires_at)?,
      version,
    }))
  }

  fn put_object(&self, store: &str, key: &str, object: &StoredObject) -> Result<()> {
    let data =
      serde_json::to_vec(&object.data).map_err(|e| eyre!("Failed to encode object: {}", e))?;

    let conn = self.conn()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO object_store (store, key, data, timestamp, expires_at, version)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
          store,
          key,
          data,
          object.timestamp.to_rfc3339(),
          object.expires_at.to_rfc3339(),
          object.version
        ],
      )
      .map_err(|e| eyre!("Failed to write object {}/{}: {}", store, key, e))?;
    Ok(())
  }

  fn delete_object(&self, store: &str, key: &str) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute(
        "DELETE FROM object_store WHERE store = ? AND key = ?",
        params![store, key],
      )
      .map_err(|e| eyre!("Failed to delete object {}/{}: {}", store, key, e))?;
    Ok(())
  }

  fn clear_objects(&self, store: &str) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute("DELETE FROM object_store WHERE store = ?", params![store])
      .map_err(|e| eyre!("Failed to clear object store {}: {}", store, e))?;
    Ok(())
  }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

/// Process-local storage. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
  values: Mutex<HashMap<String, String>>,
  objects: Mutex<HashMap<(String, String), StoredObject>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueStore for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let values = self.values.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(values.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut values = self.values.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let mut values = self.values.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.remove(key);
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let mut values = self.values.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.clear();
    Ok(())
  }
}

impl ObjectStore for MemoryStorage {
  fn get_object(&self, store: &str, key: &str) -> Result<Option<StoredObject>> {
    let objects = self.objects.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(objects.get(&(store.to_string(), key.to_string())).cloned())
  }

  fn put_object(&self, store: &str, key: &str, object: &StoredObject) -> Result<()> {
    let mut objects = self.objects.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    objects.insert((store.to_string(), key.to_string()), object.clone());
    Ok(())
  }

  fn delete_object(&self, store: &str, key: &str) -> Result<()> {
    let mut objects = self.objects.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    objects.remove(&(store.to_string(), key.to_string()));
    Ok(())
  }

  fn clear_objects(&self, store: &str) -> Result<()> {
    let mut objects = self.objects.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    objects.retain(|(s, _), _| s != store);
    Ok(())
  }
}
