//! Storage backend trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Lifetime scope of persisted cache data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageScope {
  /// Cleared when the process exits (in-memory database).
  #[default]
  Session,
  /// Durable across runs (database file under the platform data dir).
  Local,
}

/// Trait for key-value stores holding serialized cache blobs.
///
/// The contract is deliberately small: whole values are read and written as
/// opaque strings, one per key.
pub trait StorageBackend: Send + Sync {
  /// Read the value stored under `key`, if any.
  fn get_item(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any prior value.
  fn set_item(&self, key: &str, value: &str) -> Result<()>;

  /// Remove the value stored under `key`. Removing a missing key is fine.
  fn remove_item(&self, key: &str) -> Result<()>;
}

// Lets one backend instance serve several sessions.
impl<S: StorageBackend + ?Sized> StorageBackend for Arc<S> {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    (**self).get_item(key)
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    (**self).set_item(key, value)
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    (**self).remove_item(key)
  }
}

/// In-process storage backend. Nothing survives the process; useful in tests
/// and wherever persistence is explicitly unwanted.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl StorageBackend for MemoryStorage {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(entries.get(key).cloned())
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    entries.remove(key);
    Ok(())
  }
}

/// SQLite-based storage backend.
///
/// `Session` scope opens an in-memory database that disappears with the
/// process; `Local` scope opens a durable database under the platform data
/// directory.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open storage for the given scope at the default location.
  pub fn open(scope: StorageScope) -> Result<Self> {
    let conn = match scope {
      StorageScope::Session => Connection::open_in_memory()
        .map_err(|e| eyre!("Failed to open in-memory storage: {}", e))?,
      StorageScope::Local => {
        let path = Self::default_path()?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
          std::fs::create_dir_all(parent)
            .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
        }

        Connection::open(&path)
          .map_err(|e| eyre!("Failed to open storage database at {}: {}", path.display(), e))?
      }
    };

    debug!("Opened sqlite storage ({:?})", scope);

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Open storage at an explicit database path, ignoring scope defaults.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open storage database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("restq").join("storage.db"))
  }

  /// Run database migrations for the key-value table.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORAGE_SCHEMA)
      .map_err(|e| eyre!("Failed to run storage migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the key-value table.
const STORAGE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

impl StorageBackend for SqliteStorage {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let value: Option<String> = conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read key {}: {}", key, e))?;

    Ok(value)
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write key {}: {}", key, e))?;

    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM kv_store WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove key {}: {}", key, e))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn init_tracing() {
    let _ = tracing_subscriber::fmt()
      .with_env_filter("restq=debug")
      .try_init();
  }

  #[test]
  fn test_memory_storage_round_trip() {
    let storage = MemoryStorage::new();

    assert_eq!(storage.get_item("a").unwrap(), None);
    storage.set_item("a", "one").unwrap();
    assert_eq!(storage.get_item("a").unwrap(), Some("one".to_string()));

    storage.set_item("a", "two").unwrap();
    assert_eq!(storage.get_item("a").unwrap(), Some("two".to_string()));

    storage.remove_item("a").unwrap();
    assert_eq!(storage.get_item("a").unwrap(), None);
  }

  #[test]
  fn test_remove_missing_key_is_ok() {
    let storage = MemoryStorage::new();
    storage.remove_item("never-set").unwrap();

    let sqlite = SqliteStorage::open(StorageScope::Session).unwrap();
    sqlite.remove_item("never-set").unwrap();
  }

  #[test]
  fn test_sqlite_session_round_trip() {
    init_tracing();
    let storage = SqliteStorage::open(StorageScope::Session).unwrap();

    storage.set_item("blob", r#"{"users":[]}"#).unwrap();
    assert_eq!(
      storage.get_item("blob").unwrap(),
      Some(r#"{"users":[]}"#.to_string())
    );
  }

  #[test]
  fn test_sqlite_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.db");

    {
      let storage = SqliteStorage::open_at(&path).unwrap();
      storage.set_item("k", "v").unwrap();
    }

    let reopened = SqliteStorage::open_at(&path).unwrap();
    assert_eq!(reopened.get_item("k").unwrap(), Some("v".to_string()));
  }
}
