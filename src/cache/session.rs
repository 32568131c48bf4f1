//! Persistent session: one serialized blob holding keyed record lists.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

use super::storage::{SqliteStorage, StorageBackend, StorageScope};
use crate::record::Record;

/// Default storage key the persisted blob lives under.
pub const DEFAULT_STORAGE_KEY: &str = "restq.cache.v1";

/// Options controlling how a session binds to persistent storage.
#[derive(Debug, Clone)]
pub struct SessionOptions {
  /// Adopt an existing persisted blob (true) or discard it at construction
  /// (false).
  pub parse_saved: bool,
  /// Storage lifetime used when the session builds its own backend.
  pub scope: StorageScope,
  /// Storage key for the whole blob. Configurable so independent
  /// applications, or caches of different record types, never collide in one
  /// store.
  pub storage_key: String,
}

impl Default for SessionOptions {
  fn default() -> Self {
    Self {
      parse_saved: true,
      scope: StorageScope::Session,
      storage_key: DEFAULT_STORAGE_KEY.to_string(),
    }
  }
}

impl SessionOptions {
  pub fn with_parse_saved(mut self, parse_saved: bool) -> Self {
    self.parse_saved = parse_saved;
    self
  }

  pub fn with_scope(mut self, scope: StorageScope) -> Self {
    self.scope = scope;
    self
  }

  pub fn with_storage_key(mut self, storage_key: impl Into<String>) -> Self {
    self.storage_key = storage_key.into();
    self
  }
}

/// Whole-blob persisted mapping from collection key to record list.
///
/// Every mutation rewrites the full blob under one storage key. An in-memory
/// shadow of the parsed mapping avoids re-parsing on every read and is kept
/// consistent with the blob after every write. A malformed persisted blob is
/// discarded with a warning rather than failing construction.
pub struct PersistentSession<T: Record> {
  storage: Box<dyn StorageBackend>,
  storage_key: String,
  shadow: Mutex<HashMap<String, Vec<T>>>,
}

impl<T: Record> PersistentSession<T> {
  /// Create a session with its own SQLite backend chosen from the options.
  pub fn open(options: SessionOptions) -> Result<Self> {
    let storage = Box::new(SqliteStorage::open(options.scope)?);
    Self::with_backend(storage, options)
  }

  /// Create a session over an injected backend. `options.scope` is ignored
  /// here since the backend is already bound.
  pub fn with_backend(storage: Box<dyn StorageBackend>, options: SessionOptions) -> Result<Self> {
    let session = Self {
      storage,
      storage_key: options.storage_key,
      shadow: Mutex::new(HashMap::new()),
    };

    if options.parse_saved {
      let saved = session.read_blob()?;
      if !saved.is_empty() {
        *session.lock_shadow()? = saved;
      }
    } else {
      // Destructive reset: drop whatever an earlier session persisted.
      session.storage.remove_item(&session.storage_key)?;
    }

    Ok(session)
  }

  /// Records stored under `key`, if any.
  pub fn get_item(&self, key: &str) -> Result<Option<Vec<T>>> {
    let mut shadow = self.lock_shadow()?;
    if shadow.is_empty() {
      *shadow = self.read_blob()?;
    }

    Ok(shadow.get(key).cloned())
  }

  /// Store `records` under `key` and rewrite the blob.
  pub fn set_item(&self, key: &str, records: Vec<T>) -> Result<()> {
    let mut shadow = self.lock_shadow()?;
    if shadow.is_empty() {
      *shadow = self.read_blob()?;
    }

    shadow.insert(key.to_string(), records);
    self.write_blob(&shadow)
  }

  /// Merge several keys at once. Existing keys are kept untouched unless
  /// `override_existing` is set.
  pub fn set_items(&self, items: HashMap<String, Vec<T>>, override_existing: bool) -> Result<()> {
    let mut shadow = self.lock_shadow()?;
    if shadow.is_empty() {
      *shadow = self.read_blob()?;
    }

    for (key, records) in items {
      if override_existing || !shadow.contains_key(&key) {
        shadow.insert(key, records);
      }
    }

    self.write_blob(&shadow)
  }

  /// Remove `key` from the mapping and rewrite the blob.
  pub fn remove_item(&self, key: &str) -> Result<()> {
    let mut shadow = self.lock_shadow()?;
    if shadow.is_empty() {
      *shadow = self.read_blob()?;
    }

    shadow.remove(key);
    self.write_blob(&shadow)
  }

  /// Drop every key and rewrite the now-empty blob.
  pub fn clear(&self) -> Result<()> {
    let mut shadow = self.lock_shadow()?;
    shadow.clear();
    self.write_blob(&shadow)
  }

  fn lock_shadow(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<T>>>> {
    self.shadow.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  fn read_blob(&self) -> Result<HashMap<String, Vec<T>>> {
    let raw = match self.storage.get_item(&self.storage_key)? {
      Some(raw) => raw,
      None => return Ok(HashMap::new()),
    };

    match serde_json::from_str(&raw) {
      Ok(parsed) => Ok(parsed),
      Err(e) => {
        warn!("Discarding malformed blob under {}: {}", self.storage_key, e);
        Ok(HashMap::new())
      }
    }
  }

  fn write_blob(&self, blob: &HashMap<String, Vec<T>>) -> Result<()> {
    let raw =
      serde_json::to_string(blob).map_err(|e| eyre!("Failed to serialize cache blob: {}", e))?;

    self.storage.set_item(&self.storage_key, &raw)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::MemoryStorage;
  use crate::testutil::{user, User};
  use std::sync::Arc;

  #[test]
  fn test_round_trip_through_shared_backend() {
    let store = Arc::new(MemoryStorage::new());

    let first =
      PersistentSession::with_backend(Box::new(Arc::clone(&store)), SessionOptions::default())
        .unwrap();
    first
      .set_item("users", vec![user("1", "ada", 1), user("2", "bob", 2)])
      .unwrap();
    drop(first);

    let second =
      PersistentSession::<User>::with_backend(Box::new(store), SessionOptions::default()).unwrap();
    let restored = second.get_item("users").unwrap().unwrap();
    assert_eq!(restored.len(), 2);
    assert_eq!(restored[0], user("1", "ada", 1));
  }

  #[test]
  fn test_parse_saved_false_discards_blob() {
    let store = Arc::new(MemoryStorage::new());

    let first =
      PersistentSession::with_backend(Box::new(Arc::clone(&store)), SessionOptions::default())
        .unwrap();
    first.set_item("users", vec![user("1", "ada", 1)]).unwrap();
    drop(first);

    let second = PersistentSession::<User>::with_backend(
      Box::new(Arc::clone(&store)),
      SessionOptions::default().with_parse_saved(false),
    )
    .unwrap();

    assert_eq!(second.get_item("users").unwrap(), None);
    assert_eq!(store.get_item(DEFAULT_STORAGE_KEY).unwrap(), None);
  }

  #[test]
  fn test_malformed_blob_is_discarded() {
    let store = MemoryStorage::new();
    store.set_item(DEFAULT_STORAGE_KEY, "not json").unwrap();

    let session = PersistentSession::<User>::with_backend(
      Box::new(store),
      SessionOptions::default(),
    )
    .unwrap();

    assert_eq!(session.get_item("users").unwrap(), None);
  }

  #[test]
  fn test_set_items_respects_override_flag() {
    let session = PersistentSession::with_backend(
      Box::new(MemoryStorage::new()),
      SessionOptions::default(),
    )
    .unwrap();
    session.set_item("users", vec![user("1", "ada", 1)]).unwrap();

    let mut incoming = HashMap::new();
    incoming.insert("users".to_string(), vec![user("9", "zoe", 9)]);
    incoming.insert("posts".to_string(), vec![user("3", "cy", 3)]);

    session.set_items(incoming.clone(), false).unwrap();
    assert_eq!(session.get_item("users").unwrap().unwrap()[0].id, "1");
    assert_eq!(session.get_item("posts").unwrap().unwrap().len(), 1);

    session.set_items(incoming, true).unwrap();
    assert_eq!(session.get_item("users").unwrap().unwrap()[0].id, "9");
  }

  #[test]
  fn test_remove_and_clear() {
    let session = PersistentSession::with_backend(
      Box::new(MemoryStorage::new()),
      SessionOptions::default(),
    )
    .unwrap();
    session.set_item("a", vec![user("1", "ada", 1)]).unwrap();
    session.set_item("b", vec![user("2", "bob", 2)]).unwrap();

    session.remove_item("a").unwrap();
    assert_eq!(session.get_item("a").unwrap(), None);
    assert!(session.get_item("b").unwrap().is_some());

    session.clear().unwrap();
    assert_eq!(session.get_item("b").unwrap(), None);
  }

  #[test]
  fn test_open_with_scoped_options() {
    assert_eq!(
      SessionOptions::default().with_scope(StorageScope::Local).scope,
      StorageScope::Local
    );

    // Session scope backs the blob with an in-memory sqlite database
    let session =
      PersistentSession::open(SessionOptions::default().with_scope(StorageScope::Session))
        .unwrap();
    session.set_item("users", vec![user("1", "ada", 1)]).unwrap();
    assert_eq!(session.get_item("users").unwrap().unwrap().len(), 1);
  }

  #[test]
  fn test_custom_storage_key_isolates_blobs() {
    let store = Arc::new(MemoryStorage::new());

    let a = PersistentSession::with_backend(
      Box::new(Arc::clone(&store)),
      SessionOptions::default().with_storage_key("app-a"),
    )
    .unwrap();
    a.set_item("users", vec![user("1", "ada", 1)]).unwrap();

    let b = PersistentSession::<User>::with_backend(
      Box::new(Arc::clone(&store)),
      SessionOptions::default().with_storage_key("app-b"),
    )
    .unwrap();
    assert_eq!(b.get_item("users").unwrap(), None);
  }
}
