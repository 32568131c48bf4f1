//! Container of collection caches, keyed by endpoint.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

use super::collection::CollectionCache;
use super::session::{PersistentSession, SessionOptions};
use crate::record::Record;

/// Shared handle to one collection cache. Callers hold these, never direct
/// references; the container keeps the owning entry alive.
pub type CacheHandle<T> = Arc<Mutex<CollectionCache<T>>>;

struct CacheEntry {
  handle: Box<dyn Any + Send + Sync>,
  /// Type-erased clear so clearing works without knowing the record type.
  wipe: Box<dyn Fn() + Send + Sync>,
}

/// Lazily materializing map from cache key to collection cache.
///
/// [`CacheContainer::get_cache`] never fails for an unseen key: it creates an
/// empty cache and hands back a shared handle, and every later call with the
/// same key observes the same instance. One container is meant to be shared
/// by all resources of an application so mounts against a warm key skip the
/// network.
#[derive(Default)]
pub struct CacheContainer {
  entries: Mutex<HashMap<String, CacheEntry>>,
  /// When set, lazily created caches are session-backed, each under its own
  /// blob key derived from this template and the cache key.
  persist: Option<SessionOptions>,
}

impl CacheContainer {
  /// Container producing in-process caches.
  pub fn new() -> Self {
    Self::default()
  }

  /// Container producing session-backed caches. Each lazily created cache
  /// gets its own blob under `options.storage_key` suffixed with the cache
  /// key, so collections of different record types never share a blob.
  pub fn with_persistence(options: SessionOptions) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      persist: Some(options),
    }
  }

  /// The cache for `key`, created empty on first request.
  pub fn get_cache<T: Record>(&self, key: &str) -> CacheHandle<T> {
    let mut entries = self.lock_entries();

    if let Some(entry) = entries.get(key) {
      if let Some(handle) = entry.handle.downcast_ref::<CacheHandle<T>>() {
        return Arc::clone(handle);
      }
      // A second record type under one key orphans the first cache; that is
      // a caller bug worth surfacing in logs.
      warn!("Cache key {} reused with a different record type, replacing", key);
    }

    let handle = self.build_cache::<T>(key);

    let wipe = {
      let handle = Arc::clone(&handle);
      Box::new(move || {
        let mut cache = handle.lock().unwrap_or_else(|e| e.into_inner());
        cache.clear();
      }) as Box<dyn Fn() + Send + Sync>
    };

    entries.insert(
      key.to_string(),
      CacheEntry {
        handle: Box::new(Arc::clone(&handle)),
        wipe,
      },
    );

    handle
  }

  /// Empty the cache stored under `key`. Never-requested keys are a no-op.
  pub fn clear_cache(&self, key: &str) {
    let entries = self.lock_entries();
    if let Some(entry) = entries.get(key) {
      (entry.wipe)();
    }
  }

  /// Empty every known cache.
  pub fn clear_all(&self) {
    let entries = self.lock_entries();
    for entry in entries.values() {
      (entry.wipe)();
    }
  }

  fn build_cache<T: Record>(&self, key: &str) -> CacheHandle<T> {
    let cache = match &self.persist {
      Some(template) => {
        let options = template
          .clone()
          .with_storage_key(format!("{}.{}", template.storage_key, key));
        match PersistentSession::open(options) {
          Ok(session) => CollectionCache::with_session(session),
          Err(e) => {
            warn!("Falling back to in-process cache for {}: {}", key, e);
            CollectionCache::new()
          }
        }
      }
      None => CollectionCache::new(),
    };

    Arc::new(Mutex::new(cache))
  }

  fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil::{user, User};

  #[test]
  fn test_get_cache_materializes_lazily() {
    let container = CacheContainer::new();

    let handle = container.get_cache::<User>("users");
    assert_eq!(handle.lock().unwrap().get("users"), None);
  }

  #[test]
  fn test_same_key_returns_same_cache() {
    let container = CacheContainer::new();

    let first = container.get_cache::<User>("users");
    first
      .lock()
      .unwrap()
      .set("users", vec![user("1", "ada", 1)]);

    let second = container.get_cache::<User>("users");
    assert_eq!(second.lock().unwrap().get("users").unwrap().len(), 1);
  }

  #[test]
  fn test_clear_cache_only_touches_one_key() {
    let container = CacheContainer::new();

    let users = container.get_cache::<User>("users");
    users.lock().unwrap().set("users", vec![user("1", "ada", 1)]);
    let posts = container.get_cache::<User>("posts");
    posts.lock().unwrap().set("posts", vec![user("2", "bob", 2)]);

    container.clear_cache("users");
    assert_eq!(users.lock().unwrap().get("users"), None);
    assert!(posts.lock().unwrap().get("posts").is_some());
  }

  #[test]
  fn test_clear_unknown_key_is_noop() {
    let container = CacheContainer::new();
    container.clear_cache("never-requested");
  }

  #[test]
  fn test_clear_all_wipes_every_cache() {
    let container = CacheContainer::new();

    let users = container.get_cache::<User>("users");
    users.lock().unwrap().set("users", vec![user("1", "ada", 1)]);
    let posts = container.get_cache::<User>("posts");
    posts.lock().unwrap().set("posts", vec![user("2", "bob", 2)]);

    container.clear_all();
    assert_eq!(users.lock().unwrap().get("users"), None);
    assert_eq!(posts.lock().unwrap().get("posts"), None);
  }

  #[test]
  fn test_persistent_container_serves_session_backed_cache() {
    let container = CacheContainer::with_persistence(SessionOptions::default());

    let handle = container.get_cache::<User>("users");
    handle
      .lock()
      .unwrap()
      .set("users", vec![user("1", "ada", 1)]);

    let again = container.get_cache::<User>("users");
    assert_eq!(again.lock().unwrap().get("users").unwrap().len(), 1);
  }
}
