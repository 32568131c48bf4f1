//! Keyed cache of ordered record lists.

use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::warn;

use super::session::PersistentSession;
use crate::record::Record;

/// Cache of record lists keyed by collection key, typically the resource
/// endpoint.
///
/// Construction picks the backing: [`CollectionCache::new`] keeps everything
/// in an in-process map, [`CollectionCache::with_session`] delegates every
/// read and write to a [`PersistentSession`] so the persisted blob stays
/// current. The choice is invisible to callers; storage failures degrade to
/// cache misses with a warning instead of surfacing.
pub struct CollectionCache<T: Record> {
  backing: Backing<T>,
}

enum Backing<T: Record> {
  Memory(HashMap<String, Vec<T>>),
  Session(PersistentSession<T>),
}

impl<T: Record> CollectionCache<T> {
  /// In-process cache.
  pub fn new() -> Self {
    Self {
      backing: Backing::Memory(HashMap::new()),
    }
  }

  /// Session-backed cache: every operation goes through the persisted blob.
  pub fn with_session(session: PersistentSession<T>) -> Self {
    Self {
      backing: Backing::Session(session),
    }
  }

  /// The list stored under `key`, if any.
  pub fn get(&self, key: &str) -> Option<Vec<T>> {
    match &self.backing {
      Backing::Memory(entries) => entries.get(key).cloned(),
      Backing::Session(session) => session.get_item(key).unwrap_or_else(|e| {
        warn!("Cache read failed for {}: {}", key, e);
        None
      }),
    }
  }

  /// Store `records` under `key`, replacing any prior list.
  pub fn set(&mut self, key: &str, records: Vec<T>) {
    match &mut self.backing {
      Backing::Memory(entries) => {
        entries.insert(key.to_string(), records);
      }
      Backing::Session(session) => {
        if let Err(e) = session.set_item(key, records) {
          warn!("Cache write failed for {}: {}", key, e);
        }
      }
    }
  }

  /// Remove the list stored under `key`.
  pub fn clear_key(&mut self, key: &str) {
    match &mut self.backing {
      Backing::Memory(entries) => {
        entries.remove(key);
      }
      Backing::Session(session) => {
        if let Err(e) = session.remove_item(key) {
          warn!("Cache removal failed for {}: {}", key, e);
        }
      }
    }
  }

  /// Drop every key.
  pub fn clear(&mut self) {
    match &mut self.backing {
      Backing::Memory(entries) => entries.clear(),
      Backing::Session(session) => {
        if let Err(e) = session.clear() {
          warn!("Cache clear failed: {}", e);
        }
      }
    }
  }

  /// Sort the list under `key` ascending by `field`. Absent keys are a
  /// no-op. Chainable.
  pub fn sort_asc(&mut self, key: &str, field: &str) -> &mut Self {
    self.transform(key, |records| sort_by_field(records, field, true));
    self
  }

  /// Sort the list under `key` descending by `field`. Absent keys are a
  /// no-op. Chainable.
  pub fn sort_desc(&mut self, key: &str, field: &str) -> &mut Self {
    self.transform(key, |records| sort_by_field(records, field, false));
    self
  }

  /// Keep only records under `key` matching `predicate`. Absent keys are a
  /// no-op. Chainable.
  pub fn filter<F>(&mut self, key: &str, predicate: F) -> &mut Self
  where
    F: Fn(&T) -> bool,
  {
    self.transform(key, |records| records.retain(|r| predicate(r)));
    self
  }

  /// Read-modify-write one list in place.
  fn transform<F>(&mut self, key: &str, apply: F)
  where
    F: FnOnce(&mut Vec<T>),
  {
    match &mut self.backing {
      Backing::Memory(entries) => {
        if let Some(records) = entries.get_mut(key) {
          apply(records);
        }
      }
      Backing::Session(session) => match session.get_item(key) {
        Ok(Some(mut records)) => {
          apply(&mut records);
          if let Err(e) = session.set_item(key, records) {
            warn!("Cache write failed for {}: {}", key, e);
          }
        }
        Ok(None) => {}
        Err(e) => warn!("Cache read failed for {}: {}", key, e),
      },
    }
  }
}

impl<T: Record> Default for CollectionCache<T> {
  fn default() -> Self {
    Self::new()
  }
}

/// Stable sort by the JSON projection of one named field.
fn sort_by_field<T: Record>(records: &mut Vec<T>, field: &str, ascending: bool) {
  records.sort_by(|a, b| {
    let ordering = compare_values(&field_value(a, field), &field_value(b, field));
    if ascending {
      ordering
    } else {
      ordering.reverse()
    }
  });
}

fn field_value<T: Record>(record: &T, field: &str) -> Value {
  serde_json::to_value(record)
    .ok()
    .and_then(|v| v.get(field).cloned())
    .unwrap_or(Value::Null)
}

/// Ordering over field projections: numbers numerically, strings
/// lexicographically, bools false-before-true. Mixed or unordered kinds fall
/// back to a fixed rank per kind so the comparison stays total.
fn compare_values(a: &Value, b: &Value) -> Ordering {
  match (a, b) {
    (Value::Number(a), Value::Number(b)) => a
      .as_f64()
      .partial_cmp(&b.as_f64())
      .unwrap_or(Ordering::Equal),
    (Value::String(a), Value::String(b)) => a.cmp(b),
    (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
    (Value::Null, Value::Null) => Ordering::Equal,
    _ => kind_rank(a).cmp(&kind_rank(b)),
  }
}

fn kind_rank(value: &Value) -> u8 {
  match value {
    Value::Null => 0,
    Value::Bool(_) => 1,
    Value::Number(_) => 2,
    Value::String(_) => 3,
    Value::Array(_) => 4,
    Value::Object(_) => 5,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::session::SessionOptions;
  use crate::cache::storage::MemoryStorage;
  use crate::testutil::{user, User};

  fn ids(records: &[User]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
  }

  #[test]
  fn test_set_get_round_trip() {
    let mut cache = CollectionCache::new();
    assert_eq!(cache.get("users"), None);

    cache.set("users", vec![user("1", "ada", 1)]);
    assert_eq!(cache.get("users").unwrap().len(), 1);

    // Replaces, never merges
    cache.set("users", vec![user("2", "bob", 2)]);
    assert_eq!(ids(&cache.get("users").unwrap()), vec!["2"]);
  }

  #[test]
  fn test_clear_key_leaves_others() {
    let mut cache = CollectionCache::new();
    cache.set("users", vec![user("1", "ada", 1)]);
    cache.set("posts", vec![user("2", "bob", 2)]);

    cache.clear_key("users");
    assert_eq!(cache.get("users"), None);
    assert!(cache.get("posts").is_some());

    cache.clear();
    assert_eq!(cache.get("posts"), None);
  }

  #[test]
  fn test_sort_by_numeric_field() {
    let mut cache = CollectionCache::new();
    cache.set(
      "users",
      vec![user("1", "ada", 3), user("2", "bob", 1), user("3", "cy", 2)],
    );

    cache.sort_asc("users", "rank");
    assert_eq!(ids(&cache.get("users").unwrap()), vec!["2", "3", "1"]);

    cache.sort_desc("users", "rank");
    assert_eq!(ids(&cache.get("users").unwrap()), vec!["1", "3", "2"]);
  }

  #[test]
  fn test_sort_by_string_field() {
    let mut cache = CollectionCache::new();
    cache.set(
      "users",
      vec![user("1", "zoe", 1), user("2", "ada", 2), user("3", "mia", 3)],
    );

    cache.sort_asc("users", "name");
    assert_eq!(ids(&cache.get("users").unwrap()), vec!["2", "3", "1"]);
  }

  #[test]
  fn test_sort_missing_field_keeps_order() {
    let mut cache = CollectionCache::new();
    cache.set("users", vec![user("1", "ada", 1), user("2", "bob", 2)]);

    // Every projection is null, stable sort keeps insertion order
    cache.sort_asc("users", "no_such_field");
    assert_eq!(ids(&cache.get("users").unwrap()), vec!["1", "2"]);
  }

  #[test]
  fn test_transforms_on_absent_key_are_noops() {
    let mut cache: CollectionCache<User> = CollectionCache::new();
    cache.sort_asc("ghost", "rank").filter("ghost", |_| false);
    assert_eq!(cache.get("ghost"), None);
  }

  #[test]
  fn test_filter_chains_after_sort() {
    let mut cache = CollectionCache::new();
    cache.set(
      "users",
      vec![user("1", "ada", 3), user("2", "bob", 1), user("3", "cy", 2)],
    );

    cache
      .sort_asc("users", "rank")
      .filter("users", |u| u.rank >= 2);
    assert_eq!(ids(&cache.get("users").unwrap()), vec!["3", "1"]);
  }

  #[test]
  fn test_session_backing_persists_transforms() {
    let session = PersistentSession::with_backend(
      Box::new(MemoryStorage::new()),
      SessionOptions::default(),
    )
    .unwrap();
    let mut cache = CollectionCache::with_session(session);

    cache.set("users", vec![user("1", "ada", 2), user("2", "bob", 1)]);
    cache.sort_asc("users", "rank");
    assert_eq!(ids(&cache.get("users").unwrap()), vec!["2", "1"]);

    cache.clear_key("users");
    assert_eq!(cache.get("users"), None);
  }
}
