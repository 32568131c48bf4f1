//! Record contract for cached collections.

use serde::{de::DeserializeOwned, Serialize};

/// Trait for records that can be fetched, cached, and reconciled by identity.
///
/// The id is what create/edit/delete responses are matched against when the
/// collection list is rebuilt after a mutation.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Unique identifier for this record, usually server-assigned.
  fn id(&self) -> &str;
}
