//! Query descriptors binding a resource to one endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Describes one logical resource query: the endpoint plus the request
/// shaping the transport needs.
///
/// The descriptor is inert data. It is cloned into every spawned operation,
/// so mutating it between operations never affects requests already in
/// flight.
///
/// # Example
///
/// ```ignore
/// let query = ApiQuery::new("users")
///   .with_param("active", "true")
///   .with_header("X-Request-Source", "tui");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiQuery {
  /// Resource endpoint, relative to the transport's base URL (e.g. "users").
  pub endpoint: String,
  /// Query-string parameters.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub params: BTreeMap<String, String>,
  /// Request payload for mutating calls. Operations overwrite this with the
  /// record they were invoked with.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<Value>,
  /// Hint that mutations address a bulk endpoint.
  #[serde(default)]
  pub bulk: bool,
  /// Hint that the resource is a collection rather than a single record.
  #[serde(default)]
  pub many: bool,
  /// Extra headers applied per request.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub headers: BTreeMap<String, String>,
}

impl ApiQuery {
  /// Create a query for the given endpoint with everything else default.
  pub fn new(endpoint: impl Into<String>) -> Self {
    Self {
      endpoint: endpoint.into(),
      ..Self::default()
    }
  }

  /// Add one query-string parameter.
  pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }

  /// Add one request header.
  pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(key.into(), value.into());
    self
  }

  /// Set the request payload.
  pub fn with_data(mut self, data: Value) -> Self {
    self.data = Some(data);
    self
  }

  /// Mark mutations as addressing a bulk endpoint.
  pub fn with_bulk(mut self, bulk: bool) -> Self {
    self.bulk = bulk;
    self
  }

  /// Mark the resource as a collection.
  pub fn with_many(mut self, many: bool) -> Self {
    self.many = many;
    self
  }
}
