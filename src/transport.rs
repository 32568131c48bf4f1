//! Transport contract consumed by resources.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApiError;
use crate::query::ApiQuery;

/// Outcome of one transport call: the decoded JSON body, or the structured
/// error describing why the request failed.
pub type TransportResult = Result<Value, ApiError>;

/// An injected HTTP capability, bound to a query descriptor per call.
///
/// 2xx responses map to `Ok`; everything else, including failures before any
/// status was available, maps to `Err`. Implementations never panic on bad
/// responses.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
  /// Fetch a single record.
  async fn get(&self, query: &ApiQuery) -> TransportResult;

  /// Fetch the full collection.
  async fn get_all(&self, query: &ApiQuery) -> TransportResult;

  /// Create one record from `query.data`.
  async fn post(&self, query: &ApiQuery) -> TransportResult;

  /// Create many records from a `query.data` array.
  async fn post_many(&self, query: &ApiQuery) -> TransportResult;

  /// Replace one record from `query.data`.
  async fn put(&self, query: &ApiQuery) -> TransportResult;

  /// Replace many records from a `query.data` array.
  async fn put_many(&self, query: &ApiQuery) -> TransportResult;

  /// Delete the record identified by `query.data`.
  async fn delete(&self, query: &ApiQuery) -> TransportResult;

  /// Delete the records identified by a `query.data` array.
  async fn delete_many(&self, query: &ApiQuery) -> TransportResult;
}
