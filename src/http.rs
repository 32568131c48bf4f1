//! Default reqwest-backed transport.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde_json::Value;
use url::Url;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::query::ApiQuery;
use crate::transport::{Transport, TransportResult};

/// HTTP transport speaking JSON to a REST-style backend.
///
/// Deliberately a thin pass-through: method, endpoint, params, and an
/// optional JSON body. Status codes 200-299 resolve to `Ok` with the decoded
/// body; everything else resolves to an [`ApiError`] carrying the status and
/// whatever body the server sent. Single-record and collection calls share
/// the same wire shape; the split exists so both stay distinct at the call
/// site and in mocks.
#[derive(Debug, Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  /// Create a transport rooted at the given base URL.
  pub fn new(base_url: &str) -> Result<Self> {
    Self::with_client(reqwest::Client::new(), base_url)
  }

  /// Use a preconfigured client (timeouts, proxies, default headers).
  pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self> {
    // Url::join drops the last path segment without a trailing slash.
    let normalized = if base_url.ends_with('/') {
      base_url.to_string()
    } else {
      format!("{}/", base_url)
    };
    let base_url =
      Url::parse(&normalized).map_err(|e| eyre!("Invalid base URL {}: {}", normalized, e))?;

    Ok(Self { client, base_url })
  }

  fn endpoint_url(&self, query: &ApiQuery) -> Result<Url, ApiError> {
    let mut url = self
      .base_url
      .join(&query.endpoint)
      .map_err(|e| ApiError::client(format!("Invalid endpoint {}: {}", query.endpoint, e)))?;

    if !query.params.is_empty() {
      url.query_pairs_mut().extend_pairs(query.params.iter());
    }

    Ok(url)
  }

  async fn send(&self, method: Method, query: &ApiQuery, body: Option<&Value>) -> TransportResult {
    let url = self.endpoint_url(query)?;

    let mut request = self.client.request(method, url);
    for (name, value) in &query.headers {
      request = request.header(name, value);
    }
    if let Some(body) = body {
      request = request.json(body);
    }

    let response = match request.send().await {
      Ok(response) => response,
      Err(e) => return Err(ApiError::client(format!("Request failed: {}", e))),
    };

    let status = response.status();
    let text = response
      .text()
      .await
      .map_err(|e| ApiError::client(format!("Failed to read response body: {}", e)))?;

    // Empty bodies (204-style responses) decode to null; non-JSON bodies are
    // kept verbatim as a string so error payloads survive.
    let body = if text.is_empty() {
      Value::Null
    } else {
      serde_json::from_str(&text).unwrap_or(Value::String(text))
    };

    if status.is_success() {
      Ok(body)
    } else {
      Err(ApiError::http(
        status.as_u16(),
        status.canonical_reason().unwrap_or("Request failed"),
        Some(body),
      ))
    }
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn get(&self, query: &ApiQuery) -> TransportResult {
    self.send(Method::GET, query, None).await
  }

  async fn get_all(&self, query: &ApiQuery) -> TransportResult {
    self.send(Method::GET, query, None).await
  }

  async fn post(&self, query: &ApiQuery) -> TransportResult {
    self.send(Method::POST, query, query.data.as_ref()).await
  }

  async fn post_many(&self, query: &ApiQuery) -> TransportResult {
    self.send(Method::POST, query, query.data.as_ref()).await
  }

  async fn put(&self, query: &ApiQuery) -> TransportResult {
    self.send(Method::PUT, query, query.data.as_ref()).await
  }

  async fn put_many(&self, query: &ApiQuery) -> TransportResult {
    self.send(Method::PUT, query, query.data.as_ref()).await
  }

  async fn delete(&self, query: &ApiQuery) -> TransportResult {
    self.send(Method::DELETE, query, query.data.as_ref()).await
  }

  async fn delete_many(&self, query: &ApiQuery) -> TransportResult {
    self.send(Method::DELETE, query, query.data.as_ref()).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_endpoint_url_joins_params() {
    let transport = HttpTransport::new("http://localhost:8080/api").unwrap();
    let query = ApiQuery::new("users").with_param("active", "true");

    let url = transport.endpoint_url(&query).unwrap();
    assert_eq!(url.as_str(), "http://localhost:8080/api/users?active=true");
  }

  #[test]
  fn test_base_url_keeps_last_segment() {
    // Without normalization, "api" would be dropped by Url::join.
    let transport = HttpTransport::new("http://localhost/api").unwrap();
    let query = ApiQuery::new("posts");

    let url = transport.endpoint_url(&query).unwrap();
    assert_eq!(url.path(), "/api/posts");
  }

  #[test]
  fn test_invalid_base_url_is_rejected() {
    assert!(HttpTransport::new("not a url").is_err());
  }
}
