//! Request failures delivered as state, not raised.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One failed request, as surfaced to consumers.
///
/// Failures never unwind through the state machine. Each one is appended to
/// `RequestState::errors` and the caller decides what to show. A `status` of
/// zero marks a client-side failure (connection refused, undecodable
/// response body) rather than an HTTP status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
  pub message: String,
  pub status: u16,
  /// Response body of a non-2xx reply, when one was readable.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub body: Option<Value>,
}

impl ApiError {
  /// Error for a non-2xx HTTP response.
  pub fn http(status: u16, message: impl Into<String>, body: Option<Value>) -> Self {
    Self {
      message: message.into(),
      status,
      body,
    }
  }

  /// Error for a failure before any HTTP status was available.
  pub fn client(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      status: 0,
      body: None,
    }
  }
}

impl std::fmt::Display for ApiError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if self.status == 0 {
      write!(f, "{}", self.message)
    } else {
      write!(f, "{} (status {})", self.message, self.status)
    }
  }
}

impl std::error::Error for ApiError {}
