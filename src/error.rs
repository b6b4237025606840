//! Error taxonomy for calls made through the API client.

use serde_json::Value;

/// Result alias used by the transport core and the resource modules.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Failure of a single API call.
///
/// Errors are surfaced to callers exactly as the transport produced them,
/// after any failure-stage side effects have run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
  /// The server answered with a non-2xx status.
  #[error("request failed with status {status}")]
  Status { status: u16, body: Value },
  /// Network unreachable, timeout, connection reset.
  #[error("transport error: {0}")]
  Transport(String),
  /// The response could not be read or decoded.
  #[error("malformed response: {0}")]
  Decode(String),
  /// The request could not be built (e.g. an invalid base URL).
  #[error("invalid request: {0}")]
  InvalidRequest(String),
}

impl ApiError {
  /// HTTP status code carried by the failure, if the server responded at all.
  pub fn status(&self) -> Option<u16> {
    match self {
      ApiError::Status { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// True for 401 responses, which end the local session.
  pub fn is_unauthorized(&self) -> bool {
    self.status() == Some(401)
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      ApiError::Decode(err.to_string())
    } else if err.is_builder() {
      ApiError::InvalidRequest(err.to_string())
    } else {
      ApiError::Transport(err.to_string())
    }
  }
}
