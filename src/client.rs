//! The API client: single point of outbound HTTP execution.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::ApiResult;
use crate::navigation::Navigator;
use crate::params::QueryParams;
use crate::pipeline::Pipeline;
use crate::session::SessionStore;
use crate::transport::{HttpSend, ReqwestTransport, RequestConfig};

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3001/api/v1";

struct ClientInner {
  transport: Arc<dyn HttpSend>,
  pipeline: Pipeline,
  default_headers: HeaderMap,
}

/// HTTP client bound to the records API.
///
/// Every call runs the outbound stages, hits the transport, then runs either
/// the success or the failure stages. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
  inner: Arc<ClientInner>,
}

impl ApiClient {
  /// Client over an arbitrary transport with the standard pipeline.
  pub fn new(
    transport: Arc<dyn HttpSend>,
    session: SessionStore,
    navigator: Option<Arc<dyn Navigator>>,
  ) -> Self {
    Self::with_pipeline(transport, Pipeline::standard(session, navigator))
  }

  pub fn with_pipeline(transport: Arc<dyn HttpSend>, pipeline: Pipeline) -> Self {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Self {
      inner: Arc::new(ClientInner {
        transport,
        pipeline,
        default_headers,
      }),
    }
  }

  /// Client over reqwest, bound to `base_url`.
  pub fn connect(
    base_url: &str,
    timeout: Option<Duration>,
    session: SessionStore,
    navigator: Option<Arc<dyn Navigator>>,
  ) -> ApiResult<Self> {
    let transport = ReqwestTransport::new(base_url, timeout)?;
    Ok(Self::new(Arc::new(transport), session, navigator))
  }

  pub fn pipeline(&self) -> &Pipeline {
    &self.inner.pipeline
  }

  /// Execute one request and return the unwrapped payload.
  pub async fn execute(&self, mut request: RequestConfig) -> ApiResult<Value> {
    for (name, value) in &self.inner.default_headers {
      if !request.headers.contains_key(name) {
        request.headers.insert(name.clone(), value.clone());
      }
    }
    self.inner.pipeline.apply_outbound(&mut request);

    debug!(method = %request.method, path = %request.path, "sending request");

    match self.inner.transport.send(request).await {
      Ok(envelope) => Ok(self.inner.pipeline.apply_success(envelope)),
      Err(error) => {
        debug!(error = %error, "request failed");
        Err(self.inner.pipeline.apply_failure(error))
      }
    }
  }

  pub async fn get(&self, path: &str, params: Option<&QueryParams>) -> ApiResult<Value> {
    let mut request = RequestConfig::get(path);
    if let Some(params) = params {
      request = request.with_params(params);
    }
    self.execute(request).await
  }

  pub async fn post(&self, path: &str, body: Value) -> ApiResult<Value> {
    self.execute(RequestConfig::post(path).with_body(body)).await
  }

  pub async fn put(&self, path: &str, body: Value) -> ApiResult<Value> {
    self.execute(RequestConfig::put(path).with_body(body)).await
  }

  pub async fn delete(&self, path: &str) -> ApiResult<Value> {
    self.execute(RequestConfig::delete(path)).await
  }
}

impl std::fmt::Debug for ApiClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ApiClient")
      .field("pipeline", &self.inner.pipeline)
      .finish_non_exhaustive()
  }
}


#[cfg(test)]
mod tests {
  use super::testing::RecordingTransport;
  use super::*;
  use crate::error::ApiError;
  use crate::transport::Envelope;
  use reqwest::header::AUTHORIZATION;
  use reqwest::Method;
  use serde_json::json;

  #[tokio::test]
  async fn test_sends_json_content_type() {
    let transport = RecordingTransport::echo();
    let client = ApiClient::new(transport.clone(), SessionStore::in_memory(), None);

    client.get("/patients", None).await.unwrap();

    let request = transport.last();
    assert_eq!(request.headers.get(CONTENT_TYPE).unwrap(), "application/json");
    assert!(request.headers.get(AUTHORIZATION).is_none());
  }

  #[tokio::test]
  async fn test_attaches_bearer_token() {
    let transport = RecordingTransport::echo();
    let session = SessionStore::in_memory();
    session.set_token("abc123").unwrap();
    let client = ApiClient::new(transport.clone(), session, None);

    client.delete("/patients/p-1").await.unwrap();

    let request = transport.last();
    assert_eq!(request.method, Method::DELETE);
    assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bearer abc123");
  }

  #[tokio::test]
  async fn test_returns_unwrapped_payload() {
    let transport = RecordingTransport::new(|_| Ok(Envelope::new(201, json!({"ok": true}))));
    let client = ApiClient::new(transport, SessionStore::in_memory(), None);

    let payload = client.post("/patients", json!({"name": "Alice"})).await.unwrap();
    assert_eq!(payload, json!({"ok": true}));
  }

  #[tokio::test]
  async fn test_unauthorized_clears_token_and_propagates() {
    let session = SessionStore::in_memory();
    session.set_token("abc123").unwrap();
    let client = ApiClient::new(RecordingTransport::failing(401), session.clone(), None);

    let err = client.get("/patients", None).await.unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(session.token().unwrap(), None);
  }

  #[tokio::test]
  async fn test_other_failures_keep_token() {
    let session = SessionStore::in_memory();
    session.set_token("abc123").unwrap();
    let client = ApiClient::new(RecordingTransport::failing(500), session.clone(), None);

    let err = client.put("/patients/p-1", json!({})).await.unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 500, .. }));
    assert_eq!(session.token().unwrap().as_deref(), Some("abc123"));
  }

  #[tokio::test]
  async fn test_token_is_read_per_request() {
    let transport = RecordingTransport::echo();
    let session = SessionStore::in_memory();
    let client = ApiClient::new(transport.clone(), session.clone(), None);

    client.get("/patients", None).await.unwrap();
    assert!(transport.last().headers.get(AUTHORIZATION).is_none());

    session.set_token("fresh").unwrap();
    client.get("/patients", None).await.unwrap();
    assert_eq!(transport.last().headers.get(AUTHORIZATION).unwrap(), "Bearer fresh");
  }
}
