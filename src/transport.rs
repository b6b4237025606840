//! Raw HTTP execution: request description, response envelope, and the
//! reqwest-backed transport.

use futures::future::BoxFuture;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::error::{ApiError, ApiResult};
use crate::params::QueryParams;

/// An in-flight request, as seen by the outbound stages.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestConfig {
  pub method: Method,
  /// Path relative to the base URL, e.g. `/patients/p-1`.
  pub path: String,
  pub query: Vec<(String, String)>,
  pub headers: HeaderMap,
  pub body: Option<Value>,
}

impl RequestConfig {
  pub fn new(method: Method, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into(),
      query: Vec::new(),
      headers: HeaderMap::new(),
      body: None,
    }
  }

  pub fn get(path: impl Into<String>) -> Self {
    Self::new(Method::GET, path)
  }

  pub fn post(path: impl Into<String>) -> Self {
    Self::new(Method::POST, path)
  }

  pub fn put(path: impl Into<String>) -> Self {
    Self::new(Method::PUT, path)
  }

  pub fn delete(path: impl Into<String>) -> Self {
    Self::new(Method::DELETE, path)
  }

  pub fn with_params(mut self, params: &QueryParams) -> Self {
    self.query = params.to_pairs();
    self
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }
}

/// Transport-level wrapper around a successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
  pub status: u16,
  pub headers: HeaderMap,
  pub data: Value,
}

impl Envelope {
  pub fn new(status: u16, data: Value) -> Self {
    Self {
      status,
      headers: HeaderMap::new(),
      data,
    }
  }
}

/// The HTTP collaborator the client delegates to.
///
/// Implementations resolve with an [`Envelope`] for 2xx responses and fail
/// with [`ApiError::Status`] for everything else.
pub trait HttpSend: Send + Sync {
  fn send(&self, request: RequestConfig) -> BoxFuture<'_, ApiResult<Envelope>>;
}

/// `HttpSend` over a `reqwest::Client` bound to a base URL.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
  http: reqwest::Client,
  base_url: String,
}

impl ReqwestTransport {
  pub fn new(base_url: &str, timeout: Option<Duration>) -> ApiResult<Self> {
    Url::parse(base_url)
      .map_err(|e| ApiError::InvalidRequest(format!("invalid base URL {}: {}", base_url, e)))?;

    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }
    let http = builder.build()?;

    Ok(Self {
      http,
      base_url: base_url.trim_end_matches('/').to_string(),
    })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  /// Concatenate base URL and path so a base path prefix (`/api/v1`) survives.
  fn url_for(&self, path: &str) -> ApiResult<Url> {
    let joined = if path.starts_with('/') {
      format!("{}{}", self.base_url, path)
    } else {
      format!("{}/{}", self.base_url, path)
    };
    Url::parse(&joined).map_err(|e| ApiError::InvalidRequest(format!("{}: {}", joined, e)))
  }

  async fn execute(&self, request: RequestConfig) -> ApiResult<Envelope> {
    let url = self.url_for(&request.path)?;

    let mut builder = self
      .http
      .request(request.method, url)
      .headers(request.headers);
    if !request.query.is_empty() {
      builder = builder.query(&request.query);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder.send().await?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.bytes().await?;
    let data = parse_body(&bytes);

    if status.is_success() {
      Ok(Envelope {
        status: status.as_u16(),
        headers,
        data,
      })
    } else {
      Err(ApiError::Status {
        status: status.as_u16(),
        body: data,
      })
    }
  }
}

impl HttpSend for ReqwestTransport {
  fn send(&self, request: RequestConfig) -> BoxFuture<'_, ApiResult<Envelope>> {
    Box::pin(self.execute(request))
  }
}

/// Empty bodies become `null`, non-JSON bodies are kept as text.
fn parse_body(bytes: &[u8]) -> Value {
  if bytes.iter().all(u8::is_ascii_whitespace) {
    return Value::Null;
  }
  serde_json::from_slice(bytes)
    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
