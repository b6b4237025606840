//! Named middleware stages wrapped around every request.
//!
//! Stages run in a fixed order:
//!
//! - outbound: `attach-auth`
//! - inbound success: `unwrap-envelope`
//! - inbound failure: `handle-unauthorized`
//!
//! Each stage can be exercised on its own.

use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::navigation::{redirect_to_login, Navigator};
use crate::session::SessionStore;
use crate::transport::{Envelope, RequestConfig};

/// Decorates a request before it is sent.
pub trait OutboundStage: Send + Sync {
  fn name(&self) -> &'static str;
  fn on_request(&self, request: &mut RequestConfig);
}

/// Turns a successful envelope into the payload handed to callers.
pub trait SuccessStage: Send + Sync {
  fn name(&self) -> &'static str;
  fn on_success(&self, envelope: Envelope) -> Value;
}

/// Observes a failure. The failure itself is always re-raised unchanged.
pub trait FailureStage: Send + Sync {
  fn name(&self) -> &'static str;
  fn on_failure(&self, error: &ApiError);
}

/// Attaches `Authorization: Bearer <token>` when a credential is stored.
pub struct AttachAuth {
  session: SessionStore,
}

impl AttachAuth {
  pub fn new(session: SessionStore) -> Self {
    Self { session }
  }
}

impl OutboundStage for AttachAuth {
  fn name(&self) -> &'static str {
    "attach-auth"
  }

  fn on_request(&self, request: &mut RequestConfig) {
    let token = match self.session.token() {
      Ok(Some(token)) => token,
      Ok(None) => return,
      Err(e) => {
        warn!(error = %e, "could not read session credential");
        return;
      }
    };

    match HeaderValue::from_str(&format!("Bearer {}", token)) {
      Ok(value) => {
        request.headers.insert(AUTHORIZATION, value);
      }
      Err(e) => warn!(error = %e, "stored credential is not a valid header value"),
    }
  }
}

/// Hands callers the body only, dropping status and headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnwrapEnvelope;

impl SuccessStage for UnwrapEnvelope {
  fn name(&self) -> &'static str {
    "unwrap-envelope"
  }

  fn on_success(&self, envelope: Envelope) -> Value {
    envelope.data
  }
}

/// Tears down the local session on 401 and redirects to login.
pub struct HandleUnauthorized {
  session: SessionStore,
  navigator: Option<Arc<dyn Navigator>>,
}

impl HandleUnauthorized {
  pub fn new(session: SessionStore, navigator: Option<Arc<dyn Navigator>>) -> Self {
    Self { session, navigator }
  }
}

impl FailureStage for HandleUnauthorized {
  fn name(&self) -> &'static str {
    "handle-unauthorized"
  }

  fn on_failure(&self, error: &ApiError) {
    if !error.is_unauthorized() {
      return;
    }

    warn!("request unauthorized, clearing session");
    if let Err(e) = self.session.clear() {
      warn!(error = %e, "could not clear session credential");
    }
    redirect_to_login(self.navigator.as_deref());
  }
}

/// Ordered stages applied by the client around each transport call.
pub struct Pipeline {
  outbound: Vec<Box<dyn OutboundStage>>,
  success: Box<dyn SuccessStage>,
  failure: Vec<Box<dyn FailureStage>>,
}

impl Pipeline {
  /// The standard pipeline: attach-auth, unwrap-envelope, handle-unauthorized.
  pub fn standard(session: SessionStore, navigator: Option<Arc<dyn Navigator>>) -> Self {
    Self {
      outbound: vec![Box::new(AttachAuth::new(session.clone()))],
      success: Box::new(UnwrapEnvelope),
      failure: vec![Box::new(HandleUnauthorized::new(session, navigator))],
    }
  }

  /// Stage names in execution order: outbound, success, failure.
  pub fn stage_names(&self) -> (Vec<&'static str>, &'static str, Vec<&'static str>) {
    (
      self.outbound.iter().map(|s| s.name()).collect(),
      self.success.name(),
      self.failure.iter().map(|s| s.name()).collect(),
    )
  }

  pub fn apply_outbound(&self, request: &mut RequestConfig) {
    for stage in &self.outbound {
      stage.on_request(request);
    }
  }

  pub fn apply_success(&self, envelope: Envelope) -> Value {
    self.success.on_success(envelope)
  }

  /// Run every failure stage, then give the error back untouched.
  pub fn apply_failure(&self, error: ApiError) -> ApiError {
    for stage in &self.failure {
      debug!(stage = stage.name(), "running failure stage");
      stage.on_failure(&error);
    }
    error
  }
}

impl std::fmt::Debug for Pipeline {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let (outbound, success, failure) = self.stage_names();
    f.debug_struct("Pipeline")
      .field("outbound", &outbound)
      .field("success", &success)
      .field("failure", &failure)
      .finish()
  }
}
