//! Resource access modules: one function per remote verb.
//!
//! Each function performs exactly one [`ApiClient`](crate::client::ApiClient)
//! call and returns the unwrapped payload. No validation happens here.

mod appointments;
mod patients;

pub use appointments::{AppointmentAccess, AppointmentApi};
pub use patients::{PatientAccess, PatientApi};

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::ApiResult;

/// Owned future returned by every resource verb.
pub type ResourceFuture = BoxFuture<'static, ApiResult<Value>>;
