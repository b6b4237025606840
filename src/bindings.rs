//! Declarative bindings from UI data needs to cache-engine descriptors.
//!
//! A read need becomes a [`QueryDescriptor`] (cache key + fetch function +
//! enabled flag), a write need becomes a [`MutationDescriptor`]. Bindings
//! never touch the network themselves; the cache engine decides when to run
//! the functions they carry.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::api::{AppointmentAccess, PatientAccess};
use crate::error::ApiResult;
use crate::params::QueryParams;

/// Identity of a cached read: resource name, optional id, optional params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
  pub resource: String,
  pub id: Option<String>,
  pub params: Option<QueryParams>,
}

impl CacheKey {
  pub fn new(resource: impl Into<String>) -> Self {
    Self {
      resource: resource.into(),
      id: None,
      params: None,
    }
  }

  pub fn with_id(mut self, id: impl Into<String>) -> Self {
    self.id = Some(id.into());
    self
  }

  pub fn with_params(mut self, params: QueryParams) -> Self {
    self.params = Some(params);
    self
  }

  /// Stable, fixed-length identity for map lookups and logs.
  pub fn cache_hash(&self) -> String {
    // Each component is tagged so `id = None` and `id = ""` stay distinct.
    let input = format!(
      "{}\u{1f}{}\u{1f}{}",
      self.resource,
      self
        .id
        .as_deref()
        .map(|id| format!("i:{}", id))
        .unwrap_or_default(),
      self
        .params
        .as_ref()
        .map(|p| format!("p:{}", p.canonical()))
        .unwrap_or_default(),
    );

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  pub fn description(&self) -> String {
    match (&self.id, &self.params) {
      (Some(id), _) => format!("{} {}", self.resource, id),
      (None, Some(params)) if !params.is_empty() => {
        format!("{} {}", self.resource, params.canonical())
      }
      _ => self.resource.clone(),
    }
  }
}

type FetchFn = Arc<dyn Fn() -> BoxFuture<'static, ApiResult<Value>> + Send + Sync>;
type ExecuteFn<I> = Arc<dyn Fn(I) -> BoxFuture<'static, ApiResult<Value>> + Send + Sync>;

/// A read, ready for the cache engine.
#[derive(Clone)]
pub struct QueryDescriptor {
  pub key: CacheKey,
  enabled: bool,
  fetch: FetchFn,
}

impl QueryDescriptor {
  pub fn new<F>(key: CacheKey, fetch: F) -> Self
  where
    F: Fn() -> BoxFuture<'static, ApiResult<Value>> + Send + Sync + 'static,
  {
    Self {
      key,
      enabled: true,
      fetch: Arc::new(fetch),
    }
  }

  /// Gate the descriptor on `condition`. Once disabled it stays disabled.
  pub fn enabled_if(mut self, condition: bool) -> Self {
    self.enabled &= condition;
    self
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  /// Run the fetch function, or `None` without invoking it when disabled.
  pub fn fetch(&self) -> Option<BoxFuture<'static, ApiResult<Value>>> {
    if self.enabled {
      Some((self.fetch)())
    } else {
      None
    }
  }
}

impl std::fmt::Debug for QueryDescriptor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryDescriptor")
      .field("key", &self.key)
      .field("enabled", &self.enabled)
      .finish_non_exhaustive()
  }
}

/// A write, ready for the cache engine.
///
/// `invalidates` names the resources whose cached reads the engine should
/// drop after a successful run.
pub struct MutationDescriptor<I> {
  pub invalidates: Vec<&'static str>,
  execute: ExecuteFn<I>,
}

impl<I> MutationDescriptor<I> {
  pub fn new<F>(execute: F) -> Self
  where
    F: Fn(I) -> BoxFuture<'static, ApiResult<Value>> + Send + Sync + 'static,
  {
    Self {
      invalidates: Vec::new(),
      execute: Arc::new(execute),
    }
  }

  pub fn invalidates(mut self, resources: &[&'static str]) -> Self {
    self.invalidates = resources.to_vec();
    self
  }

  pub fn execute(&self, input: I) -> BoxFuture<'static, ApiResult<Value>> {
    (self.execute)(input)
  }
}

impl<I> Clone for MutationDescriptor<I> {
  fn clone(&self) -> Self {
    Self {
      invalidates: self.invalidates.clone(),
      execute: Arc::clone(&self.execute),
    }
  }
}

impl<I> std::fmt::Debug for MutationDescriptor<I> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MutationDescriptor")
      .field("invalidates", &self.invalidates)
      .finish_non_exhaustive()
  }
}

/// Input of an update mutation. Id and data reach the resource call as two
/// separate arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateInput {
  pub id: String,
  pub data: Value,
}

/// Input of the cancel-appointment mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelInput {
  pub id: String,
  pub reason: String,
}

/// Cache key resource names.
pub mod resources {
  pub const PATIENTS: &str = "patients";
  pub const PATIENT: &str = "patient";
  pub const PATIENT_SEARCH: &str = "patient-search";
  pub const APPOINTMENTS: &str = "appointments";
  pub const APPOINTMENT: &str = "appointment";
  pub const PATIENT_APPOINTMENTS: &str = "patient-appointments";
}

use resources::*;

/// Factory for every UI data need.
#[derive(Clone)]
pub struct Bindings {
  patients: Arc<dyn PatientAccess>,
  appointments: Arc<dyn AppointmentAccess>,
}

impl Bindings {
  pub fn new(patients: Arc<dyn PatientAccess>, appointments: Arc<dyn AppointmentAccess>) -> Self {
    Self {
      patients,
      appointments,
    }
  }

  // ==========================================================================
  // Reads
  // ==========================================================================

  pub fn patients(&self, params: QueryParams) -> QueryDescriptor {
    let api = Arc::clone(&self.patients);
    let key = CacheKey::new(PATIENTS).with_params(params.clone());
    QueryDescriptor::new(key, move || api.list(params.clone()))
  }

  /// Disabled when `id` is empty.
  pub fn patient(&self, id: &str) -> QueryDescriptor {
    let api = Arc::clone(&self.patients);
    let owned = id.to_string();
    QueryDescriptor::new(CacheKey::new(PATIENT).with_id(id), move || {
      api.get(owned.clone())
    })
    .enabled_if(!id.is_empty())
  }

  pub fn patient_search(&self, criteria: QueryParams) -> QueryDescriptor {
    let api = Arc::clone(&self.patients);
    let key = CacheKey::new(PATIENT_SEARCH).with_params(criteria.clone());
    QueryDescriptor::new(key, move || api.search(criteria.clone()))
  }

  pub fn appointments(&self, params: QueryParams) -> QueryDescriptor {
    let api = Arc::clone(&self.appointments);
    let key = CacheKey::new(APPOINTMENTS).with_params(params.clone());
    QueryDescriptor::new(key, move || api.list(params.clone()))
  }

  /// Disabled when `id` is empty.
  pub fn appointment(&self, id: &str) -> QueryDescriptor {
    let api = Arc::clone(&self.appointments);
    let owned = id.to_string();
    QueryDescriptor::new(CacheKey::new(APPOINTMENT).with_id(id), move || {
      api.get(owned.clone())
    })
    .enabled_if(!id.is_empty())
  }

  /// Disabled when `patient_id` is empty.
  pub fn patient_appointments(&self, patient_id: &str) -> QueryDescriptor {
    let api = Arc::clone(&self.appointments);
    let owned = patient_id.to_string();
    QueryDescriptor::new(
      CacheKey::new(PATIENT_APPOINTMENTS).with_id(patient_id),
      move || api.by_patient(owned.clone()),
    )
    .enabled_if(!patient_id.is_empty())
  }

  // ==========================================================================
  // Writes
  // ==========================================================================

  pub fn create_patient(&self) -> MutationDescriptor<Value> {
    let api = Arc::clone(&self.patients);
    MutationDescriptor::new(move |data: Value| api.create(data))
      .invalidates(&[PATIENTS, PATIENT_SEARCH])
  }

  pub fn update_patient(&self) -> MutationDescriptor<UpdateInput> {
    let api = Arc::clone(&self.patients);
    MutationDescriptor::new(move |input: UpdateInput| api.update(input.id, input.data))
      .invalidates(&[PATIENTS, PATIENT, PATIENT_SEARCH])
  }

  pub fn delete_patient(&self) -> MutationDescriptor<String> {
    let api = Arc::clone(&self.patients);
    MutationDescriptor::new(move |id: String| api.delete(id))
      .invalidates(&[PATIENTS, PATIENT, PATIENT_SEARCH, PATIENT_APPOINTMENTS])
  }

  pub fn create_appointment(&self) -> MutationDescriptor<Value> {
    let api = Arc::clone(&self.appointments);
    MutationDescriptor::new(move |data: Value| api.create(data))
      .invalidates(&[APPOINTMENTS, PATIENT_APPOINTMENTS])
  }

  pub fn update_appointment(&self) -> MutationDescriptor<UpdateInput> {
    let api = Arc::clone(&self.appointments);
    MutationDescriptor::new(move |input: UpdateInput| api.update(input.id, input.data))
      .invalidates(&[APPOINTMENTS, APPOINTMENT, PATIENT_APPOINTMENTS])
  }

  pub fn cancel_appointment(&self) -> MutationDescriptor<CancelInput> {
    let api = Arc::clone(&self.appointments);
    MutationDescriptor::new(move |input: CancelInput| api.cancel(input.id, input.reason))
      .invalidates(&[APPOINTMENTS, APPOINTMENT, PATIENT_APPOINTMENTS])
  }
}
