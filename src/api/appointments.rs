use serde_json::{json, Value};

use super::ResourceFuture;
use crate::client::ApiClient;
use crate::params::QueryParams;

/// Appointment verbs.
pub trait AppointmentAccess: Send + Sync {
  /// `GET /appointments`
  fn list(&self, params: QueryParams) -> ResourceFuture;
  /// `GET /appointments/{id}`
  fn get(&self, id: String) -> ResourceFuture;
  /// `POST /appointments`
  fn create(&self, data: Value) -> ResourceFuture;
  /// `PUT /appointments/{id}`
  fn update(&self, id: String, data: Value) -> ResourceFuture;
  /// `POST /appointments/{id}/cancel` with `{reason}`
  fn cancel(&self, id: String, reason: String) -> ResourceFuture;
  /// `GET /appointments/patient/{patient_id}/all`
  fn by_patient(&self, patient_id: String) -> ResourceFuture;
}

#[derive(Debug, Clone)]
pub struct AppointmentApi {
  client: ApiClient,
}

impl AppointmentApi {
  pub fn new(client: ApiClient) -> Self {
    Self { client }
  }
}

impl AppointmentAccess for AppointmentApi {
  fn list(&self, params: QueryParams) -> ResourceFuture {
    let client = self.client.clone();
    Box::pin(async move { client.get("/appointments", Some(&params)).await })
  }

  fn get(&self, id: String) -> ResourceFuture {
    let client = self.client.clone();
    Box::pin(async move { client.get(&format!("/appointments/{}", id), None).await })
  }

  fn create(&self, data: Value) -> ResourceFuture {
    let client = self.client.clone();
    Box::pin(async move { client.post("/appointments", data).await })
  }

  fn update(&self, id: String, data: Value) -> ResourceFuture {
    let client = self.client.clone();
    Box::pin(async move { client.put(&format!("/appointments/{}", id), data).await })
  }

  fn cancel(&self, id: String, reason: String) -> ResourceFuture {
    let client = self.client.clone();
    Box::pin(async move {
      client
        .post(
          &format!("/appointments/{}/cancel", id),
          json!({ "reason": reason }),
        )
        .await
    })
  }

  fn by_patient(&self, patient_id: String) -> ResourceFuture {
    let client = self.client.clone();
    Box::pin(async move {
      client
        .get(&format!("/appointments/patient/{}/all", patient_id), None)
        .await
    })
  }
}
