use serde_json::Value;

use super::ResourceFuture;
use crate::client::ApiClient;
use crate::params::QueryParams;

/// Patient verbs.
pub trait PatientAccess: Send + Sync {
  /// `GET /patients`
  fn list(&self, params: QueryParams) -> ResourceFuture;
  /// `GET /patients/{id}`
  fn get(&self, id: String) -> ResourceFuture;
  /// `POST /patients`
  fn create(&self, data: Value) -> ResourceFuture;
  /// `PUT /patients/{id}`
  fn update(&self, id: String, data: Value) -> ResourceFuture;
  /// `DELETE /patients/{id}`
  fn delete(&self, id: String) -> ResourceFuture;
  /// `GET /patients/search`
  fn search(&self, criteria: QueryParams) -> ResourceFuture;
}

#[derive(Debug, Clone)]
pub struct PatientApi {
  client: ApiClient,
}

impl PatientApi {
  pub fn new(client: ApiClient) -> Self {
    Self { client }
  }
}

impl PatientAccess for PatientApi {
  fn list(&self, params: QueryParams) -> ResourceFuture {
    let client = self.client.clone();
    Box::pin(async move { client.get("/patients", Some(&params)).await })
  }

  fn get(&self, id: String) -> ResourceFuture {
    let client = self.client.clone();
    Box::pin(async move { client.get(&format!("/patients/{}", id), None).await })
  }

  fn create(&self, data: Value) -> ResourceFuture {
    let client = self.client.clone();
    Box::pin(async move { client.post("/patients", data).await })
  }

  fn update(&self, id: String, data: Value) -> ResourceFuture {
    let client = self.client.clone();
    Box::pin(async move { client.put(&format!("/patients/{}", id), data).await })
  }

  fn delete(&self, id: String) -> ResourceFuture {
    let client = self.client.clone();
    Box::pin(async move { client.delete(&format!("/patients/{}", id)).await })
  }

  fn search(&self, criteria: QueryParams) -> ResourceFuture {
    let client = self.client.clone();
    Box::pin(async move { client.get("/patients/search", Some(&criteria)).await })
  }
}
