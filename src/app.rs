//! Wiring of storage, session, client, bindings, and the query cache.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::api::{AppointmentApi, PatientApi};
use crate::bindings::{Bindings, MutationDescriptor, QueryDescriptor};
use crate::cache::QueryClient;
use crate::client::ApiClient;
use crate::config::Config;
use crate::navigation::Navigator;
use crate::session::SessionStore;
use crate::storage::{ClientStorage, SqliteStorage};

/// Fully wired data-access layer
pub struct App {
  session: SessionStore,
  bindings: Bindings,
  queries: QueryClient,
}

impl App {
  /// Build the layer described by `config`, persisting the session in SQLite.
  pub fn new(config: &Config, navigator: Option<Arc<dyn Navigator>>) -> Result<Self> {
    let storage = SqliteStorage::open(config.storage.path.as_deref())?;
    Self::with_storage(config, Arc::new(storage), navigator)
  }

  pub fn with_storage(
    config: &Config,
    storage: Arc<dyn ClientStorage>,
    navigator: Option<Arc<dyn Navigator>>,
  ) -> Result<Self> {
    let session = SessionStore::new(storage);
    let base_url = config.base_url();
    let client = ApiClient::connect(&base_url, config.timeout(), session.clone(), navigator)?;
    info!(base_url = %base_url, "api client ready");

    Ok(Self::from_client(client, session, config))
  }

  pub fn from_client(client: ApiClient, session: SessionStore, config: &Config) -> Self {
    let bindings = Bindings::new(
      Arc::new(PatientApi::new(client.clone())),
      Arc::new(AppointmentApi::new(client)),
    );
    let queries = QueryClient::new().with_stale_time(config.stale_time());

    // Logout and unauthorized responses both end up here.
    let cached = queries.clone();
    session.on_clear(move || cached.clear());

    Self {
      session,
      bindings,
      queries,
    }
  }

  pub fn bindings(&self) -> &Bindings {
    &self.bindings
  }

  pub fn session(&self) -> &SessionStore {
    &self.session
  }

  pub fn login(&self, token: &str) -> Result<()> {
    if token.trim().is_empty() {
      return Err(eyre!("Token must not be empty"));
    }
    self.session.set_token(token.trim())?;
    self.queries.clear();
    Ok(())
  }

  pub fn logout(&self) -> Result<()> {
    self.session.clear()
  }

  /// Run a read through the cache.
  pub async fn read(&self, query: &QueryDescriptor) -> Result<Value> {
    match self.queries.fetch_query(query).await? {
      Some(result) => Ok(result.data),
      None => Err(eyre!("An identifier is required for {}", query.key.resource)),
    }
  }

  /// Run a write through the cache.
  pub async fn write<I>(&self, mutation: &MutationDescriptor<I>, input: I) -> Result<Value> {
    Ok(self.queries.mutate(mutation, input).await?)
  }
}
