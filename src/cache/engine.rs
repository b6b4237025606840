//! Query client that orchestrates cached reads and mutations.

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, trace};

use super::traits::CacheResult;
use crate::bindings::{CacheKey, MutationDescriptor, QueryDescriptor};
use crate::error::ApiResult;

type SharedFetch = Shared<BoxFuture<'static, ApiResult<Value>>>;

#[derive(Debug, Clone)]
struct CachedEntry {
  key: CacheKey,
  data: Value,
  cached_at: DateTime<Utc>,
}

/// A fetch some reader started and nobody has settled yet.
struct InFlight {
  id: u64,
  resource: String,
  fetch: SharedFetch,
}

/// State shared between the client and the fetches it starts.
///
/// Lock order is `in_flight` then `entries`.
#[derive(Default)]
struct CacheState {
  entries: Mutex<HashMap<String, CachedEntry>>,
  in_flight: Mutex<HashMap<String, InFlight>>,
  next_fetch: AtomicU64,
}

impl CacheState {
  fn entries(&self) -> MutexGuard<'_, HashMap<String, CachedEntry>> {
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn in_flight(&self) -> MutexGuard<'_, HashMap<String, InFlight>> {
    self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Record the outcome of fetch `id`.
  ///
  /// A fetch whose registration was dropped by `invalidate` or `clear` while
  /// it ran is not stored.
  fn settle(&self, hash: &str, id: u64, key: &CacheKey, result: &ApiResult<Value>) {
    let mut in_flight = self.in_flight();
    if in_flight.get(hash).map(|pending| pending.id) != Some(id) {
      trace!(key = %key.description(), "fetch superseded, not caching");
      return;
    }
    in_flight.remove(hash);

    if let Ok(data) = result {
      self.entries().insert(
        hash.to_string(),
        CachedEntry {
          key: key.clone(),
          data: data.clone(),
          cached_at: Utc::now(),
        },
      );
    }
  }
}

/// Cache engine keyed by [`CacheKey::cache_hash`].
///
/// Clones share the same cache.
#[derive(Clone)]
pub struct QueryClient {
  state: Arc<CacheState>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl Default for QueryClient {
  fn default() -> Self {
    Self::new()
  }
}

impl QueryClient {
  pub fn new() -> Self {
    Self {
      state: Arc::new(CacheState::default()),
      stale_time: Duration::minutes(5),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  fn is_stale(&self, cached_at: DateTime<Utc>) -> bool {
    Utc::now() - cached_at >= self.stale_time
  }

  /// Run a read descriptor with cache-first strategy.
  ///
  /// 1. Disabled descriptor: `Ok(None)`, fetch function not invoked
  /// 2. Fresh cache entry: returned as-is
  /// 3. Fetch already running for this key: wait on it
  /// 4. Otherwise fetch, and cache the result on success
  ///
  /// The fetch settles itself when it completes, whichever reader drives it,
  /// so dropping any reader early leaves the cache consistent. Failures are
  /// not cached and are returned unchanged.
  pub async fn fetch_query(
    &self,
    descriptor: &QueryDescriptor,
  ) -> ApiResult<Option<CacheResult<Value>>> {
    if !descriptor.is_enabled() {
      trace!(key = %descriptor.key.description(), "query disabled");
      return Ok(None);
    }

    let hash = descriptor.key.cache_hash();

    if let Some(entry) = self.fresh_entry(&hash) {
      trace!(key = %entry.key.description(), "cache hit");
      return Ok(Some(CacheResult::from_cache(entry.data, entry.cached_at)));
    }

    let fetch = {
      let mut in_flight = self.state.in_flight();
      match in_flight.get(&hash) {
        Some(pending) => {
          trace!(key = %descriptor.key.description(), "joining in-flight fetch");
          pending.fetch.clone()
        }
        None => {
          let Some(request) = descriptor.fetch() else {
            return Ok(None);
          };
          debug!(key = %descriptor.key.description(), "cache miss, fetching");

          let id = self.state.next_fetch.fetch_add(1, Ordering::Relaxed);
          let state: Weak<CacheState> = Arc::downgrade(&self.state);
          let key = descriptor.key.clone();
          let settle_hash = hash.clone();
          let shared = async move {
            let result = request.await;
            if let Some(state) = state.upgrade() {
              state.settle(&settle_hash, id, &key, &result);
            }
            result
          }
          .boxed()
          .shared();

          in_flight.insert(
            hash,
            InFlight {
              id,
              resource: descriptor.key.resource.clone(),
              fetch: shared.clone(),
            },
          );
          shared
        }
      }
    };

    fetch
      .await
      .map(|data| Some(CacheResult::from_network(data)))
  }

  fn fresh_entry(&self, hash: &str) -> Option<CachedEntry> {
    self
      .state
      .entries()
      .get(hash)
      .filter(|entry| !self.is_stale(entry.cached_at))
      .cloned()
  }

  /// Cached data for `key`, fresh or not.
  pub fn cached(&self, key: &CacheKey) -> Option<Value> {
    self
      .state
      .entries()
      .get(&key.cache_hash())
      .map(|entry| entry.data.clone())
  }

  /// Number of fetches currently registered as running.
  pub fn in_flight_count(&self) -> usize {
    self.state.in_flight().len()
  }

  /// Run a mutation, then drop cached reads of the resources it names.
  pub async fn mutate<I>(&self, descriptor: &MutationDescriptor<I>, input: I) -> ApiResult<Value> {
    let data = descriptor.execute(input).await?;
    for resource in &descriptor.invalidates {
      self.invalidate(resource);
    }
    Ok(data)
  }

  /// Drop every cached read of `resource`.
  ///
  /// Fetches of `resource` still running are detached: their readers get
  /// the result, but it is not stored, and the next read starts over.
  pub fn invalidate(&self, resource: &str) {
    let mut in_flight = self.state.in_flight();
    let mut entries = self.state.entries();

    let pending = in_flight.len();
    in_flight.retain(|_, fetch| fetch.resource != resource);
    let before = entries.len();
    entries.retain(|_, entry| entry.key.resource != resource);

    debug!(
      resource,
      dropped = before - entries.len(),
      detached = pending - in_flight.len(),
      "invalidated"
    );
  }

  pub fn clear(&self) {
    let mut in_flight = self.state.in_flight();
    in_flight.clear();
    self.state.entries().clear();
  }
}

impl std::fmt::Debug for QueryClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryClient")
      .field("stale_time", &self.stale_time)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bindings::testing::{bindings, FakeAccess};
  use crate::bindings::UpdateInput;
  use crate::cache::CacheSource;
  use crate::error::ApiError;
  use crate::params::QueryParams;
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  fn counting_query(key: CacheKey, counter: Arc<AtomicU32>) -> QueryDescriptor {
    QueryDescriptor::new(key, move || {
      let counter = counter.clone();
      Box::pin(async move {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        Ok::<_, ApiError>(json!(counter.fetch_add(1, Ordering::SeqCst)))
      })
    })
  }

  #[tokio::test]
  async fn test_second_read_served_from_cache() {
    let client = QueryClient::new();
    let counter = Arc::new(AtomicU32::new(0));
    let query = counting_query(CacheKey::new("patients"), counter.clone());

    let first = client.fetch_query(&query).await.unwrap().unwrap();
    assert_eq!(first.source, CacheSource::Network);

    let second = client.fetch_query(&query).await.unwrap().unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.data, json!(0));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_disabled_query_never_fetches() {
    let client = QueryClient::new();
    let counter = Arc::new(AtomicU32::new(0));
    let query = counting_query(CacheKey::new("patient").with_id(""), counter.clone()).enabled_if(false);

    assert_eq!(client.fetch_query(&query).await.unwrap(), None);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_concurrent_reads_share_one_fetch() {
    let client = QueryClient::new();
    let counter = Arc::new(AtomicU32::new(0));
    let a = counting_query(CacheKey::new("patients"), counter.clone());
    let b = counting_query(CacheKey::new("patients"), counter.clone());

    let (ra, rb) = tokio::join!(client.fetch_query(&a), client.fetch_query(&b));

    assert_eq!(ra.unwrap().unwrap().data, json!(0));
    assert_eq!(rb.unwrap().unwrap().data, json!(0));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_distinct_keys_fetch_separately() {
    let client = QueryClient::new();
    let counter = Arc::new(AtomicU32::new(0));
    let a = counting_query(
      CacheKey::new("patients").with_params(QueryParams::new().with("page", 1)),
      counter.clone(),
    );
    let b = counting_query(
      CacheKey::new("patients").with_params(QueryParams::new().with("page", 2)),
      counter.clone(),
    );

    client.fetch_query(&a).await.unwrap();
    client.fetch_query(&b).await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_stale_entries_are_refetched() {
    let client = QueryClient::new().with_stale_time(Duration::zero());
    let counter = Arc::new(AtomicU32::new(0));
    let query = counting_query(CacheKey::new("patients"), counter.clone());

    client.fetch_query(&query).await.unwrap();
    let second = client.fetch_query(&query).await.unwrap().unwrap();

    assert_eq!(second.source, CacheSource::Network);
    assert_eq!(second.data, json!(1));
  }

  #[tokio::test]
  async fn test_failures_are_not_cached() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();
    let query = QueryDescriptor::new(CacheKey::new("patients"), move || {
      calls_clone.fetch_add(1, Ordering::SeqCst);
      Box::pin(async {
        Err::<Value, _>(ApiError::Status {
          status: 401,
          body: Value::Null,
        })
      })
    });

    let err = client.fetch_query(&query).await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(client.fetch_query(&query).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(client.cached(&CacheKey::new("patients")), None);
  }

  #[tokio::test]
  async fn test_invalidate_drops_only_named_resource() {
    let client = QueryClient::new();
    let counter = Arc::new(AtomicU32::new(0));
    let patients = counting_query(CacheKey::new("patients"), counter.clone());
    let appointments = counting_query(CacheKey::new("appointments"), counter.clone());

    client.fetch_query(&patients).await.unwrap();
    client.fetch_query(&appointments).await.unwrap();

    client.invalidate("patients");

    assert_eq!(client.cached(&CacheKey::new("patients")), None);
    assert!(client.cached(&CacheKey::new("appointments")).is_some());
  }

  #[tokio::test]
  async fn test_mutation_invalidates_named_resources() {
    let patients = FakeAccess::responding(json!({"id": "p-1"}));
    let appointments = FakeAccess::responding(json!([]));
    let b = bindings(&patients, &appointments);
    let client = QueryClient::new();

    client.fetch_query(&b.patient("p-1")).await.unwrap();
    client
      .fetch_query(&b.appointments(QueryParams::new()))
      .await
      .unwrap();

    client
      .mutate(
        &b.update_patient(),
        UpdateInput {
          id: "p-1".to_string(),
          data: json!({"name": "Updated"}),
        },
      )
      .await
      .unwrap();

    assert_eq!(client.cached(&b.patient("p-1").key), None);
    assert!(client
      .cached(&b.appointments(QueryParams::new()).key)
      .is_some());
  }

  #[tokio::test]
  async fn test_clear() {
    let client = QueryClient::new();
    let counter = Arc::new(AtomicU32::new(0));
    let query = counting_query(CacheKey::new("patients"), counter.clone());

    client.fetch_query(&query).await.unwrap();
    client.clear();
    client.fetch_query(&query).await.unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  fn versioned_query(
    key: CacheKey,
    version: Arc<AtomicU32>,
    calls: Arc<AtomicU32>,
    delay_ms: u64,
  ) -> QueryDescriptor {
    QueryDescriptor::new(key, move || {
      let version = version.clone();
      let calls = calls.clone();
      Box::pin(async move {
        let seen = version.load(Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
          return Err(ApiError::Status {
            status: 500,
            body: Value::Null,
          });
        }
        Ok(json!(seen))
      })
    })
  }

  #[tokio::test]
  async fn test_abandoned_fetch_is_settled_by_next_reader() {
    let client = QueryClient::new();
    let version = Arc::new(AtomicU32::new(0));
    let calls = Arc::new(AtomicU32::new(0));
    let query = versioned_query(CacheKey::new("patients"), version, calls.clone(), 20);

    let abandoned = tokio::time::timeout(
      std::time::Duration::from_millis(1),
      client.fetch_query(&query),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(client.in_flight_count(), 1);

    // Joins the running fetch, which fails; the failure is not kept.
    assert!(client.fetch_query(&query).await.is_err());
    assert_eq!(client.in_flight_count(), 0);

    let next = client.fetch_query(&query).await.unwrap().unwrap();
    assert_eq!(next.source, CacheSource::Network);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_clear_and_invalidate_detach_abandoned_fetch() {
    let client = QueryClient::new();
    let counter = Arc::new(AtomicU32::new(0));
    let query = counting_query(CacheKey::new("patients"), counter.clone());
    let abandon = || tokio::time::timeout(std::time::Duration::from_millis(1), client.fetch_query(&query));

    assert!(abandon().await.is_err());
    client.invalidate("patients");
    assert_eq!(client.in_flight_count(), 0);

    let first = client.fetch_query(&query).await.unwrap().unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.data, json!(0));

    client.clear();
    assert!(abandon().await.is_err());
    client.clear();
    assert_eq!(client.in_flight_count(), 0);

    let second = client.fetch_query(&query).await.unwrap().unwrap();
    assert_eq!(second.source, CacheSource::Network);
    assert_eq!(second.data, json!(1));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_mutation_during_read_discards_old_result() {
    let client = QueryClient::new();
    let version = Arc::new(AtomicU32::new(0));
    let calls = Arc::new(AtomicU32::new(1));
    let query = versioned_query(CacheKey::new("patients"), version.clone(), calls, 30);

    let bump = version.clone();
    let mutation = MutationDescriptor::new(move |_: ()| {
      let bump = bump.clone();
      Box::pin(async move {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        Ok::<_, ApiError>(json!(bump.fetch_add(1, Ordering::SeqCst) + 1))
      })
    })
    .invalidates(&["patients"]);

    let (read, written) = tokio::join!(client.fetch_query(&query), client.mutate(&mutation, ()));
    assert_eq!(read.unwrap().unwrap().data, json!(0));
    assert_eq!(written.unwrap(), json!(1));
    assert_eq!(client.cached(&CacheKey::new("patients")), None);

    let after = client.fetch_query(&query).await.unwrap().unwrap();
    assert_eq!(after.source, CacheSource::Network);
    assert_eq!(after.data, json!(1));
  }
}
