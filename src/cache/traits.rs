//! Result types for cache lookups.

use chrono::{DateTime, Utc};

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched by this call (or by a concurrent call for the same key)
  Network,
  /// Served from cache, still fresh
  Cache,
}
