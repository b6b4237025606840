//! In-memory cache engine that consumes query and mutation descriptors.
//!
//! This module provides a small reference engine:
//! - Serves fresh cached reads by cache key
//! - Shares one in-flight fetch between concurrent readers of the same key
//! - Drops cached reads when a mutation names their resource
//!
//! Nothing is persisted and nothing is retried.

mod engine;
mod traits;

pub use engine::QueryClient;
pub use traits::{CacheResult, CacheSource};
