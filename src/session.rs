//! Session credential held in persisted client storage.

use color_eyre::Result;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::storage::{ClientStorage, MemoryStorage};

/// Storage key the bearer token lives under.
pub const TOKEN_KEY: &str = "token";

type TeardownHook = Box<dyn Fn() + Send + Sync>;

/// Get/set/clear access to the single active session credential.
///
/// Written by login and by the unauthorized handler; read by every
/// outbound request. Clones share storage and teardown hooks.
#[derive(Clone)]
pub struct SessionStore {
  storage: Arc<dyn ClientStorage>,
  on_clear: Arc<Mutex<Vec<TeardownHook>>>,
}

impl SessionStore {
  pub fn new(storage: Arc<dyn ClientStorage>) -> Self {
    Self {
      storage,
      on_clear: Arc::new(Mutex::new(Vec::new())),
    }
  }

  /// A session store that forgets everything on exit.
  pub fn in_memory() -> Self {
    Self::new(Arc::new(MemoryStorage::new()))
  }

  /// The current bearer token. Empty values count as absent.
  pub fn token(&self) -> Result<Option<String>> {
    Ok(
      self
        .storage
        .get(TOKEN_KEY)?
        .filter(|token| !token.is_empty()),
    )
  }

  pub fn set_token(&self, token: &str) -> Result<()> {
    self.storage.set(TOKEN_KEY, token)
  }

  /// Forget the credential, then run every teardown hook.
  ///
  /// Hooks run even when the storage write fails.
  pub fn clear(&self) -> Result<()> {
    let removed = self.storage.remove(TOKEN_KEY);

    let hooks = self.on_clear.lock().unwrap_or_else(|e| e.into_inner());
    debug!(hooks = hooks.len(), "session cleared");
    for hook in hooks.iter() {
      hook();
    }

    removed
  }

  /// Register `hook` to run whenever the session is cleared.
  pub fn on_clear<F>(&self, hook: F)
  where
    F: Fn() + Send + Sync + 'static,
  {
    self
      .on_clear
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(Box::new(hook));
  }
}

impl std::fmt::Debug for SessionStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SessionStore").finish_non_exhaustive()
  }
}
