//! Persisted client storage: a small synchronous key-value surface.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Trait for client storage backends.
pub trait ClientStorage: Send + Sync {
  /// Read the value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<()>;
}

/// Storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl ClientStorage for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(values.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.remove(key);
    Ok(())
  }
}

/// SQLite-backed client storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the storage database at `path`, or at the default
  /// location when `path` is `None`.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open storage at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a throwaway in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory storage: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(STORAGE_SCHEMA)
      .map_err(|e| eyre!("Failed to run storage migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("clinic").join("client.db"))
  }
}

const STORAGE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS client_storage (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl ClientStorage for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM client_storage WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read storage key {}: {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO client_storage (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write storage key {}: {}", key, e))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM client_storage WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove storage key {}: {}", key, e))?;

    Ok(())
  }
}
