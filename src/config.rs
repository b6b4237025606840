use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::DEFAULT_BASE_URL;

/// Environment variable that overrides the API base URL.
pub const BASE_URL_ENV: &str = "CLINIC_API_URL";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the records API (overridden by `CLINIC_API_URL`)
  pub base_url: Option<String>,
  /// Per-request timeout; none means the HTTP client default
  pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Seconds before a cached read is refetched
  #[serde(default = "default_stale_secs")]
  pub stale_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_secs: default_stale_secs(),
    }
  }
}

fn default_stale_secs() -> u64 {
  300
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// SQLite file holding the session credential
  pub path: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./clinic.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/clinic/config.yaml
  ///
  /// Without any file the defaults apply.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("clinic.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("clinic").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file deserializes to unit, not a mapping.
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Resolve the API base URL.
  ///
  /// Checks CLINIC_API_URL first, then `api.base_url`, then the local
  /// development default. Empty values count as unset.
  pub fn base_url(&self) -> String {
    Self::resolve_base_url(std::env::var(BASE_URL_ENV).ok(), self.api.base_url.as_deref())
  }

  fn resolve_base_url(env: Option<String>, configured: Option<&str>) -> String {
    env
      .filter(|url| !url.trim().is_empty())
      .or_else(|| {
        configured
          .filter(|url| !url.trim().is_empty())
          .map(String::from)
      })
      .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.api.timeout_secs.map(Duration::from_secs)
  }

  pub fn stale_time(&self) -> chrono::Duration {
    let secs = i64::try_from(self.cache.stale_secs).unwrap_or(i64::MAX);
    chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.cache.stale_secs, 300);
    assert_eq!(config.timeout(), None);
    assert_eq!(config.stale_time(), chrono::Duration::minutes(5));
  }

  #[test]
  fn test_parse_yaml() {
    let config = Config::parse(
      "api:\n  base_url: https://records.example.org/api/v1\n  timeout_secs: 15\ncache:\n  stale_secs: 30\nstorage:\n  path: /tmp/clinic.db\n",
    )
    .unwrap();

    assert_eq!(
      config.api.base_url.as_deref(),
      Some("https://records.example.org/api/v1")
    );
    assert_eq!(config.timeout(), Some(Duration::from_secs(15)));
    assert_eq!(config.cache.stale_secs, 30);
    assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/clinic.db")));
  }

  #[test]
  fn test_parse_partial_and_empty() {
    let config = Config::parse("api:\n  timeout_secs: 5\n").unwrap();
    assert_eq!(config.cache.stale_secs, 300);
    assert_eq!(config.api.base_url, None);

    let empty = Config::parse("").unwrap();
    assert_eq!(empty.api.timeout_secs, None);
  }

  #[test]
  fn test_base_url_resolution() {
    assert_eq!(Config::resolve_base_url(None, None), DEFAULT_BASE_URL);
    assert_eq!(
      Config::resolve_base_url(None, Some("http://api.local")),
      "http://api.local"
    );
    assert_eq!(
      Config::resolve_base_url(Some("http://env.local".to_string()), Some("http://api.local")),
      "http://env.local"
    );
    assert_eq!(
      Config::resolve_base_url(Some(String::new()), Some("")),
      DEFAULT_BASE_URL
    );
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    assert!(Config::load(Some(Path::new("/definitely/not/here.yaml"))).is_err());
  }
}
