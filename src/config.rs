use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://school-managment-web-backend.vercel.app/api";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub polling: PollingConfig,
  pub attendance: AttendanceConfig,
  pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  /// Per-request timeout in seconds
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_API_URL.to_string(),
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
  /// Notification refresh interval in seconds; 0 disables polling
  pub notifications_secs: u64,
}

impl Default for PollingConfig {
  fn default() -> Self {
    Self {
      notifications_secs: 30,
    }
  }
}

impl PollingConfig {
  pub fn notifications_interval(&self) -> Option<Duration> {
    (self.notifications_secs > 0).then(|| Duration::from_secs(self.notifications_secs))
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AttendanceConfig {
  pub page_size: u32,
}

impl Default for AttendanceConfig {
  fn default() -> Self {
    Self { page_size: 10 }
  }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
  /// SQLite file holding the signed-in session (defaults to the data directory)
  pub path: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file, falling back to defaults.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./schoolhub.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/schoolhub/config.yaml
  ///
  /// `SCHOOLHUB_API_URL` overrides the configured base URL.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(url) = std::env::var("SCHOOLHUB_API_URL") {
      config.api.base_url = url;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("schoolhub.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("schoolhub").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid, all-defaults config.
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Bearer token supplied through `SCHOOLHUB_TOKEN`, used instead of the
  /// stored session.
  pub fn token_override() -> Option<String> {
    std::env::var("SCHOOLHUB_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }

  /// Get the login password from environment variables.
  ///
  /// Checks SCHOOLHUB_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("SCHOOLHUB_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set SCHOOLHUB_PASSWORD or pass --password."))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.api.base_url, DEFAULT_API_URL);
    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(
      config.polling.notifications_interval(),
      Some(Duration::from_secs(30))
    );
    assert_eq!(config.attendance.page_size, 10);
    assert_eq!(config.session.path, None);
  }

  #[test]
  fn test_partial_file_keeps_defaults() {
    let config = Config::parse(
      "api:\n  base_url: http://localhost:5000/api\npolling:\n  notifications_secs: 0\n",
    )
    .unwrap();
    assert_eq!(config.api.base_url, "http://localhost:5000/api");
    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(config.polling.notifications_interval(), None);
    assert_eq!(config.attendance.page_size, 10);
  }

  #[test]
  fn test_empty_file_is_default() {
    assert_eq!(Config::parse("").unwrap(), Config::default());
  }

  #[test]
  fn test_explicit_path_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.yaml");
    assert!(Config::load(Some(&missing)).is_err());
  }

  #[test]
  fn test_load_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "attendance:\n  page_size: 25\nsession:\n  path: /tmp/s.db\n").unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.attendance.page_size, 25);
    assert_eq!(config.session.path, Some(PathBuf::from("/tmp/s.db")));
  }
}
