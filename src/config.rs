use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub session: SessionConfig,
  /// Login entry point shown when the session ends
  #[serde(default = "default_login_url")]
  pub login_url: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api: ApiConfig::default(),
      session: SessionConfig::default(),
      login_url: default_login_url(),
    }
  }
}

fn default_login_url() -> String {
  "/login".to_string()
}

fn default_base_url() -> String {
  DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Request timeout in seconds (transport default if unset)
  pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      timeout_secs: None,
    }
  }
}

impl ApiConfig {
  pub fn timeout(&self) -> Option<Duration> {
    self.timeout_secs.map(Duration::from_secs)
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
  /// Persist tokens in a SQLite file
  #[default]
  Sqlite,
  /// Keep tokens in memory only
  Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
  #[serde(default)]
  pub store: StoreKind,
  /// Override for the session database location
  pub path: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./ledgerline.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/ledgerline/config.yaml
  ///
  /// Without a config file the defaults are used. `LEDGERLINE_API_URL`
  /// overrides the base URL in every case.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    Ok(config.with_env_overrides())
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("ledgerline.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("ledgerline").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  /// Parse configuration from YAML. An empty document yields the defaults.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  fn with_env_overrides(mut self) -> Self {
    if let Some(url) = Self::api_url_override() {
      self.api.base_url = url;
    }
    self
  }

  /// Base URL from the `LEDGERLINE_API_URL` environment variable.
  pub fn api_url_override() -> Option<String> {
    std::env::var("LEDGERLINE_API_URL")
      .ok()
      .filter(|url| !url.trim().is_empty())
  }

  /// Get the account password from environment variables.
  ///
  /// Checks LEDGERLINE_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("LEDGERLINE_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set LEDGERLINE_PASSWORD or pass --password."))
  }
}
