use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Application directory name under the config and data dirs
const APP_DIR: &str = "tweetsync";

const DEFAULT_API_URL: &str = "https://uehs-tweet-backend.onrender.com/api/";

/// Shell assets every offline start needs
const DEFAULT_STATIC_ASSETS: &[&str] = &[
  "/",
  "/index.html",
  "/static/media/logo192.png",
  "/static/media/logo512.png",
  "/static/js/main.js",
  "/static/css/main.css",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// API root; the tweet collection lives at `<url>/tweets/`
  pub url: String,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: DEFAULT_API_URL.to_string(),
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// When false, nothing is persisted and the proxy is network-only
  pub enabled: bool,
  /// Store file (defaults to `<data_dir>/tweetsync/store.db`)
  pub path: Option<PathBuf>,
  /// Drop cached reads not refreshed for this many days
  pub retention_days: Option<u32>,
  /// Origin the static asset paths are resolved against (defaults to the API origin)
  pub asset_origin: Option<String>,
  pub static_assets: Vec<String>,
  /// Path prefix attachments are served under
  pub media_prefix: String,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      retention_days: None,
      asset_origin: None,
      static_assets: DEFAULT_STATIC_ASSETS.iter().map(|s| s.to_string()).collect(),
      media_prefix: "/media/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: 15,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tweetsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tweetsync/config.yaml
  ///
  /// Defaults are used when no file is found.
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
    let local = PathBuf::from("tweetsync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join(APP_DIR).join("config.yaml");
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
    // An empty file deserializes to null
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Get the API bearer token from the environment, if set.
  pub fn get_api_token() -> Option<String> {
    std::env::var("TWEETSYNC_TOKEN").ok().filter(|t| !t.is_empty())
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.sync.probe_interval_secs.max(1))
  }

  pub fn retention(&self) -> Option<chrono::Duration> {
    self
      .cache
      .retention_days
      .map(|days| chrono::Duration::days(i64::from(days)))
  }

  pub fn store_path(&self) -> Result<PathBuf> {
    if let Some(ref path) = self.cache.path {
      return Ok(path.clone());
    }
    Ok(Self::data_dir()?.join("store.db"))
  }

  pub fn log_dir(&self) -> Result<PathBuf> {
    Ok(Self::data_dir()?.join("logs"))
  }

  fn data_dir() -> Result<PathBuf> {
    dirs::data_dir()
      .map(|d| d.join(APP_DIR))
      .ok_or_else(|| eyre!("Could not determine data directory"))
  }

  pub fn api_url(&self) -> Result<Url> {
    Url::parse(&self.api.url).map_err(|e| eyre!("Invalid api.url {}: {}", self.api.url, e))
  }

  /// Static asset URLs, resolved against the asset origin.
  pub fn static_asset_urls(&self) -> Result<Vec<Url>> {
    let origin = match self.cache.asset_origin {
      Some(ref origin) => {
        Url::parse(origin).map_err(|e| eyre!("Invalid cache.asset_origin {}: {}", origin, e))?
      }
      None => self.api_url()?,
    };
    self
      .cache
      .static_assets
      .iter()
      .map(|asset| {
        origin
          .join(asset)
          .map_err(|e| eyre!("Invalid static asset {}: {}", asset, e))
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_when_empty() {
    let config = Config::parse("").unwrap();
    assert!(config.cache.enabled);
    assert_eq!(config.api_url().unwrap().as_str(), DEFAULT_API_URL);
    assert_eq!(config.timeout(), Duration::from_secs(30));
    assert_eq!(config.cache.media_prefix, "/media/");
    assert!(config.retention().is_none());
  }

  #[test]
  fn test_partial_sections_keep_defaults() {
    let config = Config::parse(
      "api:\n  url: http://localhost:8000/api/\ncache:\n  retention_days: 7\nsync:\n  probe_interval_secs: 0\n",
    )
    .unwrap();
    assert_eq!(config.api_url().unwrap().as_str(), "http://localhost:8000/api/");
    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(config.retention(), Some(chrono::Duration::days(7)));
    assert!(config.cache.enabled);
    assert_eq!(config.probe_interval(), Duration::from_secs(1));
  }

  #[test]
  fn test_static_assets_resolve_against_origin() {
    let config = Config::parse(
      "api:\n  url: https://api.example.org/api/\ncache:\n  asset_origin: https://app.example.org/\n  static_assets: [\"/index.html\"]\n",
    )
    .unwrap();
    let urls = config.static_asset_urls().unwrap();
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].as_str(), "https://app.example.org/index.html");
  }

  #[test]
  fn test_default_assets_use_api_origin() {
    let urls = Config::default().static_asset_urls().unwrap();
    assert_eq!(urls[0].as_str(), "https://uehs-tweet-backend.onrender.com/");
    assert_eq!(urls.len(), DEFAULT_STATIC_ASSETS.len());
  }

  #[test]
  fn test_invalid_api_url_is_error() {
    let config = Config::parse("api:\n  url: not a url\n").unwrap();
    assert!(config.api_url().is_err());
    assert!(config.static_asset_urls().is_err());
  }

  #[test]
  fn test_explicit_missing_path_is_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/tweetsync.yaml"))).is_err());
  }

  #[test]
  fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "cache:\n  enabled: false\n").unwrap();
    let config = Config::load(Some(&path)).unwrap();
    assert!(!config.cache.enabled);
  }
}
