//! Client configuration: account endpoint, credentials and request limits.

use std::{
   fs,
   path::{Path, PathBuf},
   sync::OnceLock,
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Service version that introduced file leases.
pub const DEFAULT_API_VERSION: &str = "2019-07-07";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3600;

/// Client configuration loaded from config file and environment variables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
   /// File service endpoint, e.g. `https://<account>.file.core.windows.net`.
   pub account_url:          String,
   /// Shared access signature appended to every request URL.
   pub sas_token:            Option<String>,
   pub api_version:          String,
   /// Client-side limit for calls that carry no per-call timeout.
   pub request_timeout_secs: u64,
   /// Server-side timeout sent with lease calls when the caller gives none.
   pub lease_timeout_secs:   Option<u32>,
   pub user_agent_suffix:    Option<String>,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         account_url:          String::new(),
         sas_token:            None,
         api_version:          DEFAULT_API_VERSION.to_string(),
         request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
         lease_timeout_secs:   None,
         user_agent_suffix:    None,
      }
   }
}

impl Config {
   pub fn load() -> Self {
      Self::load_from(config_file_path())
   }

   /// Loads defaults, then `path` if it exists, then `FILESHARE_*` variables.
   pub fn load_from(path: &Path) -> Self {
      Self::figment(path)
         .extract()
         .inspect_err(|e| tracing::warn!("failed to parse config: {e}"))
         .unwrap_or_default()
   }

   pub fn figment(path: &Path) -> Figment {
      Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(path))
         .merge(Env::prefixed("FILESHARE_").lowercase(true))
   }

   /// Writes the default config as TOML, creating parent directories.
   pub fn create_default_config(path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }
      fs::write(path, Self::default().to_toml()?)?;
      Ok(())
   }

   pub fn to_toml(&self) -> Result<String> {
      Ok(toml::to_string_pretty(self)?)
   }

   pub fn parsed_account_url(&self) -> Result<Url> {
      let raw = self.account_url.trim();
      if raw.is_empty() {
         return Err(ConfigError::MissingAccountUrl.into());
      }
      let invalid = |reason: String| ConfigError::InvalidAccountUrl { url: raw.to_string(), reason };
      let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
      if !matches!(url.scheme(), "http" | "https") {
         return Err(invalid(format!("unsupported scheme {}", url.scheme())).into());
      }
      if url.cannot_be_a_base() || url.host_str().is_none() {
         return Err(invalid("missing host".to_string()).into());
      }
      Ok(url)
   }

   pub fn validate(&self) -> Result<()> {
      self.parsed_account_url()?;
      if self.api_version.trim().is_empty() {
         return Err(ConfigError::Invalid("api_version must not be empty".to_string()).into());
      }
      if self.request_timeout_secs == 0 || self.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
         return Err(
            ConfigError::Invalid(format!(
               "request_timeout_secs {} must be between 1 and {MAX_REQUEST_TIMEOUT_SECS}",
               self.request_timeout_secs
            ))
            .into(),
         );
      }
      if self.lease_timeout_secs == Some(0) {
         return Err(ConfigError::Invalid("lease_timeout_secs must be positive".to_string()).into());
      }
      Ok(())
   }
}

/// Returns the global configuration instance
pub fn get() -> &'static Config {
   CONFIG.get_or_init(Config::load)
}

/// Returns the base directory for fileshare configuration
pub fn base_dir() -> &'static PathBuf {
   static ONCE: OnceLock<PathBuf> = OnceLock::new();
   ONCE.get_or_init(|| resolve_base_dir(".fileshare"))
}

pub fn config_file_path() -> &'static PathBuf {
   static ONCE: OnceLock<PathBuf> = OnceLock::new();
   ONCE.get_or_init(|| base_dir().join("config.toml"))
}

fn resolve_base_dir(dir_name: &str) -> PathBuf {
   BaseDirs::new()
      .map(|d| d.home_dir().join(dir_name))
      .or_else(|| {
         std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(dir_name))
      })
      .unwrap_or_else(|| {
         std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(dir_name)
      })
}
