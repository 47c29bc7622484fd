//! Feed configuration.
//!
//! Sources are layered, later wins: built-in defaults, an optional TOML file,
//! then environment variables. The API key has no default; `validate()` fails
//! fast before any request is issued when it is missing.

use crate::error::FeedError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_FALLBACK_POINTS: usize = 100;
/// Upper bound on synthetic bars per fallback series.
pub const MAX_FALLBACK_POINTS: usize = 10_000;

/// Environment variables read by [`FeedConfig::apply_env`].
pub const ENV_API_KEY: &str = "QUOTEFEED_API_KEY";
pub const ENV_API_KEY_LEGACY: &str = "ALPHA_VANTAGE_API_KEY";
pub const ENV_BASE_URL: &str = "QUOTEFEED_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "QUOTEFEED_TIMEOUT_SECS";
pub const ENV_STORE_DIR: &str = "QUOTEFEED_STORE_DIR";

/// Runtime configuration for the upstream client, store and fallback supplier.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedConfig {
    /// Provider credential. Required.
    pub api_key: Option<String>,
    /// Provider query endpoint.
    pub base_url: String,
    /// Upper bound for a single upstream request, in seconds.
    pub timeout_secs: u64,
    /// Root directory of the JSON record store.
    pub store_dir: PathBuf,
    /// Number of bars in a synthetic intraday fallback series.
    pub fallback_points: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            store_dir: PathBuf::from("data"),
            fallback_points: DEFAULT_FALLBACK_POINTS,
        }
    }
}

// Hand-written so the credential never ends up in logs.
impl std::fmt::Debug for FeedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("store_dir", &self.store_dir)
            .field("fallback_points", &self.fallback_points)
            .finish()
    }
}

impl FeedConfig {
    /// Load a config from a TOML file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, FeedError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FeedError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, FeedError> {
        toml::from_str(content).map_err(|e| FeedError::Config(format!("parse config TOML: {e}")))
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, FeedError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from an environment lookup.
    ///
    /// Takes the lookup as a closure so tests don't have to mutate the
    /// process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), FeedError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_API_KEY).or_else(|| lookup(ENV_API_KEY_LEGACY)) {
            self.api_key = Some(key);
        }
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = secs.trim().parse().map_err(|e| {
                FeedError::Config(format!("{ENV_TIMEOUT_SECS}={secs:?} is not a number: {e}"))
            })?;
        }
        if let Some(dir) = lookup(ENV_STORE_DIR) {
            self.store_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Fail fast on settings that would make every request fail.
    pub fn validate(&self) -> Result<(), FeedError> {
        match self.api_key.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(FeedError::Config(format!(
                    "missing API key: set {ENV_API_KEY} or `api_key` in the config file"
                )))
            }
            Some(_) => {}
        }
        if self.timeout_secs == 0 {
            return Err(FeedError::Config("timeout_secs must be > 0".into()));
        }
        if self.base_url.trim().is_empty() {
            return Err(FeedError::Config("base_url must not be empty".into()));
        }
        if !(1..=MAX_FALLBACK_POINTS).contains(&self.fallback_points) {
            return Err(FeedError::Config(format!(
                "fallback_points must be between 1 and {MAX_FALLBACK_POINTS}, got {}",
                self.fallback_points
            )));
        }
        Ok(())
    }

    /// The validated API key.
    pub fn require_api_key(&self) -> Result<&str, FeedError> {
        self.validate()?;
        self.api_key
            .as_deref()
            .map(str::trim)
            .ok_or_else(|| FeedError::Config("missing API key".into()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
