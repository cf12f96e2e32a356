//! Configuration management for function-sync.
//!
//! Loads configuration from a TOML file with environment variable overrides.
//! Command-line flags are applied on top by the binary.

use crate::utils::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Credential profile name
    #[serde(default)]
    pub profile: Option<String>,

    /// Region override (otherwise taken from the profile)
    #[serde(default)]
    pub region: Option<String>,

    /// Endpoint override, e.g. a local emulator
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Timeout for downloading the deployed package
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Where the working archive and manifest live; never inside the watched tree
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Extra attempts for uploads that failed in transport
    #[serde(default = "default_upload_retries")]
    pub upload_retries: u32,

    /// Pause between upload attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_download_timeout_secs() -> u64 {
    120
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_upload_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            profile: None,
            region: None,
            endpoint_url: None,
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            upload_retries: default_upload_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SyncConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SyncError::Config(format!("invalid config: {e}")))
    }

    /// Apply `FUNCTION_SYNC_*` and `LOGLEVEL` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(profile) = lookup("FUNCTION_SYNC_PROFILE") {
            self.remote.profile = Some(profile);
        }
        if let Some(region) = lookup("FUNCTION_SYNC_REGION") {
            self.remote.region = Some(region);
        }
        if let Some(endpoint) = lookup("FUNCTION_SYNC_ENDPOINT_URL") {
            self.remote.endpoint_url = Some(endpoint);
        }
        if let Some(dir) = lookup("FUNCTION_SYNC_SCRATCH_DIR") {
            self.sync.scratch_dir = PathBuf::from(dir);
        }
        if let Some(retries) = lookup("FUNCTION_SYNC_UPLOAD_RETRIES").and_then(|v| v.parse().ok()) {
            self.sync.upload_retries = retries;
        }
        if let Some(level) = lookup("LOGLEVEL") {
            self.log.level = level.to_lowercase();
        }
        self
    }
}
