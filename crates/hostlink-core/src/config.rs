// ── Settings ──────────────────────────────────────────────────────────────────
//
// Optional `~/.hostlink/settings.json`. Every field has a default so a partial
// (or absent) file is valid; a malformed file is a configuration error.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_DIR_NAME: &str = ".hostlink";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const TRUST_STORE_FILE_NAME: &str = "trusted_hosts.json";

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_connect_timeout_secs() -> u64 {
    30
}
fn default_operation_timeout_secs() -> u64 {
    0
}
fn default_keepalive_secs() -> u64 {
    60
}
fn default_chunk_size() -> usize {
    65_536
}
fn default_concurrency() -> usize {
    4
}
fn default_percent_step() -> u8 {
    10
}
fn default_call_stride() -> u32 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

// ── Top-level settings ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostlinkSettings {
    /// Overrides `~/.hostlink/trusted_hosts.json`.
    #[serde(default)]
    pub trust_store_path: Option<PathBuf>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 0 disables the per-operation timeout.
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    /// 0 disables keepalives.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Upper bound on hosts handled at once by batch connect / transfer.
    #[serde(default = "default_concurrency")]
    pub max_concurrent_hosts: usize,
    #[serde(default)]
    pub progress: ProgressSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for HostlinkSettings {
    fn default() -> Self {
        Self {
            trust_store_path: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            keepalive_interval_secs: default_keepalive_secs(),
            chunk_size: default_chunk_size(),
            max_concurrent_hosts: default_concurrency(),
            progress: ProgressSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl HostlinkSettings {
    /// Load settings from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read '{}': {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid settings in '{}': {}", path.display(), e)))
    }

    /// Load `~/.hostlink/settings.json`.
    pub fn load_default() -> Result<Self> {
        Self::load(&config_dir()?.join(SETTINGS_FILE_NAME))
    }

    /// Resolved trust-store location.
    pub fn trust_store_path(&self) -> Result<PathBuf> {
        match &self.trust_store_path {
            Some(p) => Ok(p.clone()),
            None => Ok(config_dir()?.join(TRUST_STORE_FILE_NAME)),
        }
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Option<std::time::Duration> {
        (self.operation_timeout_secs > 0)
            .then(|| std::time::Duration::from_secs(self.operation_timeout_secs))
    }
}

/// `~/.hostlink`
pub fn config_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|h| h.join(CONFIG_DIR_NAME))
        .ok_or_else(|| Error::Config("cannot determine the home directory".into()))
}

// ── Progress throttling ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSettings {
    /// Surface an update only when the percentage crosses a multiple of this.
    #[serde(default = "default_percent_step")]
    pub percent_step: u8,
    /// Evaluate at most once per this many byte-count callbacks.
    #[serde(default = "default_call_stride")]
    pub call_stride: u32,
    /// Minimum spacing between surfaced updates; 0 disables.
    #[serde(default)]
    pub min_interval_ms: u64,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            percent_step: default_percent_step(),
            call_stride: default_call_stride(),
            min_interval_ms: 0,
        }
    }
}

// ── Logging ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Append logs to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            file: None,
        }
    }
}
