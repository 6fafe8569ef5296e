//! Delivery configuration types.
//!
//! Every field has a serde default so a partial (or empty) JSON object is a
//! valid configuration file.

use courier_common::{Destination, EndpointKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::validate::ValidationError;
use crate::ConfigError;

/// Subdirectory of the platform data dir used when `storage_dir` is unset.
const STORAGE_SUBDIR: &str = "courier/delivery";

/// Complete delivery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Directory holding cache entries. `None` means the platform default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,

    /// Destination prefix; each endpoint is `<base_url>/v1/log/<endpoint>`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub queue_limits: QueueLimits,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Interval between periodic session snapshots.
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_snapshot_interval_ms() -> u64 {
    2000
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            storage_dir: None,
            base_url: default_base_url(),
            queue_limits: QueueLimits::default(),
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
        }
    }
}

impl DeliveryConfig {
    /// Load from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse_json(&content)
    }

    /// Parse from a JSON string.
    pub fn parse_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }

    /// Write as pretty JSON, atomically replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<(), ValidationError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ValidationError::ParseError(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ValidationError::IoError(format!("{}: {}", parent.display(), e)))?;
        }
        let tmp = path.with_extension(format!("json.tmp.{}", std::process::id()));
        std::fs::write(&tmp, content)
            .map_err(|e| ValidationError::IoError(format!("{}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| ValidationError::IoError(format!("{}: {}", path.display(), e)))
    }

    /// Effective storage directory: explicit value or the platform data dir.
    pub fn storage_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.storage_dir {
            return Ok(dir.clone());
        }
        dirs::data_local_dir()
            .map(|d| d.join(STORAGE_SUBDIR))
            .ok_or(ConfigError::NoStorageDir)
    }

    /// JSON `POST` destination for an endpoint kind.
    pub fn destination_for(&self, kind: EndpointKind) -> Destination {
        Destination::post(format!(
            "{}/v1/log/{}",
            self.base_url.trim_end_matches('/'),
            kind.path()
        ))
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }
}

/// Maximum pending calls per endpoint kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueLimits {
    #[serde(default = "default_large_limit")]
    pub sessions: usize,
    #[serde(default = "default_large_limit")]
    pub events: usize,
    #[serde(default = "default_small_limit")]
    pub blobs: usize,
    #[serde(default = "default_large_limit")]
    pub logging: usize,
    #[serde(default = "default_small_limit")]
    pub network: usize,
}

fn default_large_limit() -> usize {
    100
}

fn default_small_limit() -> usize {
    50
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            sessions: 100,
            events: 100,
            blobs: 50,
            logging: 100,
            network: 50,
        }
    }
}

impl QueueLimits {
    pub fn limit_for(&self, kind: EndpointKind) -> usize {
        match kind {
            EndpointKind::Sessions => self.sessions,
            EndpointKind::Events => self.events,
            EndpointKind::Blobs => self.blobs,
            EndpointKind::Logging => self.logging,
            EndpointKind::Network => self.network,
        }
    }

    pub fn set_limit(&mut self, kind: EndpointKind, limit: usize) {
        match kind {
            EndpointKind::Sessions => self.sessions = limit,
            EndpointKind::Events => self.events = limit,
            EndpointKind::Blobs => self.blobs = limit,
            EndpointKind::Logging => self.logging = limit,
            EndpointKind::Network => self.network = limit,
        }
    }

    /// Same limit for every kind. Mostly useful in tests.
    pub fn uniform(limit: usize) -> Self {
        Self {
            sessions: limit,
            events: limit,
            blobs: limit,
            logging: limit,
            network: limit,
        }
    }
}

/// Retry drive backoff.
///
/// The delay starts at `initial_delay_secs`, doubles after every drain that
/// had failures and is capped at `max_delay_secs`. A clean drain resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

fn default_initial_delay_secs() -> u64 {
    120
}

fn default_max_delay_secs() -> u64 {
    3600
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    /// Delay after a drain with failures, given the current delay.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay())
    }
}

/// Blocking-send timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Upper bound for `send_and_await`.
    #[serde(default = "default_await_secs")]
    pub await_secs: u64,
    /// Upper bound for `send_critical` (crash payloads).
    #[serde(default = "default_critical_secs")]
    pub critical_secs: u64,
}

fn default_await_secs() -> u64 {
    60
}

fn default_critical_secs() -> u64 {
    1
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            await_secs: default_await_secs(),
            critical_secs: default_critical_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn await_timeout(&self) -> Duration {
        Duration::from_secs(self.await_secs)
    }

    pub fn critical_timeout(&self) -> Duration {
        Duration::from_secs(self.critical_secs)
    }
}
