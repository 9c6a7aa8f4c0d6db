//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::network::Transport;
use crate::persistence::retention::RetentionPolicy;
use crate::{AppError, Result};

/// Reachability probe settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProbeSettings {
    /// Endpoint requested by the HTTP reachability test.
    #[serde(default = "default_probe_url")]
    pub url: String,
    /// Interval between reachability tests.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Floor applied to every interval.
    #[serde(default = "default_interval_ms")]
    pub min_interval_ms: u64,
    /// Timeout of a single reachability request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            url: default_probe_url(),
            interval_ms: default_interval_ms(),
            min_interval_ms: default_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ProbeSettings {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_probe_url() -> String {
    "https://httpbin.org/delay/1".into()
}

fn default_interval_ms() -> u64 {
    3000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

/// Number of records kept per store when history is trimmed.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RetentionConfig {
    /// Sessions kept.
    #[serde(default = "default_sessions_kept")]
    pub sessions: u32,
    /// Network state rows kept.
    #[serde(default = "default_rows_kept")]
    pub network_states: u32,
    /// Network capability rows kept.
    #[serde(default = "default_rows_kept")]
    pub network_capabilities: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sessions: default_sessions_kept(),
            network_states: default_rows_kept(),
            network_capabilities: default_rows_kept(),
        }
    }
}

impl RetentionConfig {
    /// Policy handed to the trimming routine.
    #[must_use]
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            sessions: self.sessions,
            network_states: self.network_states,
            network_capabilities: self.network_capabilities,
        }
    }
}

fn default_sessions_kept() -> u32 {
    3
}

fn default_rows_kept() -> u32 {
    30
}

/// Which change callbacks a lifecycle context registers.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LifecycleConfig {
    /// React to network capability changes.
    #[serde(default = "default_true")]
    pub capability_callback: bool,
    /// React to reachability changes.
    #[serde(default = "default_true")]
    pub reachability_callback: bool,
    /// Whether the host granted network-state and internet access.
    #[serde(default = "default_true")]
    pub internet_access_permitted: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            capability_callback: true,
            reachability_callback: true,
            internet_access_permitted: true,
        }
    }
}

impl LifecycleConfig {
    /// Capability callback requested and permitted.
    #[must_use]
    pub fn capability_callback_enabled(&self) -> bool {
        self.capability_callback && self.internet_access_permitted
    }

    /// Reachability callback requested and permitted.
    #[must_use]
    pub fn reachability_callback_enabled(&self) -> bool {
        self.reachability_callback && self.internet_access_permitted
    }
}

fn default_true() -> bool {
    true
}

/// Static description of the active network for hosts without a platform
/// notifier.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct ConnectivityConfig {
    /// Transports of the active network; empty means no network.
    #[serde(default)]
    pub transports: Vec<Transport>,
    /// Advertised capability codes.
    #[serde(default)]
    pub capabilities: Vec<i32>,
    /// Estimated downstream bandwidth.
    #[serde(default)]
    pub downstream_kbps: i32,
    /// Estimated upstream bandwidth.
    #[serde(default)]
    pub upstream_kbps: i32,
    /// Signal strength.
    #[serde(default)]
    pub signal_strength: i32,
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Reachability probing.
    #[serde(default)]
    pub probe: ProbeSettings,
    /// History trimming.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Callback registration.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Static connectivity description.
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("netaware.db")
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        if self.probe.min_interval_ms == 0 {
            return Err(AppError::Config(
                "probe.min_interval_ms must be greater than zero".into(),
            ));
        }

        if self.probe.url.trim().is_empty() {
            return Err(AppError::Config("probe.url must not be empty".into()));
        }

        if self.probe.interval_ms < self.probe.min_interval_ms {
            warn!(
                interval_ms = self.probe.interval_ms,
                min_interval_ms = self.probe.min_interval_ms,
                "probe interval below floor, clamping"
            );
            self.probe.interval_ms = self.probe.min_interval_ms;
        }

        let retention = &self.retention;
        if retention.sessions == 0
            || retention.network_states == 0
            || retention.network_capabilities == 0
        {
            return Err(AppError::Config(
                "retention counts must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
