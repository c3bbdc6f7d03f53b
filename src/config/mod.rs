pub mod runtime;
pub use runtime::apply_env_overrides;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::geolocation::WatchOptions;

/// Complete pawmap configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PawmapConfig {
    #[serde(default)]
    pub geolocation: GeolocationConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl PawmapConfig {
    /// Defaults with `PAWMAP_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        apply_env_overrides(&mut cfg);
        cfg
    }
}

/// Device geolocation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GeolocationConfig {
    #[serde(default = "default_high_accuracy")]
    pub high_accuracy: bool,
    /// A fix must arrive within this window or the request counts as `FixTimeout`
    #[serde(default = "default_fix_timeout_ms")]
    pub fix_timeout_ms: u64,
    /// Oldest cached platform position accepted (0 = always fresh)
    #[serde(default)]
    pub max_fix_age_ms: u64,
    /// Consecutive timeouts retried before surfacing an error
    #[serde(default = "default_max_timeout_retries")]
    pub max_timeout_retries: u32,
}

fn default_high_accuracy() -> bool {
    true
}

fn default_fix_timeout_ms() -> u64 {
    15_000
}

fn default_max_timeout_retries() -> u32 {
    2
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: default_high_accuracy(),
            fix_timeout_ms: default_fix_timeout_ms(),
            max_fix_age_ms: 0,
            max_timeout_retries: default_max_timeout_retries(),
        }
    }
}

impl GeolocationConfig {
    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            high_accuracy: self.high_accuracy,
            timeout: Duration::from_millis(self.fix_timeout_ms),
            max_fix_age: Duration::from_millis(self.max_fix_age_ms),
        }
    }
}

/// Location publisher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    /// Seconds between periodic writes while active
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// Consecutive failed cycles before the degraded signal fires
    #[serde(default = "default_degraded_after_failures")]
    pub degraded_after_failures: u32,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_interval_seconds() -> u64 {
    60
}

fn default_degraded_after_failures() -> u32 {
    3
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            degraded_after_failures: default_degraded_after_failures(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl PublisherConfig {
    /// Period between writes. Zero is raised to one second, since a timer
    /// cannot tick with a zero period.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Nearby feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Store table whose change notifications drive refreshes
    #[serde(default = "default_table")]
    pub table: String,
    /// Discovery radius around the viewer (unbounded when absent)
    #[serde(default)]
    pub discovery_radius_km: Option<f64>,
    /// Bound on each snapshot read; a slower read keeps the previous view
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_table() -> String {
    "pets".to_string()
}

fn default_read_timeout_ms() -> u64 {
    5_000
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            discovery_radius_km: None,
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl FeedConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Per-session channel sizing
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
    #[serde(default = "default_notice_buffer")]
    pub notice_buffer: usize,
}

fn default_command_buffer() -> usize {
    32
}

fn default_notice_buffer() -> usize {
    64
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_buffer: default_command_buffer(),
            notice_buffer: default_notice_buffer(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<PawmapConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: PawmapConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}
